use redirect::config::Config as RedirectConfig;
use resolver::config::UpstreamConfig;
use resolver::types::ProjectId;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub redirect: RedirectConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Public file key to the project whose newest release asset it points at
    pub files: HashMap<String, ProjectId>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.redirect.validate()?;
        self.upstream.validate()?;

        if self.files.contains_key("") {
            return Err(ValidationError::EmptyFileKey);
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("invalid redirect config: {0}")]
    Redirect(#[from] redirect::config::ValidationError),
    #[error("invalid upstream config: {0}")]
    Upstream(#[from] resolver::config::ValidationError),
    #[error("file keys cannot be empty")]
    EmptyFileKey,
}
