use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_USER_AGENT: &str = "GitHub-Redirector/0.1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Upstream timeout cannot be 0")]
    ZeroTimeout,

    #[error("Upstream user agent cannot be empty")]
    EmptyUserAgent,

    #[error("Invalid upstream URL: {0}")]
    InvalidApiUrl(#[from] url::ParseError),

    #[error("Unsupported upstream URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Settings for the release-listing API that projects are resolved against.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the API, e.g. `https://api.github.com` or a GitHub Enterprise host
    pub api_url: String,
    /// Sent as `User-Agent` upstream and as `Server` on our own responses
    pub user_agent: String,
    /// Bounds the whole upstream request, including reading the body
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            api_url: DEFAULT_API_URL.into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }

        if self.user_agent.trim().is_empty() {
            return Err(ValidationError::EmptyUserAgent);
        }

        let api_url = Url::parse(&self.api_url)?;
        match api_url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ValidationError::UnsupportedScheme(other.to_string())),
        }
    }
}
