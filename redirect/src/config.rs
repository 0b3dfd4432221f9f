use serde::Deserialize;
use shared::config::{Listener, ListenerError};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("invalid listener: {0}")]
    Listener(#[from] ListenerError),

    #[error("listener and admin listener cannot share {0}")]
    SharedListener(String),
}

/// Redirect service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Where redirect requests are served
    #[serde(default = "default_listener")]
    pub listener: Listener,
    /// Health and readiness endpoints
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
}

fn default_listener() -> Listener {
    Listener::tcp("0.0.0.0", 8947)
}

fn default_admin_listener() -> Listener {
    Listener::tcp("127.0.0.1", 8948)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: default_listener(),
            admin_listener: default_admin_listener(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::SharedListener(self.listener.to_string()));
        }

        Ok(())
    }
}
