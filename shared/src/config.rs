use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ListenerError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Unix socket path cannot be empty")]
    EmptySocketPath,
}

/// Where a service accepts connections.
///
/// Either a TCP `host`/`port` pair or a `path` to a Unix domain socket.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Listener {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl Listener {
    pub fn tcp<H: Into<String>>(host: H, port: u16) -> Self {
        Listener::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn validate(&self) -> Result<(), ListenerError> {
        match self {
            Listener::Tcp { port: 0, .. } => Err(ListenerError::InvalidPort),
            Listener::Unix { path } if path.as_os_str().is_empty() => {
                Err(ListenerError::EmptySocketPath)
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Tcp { host, port } => write!(f, "{host}:{port}"),
            Listener::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listeners() {
        let tcp: Listener = serde_yaml::from_str("{ host: 0.0.0.0, port: 8947 }").unwrap();
        assert_eq!(tcp, Listener::tcp("0.0.0.0", 8947));
        assert_eq!(tcp.to_string(), "0.0.0.0:8947");

        let unix: Listener = serde_yaml::from_str("path: /run/redirector.sock").unwrap();
        assert_eq!(
            unix,
            Listener::Unix {
                path: "/run/redirector.sock".into()
            }
        );
        assert_eq!(unix.to_string(), "unix:/run/redirector.sock");
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            Listener::tcp("127.0.0.1", 0).validate(),
            Err(ListenerError::InvalidPort)
        );
        assert_eq!(
            Listener::Unix { path: "".into() }.validate(),
            Err(ListenerError::EmptySocketPath)
        );
        assert!(Listener::tcp("127.0.0.1", 3000).validate().is_ok());
    }
}
