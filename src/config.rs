//! Environment-backed runtime configuration.

use std::env;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_ADDR is not a valid socket address: {0}")]
    InvalidBindAddr(String),
}

/// Runtime configuration for the hub.
///
/// Both secrets are optional on purpose: a missing secret makes the
/// corresponding operation fail closed at request time rather than crashing
/// the server at startup, and an empty value counts as missing.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Verifies upgrade bearer tokens. Unset → every upgrade is a 500.
    pub ws_token_secret: Option<String>,
    /// Guards the internal broadcast channel. Unset → every broadcast is a 401.
    pub internal_broadcast_secret: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = match env::var("BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddr(raw))?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        Ok(Self {
            bind_addr,
            ws_token_secret: non_empty(env::var("WS_TOKEN_SECRET").ok()),
            internal_broadcast_secret: non_empty(env::var("INTERNAL_BROADCAST_SECRET").ok()),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secrets_count_as_missing() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("   ".to_string())), None);
        assert_eq!(
            non_empty(Some("secret".to_string())),
            Some("secret".to_string())
        );
    }
}
