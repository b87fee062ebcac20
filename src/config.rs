use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::mcp::server::ServerInfo;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_BIND_PORT: u16 = 8898;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub server_name: String,
    pub instructions: Option<String>,
    /// `None` disables idle eviction.
    pub session_idle_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("MCP_SESSION_IDLE_SECS must be a non-negative integer")]
    InvalidIdleTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_port = non_empty("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_BIND_PORT);
        let server_name =
            non_empty("MCP_SERVER_NAME").unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let instructions = non_empty("MCP_INSTRUCTIONS");
        let idle_secs = non_empty("MCP_SESSION_IDLE_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidIdleTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_SESSION_IDLE_SECS);

        let config = Self {
            bind_addr,
            bind_port,
            server_name,
            instructions,
            session_idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: self.instructions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = config_from(&[]).expect("config should parse");

        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.bind_port, 8898);
        assert_eq!(config.server_name, env!("CARGO_PKG_NAME"));
        assert_eq!(config.instructions, None);
        assert_eq!(
            config.session_idle_timeout,
            Some(Duration::from_secs(1800))
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("BIND_ADDR", "0.0.0.0"),
            ("BIND_PORT", "9000"),
            ("MCP_SERVER_NAME", "notes"),
            ("MCP_INSTRUCTIONS", "Use read_note to fetch markdown notes."),
            ("MCP_SESSION_IDLE_SECS", "60"),
        ])
        .expect("config should parse");

        assert_eq!(
            config.bind_socket().expect("valid socket").to_string(),
            "0.0.0.0:9000"
        );
        let info = config.server_info();
        assert_eq!(info.name, "notes");
        assert_eq!(
            info.instructions.as_deref(),
            Some("Use read_note to fetch markdown notes.")
        );
        assert_eq!(config.session_idle_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn zero_idle_secs_disables_eviction() {
        let config =
            config_from(&[("MCP_SESSION_IDLE_SECS", "0")]).expect("config should parse");
        assert_eq!(config.session_idle_timeout, None);
    }

    #[test]
    fn invalid_port_fails() {
        let err = config_from(&[("BIND_PORT", "70000")]).expect_err("expected invalid port");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn invalid_idle_secs_fails() {
        let err = config_from(&[("MCP_SESSION_IDLE_SECS", "-5")])
            .expect_err("expected invalid idle timeout");
        assert!(matches!(err, ConfigError::InvalidIdleTimeout));
    }

    #[test]
    fn invalid_bind_addr_fails() {
        let err = config_from(&[("BIND_ADDR", "not an address")])
            .expect_err("expected invalid socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }
}
