//! Server configuration loaded from TOML (ambient addition; the original
//! C++ library takes these as constructor/setter arguments with no config
//! file format of its own).

use anyrpc::error::{AnyRpcError, ErrorKind, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_connections: usize,
    pub backlog: i32,
    pub thread_pool_size: usize,
    pub forced_disconnect_allowed: bool,
    pub keepalive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 9000,
            max_connections: 8,
            backlog: 5,
            thread_pool_size: 4,
            forced_disconnect_allowed: true,
            keepalive_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AnyRpcError::new(ErrorKind::TransportError, e.to_string()))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_library() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.thread_pool_size, 4);
    }

    #[test]
    fn parses_a_partial_toml_document() {
        let config = ServerConfig::from_toml_str("port = 9500\nmax_connections = 32\n").unwrap();
        assert_eq!(config.port, 9500);
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.thread_pool_size, 4);
    }
}
