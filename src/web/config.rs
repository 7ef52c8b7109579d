//! Web server configuration.

use crate::error::{Result, SystemError};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Where and how the dashboard is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    /// Host name or IP address to listen on
    pub host: String,
    pub port: u16,
    /// Send permissive CORS headers on every response
    pub enable_cors: bool,
    /// Directory holding a custom dashboard (`index.html` plus assets)
    pub dashboard_dir: Option<PathBuf>,
    /// WebSocket connections accepted at once
    pub max_websocket_connections: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::DEFAULT_WEB_PORT,
            enable_cors: true,
            dashboard_dir: None,
            max_websocket_connections: 100,
        }
    }
}

impl WebConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_cors(mut self, enable_cors: bool) -> Self {
        self.enable_cors = enable_cors;
        self
    }

    /// Serve the dashboard from `dir` instead of the built-in page.
    pub fn with_dashboard_dir(mut self, dir: Option<impl Into<PathBuf>>) -> Self {
        self.dashboard_dir = dir.map(Into::into);
        self
    }

    pub fn with_max_websocket_connections(mut self, max: usize) -> Self {
        self.max_websocket_connections = max;
        self
    }

    /// `host:port` as given, for logging.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the listen address. Host names resolve to their first address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                SystemError::config_error(format!("cannot resolve {}: {}", self.bind_address(), e))
            })?
            .next()
            .ok_or_else(|| {
                SystemError::config_error(format!("{} resolves to no address", self.bind_address()))
            })
    }

    /// The custom `index.html`, if a dashboard directory is set and holds one.
    pub fn dashboard_index(&self) -> Option<PathBuf> {
        self.dashboard_dir
            .as_deref()
            .map(|dir| dir.join("index.html"))
            .filter(|index| index.is_file())
    }

    /// The dashboard directory, if set and present on disk.
    pub fn served_dashboard_dir(&self) -> Option<&Path> {
        self.dashboard_dir.as_deref().filter(|dir| dir.is_dir())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SystemError::config_error("host must not be empty"));
        }
        if self.max_websocket_connections == 0 {
            return Err(SystemError::config_error(
                "at least one WebSocket connection must be allowed",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr_resolves_ip() {
        let config = WebConfig::new("127.0.0.1", 9000);
        assert_eq!(config.socket_addr().unwrap(), "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_missing_dashboard_dir_falls_back() {
        let config = WebConfig::default().with_dashboard_dir(Some("/nonexistent/sysdash"));
        assert!(config.served_dashboard_dir().is_none());
        assert!(config.dashboard_index().is_none());
    }
}
