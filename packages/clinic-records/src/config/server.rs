use super::{DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_WORKER_THREADS};
use crate::error::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,

    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    #[serde(default = "ServerConfig::default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    #[serde(default = "ServerConfig::default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default = "ServerConfig::default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: ServerConfig::default_host(),
            port: ServerConfig::default_port(),
            shutdown_timeout: ServerConfig::default_shutdown_timeout(),
            worker_threads: ServerConfig::default_worker_threads(),
            cors_origin: ServerConfig::default_cors_origin(),
        }
    }
}

impl ServerConfig {
    pub fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    pub fn default_port() -> u16 {
        DEFAULT_PORT
    }

    pub fn default_shutdown_timeout() -> u64 {
        DEFAULT_SHUTDOWN_TIMEOUT
    }

    pub fn default_cors_origin() -> String {
        "http://localhost:5173".to_string()
    }

    ///
    /// Default number of worker threads
    /// This is half the number of available cores or DEFAULT_WORKER_THREADS, whichever is greater
    pub fn default_worker_threads() -> usize {
        match thread::available_parallelism() {
            Ok(p) => {
                let count = p.get();
                let threads = count / 2;
                threads.max(DEFAULT_WORKER_THREADS)
            }
            Err(_) => DEFAULT_WORKER_THREADS,
        }
    }

    pub fn to_socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_address(&self) -> Result<SocketAddr, ConfigError> {
        let address = self.to_socket_address();
        address
            .parse()
            .map_err(|_| ConfigError::InvalidServerAddress { address })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::ServerConfig;

    #[test]
    fn default_worker_threads_has_a_floor() {
        assert!(ServerConfig::default_worker_threads() >= 4);
    }

    #[test]
    fn invalid_host_is_rejected() {
        let config = ServerConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(config.socket_address().is_err());

        let config = ServerConfig::default();
        assert_eq!(config.socket_address().unwrap().port(), 5000);
    }
}
