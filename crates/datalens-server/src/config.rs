//! Configuration for the DataLens Server
//!
//! This module contains the configuration types and loading functionality.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Directory holding uploaded dataset blobs
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory holding per-session chat history files
    #[serde(default = "default_history_dir")]
    pub history_dir: String,

    /// Seconds a parsed snapshot stays fresh before the next read reloads it
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Budget for evaluating one query expression, in milliseconds
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Maximum retained provenance records; oldest are evicted beyond this
    #[serde(default = "default_provenance_capacity")]
    pub provenance_capacity: usize,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_history_dir() -> String {
    "chat_history".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_query_timeout_ms() -> u64 {
    5000
}

fn default_provenance_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override from environment variables
        if let Ok(port) = env::var("DATALENS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            } else {
                warn!("Invalid DATALENS_PORT value: {}", port);
            }
        }

        if let Ok(host) = env::var("DATALENS_BIND_ADDRESS") {
            config.bind_address = host;
        }

        if let Ok(data_dir) = env::var("DATALENS_DATA_DIR") {
            config.data_dir = data_dir;
        }

        if let Ok(history_dir) = env::var("DATALENS_HISTORY_DIR") {
            config.history_dir = history_dir;
        }

        if let Ok(ttl) = env::var("DATALENS_CACHE_TTL_SECS") {
            if let Ok(secs) = ttl.parse::<u64>() {
                config.cache_ttl_secs = secs;
            } else {
                warn!("Invalid DATALENS_CACHE_TTL_SECS value: {}", ttl);
            }
        }

        if let Ok(timeout) = env::var("DATALENS_QUERY_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.query_timeout_ms = ms;
            } else {
                warn!("Invalid DATALENS_QUERY_TIMEOUT_MS value: {}", timeout);
            }
        }

        if let Ok(capacity) = env::var("DATALENS_PROVENANCE_CAPACITY") {
            if let Ok(capacity) = capacity.parse::<usize>() {
                config.provenance_capacity = capacity;
            } else {
                warn!("Invalid DATALENS_PROVENANCE_CAPACITY value: {}", capacity);
            }
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.log_level = log_level;
        }

        // Validate required fields
        if config.data_dir.is_empty() {
            return Err(ServerError::Validation(
                "Data directory is required".to_string(),
            ));
        }

        if config.history_dir.is_empty() {
            return Err(ServerError::Validation(
                "History directory is required".to_string(),
            ));
        }

        if config.provenance_capacity == 0 {
            return Err(ServerError::Validation(
                "Provenance capacity must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Snapshot time-to-live as a duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Expression evaluation budget as a duration
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            data_dir: default_data_dir(),
            history_dir: default_history_dir(),
            cache_ttl_secs: default_cache_ttl_secs(),
            query_timeout_ms: default_query_timeout_ms(),
            provenance_capacity: default_provenance_capacity(),
            log_level: default_log_level(),
        }
    }
}
