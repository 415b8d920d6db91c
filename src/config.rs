//! Server configuration
//!
//! Bind address and the idle-eviction window. Values come from the
//! command line with sensible defaults; there is no config file.

use std::time::Duration;

/// Default bind address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8888";

/// Default inactivity window before a session is evicted
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the listener binds to, e.g. "127.0.0.1:8888"
    pub bind_addr: String,
    /// A session that sends nothing for this long is evicted
    pub idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl Config {
    /// Create a config with the given bind address and the default timeout
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }

    /// Override the idle-eviction window
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}
