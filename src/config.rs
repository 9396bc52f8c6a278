//! Configuration for optikv
//!
//! One struct with defaults that work out of the box, built up through a
//! fluent builder.

/// Settings for an optikv server instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Address the TCP listener binds
    pub listen_addr: String,

    /// Max concurrent client connections (size of the worker pool; each
    /// worker services one connection at a time)
    pub max_connections: usize,

    /// Connection read timeout in milliseconds (0 disables; calls at the
    /// client layer are blocking round-trips, so the default keeps idle
    /// connections open indefinitely)
    pub read_timeout_ms: u64,

    /// Connection write timeout in milliseconds (0 disables)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Object Configuration
    // -------------------------------------------------------------------------
    /// Maximum size of a single object value in bytes; writes and inserts
    /// above this fail with a server error
    pub max_value_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7878".to_string(),
            max_connections: 64,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            max_value_size: 1024 * 1024, // 1 MB
        }
    }
}

impl Config {
    /// Start building a config from the defaults
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Fluent builder for [`Config`]
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the address the listener binds
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the worker pool size (one connection served per worker)
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds, 0 disables)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds, 0 disables)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the maximum object value size (in bytes)
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
