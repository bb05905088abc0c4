use crate::buffer::OverflowPolicy;
use crate::forwarder::ForwarderSettings;
use crate::sender::{Endpoint, PoolError, ServerPool, WireFormat};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid server list: {0}")]
    InvalidServers(#[from] PoolError),
    #[error("file error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Tails a log and forwards framed events to a collection server", long_about = None)]
#[serde(default)]
pub struct Config {
    /// Tag attached to every forwarded event
    #[arg(long, env = "TAILFWD_TAG", default_value = "")]
    pub tag: String,

    /// Record field the raw line is stored under
    #[arg(long, env = "TAILFWD_FIELD", default_value = "message")]
    pub field_name: String,

    /// Log file to tail (reads stdin when omitted)
    #[arg(long, env = "TAILFWD_INPUT")]
    pub input: Option<PathBuf>,

    /// Primary servers, host[:port], comma separated (default port 24224)
    #[arg(long, env = "TAILFWD_SERVERS", value_delimiter = ',')]
    pub servers: Vec<String>,

    /// Secondary servers tried after the primary pool is exhausted
    #[arg(long, env = "TAILFWD_SECONDARY_SERVERS", value_delimiter = ',')]
    pub secondary_servers: Vec<String>,

    /// Buffer ceiling in bytes for unsent events
    #[arg(long, env = "TAILFWD_BUFFER_LIMIT", default_value = "8388608")]
    pub buffer_limit_bytes: usize,

    /// Upper bound on a single batch payload in bytes
    #[arg(long, env = "TAILFWD_MAX_BATCH_BYTES", default_value = "2097152")]
    pub max_batch_bytes: usize,

    /// Wire encoding for forwarded events
    #[arg(long, env = "TAILFWD_FORMAT", default_value = "msgpack")]
    pub wire_format: WireFormat,

    /// What to evict when the buffer ceiling is hit
    #[arg(long, env = "TAILFWD_OVERFLOW_POLICY", default_value = "drop-oldest")]
    pub overflow_policy: OverflowPolicy,

    /// Tag for periodic throughput ("drain") events; disabled when omitted
    #[arg(long, env = "TAILFWD_DRAIN_TAG")]
    pub drain_log_tag: Option<String>,

    /// Drain emission interval, in flush cycles
    #[arg(long, env = "TAILFWD_DRAIN_INTERVAL", default_value = "300")]
    pub drain_interval: u64,

    /// TCP connect timeout in seconds
    #[arg(long, env = "TAILFWD_CONNECT_TIMEOUT_SECS", default_value = "5")]
    pub connect_timeout_secs: u64,

    /// Write timeout on an established connection in seconds
    #[arg(long, env = "TAILFWD_WRITE_TIMEOUT_SECS", default_value = "30")]
    pub write_timeout_secs: u64,

    /// Backoff before re-probing the primary pool after full exhaustion, ms
    #[arg(long, env = "TAILFWD_FAILOVER_BACKOFF_MS", default_value = "2000")]
    pub failover_backoff_ms: u64,

    /// Idle sleep between loop iterations with nothing to do, ms
    #[arg(long, env = "TAILFWD_IDLE_WAIT_MS", default_value = "100")]
    pub idle_wait_ms: u64,

    /// Log level for the agent's own diagnostics
    #[arg(long, env = "TAILFWD_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Optional TOML configuration file; explicit flags and env vars win
    #[arg(long, env = "TAILFWD_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tag: String::new(),
            field_name: "message".to_string(),
            input: None,
            servers: Vec::new(),
            secondary_servers: Vec::new(),
            buffer_limit_bytes: 8 * 1024 * 1024,
            max_batch_bytes: 2 * 1024 * 1024,
            wire_format: WireFormat::Msgpack,
            overflow_policy: OverflowPolicy::DropOldest,
            drain_log_tag: None,
            drain_interval: 300,
            connect_timeout_secs: 5,
            write_timeout_secs: 30,
            failover_backoff_ms: 2000,
            idle_wait_ms: 100,
            log_level: LogLevel::Info,
            config_file: None,
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        if let Some(path) = config.config_file.clone() {
            let file = Config::load_file(&path)?;
            config.merge_file_values(file);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Fills in file values for every field still at its built-in default.
    /// Flags and env vars already live in `self` from the clap parse, so
    /// they take precedence over the file.
    fn merge_file_values(&mut self, file: Config) {
        fn fill<T: PartialEq>(current: &mut T, file: T, default: &T) {
            if *current == *default && file != *default {
                *current = file;
            }
        }

        let defaults = Config::default();
        fill(&mut self.tag, file.tag, &defaults.tag);
        fill(&mut self.field_name, file.field_name, &defaults.field_name);
        fill(&mut self.servers, file.servers, &defaults.servers);
        fill(
            &mut self.secondary_servers,
            file.secondary_servers,
            &defaults.secondary_servers,
        );
        fill(
            &mut self.buffer_limit_bytes,
            file.buffer_limit_bytes,
            &defaults.buffer_limit_bytes,
        );
        fill(
            &mut self.max_batch_bytes,
            file.max_batch_bytes,
            &defaults.max_batch_bytes,
        );
        fill(&mut self.wire_format, file.wire_format, &defaults.wire_format);
        fill(
            &mut self.overflow_policy,
            file.overflow_policy,
            &defaults.overflow_policy,
        );
        fill(
            &mut self.drain_interval,
            file.drain_interval,
            &defaults.drain_interval,
        );
        fill(
            &mut self.connect_timeout_secs,
            file.connect_timeout_secs,
            &defaults.connect_timeout_secs,
        );
        fill(
            &mut self.write_timeout_secs,
            file.write_timeout_secs,
            &defaults.write_timeout_secs,
        );
        fill(
            &mut self.failover_backoff_ms,
            file.failover_backoff_ms,
            &defaults.failover_backoff_ms,
        );
        fill(&mut self.idle_wait_ms, file.idle_wait_ms, &defaults.idle_wait_ms);
        fill(&mut self.log_level, file.log_level, &defaults.log_level);
        if self.input.is_none() {
            self.input = file.input;
        }
        if self.drain_log_tag.is_none() {
            self.drain_log_tag = file.drain_log_tag;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tag.is_empty() {
            return Err(ConfigError::InvalidConfig("tag must not be empty".into()));
        }
        if self.field_name.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "field name must not be empty".into(),
            ));
        }
        if self.servers.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one primary server is required".into(),
            ));
        }
        if self.buffer_limit_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "buffer limit must be positive".into(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "max batch size must be positive".into(),
            ));
        }
        if self.drain_log_tag.is_some() && self.drain_interval == 0 {
            return Err(ConfigError::InvalidConfig(
                "drain interval must be positive when drain logging is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Parses the configured server lists into the immutable pool.
    pub fn server_pool(&self) -> Result<ServerPool, ConfigError> {
        let parse = |list: &[String]| -> Result<Vec<Endpoint>, PoolError> {
            list.iter().map(|s| Endpoint::parse(s)).collect()
        };
        Ok(ServerPool::new(
            parse(&self.servers)?,
            parse(&self.secondary_servers)?,
        )?)
    }

    /// Resolves the engine tunables out of the raw config values.
    pub fn forwarder_settings(&self) -> ForwarderSettings {
        ForwarderSettings {
            tag: self.tag.clone(),
            field_name: self.field_name.clone(),
            format: self.wire_format,
            buffer_limit_bytes: self.buffer_limit_bytes,
            overflow_policy: self.overflow_policy,
            max_batch_bytes: self.max_batch_bytes,
            drain_tag: self.drain_log_tag.clone(),
            drain_interval: self.drain_interval,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            failover_backoff: Duration::from_millis(self.failover_backoff_ms),
            idle_wait: Duration::from_millis(self.idle_wait_ms),
        }
    }
}
