//! Configuration management for the remote-shell binary.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values
//!
//! The password is never read from the configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::execution::RunOptions;
use crate::session::{DrainConfig, DEFAULT_CHUNK_SIZE};
use crate::transport::{TransportConfig, DEFAULT_PORT};

/// Application configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote host and login settings.
    pub connection: ConnectionSection,
    /// Output completion settings.
    pub drain: DrainSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Connection configuration section.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    #[serde(skip)]
    pub password: Option<SecretString>,
    /// Require the host key to be present in a known-hosts file.
    pub verify_host_strictly: bool,
    pub known_hosts: Option<PathBuf>,
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            user: None,
            password: None,
            verify_host_strictly: true,
            known_hosts: None,
            connect_timeout_secs: 30,
        }
    }
}

/// How the end of a command's output is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainMode {
    /// Stop after a silent period.
    #[default]
    Quiet,
    /// Stop after a read shorter than the chunk size.
    Shortfall,
}

impl std::str::FromStr for DrainMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiet" => Ok(Self::Quiet),
            "shortfall" => Ok(Self::Shortfall),
            other => Err(ConfigError::InvalidValue("drain", other.to_string())),
        }
    }
}

/// Drain configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainSection {
    pub strategy: DrainMode,
    pub quiet_ms: u64,
    /// Wait for a command's first byte before the quiet period applies.
    /// Zero starts the quiet period at the write.
    pub first_output_ms: u64,
    pub chunk_size: usize,
    /// Bound on one chunk read. Zero disables it.
    pub read_timeout_secs: u64,
    /// Bound on one command. Zero disables it.
    pub command_timeout_secs: u64,
}

impl Default for DrainSection {
    fn default() -> Self {
        Self {
            strategy: DrainMode::Quiet,
            quiet_ms: 250,
            first_output_ms: 3000,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout_secs: 30,
            command_timeout_secs: 300,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("REMOTE_SHELL_HOST") {
            self.connection.host = Some(host);
        }

        if let Some(port) = var("REMOTE_SHELL_PORT") {
            if let Ok(port) = port.parse() {
                self.connection.port = port;
            }
        }

        if let Some(user) = var("REMOTE_SHELL_USER") {
            self.connection.user = Some(user);
        }

        if let Some(password) = var("REMOTE_SHELL_PASSWORD") {
            self.connection.password = Some(SecretString::from(password));
        }

        if let Some(level) = var("REMOTE_SHELL_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) -> Result<(), ConfigError> {
        if let Some(ref host) = args.host {
            self.connection.host = Some(host.clone());
        }
        if let Some(port) = args.port {
            self.connection.port = port;
        }
        if let Some(ref user) = args.user {
            self.connection.user = Some(user.clone());
        }
        if let Some(ref password) = args.password {
            self.connection.password = Some(SecretString::from(password.clone()));
        }
        if args.insecure {
            self.connection.verify_host_strictly = false;
        }
        if let Some(ref path) = args.known_hosts {
            self.connection.known_hosts = Some(path.clone());
        }

        if let Some(ref mode) = args.drain {
            self.drain.strategy = mode.parse()?;
        }
        if let Some(ms) = args.quiet_ms {
            self.drain.quiet_ms = ms;
        }
        if let Some(size) = args.chunk_size {
            self.drain.chunk_size = size;
        }
        if let Some(secs) = args.timeout {
            self.drain.command_timeout_secs = secs;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        Ok(())
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        Self::load_with(args, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], with variables taken from `var` instead of the
    /// process environment.
    pub fn load_with<F>(args: &Args, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_vars(var);
        config.apply_args(args)?;

        Ok(config)
    }

    /// Connection settings for the transport.
    ///
    /// A missing password is treated as empty.
    pub fn to_transport_config(&self) -> Result<TransportConfig, ConfigError> {
        let host = self
            .connection
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::Missing("host"))?;
        let user = self
            .connection
            .user
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing("user"))?;
        let password = self
            .connection
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_string())
            .unwrap_or_default();

        let mut transport = TransportConfig::new(user, password, host)
            .port(self.connection.port)
            .verify_host_strictly(self.connection.verify_host_strictly)
            .connect_timeout(Duration::from_secs(self.connection.connect_timeout_secs.max(1)));
        if let Some(ref path) = self.connection.known_hosts {
            transport = transport.known_hosts(path.clone());
        }

        Ok(transport)
    }

    /// Drain settings for interactive sessions.
    pub fn to_drain_config(&self) -> DrainConfig {
        let base = match self.drain.strategy {
            DrainMode::Quiet => DrainConfig::quiet_period(Duration::from_millis(self.drain.quiet_ms)),
            DrainMode::Shortfall => DrainConfig::chunk_shortfall(),
        };

        base.with_chunk_size(self.drain.chunk_size)
            .with_read_timeout(optional_secs(self.drain.read_timeout_secs))
            .with_first_output(
                (self.drain.first_output_ms > 0)
                    .then(|| Duration::from_millis(self.drain.first_output_ms)),
            )
            .with_command_timeout(optional_secs(self.drain.command_timeout_secs))
    }

    /// Options for one-shot runs.
    pub fn to_run_options(&self) -> RunOptions {
        match optional_secs(self.drain.command_timeout_secs) {
            Some(limit) => RunOptions::default().timeout(limit),
            None => RunOptions::default(),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Required setting absent from every source.
    Missing(&'static str),
    /// Setting present but unusable.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::Missing(name) => write!(f, "missing required setting: {}", name),
            Self::InvalidValue(name, value) => write!(f, "invalid {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}
