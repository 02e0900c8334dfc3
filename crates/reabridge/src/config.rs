//! Configuration loading and typed config for the bridge.
//!
//! Values come from three layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. a YAML file (`--config`, or `reabridge.yaml` in the working
//!    directory when it exists)
//! 3. command-line flags and their environment variables
//!
//! Durations are plain millisecond integers.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Cli;

/// Config file picked up from the working directory when no `--config`
/// is given.
pub const DEFAULT_CONFIG_FILE: &str = "reabridge.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range or malformed.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of REAPER's HTTP interface.
    #[serde(default = "default_reaper_url")]
    pub reaper_url: String,

    /// Name registered at rc.reaper.fm; empty disables registration.
    #[serde(default = "default_reaper_rc_name")]
    pub reaper_rc_name: String,

    /// Semicolon-joined poll commands; empty disables polling.
    #[serde(default = "default_poll_get_keys")]
    pub poll_get_keys: String,

    /// Milliseconds between two poll ticks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline of one poll request.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Pause after REAPER was found unreachable.
    #[serde(default = "default_poll_error_cooldown_ms")]
    pub poll_error_cooldown_ms: u64,

    /// Floor between two broadcasts.
    #[serde(default = "default_min_broadcast_interval_ms")]
    pub min_broadcast_interval_ms: u64,

    /// Deadline of one proxied request.
    #[serde(default = "default_proxy_timeout_ms")]
    pub proxy_timeout_ms: u64,

    /// Time in-flight HTTP requests get to finish on shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Listen address; `:port` means all interfaces.
    #[serde(default = "default_addr")]
    pub addr: String,

    /// WebSocket path.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Static file root.
    #[serde(default = "default_www_root_path")]
    pub www_root_path: PathBuf,

    /// Health check path.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reaper_url: default_reaper_url(),
            reaper_rc_name: default_reaper_rc_name(),
            poll_get_keys: default_poll_get_keys(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            poll_error_cooldown_ms: default_poll_error_cooldown_ms(),
            min_broadcast_interval_ms: default_min_broadcast_interval_ms(),
            proxy_timeout_ms: default_proxy_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            addr: default_addr(),
            ws_path: default_ws_path(),
            www_root_path: default_www_root_path(),
            health_path: default_health_path(),
            log_format: LogFormat::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Build the effective configuration: defaults, then the config file,
    /// then command-line overrides, then validation.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be loaded or the
    /// result fails [`validate`](Self::validate).
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let path = cli.config.clone().or_else(|| {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            fallback.exists().then_some(fallback)
        });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Overwrite fields with every flag that was given.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = &cli.reaper_url {
            self.reaper_url.clone_from(v);
        }
        if let Some(v) = &cli.reaper_rc_name {
            self.reaper_rc_name.clone_from(v);
        }
        if let Some(v) = &cli.poll_get_keys {
            self.poll_get_keys.clone_from(v);
        }
        if let Some(v) = cli.poll_interval_ms {
            self.poll_interval_ms = v;
        }
        if let Some(v) = &cli.addr {
            self.addr.clone_from(v);
        }
        if let Some(v) = &cli.ws_path {
            self.ws_path.clone_from(v);
        }
        if let Some(v) = &cli.www_root_path {
            self.www_root_path.clone_from(v);
        }
        if let Some(v) = &cli.health_path {
            self.health_path.clone_from(v);
        }
        if cli.log_json {
            self.log_format = LogFormat::Json;
        }
    }

    /// Reject values the bridge cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("proxy_timeout_ms", self.proxy_timeout_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }

        for (name, path) in [("ws_path", &self.ws_path), ("health_path", &self.health_path)] {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "{name} must start with '/', got {path:?}"
                )));
            }
        }
        if self.ws_path == self.health_path {
            return Err(ConfigError::Invalid(String::from(
                "ws_path and health_path must differ",
            )));
        }

        let url = reqwest::Url::parse(&self.reaper_url).map_err(|e| {
            ConfigError::Invalid(format!("reaper_url {:?} is not a URL: {e}", self.reaper_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
            return Err(ConfigError::Invalid(format!(
                "reaper_url must be an http(s) URL with a host, got {:?}",
                self.reaper_url
            )));
        }

        self.listen_addr().map(|_| ())
    }

    /// Resolve the listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `addr` does not resolve.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_listen_addr(&self.addr)
    }

    /// Time between poll ticks.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Deadline of one poll request.
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Pause after a transport error.
    pub const fn poll_error_cooldown(&self) -> Duration {
        Duration::from_millis(self.poll_error_cooldown_ms)
    }

    /// Floor between broadcasts.
    pub const fn min_broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.min_broadcast_interval_ms)
    }

    /// Deadline of one proxied request.
    pub const fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_timeout_ms)
    }

    /// Grace period for in-flight requests on shutdown.
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Parse a listen address. A bare `:port` binds every interface.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the address does not resolve.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_owned()
    };

    full.to_socket_addrs()
        .map_err(|e| ConfigError::Invalid(format!("invalid listen address {addr:?}: {e}")))?
        .next()
        .ok_or_else(|| ConfigError::Invalid(format!("listen address {addr:?} resolved to nothing")))
}

fn default_reaper_url() -> String {
    String::from("http://localhost:8088")
}

fn default_reaper_rc_name() -> String {
    String::from("ws")
}

fn default_poll_get_keys() -> String {
    String::from("TRANSPORT;GET/EXTSTATE/TUX/text;GET/EXTSTATE/TUX/need_refresh")
}

const fn default_poll_interval_ms() -> u64 {
    80
}

const fn default_poll_timeout_ms() -> u64 {
    1000
}

const fn default_poll_error_cooldown_ms() -> u64 {
    1000
}

const fn default_min_broadcast_interval_ms() -> u64 {
    10
}

const fn default_proxy_timeout_ms() -> u64 {
    2000
}

const fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_addr() -> String {
    String::from(":8090")
}

fn default_ws_path() -> String {
    String::from("/ws")
}

fn default_www_root_path() -> PathBuf {
    PathBuf::from("./www")
}

fn default_health_path() -> String {
    String::from("/health")
}
