//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/framewise/config.toml` by default. Every section and field is
//! optional.
//!
//! ```toml
//! [service]
//! host = "backendapi.framewise.ai"
//! api_key = "env::FRAMEWISE_API_KEY"
//!
//! [reconnect]
//! max_delay_secs = 30
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! `api_key` supports secret references, see [`crate::secret`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use framewise_core::{TracingConfig, TracingError, TracingOutputFormat};
use framewise_protocol::MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::secret;

/// Configuration for the framewise client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Meeting service endpoint and credentials.
    pub service: ServiceSettings,

    /// Reconnect policy.
    pub reconnect: ReconnectSettings,

    /// Socket settings.
    pub connection: ConnectionSettings,

    /// Log output of the binary.
    pub logging: LoggingSettings,
}

/// Meeting service endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// WebSocket host.
    pub host: String,

    /// WebSocket port.
    pub port: u16,

    /// Use `wss` (true) or `ws` (false).
    pub secure: bool,

    /// API key (supports `pass::` and `env::` prefixes).
    pub api_key: Option<String>,

    /// Base URL of the HTTP meeting API.
    pub api_base_url: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: "backendapi.framewise.ai".to_string(),
            port: 443,
            secure: true,
            api_key: None,
            api_base_url: "https://backend.framewise.ai".to_string(),
        }
    }
}

/// Reconnect policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Reconnect after failures and unexpected closes.
    pub enabled: bool,

    /// First delay, in seconds.
    pub initial_delay_secs: u64,

    /// Delay ceiling, in seconds.
    pub max_delay_secs: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_secs: 1,
            max_delay_secs: 60,
        }
    }
}

impl ReconnectSettings {
    /// Returns the first delay.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs.max(1))
    }

    /// Returns the delay ceiling.
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs).max(self.initial_delay())
    }
}

/// Socket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Largest frame accepted or sent.
    pub max_frame_bytes: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            max_frame_bytes: MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionSettings {
    /// Returns the connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    pub level: String,

    /// Output format.
    pub format: TracingOutputFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: TracingOutputFormat::Pretty,
        }
    }
}

impl LoggingSettings {
    /// Converts to a tracing configuration.
    pub fn to_tracing_config(&self) -> Result<TracingConfig, TracingError> {
        TracingConfig::from_settings(&self.level, self.format)
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("framewise")
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Builder: set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.service.api_key = Some(api_key.into());
        self
    }

    /// Builder: set host, port and scheme.
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16, secure: bool) -> Self {
        self.service.host = host.into();
        self.service.port = port;
        self.service.secure = secure;
        self
    }

    /// Resolves the API key, following secret references.
    pub fn api_key(&self) -> Result<Option<String>, ConfigError> {
        self.service
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(secret::resolve)
            .transpose()
    }

    /// Returns the WebSocket URL of a joined meeting.
    ///
    /// `{scheme}://{host}[:{port}]/ws/{meeting_id}[/{api_key}]`
    pub fn meeting_url(&self, meeting_id: &str) -> Result<String, ConfigError> {
        let mut url = format!(
            "{}/ws/{}",
            self.ws_origin(),
            urlencoding::encode(meeting_id)
        );
        if let Some(key) = self.api_key()? {
            url.push('/');
            url.push_str(&urlencoding::encode(&key));
        }
        Ok(url)
    }

    /// Returns the WebSocket URL used to discover meetings for an API key.
    ///
    /// `{scheme}://{host}[:{port}]/ws/api_key/{api_key}`
    pub fn discovery_url(&self) -> Result<String, ConfigError> {
        let key = self.api_key()?.ok_or(ConfigError::MissingApiKey)?;
        Ok(format!(
            "{}/ws/api_key/{}",
            self.ws_origin(),
            urlencoding::encode(&key)
        ))
    }

    fn ws_origin(&self) -> String {
        let service = &self.service;
        let (scheme, default_port) = if service.secure {
            ("wss", 443)
        } else {
            ("ws", 80)
        };
        if service.port == default_port {
            format!("{scheme}://{}", service.host)
        } else {
            format!("{scheme}://{}:{}", service.host, service.port)
        }
    }
}
