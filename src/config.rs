//! Daemon configuration.
//!
//! Loaded from a TOML file. Missing required settings are fatal at startup;
//! nothing in the core reads configuration after `Daemon::start`.

use crate::error::{RelayError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

fn default_resubscribe_interval() -> u64 {
    30
}

fn default_status_interval() -> u64 {
    5
}

fn default_pipeline_threads() -> usize {
    4
}

/// Transport account settings. Opaque to the core; carried for the embedder
/// that constructs the concrete transport client.
///
/// Unknown keys are rejected: a daemon setting accidentally placed under
/// `[transport]` must fail loudly instead of being silently dropped.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// `host:port` of the pub/sub server.
    pub server: String,
    pub login: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Top-level daemon configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct RelayConfig {
    pub transport: TransportConfig,

    /// Site name patterns to subscribe to. Empty means every site found on
    /// the server.
    #[serde(default)]
    pub sites: Vec<String>,

    /// Converter endpoint URLs. Empty means the in-process converter.
    #[serde(default)]
    pub converters: Vec<String>,

    /// Publish target for the publish worker (`file:`, `http(s):` or
    /// `exec:` scheme).
    #[serde(default)]
    pub publish_url: Option<String>,

    /// Output workers by registry name, invoked in this order.
    #[serde(default)]
    pub workers: Vec<String>,

    /// Dump intermediate artifacts to the temp directory.
    #[serde(default)]
    pub debug_dump: bool,

    /// Seconds between resubscription passes.
    #[serde(default = "default_resubscribe_interval")]
    pub resubscribe_interval_secs: u64,

    /// Seconds between status-report log lines.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    /// Threads in the manifest pipeline pool.
    #[serde(default = "default_pipeline_threads")]
    pub pipeline_threads: usize,
}

impl RelayConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::Config(format!(
                "unable to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RelayConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.transport.server.is_empty() || !self.transport.server.contains(':') {
            return Err(RelayError::Config(
                "transport.server must be host:port".into(),
            ));
        }
        if self.transport.login.is_empty() {
            return Err(RelayError::Config("transport.login must be set".into()));
        }
        if self.pipeline_threads == 0 {
            return Err(RelayError::Config(
                "pipeline_threads must be at least 1".into(),
            ));
        }
        if let Some(url) = &self.publish_url {
            url::Url::parse(url)?;
        }
        Ok(())
    }

    pub fn resubscribe_interval(&self) -> Duration {
        Duration::from_secs(self.resubscribe_interval_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}
