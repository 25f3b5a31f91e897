//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (RIPPLE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use ripple_history::HistoryLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster coordination configuration.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Message history defaults.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Cluster coordination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Whether this process coordinates with peers over a shared backend.
    #[serde(default)]
    pub enabled: bool,

    /// Channel name coordinators exchange envelopes on.
    #[serde(default = "default_channel")]
    pub channel: String,
}

/// Default limits applied when history is enabled for a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Ring buffer capacity per room.
    #[serde(default = "default_history_entries")]
    pub max_entries: usize,

    /// Maximum entry age in seconds, if bounded.
    #[serde(default)]
    pub retention_seconds: Option<f64>,

    /// Payload truncation applied at record time, if set.
    #[serde(default)]
    pub payload_size_cap: Option<usize>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_channel() -> String {
    std::env::var("RIPPLE_CHANNEL").unwrap_or_else(|_| "ripple".to_string())
}

fn default_history_entries() -> usize {
    std::env::var("RIPPLE_HISTORY_ENTRIES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100)
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            history: HistoryConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: default_channel(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_history_entries(),
            retention_seconds: None,
            payload_size_cap: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl HistoryConfig {
    /// The configured defaults as history limits.
    #[must_use]
    pub fn limits(&self) -> HistoryLimits {
        HistoryLimits {
            max_entries: self.max_entries,
            retention_seconds: self.retention_seconds,
            payload_size_cap: self.payload_size_cap,
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or
    /// if it carries invalid values.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = [
            "ripple.toml",
            "/etc/ripple/ripple.toml",
            "~/.config/ripple/ripple.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or carries
    /// invalid values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Reject invalid values before anything is constructed from them.
    ///
    /// # Errors
    ///
    /// Returns an error describing the offending value.
    pub fn validate(&self) -> Result<()> {
        self.history
            .limits()
            .validate()
            .context("Invalid [history] section")?;
        if self.cluster.channel.is_empty() {
            anyhow::bail!("Invalid [cluster] section: channel cannot be empty");
        }
        Ok(())
    }
}
