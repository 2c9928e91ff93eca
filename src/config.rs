// Configuration for multi-capture replication analysis
//
// Defaults keep peer aggregation off: peer captures are discovered and
// decoded, but their queues are only drained when `drain_peer_captures` is
// enabled explicitly.

use crate::discovery::DEFAULT_TOLERANCE_SECS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Analysis settings
///
/// # Example
/// ```
/// use replitrace::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.discovery_tolerance_secs, 5.0);
/// assert!(!config.drain_peer_captures);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Maximum distance between capture creation times for a capture to be
    /// treated as part of the main capture's session
    ///
    /// Default: 5.0 seconds
    pub discovery_tolerance_secs: f64,

    /// Drain peer capture queues on the foreground thread
    ///
    /// When disabled, peer captures are still discovered and decoded in the
    /// background, but nothing they produce reaches the data model.
    ///
    /// Default: false
    pub drain_peer_captures: bool,

    /// Main-capture events processed between two drain ticks
    ///
    /// Default: 1024
    pub tick_interval_events: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            discovery_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            drain_peer_captures: false,
            tick_interval_events: 1024,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a TOML file; missing keys take their defaults
    ///
    /// # Example TOML
    /// ```toml
    /// discovery_tolerance_secs = 2.5
    /// drain_peer_captures = true
    /// tick_interval_events = 256
    /// ```
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).context("Failed to parse analysis configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.discovery_tolerance_secs.is_finite() || self.discovery_tolerance_secs < 0.0 {
            anyhow::bail!(
                "discovery_tolerance_secs must be a non-negative number, got {}",
                self.discovery_tolerance_secs
            );
        }
        if self.tick_interval_events == 0 {
            anyhow::bail!("tick_interval_events must be > 0");
        }
        Ok(())
    }
}
