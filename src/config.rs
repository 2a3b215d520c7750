//! Runtime configuration.
//!
//! Every section has working defaults; a config file and `CROSSBAR_*`
//! environment variables override them.

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rtc: RtcConfig,
    pub stream_tracker: StreamTrackerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    /// Quiet period for coalescing renegotiation requests, in milliseconds.
    pub negotiation_frequency_ms: u64,
    /// STUN servers handed to the peer-connection builder.
    pub stun_servers: Vec<String>,
    /// Codecs registered with the media engine and recognized when matching
    /// a subscriber track to a transceiver slot.
    pub enabled_codecs: Vec<CodecSpec>,
}

impl RtcConfig {
    #[must_use]
    pub fn negotiation_frequency(&self) -> Duration {
        Duration::from_millis(self.negotiation_frequency_ms)
    }
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            negotiation_frequency_ms: 150,
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            enabled_codecs: vec![
                CodecSpec::mime("audio/opus"),
                CodecSpec::mime("video/VP8"),
                CodecSpec::mime("video/H264"),
            ],
        }
    }
}

/// A codec enabled for negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSpec {
    pub mime: String,
    pub fmtp_line: String,
}

impl CodecSpec {
    pub fn mime(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            fmtp_line: String::new(),
        }
    }
}

/// Per-layer liveness detection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamTrackerConfig {
    /// Tuning for spatial layer 0. Forgiving by default: a static screen
    /// share can produce as little as one packet every two seconds.
    pub base_layer: TrackerTuning,
    /// Tuning for every layer above 0. The default requires roughly 30s of
    /// continuous stream before the layer is declared active.
    pub higher_layers: TrackerTuning,
}

impl Default for StreamTrackerConfig {
    fn default() -> Self {
        Self {
            base_layer: TrackerTuning {
                samples_required: 1,
                cycles_required: 1,
                cycle_duration_ms: 2000,
            },
            higher_layers: TrackerTuning {
                samples_required: 5,
                cycles_required: 60,
                cycle_duration_ms: 500,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerTuning {
    /// Packets needed within a cycle for the cycle to count.
    pub samples_required: u32,
    /// Consecutive good cycles needed to declare the stream active.
    pub cycles_required: u64,
    pub cycle_duration_ms: u64,
}

impl TrackerTuning {
    #[must_use]
    pub fn cycle_duration(&self) -> Duration {
        Duration::from_millis(self.cycle_duration_ms)
    }
}

impl Default for TrackerTuning {
    fn default() -> Self {
        Self {
            samples_required: 1,
            cycles_required: 1,
            cycle_duration_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from an optional file, then apply environment
    /// overrides (`CROSSBAR_RTC_NEGOTIATION_FREQUENCY_MS`, etc.).
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CROSSBAR")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from environment variables only (for Docker/K8s).
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tracker_tuning_matches_layer_profiles() {
        let config = StreamTrackerConfig::default();
        assert_eq!(config.base_layer.samples_required, 1);
        assert_eq!(config.base_layer.cycles_required, 1);
        assert_eq!(config.base_layer.cycle_duration(), Duration::from_secs(2));
        assert_eq!(config.higher_layers.samples_required, 5);
        assert_eq!(config.higher_layers.cycles_required, 60);
        assert_eq!(
            config.higher_layers.cycle_duration(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn default_rtc_config() {
        let config = RtcConfig::default();
        assert_eq!(config.negotiation_frequency(), Duration::from_millis(150));
        assert!(config
            .enabled_codecs
            .iter()
            .any(|codec| codec.mime == "audio/opus"));
    }

    #[test]
    fn malformed_config_file_surfaces_config_error() {
        let path = std::env::temp_dir().join(format!("crossbar-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "rtc: [").unwrap();

        let result = Config::from_file(path.to_str().unwrap());
        assert!(matches!(result, Err(crate::Error::Config(_))));

        let _ = std::fs::remove_file(&path);
    }
}
