//! Camera and application configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for camera capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device index (0 is the system default camera).
    pub device_index: u32,
    /// Maximum frames per second delivered to the frame sink.
    pub max_frame_rate: f64,
    /// Whether the enable switch starts in the "on" position.
    pub start_enabled: bool,
    /// Mirror the preview horizontally.
    pub mirror: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            max_frame_rate: 20.0,
            start_enabled: true,
            mirror: true,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the given frame rate.
    pub fn with_frame_rate(max_frame_rate: f64) -> Self {
        Self {
            max_frame_rate,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        min_frame_interval(self.max_frame_rate).map(|_| ())
    }
}

/// Converts a frame rate into the minimum spacing between delivered frames.
pub fn min_frame_interval(max_frame_rate: f64) -> Result<Duration, ConfigError> {
    if !max_frame_rate.is_finite() || max_frame_rate <= 0.0 {
        return Err(ConfigError::InvalidFrameRate(max_frame_rate));
    }
    // Rates close to zero give an interval too long for `Duration`.
    Duration::try_from_secs_f64(1.0 / max_frame_rate)
        .map_err(|_| ConfigError::InvalidFrameRate(max_frame_rate))
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame rate {0} (must be a positive number)")]
    InvalidFrameRate(f64),
    #[error("invalid hot-plug subsystem {0:?}")]
    InvalidSubsystem(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub camera: CaptureConfig,
    #[serde(default)]
    pub hotplug: HotplugConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Hot-plug monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotplugConfig {
    /// Listen for device arrival notifications.
    pub enabled: bool,
    /// Kernel subsystem whose events start capture.
    pub subsystem: String,
}

impl Default for HotplugConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subsystem: "usb".to_string(),
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.validate()?;
        if self.hotplug.enabled && self.hotplug.subsystem.trim().is_empty() {
            return Err(ConfigError::InvalidSubsystem(self.hotplug.subsystem.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            min_frame_interval(config.max_frame_rate).unwrap(),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_invalid_frame_rates() {
        for rate in [0.0, -5.0, f64::NAN, f64::INFINITY, 1e-300] {
            assert!(matches!(
                min_frame_interval(rate),
                Err(ConfigError::InvalidFrameRate(_))
            ));
        }
    }

    #[test]
    fn test_high_frame_rates_accepted() {
        assert_eq!(
            min_frame_interval(2000.0).unwrap(),
            Duration::from_micros(500)
        );
        assert!(min_frame_interval(1e6).unwrap() > Duration::ZERO);
        assert!(CaptureConfig::with_frame_rate(5000.0).validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = FileConfig::from_toml(
            r#"
            [camera]
            max_frame_rate = 30.0

            [hotplug]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.camera.max_frame_rate, 30.0);
        assert!(config.camera.start_enabled);
        assert!(!config.hotplug.enabled);
        assert_eq!(config.hotplug.subsystem, "usb");
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_parse_rejects_bad_rate() {
        let result = FileConfig::from_toml("[camera]\nmax_frame_rate = 0.0\n");
        assert!(matches!(result, Err(ConfigError::InvalidFrameRate(_))));
    }

    #[test]
    fn test_parse_rejects_empty_subsystem() {
        let result = FileConfig::from_toml("[hotplug]\nsubsystem = \"\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidSubsystem(_))));
    }
}
