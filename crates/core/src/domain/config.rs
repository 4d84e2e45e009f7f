//! Configuration management for the equalizer
//!
//! This module provides:
//! - Engine tuning (smoothing ramps, order-transition fade lengths)
//! - The stage list of an equalizer strip, with optional saved targets
//! - TOML load/save through `tokio::fs`
//!
//! Nothing here runs on the audio thread.

use super::control::StageState;
use super::params::FilterSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Parameter ramp durations, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub frequency_ms: f32,
    pub resonance_ms: f32,
    pub gain_ms: f32,
    pub bypass_ms: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            frequency_ms: 20.0,
            resonance_ms: 20.0,
            gain_ms: 20.0,
            bypass_ms: 10.0,
        }
    }
}

/// Order-transition crossfade lengths, in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeConfig {
    /// Stages without shelf mode
    pub cut_samples: u32,
    /// Shelf-capable stages
    pub shelf_samples: u32,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            cut_samples: 1000,
            shelf_samples: 200,
        }
    }
}

/// Engine-wide tuning shared by every stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub smoothing: SmoothingConfig,
    pub fade: FadeConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let s = &self.smoothing;
        for (name, ms) in [
            ("frequency_ms", s.frequency_ms),
            ("resonance_ms", s.resonance_ms),
            ("gain_ms", s.gain_ms),
            ("bypass_ms", s.bypass_ms),
        ] {
            if !ms.is_finite() || ms <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "smoothing.{name} must be positive, got {ms}"
                )));
            }
        }
        if self.fade.cut_samples == 0 || self.fade.shelf_samples == 0 {
            return Err(ConfigError::Invalid(
                "fade lengths must be at least one sample".to_string(),
            ));
        }
        Ok(())
    }
}

/// One stage of a strip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(flatten)]
    pub spec: FilterSpec,

    /// Initial targets; the `FilterSpec` defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StageState>,
}

impl From<FilterSpec> for StageConfig {
    fn from(spec: FilterSpec) -> Self {
        Self { spec, state: None }
    }
}

/// Complete equalizer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EqualizerConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl EqualizerConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(stages = config.stages.len(), "Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Standard strip: two high-pass, three peak, two low-pass and a gain stage
    pub fn factory_default() -> Self {
        let mut config = Self::default();

        config.stages.extend(
            [
                FilterSpec::high_pass("high1", 30.0, 2, true),
                FilterSpec::high_pass("high2", 80.0, 2, false),
                FilterSpec::peak("peak1", 200.0),
                FilterSpec::peak("peak2", 1000.0),
                FilterSpec::peak("peak3", 5000.0),
                FilterSpec::low_pass("low1", 12000.0, 2, false),
                FilterSpec::low_pass("low2", 18000.0, 2, true),
                FilterSpec::gain("gain"),
            ]
            .into_iter()
            .map(StageConfig::from),
        );

        config
    }

    /// Reject configurations that would break id routing or the engine
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        let mut names = HashSet::new();
        for stage in &self.stages {
            stage
                .spec
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !names.insert(stage.spec.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate stage name '{}'",
                    stage.spec.name
                )));
            }
        }
        Ok(())
    }
}
