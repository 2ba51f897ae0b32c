//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.bizscope.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Analysis job settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Pattern memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Emit results as JSON instead of the human-readable summary.
    #[serde(default)]
    pub json: bool,
}

/// Analysis job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum analysis attempts per job, counting the first run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Job deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Minimum classifier confidence for a non-general industry.
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,

    /// Minimum advisor confidence for applying a correction.
    #[serde(default = "default_correction_threshold")]
    pub correction_confidence_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_seconds: default_timeout(),
            detection_threshold: default_detection_threshold(),
            correction_confidence_threshold: default_correction_threshold(),
        }
    }
}

impl AnalysisConfig {
    /// Converts these settings into an orchestrator job configuration.
    pub fn job_config(&self) -> bizscope::JobConfig {
        bizscope::JobConfig {
            max_attempts: self.max_attempts,
            timeout_seconds: self.timeout_seconds,
            detection_threshold: self.detection_threshold,
            correction_confidence_threshold: self.correction_confidence_threshold,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout() -> u64 {
    300
}

fn default_detection_threshold() -> f64 {
    0.5
}

fn default_correction_threshold() -> f64 {
    0.6
}

/// Pattern memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Snapshot file the memory is loaded from and saved to.
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Maximum records held before eviction.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    bizscope::memory::DEFAULT_CAPACITY
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".bizscope.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(max_attempts) = args.max_attempts {
            self.analysis.max_attempts = max_attempts;
        }
        if let Some(timeout) = args.timeout {
            self.analysis.timeout_seconds = timeout;
        }
        if let Some(threshold) = args.detection_threshold {
            self.analysis.detection_threshold = threshold;
        }
        if let Some(threshold) = args.correction_threshold {
            self.analysis.correction_confidence_threshold = threshold;
        }

        if let Some(ref memory) = args.memory {
            self.memory.snapshot_path = Some(memory.display().to_string());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
        if args.json {
            self.general.json = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analysis.max_attempts, 3);
        assert_eq!(config.analysis.timeout_seconds, 300);
        assert_eq!(config.analysis.detection_threshold, 0.5);
        assert_eq!(config.analysis.correction_confidence_threshold, 0.6);
        assert!(config.memory.snapshot_path.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true

[analysis]
max_attempts = 5
timeout_seconds = 60

[memory]
snapshot_path = "patterns.json"
capacity = 128
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.analysis.max_attempts, 5);
        assert_eq!(config.analysis.timeout_seconds, 60);
        assert_eq!(config.analysis.detection_threshold, 0.5);
        assert_eq!(config.memory.snapshot_path.as_deref(), Some("patterns.json"));
        assert_eq!(config.memory.capacity, 128);
    }

    #[test]
    fn test_job_config_mapping() {
        let mut config = Config::default();
        config.analysis.max_attempts = 2;
        config.analysis.timeout_seconds = 90;

        let job = config.analysis.job_config();
        assert_eq!(job.max_attempts, 2);
        assert_eq!(job.timeout_seconds, 90);
        assert_eq!(job.detection_threshold, 0.5);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[memory]"));
    }
}
