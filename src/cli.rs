//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// BizScope - self-correcting analysis orchestrator for tabular data
///
/// Ask a business question about a dataset. BizScope detects the
/// industry, runs the matching analysis capabilities, and repairs
/// common data problems automatically before giving up.
///
/// Examples:
///   bizscope --demo "How are sales trending?"
///   bizscope --data sales.json "Which category sells best?"
///   bizscope --data sales.json --dimension product_cat "Segment revenue"
///   bizscope --memory patterns.json --memory-stats
///   bizscope --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Natural-language question to analyze
    ///
    /// Not required when using --init-config or --memory-stats.
    #[arg(
        value_name = "QUESTION",
        required_unless_present_any = ["init_config", "memory_stats"]
    )]
    pub question: Option<String>,

    /// Path to a JSON dataset file
    ///
    /// The file holds column declarations and row values. See the
    /// README for the exact format.
    #[arg(short, long, value_name = "FILE", conflicts_with = "demo")]
    pub data: Option<PathBuf>,

    /// Analyze the built-in retail demo dataset
    #[arg(long)]
    pub demo: bool,

    /// Metric column hint for the question
    #[arg(long, value_name = "COLUMN")]
    pub metric: Option<String>,

    /// Dimension column hint for the question
    #[arg(long, value_name = "COLUMN")]
    pub dimension: Option<String>,

    /// Capabilities to run, overriding the detected suggestions
    ///
    /// Example: --capabilities data_profile,trend_analysis
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub capabilities: Option<Vec<String>>,

    /// Maximum analysis attempts per job, counting the first run
    #[arg(long, value_name = "COUNT")]
    pub max_attempts: Option<u32>,

    /// Job deadline in seconds
    #[arg(long, value_name = "SECS", env = "BIZSCOPE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Minimum classifier confidence for a non-general industry (0.0 - 1.0)
    #[arg(long, value_name = "CONF")]
    pub detection_threshold: Option<f64>,

    /// Minimum advisor confidence for applying a correction (0.0 - 1.0)
    #[arg(long, value_name = "CONF")]
    pub correction_threshold: Option<f64>,

    /// Pattern memory snapshot file to load and save
    #[arg(short, long, value_name = "FILE", env = "BIZSCOPE_MEMORY")]
    pub memory: Option<PathBuf>,

    /// Print pattern memory statistics and exit
    ///
    /// Requires --memory.
    #[arg(long)]
    pub memory_stats: bool,

    /// Emit the result as JSON instead of the human-readable summary
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .bizscope.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .bizscope.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.memory_stats {
            if self.memory.is_none() {
                return Err("--memory-stats requires --memory".to_string());
            }
            return Ok(());
        }

        // A question needs a dataset to run against
        if self.data.is_none() && !self.demo {
            return Err("Provide a dataset with --data <FILE> or use --demo".to_string());
        }

        if let Some(ref data_path) = self.data {
            if !data_path.exists() {
                return Err(format!("Dataset file does not exist: {}", data_path.display()));
            }
            if !data_path.is_file() {
                return Err(format!("Dataset path is not a file: {}", data_path.display()));
            }
        }

        if let Some(max_attempts) = self.max_attempts {
            if max_attempts == 0 {
                return Err("Max attempts must be at least 1".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(threshold) = self.detection_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("Detection threshold must be between 0.0 and 1.0".to_string());
            }
        }

        if let Some(threshold) = self.correction_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("Correction threshold must be between 0.0 and 1.0".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
