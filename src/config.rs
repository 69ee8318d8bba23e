//! Configuration for the policy review pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pool sizes and channel settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Which files to review
    #[serde(default)]
    pub input: InputConfig,

    /// Rules applied to every file
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Runtime and metrics settings
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Settings for one review pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent file reads
    #[serde(default = "default_pool_size")]
    pub reader_pool_size: usize,

    /// Maximum concurrent evaluations
    #[serde(default = "default_pool_size")]
    pub reviewer_pool_size: usize,

    /// Capacity of the channels between stages
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Fail task submission instead of waiting when a pool is saturated
    #[serde(default)]
    pub nonblocking: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reader_pool_size: default_pool_size(),
            reviewer_pool_size: default_pool_size(),
            channel_buffer: default_channel_buffer(),
            nonblocking: false,
        }
    }
}

/// Input file selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory that file paths are relative to
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Glob patterns selecting files to review
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            patterns: Vec::new(),
        }
    }
}

/// Policy rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Label written into every verdict
    #[serde(default = "default_query")]
    pub query: String,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            rules: Vec::new(),
        }
    }
}

/// A single deny rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,

    /// JSON pointer, `*` matches any key or index
    pub pointer: String,

    /// Regular expression; matching scalar values are violations
    pub deny: String,
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of Tokio worker threads
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Enable metrics reporting
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            enable_metrics: true,
            metrics_interval_secs: default_metrics_interval(),
            metrics_output_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline.reader_pool_size == 0 || self.pipeline.reviewer_pool_size == 0 {
            anyhow::bail!("Pool sizes must be > 0");
        }
        if self.pipeline.channel_buffer == 0 {
            anyhow::bail!("Channel buffer must be > 0");
        }
        if self.input.patterns.is_empty() {
            anyhow::bail!("At least one file pattern is required");
        }
        if self.processing.metrics_interval_secs == 0 {
            anyhow::bail!("Metrics interval must be > 0");
        }

        for rule in &self.policy.rules {
            if rule.name.is_empty() {
                anyhow::bail!("Every policy rule needs a name");
            }
            if !rule.pointer.is_empty() && !rule.pointer.starts_with('/') {
                anyhow::bail!("Rule '{}': pointer must start with '/'", rule.name);
            }
            if let Err(e) = regex::Regex::new(&rule.deny) {
                anyhow::bail!("Rule '{}': invalid deny pattern: {}", rule.name, e);
            }
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_pool_size() -> usize { 100 }
fn default_channel_buffer() -> usize { 16 }
fn default_root() -> PathBuf { PathBuf::from(".") }
fn default_query() -> String { "policy".to_string() }
fn default_true() -> bool { true }
fn default_metrics_interval() -> u64 { 10 }
