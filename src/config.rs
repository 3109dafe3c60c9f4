use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::error::{ProcessingError, Result};
use crate::pipeline::processing::fusion::FusionStrategy;

/// Top-level pipeline configuration. Every section has working defaults so a
/// missing config file is not an error; `load` only fails on unreadable or
/// malformed TOML.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-source processing timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Number of sources processed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Process sources one at a time instead of in batches
    #[serde(default)]
    pub sequential: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FusionConfig {
    /// Minimum field confidence for a value to participate in conflict detection
    #[serde(default = "default_conflict_threshold")]
    pub conflict_threshold: u8,
    /// Minimum group size for the consensus strategy to apply
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: usize,
    /// Strategy applied to fields without an explicit override
    #[serde(default)]
    pub default_strategy: FusionStrategy,
    /// Per-field strategy overrides, keyed by canonical field name
    #[serde(default)]
    pub field_strategies: HashMap<String, FusionStrategy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    /// Similarity score (0-100) at which two events are grouped as duplicates
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_similarity_threshold: f64,
    /// Threshold for the primary venue match lookup
    #[serde(default = "default_primary_match_threshold")]
    pub primary_match_threshold: f64,
    /// Threshold for secondary venue match candidates
    #[serde(default = "default_secondary_match_threshold")]
    pub secondary_match_threshold: f64,
    /// Scanner confidence below which a low-confidence issue is raised
    #[serde(default = "default_min_scanner_confidence")]
    pub min_scanner_confidence: u8,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_batch_size() -> usize {
    3
}

fn default_conflict_threshold() -> u8 {
    30
}

fn default_consensus_threshold() -> usize {
    2
}

fn default_duplicate_threshold() -> f64 {
    85.0
}

fn default_primary_match_threshold() -> f64 {
    50.0
}

fn default_secondary_match_threshold() -> f64 {
    30.0
}

fn default_min_scanner_confidence() -> u8 {
    70
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            batch_size: default_batch_size(),
            sequential: false,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            conflict_threshold: default_conflict_threshold(),
            consensus_threshold: default_consensus_threshold(),
            default_strategy: FusionStrategy::default(),
            field_strategies: HashMap::new(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            duplicate_similarity_threshold: default_duplicate_threshold(),
            primary_match_threshold: default_primary_match_threshold(),
            secondary_match_threshold: default_secondary_match_threshold(),
            min_scanner_confidence: default_min_scanner_confidence(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            ProcessingError::Config(format!("Failed to read config file '{}': {}", path, e))
        })?;

        let config: PipelineConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Load from `config.toml` when present, otherwise fall back to defaults.
    pub fn load_or_default() -> Self {
        match fs::read_to_string("config.toml") {
            Ok(content) => toml::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }
}
