use serde::{Deserialize, Serialize};

use crate::shelf_life::StorageLocation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file; defaults to `~/.shelflife/data/shelflife.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    pub upload_directory: String,
    /// Optional JSON shelf-life table replacing the built-in dataset.
    #[serde(default)]
    pub shelf_life_table: Option<String>,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            upload_directory: "uploads".to_string(),
            shelf_life_table: None,
            ocr: OcrConfig::default(),
            pipeline: PipelineSettings::default(),
            inventory: InventoryConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Tokens at or below this confidence (0-100) are dropped from the text.
    #[serde(default = "default_min_token_confidence")]
    pub min_token_confidence: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_min_token_confidence() -> f32 {
    30.0
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: default_languages(),
            min_token_confidence: default_min_token_confidence(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// What happens to previously derived items when a receipt is reprocessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReprocessPolicy {
    /// Delete earlier items in the same transaction as the new write.
    #[default]
    Replace,
    /// Keep earlier items and add the new set alongside them.
    Append,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub default_storage: StorageLocation,
    /// Extractions below this confidence (0.0-1.0) fail the receipt.
    #[serde(default)]
    pub min_ocr_confidence: Option<f32>,
    #[serde(default)]
    pub reprocess: ReprocessPolicy,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    num_cpus::get()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_storage: StorageLocation::default(),
            min_ocr_confidence: None,
            reprocess: ReprocessPolicy::default(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_nearing_days")]
    pub nearing_days: u32,
}

fn default_nearing_days() -> u32 {
    3
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            nearing_days: default_nearing_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Use the heuristic shelf-life model on top of the table.
    #[serde(default)]
    pub enabled: bool,
}
