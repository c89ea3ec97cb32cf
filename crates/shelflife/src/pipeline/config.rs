use std::time::Duration;

use crate::config::{Config, ReprocessPolicy};
use crate::processor::ocr::DEFAULT_MIN_TOKEN_CONFIDENCE;
use crate::shelf_life::StorageLocation;

pub struct PipelineConfig {
    pub default_storage: StorageLocation,
    pub min_ocr_confidence: Option<f32>,
    pub reprocess: ReprocessPolicy,
    pub ocr_timeout: Duration,
    pub min_token_confidence: f32,
    pub nearing_days: u32,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_storage: config.pipeline.default_storage,
            min_ocr_confidence: config.pipeline.min_ocr_confidence,
            reprocess: config.pipeline.reprocess,
            ocr_timeout: Duration::from_secs(config.ocr.timeout_secs),
            min_token_confidence: config.ocr.min_token_confidence,
            nearing_days: config.inventory.nearing_days,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_storage: StorageLocation::default(),
            min_ocr_confidence: None,
            reprocess: ReprocessPolicy::default(),
            ocr_timeout: Duration::from_secs(30),
            min_token_confidence: DEFAULT_MIN_TOKEN_CONFIDENCE,
            nearing_days: 3,
        }
    }
}
