//! Builders for test inputs.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};

use shelflife::pipeline::PipelineConfig;
use shelflife::ReprocessPolicy;

/// Builder for `PipelineConfig` instances.
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn reprocess(mut self, policy: ReprocessPolicy) -> Self {
        self.config.reprocess = policy;
        self
    }

    pub fn min_ocr_confidence(mut self, threshold: f32) -> Self {
        self.config.min_ocr_confidence = Some(threshold);
        self
    }

    pub fn ocr_timeout(mut self, timeout: Duration) -> Self {
        self.config.ocr_timeout = timeout;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

/// Builder for OCR text laid out like a grocery receipt.
pub struct ReceiptTextBuilder {
    lines: Vec<String>,
}

impl ReceiptTextBuilder {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn header(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn item(mut self, name: &str, price: f64) -> Self {
        self.lines.push(format!("{} {:.2}", name, price));
        self
    }

    pub fn item_qty(mut self, qty: u32, name: &str, price: f64) -> Self {
        self.lines.push(format!("{} {} {:.2}", qty, name, price));
        self
    }

    pub fn total(mut self, amount: f64) -> Self {
        self.lines.push(format!("TOTAL {:.2}", amount));
        self
    }

    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

/// Builder for config JSON documents.
pub struct ConfigJsonBuilder {
    value: Value,
}

impl ConfigJsonBuilder {
    pub fn new() -> Self {
        Self {
            value: json!({
                "version": "1.0",
                "upload_directory": "/srv/uploads"
            }),
        }
    }

    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.value[key] = value;
        self
    }

    pub fn build(self) -> String {
        self.value.to_string()
    }
}
