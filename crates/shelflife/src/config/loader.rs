use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.upload_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "upload_directory must not be empty".to_string(),
        });
    }

    if !(0.0..=100.0).contains(&config.ocr.min_token_confidence) {
        return Err(ConfigError::Validation {
            message: format!(
                "ocr.min_token_confidence must be within 0-100, got {}",
                config.ocr.min_token_confidence
            ),
        });
    }

    if config.ocr.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "ocr.timeout_secs must be positive".to_string(),
        });
    }

    if let Some(threshold) = config.pipeline.min_ocr_confidence {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Validation {
                message: format!(
                    "pipeline.min_ocr_confidence must be within 0-1, got {}",
                    threshold
                ),
            });
        }
    }

    if config.pipeline.max_concurrent == 0 {
        return Err(ConfigError::Validation {
            message: "pipeline.max_concurrent must be at least 1".to_string(),
        });
    }

    Ok(())
}
