//! Receipt ingestion for a household food inventory.
//!
//! An uploaded receipt photo is cleaned up, run through OCR, split into
//! candidate line items, categorized, and given a predicted expiry date.
//! [`Pipeline`] runs one receipt end to end and owns its status;
//! [`IngestService`] runs pipelines in the background.

pub mod categorizer;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod inventory;
pub mod parser;
pub mod pipeline;
pub mod predictor;
pub mod processor;
pub mod receipt;
pub mod sanitize;
pub mod shelf_life;
pub mod telemetry;

pub use categorizer::{Categorizer, FoodCategory};
pub use config::{load_config, Config, ReprocessPolicy};
pub use db::{Database, DatabaseError, SqliteStore, Store};
pub use error::{ConfigError, ProcessError, Result, ShelflifeError};
pub use ingest::{IngestError, IngestService, PipelineResult};
pub use inventory::{InventoryItem, ItemSource, ItemStatus};
pub use parser::{LineParser, ParsedLineItem};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext, RunResult, Trigger};
pub use predictor::{ExpiryPrediction, ExpiryPredictor, PredictionRequest};
pub use receipt::{NewReceipt, ProcessingStatus, Receipt};
pub use shelf_life::{ShelfLifeTable, StorageLocation};
