use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::processor::ImageWarning;
use crate::receipt::ProcessingStatus;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Receipt not found: {0}")]
    ReceiptNotFound(String),

    #[error("Receipt {id} cannot be processed while {status}")]
    InvalidState {
        id: String,
        status: ProcessingStatus,
    },

    #[error("Receipt processing failed: {0}")]
    Processing(#[from] crate::error::ProcessError),

    #[error("Text extraction timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("OCR confidence {confidence:.2} is below the required {threshold:.2}")]
    LowConfidence { confidence: f32, threshold: f32 },

    #[error("Pipeline stage panicked: {0}")]
    Panicked(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Problems that did not stop the run but are worth surfacing.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    Image(ImageWarning),
    OcrDegraded { reason: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::Image(warning) => write!(f, "{}", warning),
            PipelineWarning::OcrDegraded { reason } => write!(f, "OCR degraded: {}", reason),
        }
    }
}
