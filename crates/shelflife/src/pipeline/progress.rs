use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::receipt::ProcessingStatus;

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Queued,
    ReadingImage,
    Preprocessing,
    ExtractingText,
    ParsingLines,
    Predicting,
    Persisting,
    Completed,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Queued => write!(f, "Queued"),
            PipelineStage::ReadingImage => write!(f, "Reading image"),
            PipelineStage::Preprocessing => write!(f, "Preprocessing"),
            PipelineStage::ExtractingText => write!(f, "Extracting text"),
            PipelineStage::ParsingLines => write!(f, "Parsing lines"),
            PipelineStage::Predicting => write!(f, "Predicting expiry"),
            PipelineStage::Persisting => write!(f, "Persisting"),
            PipelineStage::Completed => write!(f, "Completed"),
            PipelineStage::Failed => write!(f, "Failed"),
        }
    }
}

/// Events emitted by the pipeline during processing.
/// OCR text is not part of any event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage { stage: PipelineStage, message: String },
    Completed { items: usize },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress of one receipt as seen by subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptProgressEvent {
    pub receipt_id: String,
    pub stage: PipelineStage,
    pub status: ProcessingStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Forwards pipeline events for one receipt to a broadcast channel.
pub struct BroadcastProgress {
    receipt_id: String,
    sender: broadcast::Sender<ReceiptProgressEvent>,
}

impl BroadcastProgress {
    pub fn new(receipt_id: &str, sender: broadcast::Sender<ReceiptProgressEvent>) -> Self {
        Self {
            receipt_id: receipt_id.to_string(),
            sender,
        }
    }

    fn send(
        &self,
        stage: PipelineStage,
        status: ProcessingStatus,
        message: String,
        item_count: Option<usize>,
        error: Option<String>,
    ) {
        let event = ReceiptProgressEvent {
            receipt_id: self.receipt_id.clone(),
            stage,
            status,
            message,
            timestamp: Utc::now(),
            item_count,
            error,
        };
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage { stage, message } => {
                let status = if stage == PipelineStage::Queued {
                    ProcessingStatus::Pending
                } else {
                    ProcessingStatus::Processing
                };
                self.send(stage, status, message, None, None);
            }
            ProgressEvent::Completed { items } => self.send(
                PipelineStage::Completed,
                ProcessingStatus::Completed,
                format!("Created {} inventory items", items),
                Some(items),
                None,
            ),
            ProgressEvent::Failed { error } => self.send(
                PipelineStage::Failed,
                ProcessingStatus::Failed,
                "Processing failed".to_string(),
                None,
                Some(error),
            ),
        }
    }
}
