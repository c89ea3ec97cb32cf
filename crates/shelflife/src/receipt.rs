//! Receipt records and the processing-status state machine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Position of a receipt in the ingestion state machine.
///
/// Legal moves: `pending -> processing -> {completed | failed}`, and
/// `{completed | failed} -> pending` on an explicit reprocess request.
/// `processing -> failed` also covers recovery of interrupted runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub user_id: String,
    pub file_path: PathBuf,
    pub original_filename: Option<String>,
    pub store_name: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub total_amount: Option<f64>,
    pub currency: String,
    pub ocr_text: Option<String>,
    pub ocr_confidence: Option<f32>,
    pub processing_status: ProcessingStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Receipt {
    /// Date items on this receipt were bought: the receipt date when known,
    /// otherwise the upload time.
    pub fn purchase_date(&self) -> DateTime<Utc> {
        self.receipt_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(self.created_at)
    }
}

/// Metadata supplied by the uploader when a receipt image is registered.
#[derive(Debug, Clone, Default)]
pub struct NewReceipt {
    pub user_id: String,
    pub file_path: PathBuf,
    pub original_filename: Option<String>,
    pub store_name: Option<String>,
    pub receipt_date: Option<NaiveDate>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
}

impl NewReceipt {
    pub fn new(user_id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let original_filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        Self {
            user_id: user_id.into(),
            file_path,
            original_filename,
            ..Default::default()
        }
    }

    pub fn into_receipt(self, now: DateTime<Utc>) -> Receipt {
        Receipt {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id,
            file_path: self.file_path,
            original_filename: self.original_filename,
            store_name: self.store_name,
            receipt_date: self.receipt_date,
            total_amount: self.total_amount,
            currency: self.currency.unwrap_or_else(|| "USD".to_string()),
            ocr_text: None,
            ocr_confidence: None,
            processing_status: ProcessingStatus::Pending,
            error: None,
            created_at: now,
            processed_at: None,
        }
    }
}
