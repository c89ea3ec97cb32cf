//! Asynchronous ingestion front door.
//!
//! [`IngestService`] turns "this receipt was uploaded" into a background
//! pipeline run. Runs are bounded by a semaphore and serialized per receipt
//! id, so an ingest and a reprocess of the same receipt never race on its
//! status. The pipeline itself is synchronous and runs on the blocking pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::DatabaseError;
use crate::inventory::InventoryItem;
use crate::pipeline::{
    BroadcastProgress, Pipeline, PipelineError, PipelineStage, ProgressEvent, ProgressReporter,
    ReceiptProgressEvent, RunResult, Trigger,
};
use crate::receipt::ProcessingStatus;

const PROGRESS_CAPACITY: usize = 256;
const INTERRUPTED_MESSAGE: &str = "processing was interrupted before completion";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unknown receipt: {0}")]
    UnknownReceipt(String),

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Ingest service is shut down")]
    ShutDown,

    #[error("Pipeline task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Current state of a receipt as seen by callers. Items are only present
/// once the receipt is `completed`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub receipt_id: String,
    pub status: ProcessingStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub ocr_confidence: Option<f32>,
    pub items: Vec<InventoryItem>,
}

pub type RunHandle = JoinHandle<Result<Option<RunResult>, IngestError>>;

/// One async mutex per receipt id currently queued or running.
#[derive(Clone, Default)]
struct ReceiptLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ReceiptLocks {
    fn get(&self, receipt_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(map.entry(receipt_id.to_string()).or_default())
    }

    /// Drops the registry entry when nobody else is waiting on it.
    fn release(&self, receipt_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // one reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            map.remove(receipt_id);
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}

pub struct IngestService {
    pipeline: Arc<Pipeline>,
    limiter: Arc<Semaphore>,
    locks: ReceiptLocks,
    progress: broadcast::Sender<ReceiptProgressEvent>,
    runtime: Handle,
}

impl IngestService {
    /// Must be called from within a tokio runtime.
    pub fn new(pipeline: Pipeline, max_concurrent: usize) -> Result<Self, IngestError> {
        let runtime = Handle::try_current().map_err(|e| IngestError::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(pipeline, max_concurrent, runtime))
    }

    pub fn with_handle(pipeline: Pipeline, max_concurrent: usize, runtime: Handle) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            pipeline: Arc::new(pipeline),
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            locks: ReceiptLocks::default(),
            progress,
            runtime,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Live progress of every run started by this service.
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiptProgressEvent> {
        self.progress.subscribe()
    }

    /// Queues a first run for a freshly uploaded receipt and returns
    /// immediately. Triggering an already finished receipt is a no-op run.
    pub fn ingest(&self, receipt_id: &str) -> Result<RunHandle, IngestError> {
        self.start(receipt_id, Trigger::Ingest)
    }

    /// Queues a full re-run of a finished receipt.
    pub fn reprocess(&self, receipt_id: &str) -> Result<RunHandle, IngestError> {
        self.start(receipt_id, Trigger::Reprocess)
    }

    fn start(&self, receipt_id: &str, trigger: Trigger) -> Result<RunHandle, IngestError> {
        if self.limiter.is_closed() {
            return Err(IngestError::ShutDown);
        }
        if self.pipeline.store().load_receipt(receipt_id)?.is_none() {
            return Err(IngestError::UnknownReceipt(receipt_id.to_string()));
        }

        let receipt_id = receipt_id.to_string();
        let pipeline = Arc::clone(&self.pipeline);
        let limiter = Arc::clone(&self.limiter);
        let locks = self.locks.clone();
        let sender = self.progress.clone();

        debug!(receipt_id = %receipt_id, ?trigger, "Queueing receipt");
        let handle = self.runtime.spawn(async move {
            let progress = BroadcastProgress::new(&receipt_id, sender);
            progress.report(ProgressEvent::Stage {
                stage: PipelineStage::Queued,
                message: "Receipt queued for processing".to_string(),
            });

            let lock = locks.get(&receipt_id);
            let outcome = {
                let _turn = lock.lock().await;
                run_blocking(pipeline, limiter, receipt_id.clone(), trigger, progress).await
            };
            locks.release(&receipt_id, lock);
            outcome
        });

        Ok(handle)
    }

    /// Synchronous read of a receipt's status, plus its items once completed.
    pub fn get_pipeline_result(&self, receipt_id: &str) -> Result<PipelineResult, IngestError> {
        let store = self.pipeline.store();
        let receipt = store
            .load_receipt(receipt_id)?
            .ok_or_else(|| IngestError::UnknownReceipt(receipt_id.to_string()))?;

        let items = if receipt.processing_status == ProcessingStatus::Completed {
            store.inventory_for_receipt(receipt_id)?
        } else {
            Vec::new()
        };

        Ok(PipelineResult {
            receipt_id: receipt.id,
            status: receipt.processing_status,
            processed_at: receipt.processed_at,
            error: receipt.error,
            ocr_confidence: receipt.ocr_confidence,
            items,
        })
    }

    /// Marks receipts left in `processing` by a previous process as failed.
    /// Call once at startup, before any ingest.
    pub fn recover_interrupted(&self) -> Result<usize, IngestError> {
        let store = self.pipeline.store();
        let stuck = store.receipts_in_status(ProcessingStatus::Processing)?;
        let now = Utc::now();

        let mut recovered = 0;
        for receipt in &stuck {
            match store.save_receipt_status(
                &receipt.id,
                ProcessingStatus::Processing,
                ProcessingStatus::Failed,
                Some(INTERRUPTED_MESSAGE),
                Some(now),
            ) {
                Ok(()) => recovered += 1,
                Err(e) => warn!(receipt_id = %receipt.id, error = %e, "Could not recover receipt"),
            }
        }

        if recovered > 0 {
            info!(recovered, "Recovered interrupted receipts");
        }
        Ok(recovered)
    }

    /// Stops accepting work. Queued runs that have not started fail with
    /// [`IngestError::ShutDown`]; running ones finish.
    pub fn shutdown(&self) {
        info!("Shutting down ingest service...");
        self.limiter.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.limiter.is_closed()
    }

    /// Number of receipt ids with a queued or running task.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

async fn run_blocking(
    pipeline: Arc<Pipeline>,
    limiter: Arc<Semaphore>,
    receipt_id: String,
    trigger: Trigger,
    progress: BroadcastProgress,
) -> Result<Option<RunResult>, IngestError> {
    let _permit = limiter
        .acquire_owned()
        .await
        .map_err(|_| IngestError::ShutDown)?;

    let result = tokio::task::spawn_blocking(move || {
        pipeline.process(&receipt_id, trigger, &progress)
    })
    .await
    .map_err(|e| IngestError::TaskFailed(e.to_string()))??;

    Ok(result)
}
