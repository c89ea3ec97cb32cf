//! Test harness for isolated pipeline runs.
//!
//! Each `TestHarness` owns a temp directory holding an upload folder and a
//! SQLite database file, so tests never share state.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use image::{GrayImage, Luma};
use tempfile::TempDir;

use shelflife::db::{Database, InventoryStore, ReceiptStore, SqliteStore};
use shelflife::pipeline::{PipelineConfig, ProgressEvent, ProgressReporter};
use shelflife::predictor::{ExpiryPredictor, IdentityModel, ShelfLifeModel};
use shelflife::processor::{MockOcrEngine, TextExtractor};
use shelflife::shelf_life::ShelfLifeTable;
use shelflife::{InventoryItem, NewReceipt, Pipeline, Receipt};

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub store: SqliteStore,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");

        let db = Database::open(&temp_dir.path().join("data").join("shelflife.db"))
            .expect("Failed to open database");

        Self {
            temp_dir,
            upload_dir,
            store: SqliteStore::new(db),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a synthetic receipt photo: light paper with dark text bars.
    pub fn write_receipt_image(&self, filename: &str) -> PathBuf {
        let mut img = GrayImage::from_pixel(300, 480, Luma([235]));
        for row in 0..12u32 {
            let y = 30 + row * 36;
            for x in 24..(120 + (row * 13) % 150) {
                for dy in 0..3 {
                    img.put_pixel(x, y + dy, Luma([25]));
                }
            }
        }
        let path = self.upload_dir.join(filename);
        img.save(&path).expect("Failed to write receipt image");
        path
    }

    pub fn write_bytes(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.upload_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write upload");
        path
    }

    /// Registers an upload in `pending`.
    pub fn upload(&self, user_id: &str, path: &Path) -> Receipt {
        self.store
            .create_receipt(NewReceipt::new(user_id, path), Utc::now())
            .expect("Failed to create receipt")
    }

    /// Writes an image and registers it.
    pub fn upload_image(&self, user_id: &str, filename: &str) -> Receipt {
        let path = self.write_receipt_image(filename);
        self.upload(user_id, &path)
    }

    pub fn pipeline(&self, engine: MockOcrEngine) -> Pipeline {
        self.pipeline_with(engine, PipelineConfig::default(), Arc::new(IdentityModel))
    }

    pub fn pipeline_with(
        &self,
        engine: MockOcrEngine,
        config: PipelineConfig,
        model: Arc<dyn ShelfLifeModel>,
    ) -> Pipeline {
        let predictor = ExpiryPredictor::with_model(Arc::new(ShelfLifeTable::builtin()), model);
        Pipeline::new(
            config,
            Arc::new(self.store.clone()),
            TextExtractor::new(Arc::new(engine)),
            predictor,
        )
    }

    pub fn receipt(&self, id: &str) -> Receipt {
        self.store
            .load_receipt(id)
            .expect("Failed to load receipt")
            .expect("Receipt missing")
    }

    pub fn items(&self, receipt_id: &str) -> Vec<InventoryItem> {
        self.store
            .inventory_for_receipt(receipt_id)
            .expect("Failed to load items")
    }
}

/// Collects every progress event for later assertions.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
