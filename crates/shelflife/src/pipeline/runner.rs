use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use crate::categorizer::{Categorizer, FoodCategory};
use crate::config::{Config, ReprocessPolicy};
use crate::db::Store;
use crate::error::ConfigError;
use crate::inventory::{self, InventoryItem, ItemSource, ItemStatus};
use crate::parser::{LineParser, ParsedLineItem, ReceiptHeader};
use crate::predictor::{ExpiryPrediction, ExpiryPredictor, HeuristicModel, PredictionRequest};
use crate::processor::{self, ImagePreprocessor, OcrOutput, TextExtractor};
use crate::receipt::{ProcessingStatus, Receipt};
use crate::sanitize;
use crate::shelf_life::ShelfLifeTable;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{PipelineStage, ProgressEvent, ProgressReporter};

/// Why a run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First run after upload. A receipt that already finished is left alone.
    Ingest,
    /// Explicit re-run of a finished receipt.
    Reprocess,
}

/// Outcome of one pipeline run, as reported to whoever triggered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub receipt_id: String,
    pub status: ProcessingStatus,
    pub item_count: usize,
    pub ocr_confidence: Option<f32>,
    pub error: Option<String>,
}

impl RunResult {
    fn completed(ctx: &PipelineContext) -> Self {
        Self {
            receipt_id: ctx.receipt.id.clone(),
            status: ProcessingStatus::Completed,
            item_count: ctx.items.len(),
            ocr_confidence: ctx.ocr.as_ref().map(|o| o.confidence),
            error: None,
        }
    }

    fn failed(ctx: &PipelineContext, error: String) -> Self {
        Self {
            receipt_id: ctx.receipt.id.clone(),
            status: ProcessingStatus::Failed,
            item_count: 0,
            ocr_confidence: ctx.ocr.as_ref().map(|o| o.confidence),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProcessingStatus::Completed
    }
}

/// Runs one receipt through preprocess, OCR, parsing, categorization,
/// expiry prediction and persistence, and owns its status transitions.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn Store>,
    preprocessor: ImagePreprocessor,
    extractor: TextExtractor,
    parser: LineParser,
    categorizer: Categorizer,
    predictor: ExpiryPredictor,
}

impl Pipeline {
    /// Production constructor. Loads the shelf-life table and picks the OCR
    /// engine and shelf-life model from config.
    pub fn from_config(config: &Config, store: Arc<dyn Store>) -> Result<Self, ConfigError> {
        let table = match &config.shelf_life_table {
            Some(path) => ShelfLifeTable::load(path)?,
            None => ShelfLifeTable::builtin(),
        };
        let table = Arc::new(table);
        let predictor = if config.model.enabled {
            ExpiryPredictor::with_model(table, Arc::new(HeuristicModel))
        } else {
            ExpiryPredictor::new(table)
        };

        let engine = processor::build_engine(config.ocr.enabled, &config.ocr.languages);
        let extractor =
            TextExtractor::new(engine).with_min_token_confidence(config.ocr.min_token_confidence);

        Ok(Self::new(
            PipelineConfig::from_config(config),
            store,
            extractor,
            predictor,
        ))
    }

    /// Constructor with injected OCR and prediction components.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn Store>,
        extractor: TextExtractor,
        predictor: ExpiryPredictor,
    ) -> Self {
        Self {
            config,
            store,
            preprocessor: ImagePreprocessor::new(),
            extractor,
            parser: LineParser::new(),
            categorizer: Categorizer::new(),
            predictor,
        }
    }

    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    pub fn with_parser(mut self, parser: LineParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn predictor(&self) -> &ExpiryPredictor {
        &self.predictor
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Loads the receipt and moves it to `processing`.
    ///
    /// Returns `Ok(None)` when an ingest finds the receipt already past
    /// `pending`. A reprocess of a finished receipt first moves it back to
    /// `pending`.
    pub fn begin(
        &self,
        receipt_id: &str,
        trigger: Trigger,
    ) -> Result<Option<PipelineContext>, PipelineError> {
        let mut receipt = self
            .store
            .load_receipt(receipt_id)?
            .ok_or_else(|| PipelineError::ReceiptNotFound(receipt_id.to_string()))?;

        match (trigger, receipt.processing_status) {
            (_, ProcessingStatus::Pending) => {}
            (Trigger::Ingest, status) => {
                debug!(receipt_id, %status, "Receipt already ingested, skipping");
                return Ok(None);
            }
            (Trigger::Reprocess, ProcessingStatus::Processing) => {
                return Err(PipelineError::InvalidState {
                    id: receipt_id.to_string(),
                    status: ProcessingStatus::Processing,
                });
            }
            (Trigger::Reprocess, status) => {
                self.store.save_receipt_status(
                    receipt_id,
                    status,
                    ProcessingStatus::Pending,
                    None,
                    None,
                )?;
                info!(receipt_id, from = %status, "Receipt queued for reprocessing");
            }
        }

        self.store.save_receipt_status(
            receipt_id,
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            None,
            None,
        )?;
        receipt.processing_status = ProcessingStatus::Processing;
        receipt.error = None;
        receipt.processed_at = None;

        Ok(Some(PipelineContext::new(receipt)))
    }

    /// [`begin`](Self::begin) followed by [`run`](Self::run).
    ///
    /// Stage failures end up in the returned [`RunResult`]; only problems
    /// starting the run are errors.
    pub fn process(
        &self,
        receipt_id: &str,
        trigger: Trigger,
        progress: &dyn ProgressReporter,
    ) -> Result<Option<RunResult>, PipelineError> {
        match self.begin(receipt_id, trigger)? {
            Some(ctx) => Ok(Some(self.run(ctx, progress).0)),
            None => Ok(None),
        }
    }

    /// Run the full pipeline for a receipt already in `processing`.
    /// Returns a (RunResult, PipelineContext) pair.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (RunResult, PipelineContext) {
        let filename = sanitize::redact_path(&ctx.receipt.file_path);
        let _pipeline_span = info_span!("pipeline",
            receipt_id = %ctx.receipt.id,
            filename = %filename,
            engine = self.extractor.engine_name(),
        )
        .entered();

        // A panicking stage still has to leave the receipt in `failed`.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&mut ctx, progress)))
            .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(()) => {
                info!(items = ctx.items.len(), "Receipt processed");
                progress.report(ProgressEvent::Completed {
                    items: ctx.items.len(),
                });
                (RunResult::completed(&ctx), ctx)
            }
            Err(e) => {
                let err_msg = e.to_string();
                warn!(error = %err_msg, "Receipt processing failed");
                self.mark_failed(&mut ctx, &err_msg);
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                (RunResult::failed(&ctx, err_msg), ctx)
            }
        }
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        // Step 1: Read image
        let bytes = {
            let _step = info_span!("read_image").entered();
            stage(progress, PipelineStage::ReadingImage, "Reading receipt image...");
            processor::read_image(&ctx.receipt.file_path)?
        };

        // Step 2: Preprocess
        let prepared = {
            let _step = info_span!("preprocess", bytes = bytes.len()).entered();
            stage(progress, PipelineStage::Preprocessing, "Cleaning up image...");
            self.preprocessor.preprocess(&bytes)?
        };
        drop(bytes);
        ctx.warnings
            .extend(prepared.warnings.into_iter().map(PipelineWarning::Image));

        // Step 3: Extract text
        let output = {
            let _step = info_span!("extract_text").entered();
            stage(progress, PipelineStage::ExtractingText, "Running OCR...");
            self.step_extract_text(ctx, prepared.bitmap)?
        };

        // Step 4: Parse lines
        {
            let _step = info_span!("parse_lines").entered();
            stage(progress, PipelineStage::ParsingLines, "Parsing receipt lines...");
            ctx.parsed = self.parser.parse(&output.text);
            debug!(
                candidates = ctx.parsed.len(),
                preview = %sanitize::text_preview(&output.text, 40),
                "Receipt lines parsed"
            );
        }
        ctx.ocr = Some(output);

        // Step 5: Categorize and predict
        {
            let _step = info_span!("categorize_and_predict", items = ctx.parsed.len()).entered();
            stage(progress, PipelineStage::Predicting, "Predicting expiry dates...");
            ctx.items = self.step_categorize_and_predict(ctx, Utc::now());
        }

        // Step 6: Persist
        {
            let _step = info_span!("persist", items = ctx.items.len()).entered();
            stage(progress, PipelineStage::Persisting, "Saving inventory items...");
            self.step_persist(ctx)?;
        }

        Ok(())
    }

    fn step_extract_text(
        &self,
        ctx: &mut PipelineContext,
        bitmap: image::GrayImage,
    ) -> Result<OcrOutput, PipelineError> {
        let timeout = self.config.ocr_timeout;
        let extraction = self
            .extractor
            .extract_within(bitmap, timeout)
            .ok_or(PipelineError::Timeout(timeout))?;

        if let Some(reason) = extraction.degraded_reason() {
            warn!(reason, "Text extraction degraded");
            ctx.warnings.push(PipelineWarning::OcrDegraded {
                reason: reason.to_string(),
            });
        }
        let output = extraction.into_output();

        ctx.header = ReceiptHeader::extract(&output.text);
        self.store.save_ocr_text(
            &ctx.receipt.id,
            &output.text,
            output.confidence,
            &ctx.header,
        )?;
        apply_header(&mut ctx.receipt, &ctx.header, &output);

        if let Some(threshold) = self.config.min_ocr_confidence {
            if output.confidence < threshold {
                return Err(PipelineError::LowConfidence {
                    confidence: output.confidence,
                    threshold,
                });
            }
        }

        Ok(output)
    }

    fn step_categorize_and_predict(
        &self,
        ctx: &mut PipelineContext,
        now: DateTime<Utc>,
    ) -> Vec<InventoryItem> {
        let purchase_date = ctx.receipt.purchase_date();
        let receipt = &ctx.receipt;

        ctx.parsed
            .iter_mut()
            .map(|parsed| {
                let category = self.categorizer.categorize(&parsed.name);
                parsed.category = Some(category);

                let prediction = self.predictor.predict(&PredictionRequest {
                    name: &parsed.name,
                    category,
                    brand: None,
                    purchase_date,
                    storage: self.config.default_storage,
                });

                debug!(
                    item = %parsed.name,
                    %category,
                    shelf_life_days = prediction.shelf_life_days,
                    expiry_confidence = prediction.confidence,
                    factors = ?prediction.factors,
                    "Expiry predicted"
                );

                build_item(
                    receipt,
                    parsed,
                    &prediction,
                    purchase_date,
                    now,
                    self.config.nearing_days,
                )
            })
            .collect()
    }

    fn step_persist(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let replace = self.config.reprocess == ReprocessPolicy::Replace;
        let processed_at = Utc::now();
        self.store
            .complete_receipt(&ctx.receipt.id, &ctx.items, replace, processed_at)?;

        ctx.receipt.processing_status = ProcessingStatus::Completed;
        ctx.receipt.processed_at = Some(processed_at);
        Ok(())
    }

    fn mark_failed(&self, ctx: &mut PipelineContext, message: &str) {
        let processed_at = Utc::now();
        match self.store.save_receipt_status(
            &ctx.receipt.id,
            ProcessingStatus::Processing,
            ProcessingStatus::Failed,
            Some(message),
            Some(processed_at),
        ) {
            Ok(()) => {
                ctx.receipt.processing_status = ProcessingStatus::Failed;
                ctx.receipt.error = Some(message.to_string());
                ctx.receipt.processed_at = Some(processed_at);
            }
            Err(e) => {
                error!(receipt_id = %ctx.receipt.id, error = %e, "Could not mark receipt as failed");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn stage(progress: &dyn ProgressReporter, stage: PipelineStage, message: &str) {
    progress.report(ProgressEvent::Stage {
        stage,
        message: message.to_string(),
    });
}

/// Mirrors what the store does with OCR output: header facts only fill
/// fields the uploader left empty.
fn apply_header(receipt: &mut Receipt, header: &ReceiptHeader, output: &OcrOutput) {
    receipt.ocr_text = Some(output.text.clone());
    receipt.ocr_confidence = Some(output.confidence);
    if receipt.store_name.is_none() {
        receipt.store_name = header.store_name.clone();
    }
    if receipt.receipt_date.is_none() {
        receipt.receipt_date = header.date;
    }
    if receipt.total_amount.is_none() {
        receipt.total_amount = header.total;
    }
}

fn build_item(
    receipt: &Receipt,
    parsed: &ParsedLineItem,
    prediction: &ExpiryPrediction,
    purchase_date: DateTime<Utc>,
    now: DateTime<Utc>,
    nearing_days: u32,
) -> InventoryItem {
    let quantity = parsed.decoded_quantity();
    let predicted_expiry_date = prediction.predicted_expiry_date;
    InventoryItem {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: receipt.user_id.clone(),
        receipt_id: Some(receipt.id.clone()),
        name: parsed.name.clone(),
        category: parsed.category.unwrap_or(FoodCategory::Pantry),
        brand: None,
        quantity: quantity.amount,
        unit: quantity.unit,
        purchase_price: parsed.price,
        purchase_date,
        store_name: receipt.store_name.clone(),
        predicted_expiry_date,
        confidence_score: parsed.confidence,
        expiry_confidence: prediction.confidence,
        status: inventory::status_at(ItemStatus::Fresh, predicted_expiry_date, now, nearing_days),
        source: ItemSource::Receipt,
        created_at: now,
        last_updated: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, InventoryStore, ReceiptStore, SqliteStore};
    use crate::pipeline::progress::NoopProgress;
    use crate::processor::{MockOcrEngine, OcrEngine};
    use crate::receipt::NewReceipt;
    use chrono::{Duration, NaiveDate};
    use image::{GrayImage, Luma};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingProgress(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for RecordingProgress {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn write_receipt_image(dir: &Path, name: &str) -> PathBuf {
        let mut img = GrayImage::from_pixel(240, 320, Luma([250]));
        for y in (40..280).step_by(24) {
            for x in 30..210 {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn setup() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        (tmp, store)
    }

    fn pipeline_with(store: &SqliteStore, engine: impl OcrEngine + 'static) -> Pipeline {
        pipeline_with_config(store, engine, PipelineConfig::default())
    }

    fn pipeline_with_config(
        store: &SqliteStore,
        engine: impl OcrEngine + 'static,
        config: PipelineConfig,
    ) -> Pipeline {
        Pipeline::new(
            config,
            Arc::new(store.clone()),
            TextExtractor::new(Arc::new(engine)),
            ExpiryPredictor::new(Arc::new(ShelfLifeTable::builtin())),
        )
    }

    fn upload(store: &SqliteStore, path: &Path) -> Receipt {
        store
            .create_receipt(NewReceipt::new("user-1", path), Utc::now())
            .unwrap()
    }

    // ── Happy path ──

    #[test]
    fn test_receipt_lines_become_inventory_items() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(
            &store,
            MockOcrEngine::from_text("2 BANANAS 1.99\nMILK 3.49\nTOTAL 5.48", 91.0),
        );

        let result = pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap()
            .unwrap();

        assert!(result.is_success(), "Pipeline failed: {:?}", result.error);
        assert_eq!(result.item_count, 2);

        let items = store.inventory_for_receipt(&receipt.id).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "BANANAS");
        assert_eq!(items[0].category, FoodCategory::Fruits);
        assert_eq!(items[0].quantity, 2.0);
        assert_eq!(items[0].purchase_price, Some(1.99));
        assert_eq!(items[1].name, "MILK");
        assert_eq!(items[1].category, FoodCategory::Dairy);
        assert_eq!(
            items[1].predicted_expiry_date,
            items[1].purchase_date + Duration::days(7)
        );

        let stored = store.load_receipt(&receipt.id).unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Completed);
        assert!(stored.processed_at.is_some());
        assert_eq!(stored.total_amount, Some(5.48));
    }

    #[test]
    fn test_header_date_becomes_purchase_date() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(
            &store,
            MockOcrEngine::from_text("KROGER\n03/14/2026\nMILK 3.49", 88.0),
        );

        let ctx = pipeline.begin(&receipt.id, Trigger::Ingest).unwrap().unwrap();
        let (result, ctx) = pipeline.run(ctx, &NoopProgress);

        assert!(result.is_success());
        assert_eq!(ctx.receipt.store_name.as_deref(), Some("Kroger"));
        assert_eq!(ctx.receipt.receipt_date, NaiveDate::from_ymd_opt(2026, 3, 14));
        let item = &ctx.items[0];
        assert_eq!(item.purchase_date.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(item.store_name.as_deref(), Some("Kroger"));
    }

    #[test]
    fn test_progress_reports_stages_in_order() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("MILK 3.49", 90.0));
        let progress = RecordingProgress(Mutex::new(Vec::new()));

        pipeline
            .process(&receipt.id, Trigger::Ingest, &progress)
            .unwrap()
            .unwrap();

        let events = progress.0.into_inner().unwrap();
        let stages: Vec<PipelineStage> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Stage { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                PipelineStage::ReadingImage,
                PipelineStage::Preprocessing,
                PipelineStage::ExtractingText,
                PipelineStage::ParsingLines,
                PipelineStage::Predicting,
                PipelineStage::Persisting,
            ]
        );
        assert_eq!(events.last(), Some(&ProgressEvent::Completed { items: 1 }));
    }

    #[test]
    fn test_items_carry_expiry_confidence() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("MILK 3.49\nKIMCHI", 90.0));

        pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap()
            .unwrap();

        let items = store.inventory_for_receipt(&receipt.id).unwrap();
        assert_eq!(items.len(), 2);

        let milk = &items[0];
        assert_eq!(milk.name, "MILK");
        assert!((milk.confidence_score - 0.8).abs() < 1e-6);
        assert!((milk.expiry_confidence - 1.0).abs() < 1e-6);

        // name-only line, pantry fallback with no table entry
        let kimchi = &items[1];
        assert!((kimchi.confidence_score - 0.5).abs() < 1e-6);
        assert!(kimchi.expiry_confidence < milk.expiry_confidence);
    }

    // ── Degraded and failing runs ──

    struct ExplodingModel;

    impl crate::predictor::ShelfLifeModel for ExplodingModel {
        fn name(&self) -> &str {
            "exploding"
        }

        fn adjust(&self, _base_days: u32, _features: &crate::predictor::ModelFeatures<'_>) -> u32 {
            panic!("model exploded")
        }
    }

    #[test]
    fn test_panicking_stage_marks_receipt_failed() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            Arc::new(store.clone()),
            TextExtractor::new(Arc::new(MockOcrEngine::from_text("MILK 3.49", 90.0))),
            ExpiryPredictor::with_model(
                Arc::new(ShelfLifeTable::builtin()),
                Arc::new(ExplodingModel),
            ),
        );

        let result = pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap()
            .unwrap();

        assert_eq!(result.status, ProcessingStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("model exploded"));

        let stored = store.load_receipt(&receipt.id).unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Failed);
        assert!(stored.processed_at.is_some());
        assert!(store.inventory_for_receipt(&receipt.id).unwrap().is_empty());
    }

    #[test]
    fn test_empty_extraction_completes_with_no_items() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(&store, MockOcrEngine::failing("engine crashed"));

        let ctx = pipeline.begin(&receipt.id, Trigger::Ingest).unwrap().unwrap();
        let (result, ctx) = pipeline.run(ctx, &NoopProgress);

        assert!(result.is_success());
        assert_eq!(result.item_count, 0);
        assert_eq!(result.ocr_confidence, Some(0.0));
        assert!(ctx
            .warnings
            .iter()
            .any(|w| matches!(w, PipelineWarning::OcrDegraded { .. })));
        let stored = store.load_receipt(&receipt.id).unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Completed);
    }

    #[test]
    fn test_missing_image_fails_receipt() {
        let (tmp, store) = setup();
        let receipt = upload(&store, &tmp.path().join("gone.jpg"));
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("MILK 3.49", 90.0));

        let result = pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap()
            .unwrap();

        assert_eq!(result.status, ProcessingStatus::Failed);
        let stored = store.load_receipt(&receipt.id).unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Failed);
        assert!(stored.error.is_some());
        assert!(stored.processed_at.is_some());
        assert!(store.inventory_for_receipt(&receipt.id).unwrap().is_empty());
    }

    #[test]
    fn test_undecodable_image_fails_receipt() {
        let (tmp, store) = setup();
        let path = tmp.path().join("notes.jpg");
        std::fs::write(&path, b"this is not a jpeg").unwrap();
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("MILK 3.49", 90.0));

        let result = pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap()
            .unwrap();

        assert_eq!(result.status, ProcessingStatus::Failed);
        assert!(result.error.unwrap().contains("decode"));
    }

    #[test]
    fn test_low_confidence_is_a_soft_failure_when_configured() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let config = PipelineConfig {
            min_ocr_confidence: Some(0.6),
            ..PipelineConfig::default()
        };
        let pipeline =
            pipeline_with_config(&store, MockOcrEngine::from_text("MILK 3.49", 40.0), config);

        let result = pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap()
            .unwrap();

        assert_eq!(result.status, ProcessingStatus::Failed);
        let stored = store.load_receipt(&receipt.id).unwrap().unwrap();
        // OCR output is kept for inspection
        assert_eq!(stored.ocr_text.as_deref(), Some("MILK 3.49"));
        assert!(store.inventory_for_receipt(&receipt.id).unwrap().is_empty());
    }

    #[test]
    fn test_ocr_timeout_fails_receipt() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let config = PipelineConfig {
            ocr_timeout: std::time::Duration::from_millis(50),
            ..PipelineConfig::default()
        };
        let engine = MockOcrEngine::from_text("MILK 3.49", 90.0)
            .with_delay(std::time::Duration::from_millis(500));
        let pipeline = pipeline_with_config(&store, engine, config);

        let result = pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap()
            .unwrap();

        assert_eq!(result.status, ProcessingStatus::Failed);
        assert!(result.error.unwrap().contains("timed out"));
    }

    // ── State machine ──

    #[test]
    fn test_ingest_is_noop_for_finished_receipt() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("MILK 3.49", 90.0));

        pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap();
        let again = pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap();

        assert!(again.is_none());
        assert_eq!(store.inventory_for_receipt(&receipt.id).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_receipt_is_an_error() {
        let (_tmp, store) = setup();
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("", 0.0));

        let err = pipeline.begin("nope", Trigger::Ingest).unwrap_err();
        assert!(matches!(err, PipelineError::ReceiptNotFound(_)));
    }

    #[test]
    fn test_reprocess_rejected_while_processing() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("MILK 3.49", 90.0));

        let _ctx = pipeline.begin(&receipt.id, Trigger::Ingest).unwrap().unwrap();
        let err = pipeline.begin(&receipt.id, Trigger::Reprocess).unwrap_err();

        assert!(matches!(err, PipelineError::InvalidState { .. }));
    }

    #[test]
    fn test_reprocess_replaces_items_by_default() {
        let (tmp, store) = setup();
        let path = write_receipt_image(tmp.path(), "r.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("MILK 3.49\nEGGS 2.99", 90.0));

        pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap();
        let result = pipeline
            .process(&receipt.id, Trigger::Reprocess, &NoopProgress)
            .unwrap()
            .unwrap();

        assert!(result.is_success());
        assert_eq!(store.inventory_for_receipt(&receipt.id).unwrap().len(), 2);
    }

    #[test]
    fn test_reprocess_recovers_failed_receipt() {
        let (tmp, store) = setup();
        let path = tmp.path().join("later.png");
        let receipt = upload(&store, &path);
        let pipeline = pipeline_with(&store, MockOcrEngine::from_text("MILK 3.49", 90.0));

        let first = pipeline
            .process(&receipt.id, Trigger::Ingest, &NoopProgress)
            .unwrap()
            .unwrap();
        assert_eq!(first.status, ProcessingStatus::Failed);

        write_receipt_image(tmp.path(), "later.png");
        let second = pipeline
            .process(&receipt.id, Trigger::Reprocess, &NoopProgress)
            .unwrap()
            .unwrap();

        assert!(second.is_success());
        let stored = store.load_receipt(&receipt.id).unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Completed);
        assert!(stored.error.is_none());
    }

    #[test]
    fn test_from_config_uses_builtin_table() {
        let (_tmp, store) = setup();
        let mut config = Config::default();
        config.ocr.enabled = false;
        config.model.enabled = true;

        let pipeline = Pipeline::from_config(&config, Arc::new(store)).unwrap();

        assert!(!pipeline.predictor().table().is_empty());
        assert_eq!(pipeline.predictor().model_name(), "heuristic");
        assert_eq!(pipeline.config().nearing_days, 3);
    }
}
