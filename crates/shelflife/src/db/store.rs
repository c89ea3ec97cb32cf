//! Storage seams consumed by the pipeline, and their SQLite implementation.

use chrono::{DateTime, Utc};

use super::{inventory_repo, receipt_repo, Database, DatabaseError};
use crate::inventory::{InventoryItem, InventoryStats, ItemStatus};
use crate::parser::ReceiptHeader;
use crate::receipt::{NewReceipt, ProcessingStatus, Receipt};

pub use inventory_repo::SweepReport;
pub use receipt_repo::ReceiptStats;

pub trait ReceiptStore: Send + Sync {
    fn load_receipt(&self, id: &str) -> Result<Option<Receipt>, DatabaseError>;

    /// Compare-and-set status update. Fails with `StaleStatus` when the
    /// stored status is not `from`.
    fn save_receipt_status(
        &self,
        id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
        error: Option<&str>,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    fn save_ocr_text(
        &self,
        id: &str,
        text: &str,
        confidence: f32,
        header: &ReceiptHeader,
    ) -> Result<(), DatabaseError>;

    fn receipts_in_status(&self, status: ProcessingStatus) -> Result<Vec<Receipt>, DatabaseError>;

    /// Persists `items` and moves the receipt from `processing` to
    /// `completed` in one transaction. With `replace_existing`, items
    /// previously derived from the receipt are deleted first.
    fn complete_receipt(
        &self,
        id: &str,
        items: &[InventoryItem],
        replace_existing: bool,
        processed_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}

pub trait InventoryStore: Send + Sync {
    fn save_inventory_items(&self, items: &[InventoryItem]) -> Result<(), DatabaseError>;

    fn replace_inventory_items(
        &self,
        receipt_id: &str,
        items: &[InventoryItem],
    ) -> Result<(), DatabaseError>;

    fn inventory_for_receipt(&self, receipt_id: &str) -> Result<Vec<InventoryItem>, DatabaseError>;
}

/// Everything the ingestion service needs from storage.
pub trait Store: ReceiptStore + InventoryStore {}

impl<T: ReceiptStore + InventoryStore> Store for T {}

#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Registers an uploaded image as a `pending` receipt.
    pub fn create_receipt(
        &self,
        new: NewReceipt,
        now: DateTime<Utc>,
    ) -> Result<Receipt, DatabaseError> {
        let receipt = new.into_receipt(now);
        receipt_repo::insert(&self.db, &receipt)?;
        log::info!("Receipt {} created for user {}", receipt.id, receipt.user_id);
        Ok(receipt)
    }

    pub fn list_receipts(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Receipt>, u64), DatabaseError> {
        receipt_repo::list_for_user(&self.db, user_id, limit, offset)
    }

    /// Deletes a receipt with its items, then removes the image file.
    /// A file that cannot be removed is logged, not reported.
    pub fn delete_receipt(&self, id: &str, user_id: &str) -> Result<bool, DatabaseError> {
        let Some(receipt) = receipt_repo::delete(&self.db, id, user_id)? else {
            return Ok(false);
        };

        if let Err(e) = std::fs::remove_file(&receipt.file_path) {
            log::warn!(
                "Could not remove image {} of deleted receipt {}: {}",
                crate::sanitize::redact_path(&receipt.file_path),
                id,
                e
            );
        }
        Ok(true)
    }

    pub fn receipt_stats(&self, user_id: &str) -> Result<ReceiptStats, DatabaseError> {
        receipt_repo::stats(&self.db, user_id)
    }

    pub fn inventory_for_user(
        &self,
        user_id: &str,
        status: Option<ItemStatus>,
    ) -> Result<Vec<InventoryItem>, DatabaseError> {
        inventory_repo::list_for_user(&self.db, user_id, status)
    }

    pub fn mark_used(
        &self,
        item_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        inventory_repo::mark_used(&self.db, item_id, user_id, now)
    }

    pub fn sweep(&self, now: DateTime<Utc>, nearing_days: u32) -> Result<SweepReport, DatabaseError> {
        inventory_repo::sweep(&self.db, now, nearing_days)
    }

    pub fn inventory_stats(&self, user_id: &str) -> Result<InventoryStats, DatabaseError> {
        inventory_repo::stats(&self.db, user_id)
    }
}

impl ReceiptStore for SqliteStore {
    fn load_receipt(&self, id: &str) -> Result<Option<Receipt>, DatabaseError> {
        receipt_repo::find_by_id(&self.db, id)
    }

    fn save_receipt_status(
        &self,
        id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
        error: Option<&str>,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        receipt_repo::transition(&self.db, id, from, to, error, processed_at)
    }

    fn save_ocr_text(
        &self,
        id: &str,
        text: &str,
        confidence: f32,
        header: &ReceiptHeader,
    ) -> Result<(), DatabaseError> {
        receipt_repo::save_ocr_text(&self.db, id, text, confidence, header)
    }

    fn receipts_in_status(&self, status: ProcessingStatus) -> Result<Vec<Receipt>, DatabaseError> {
        receipt_repo::find_by_status(&self.db, status)
    }

    fn complete_receipt(
        &self,
        id: &str,
        items: &[InventoryItem],
        replace_existing: bool,
        processed_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.db.with_transaction(|tx| {
            if replace_existing {
                let removed = inventory_repo::delete_for_receipt_on(tx, id)?;
                if removed > 0 {
                    log::debug!("Replacing {} items of receipt {}", removed, id);
                }
            }
            inventory_repo::insert_on(tx, items)?;
            receipt_repo::transition_on(
                tx,
                id,
                ProcessingStatus::Processing,
                ProcessingStatus::Completed,
                None,
                Some(processed_at),
            )
        })
    }
}

impl InventoryStore for SqliteStore {
    fn save_inventory_items(&self, items: &[InventoryItem]) -> Result<(), DatabaseError> {
        inventory_repo::insert_all(&self.db, items)
    }

    fn replace_inventory_items(
        &self,
        receipt_id: &str,
        items: &[InventoryItem],
    ) -> Result<(), DatabaseError> {
        inventory_repo::replace_for_receipt(&self.db, receipt_id, items)
    }

    fn inventory_for_receipt(&self, receipt_id: &str) -> Result<Vec<InventoryItem>, DatabaseError> {
        inventory_repo::list_for_receipt(&self.db, receipt_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::FoodCategory;
    use crate::inventory::ItemSource;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
    }

    fn store() -> SqliteStore {
        SqliteStore::new(Database::open_in_memory().unwrap())
    }

    fn item(receipt: &Receipt, name: &str) -> InventoryItem {
        InventoryItem {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: receipt.user_id.clone(),
            receipt_id: Some(receipt.id.clone()),
            name: name.into(),
            category: FoodCategory::Pantry,
            brand: None,
            quantity: 1.0,
            unit: "item".into(),
            purchase_price: None,
            purchase_date: now(),
            store_name: None,
            predicted_expiry_date: now() + Duration::days(365),
            confidence_score: 0.5,
            expiry_confidence: 0.7,
            status: ItemStatus::Fresh,
            source: ItemSource::Receipt,
            created_at: now(),
            last_updated: now(),
        }
    }

    fn processing(store: &SqliteStore) -> Receipt {
        let receipt = store
            .create_receipt(NewReceipt::new("u1", "/nonexistent/r.jpg"), now())
            .unwrap();
        store
            .save_receipt_status(
                &receipt.id,
                ProcessingStatus::Pending,
                ProcessingStatus::Processing,
                None,
                None,
            )
            .unwrap();
        receipt
    }

    #[test]
    fn test_complete_receipt_is_atomic() {
        let store = store();
        let receipt = processing(&store);
        store
            .complete_receipt(&receipt.id, &[item(&receipt, "rice")], true, now())
            .unwrap();

        // Second completion fails the status check and must not add items.
        let err = store
            .complete_receipt(&receipt.id, &[item(&receipt, "pasta")], false, now())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::StaleStatus { .. }));

        let items = store.inventory_for_receipt(&receipt.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "rice");

        let loaded = store.load_receipt(&receipt.id).unwrap().unwrap();
        assert_eq!(loaded.processing_status, ProcessingStatus::Completed);
        assert_eq!(loaded.processed_at, Some(now()));
    }

    #[test]
    fn test_delete_receipt_removes_items_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("receipt.jpg");
        std::fs::write(&image, b"jpeg").unwrap();

        let store = store();
        let receipt = store
            .create_receipt(NewReceipt::new("u1", &image), now())
            .unwrap();
        store
            .save_inventory_items(&[item(&receipt, "rice")])
            .unwrap();

        assert!(store.delete_receipt(&receipt.id, "u1").unwrap());
        assert!(!image.exists());
        assert!(store.inventory_for_receipt(&receipt.id).unwrap().is_empty());
        assert!(!store.delete_receipt(&receipt.id, "u1").unwrap());
    }

    #[test]
    fn test_delete_receipt_tolerates_missing_file() {
        let store = store();
        let receipt = processing(&store);
        assert!(store.delete_receipt(&receipt.id, "u1").unwrap());
    }
}
