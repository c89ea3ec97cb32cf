//! Receipt repository: CRUD operations for the `receipts` table.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{format_timestamp, parse_date, parse_enum, parse_timestamp, Database, DatabaseError};
use crate::parser::ReceiptHeader;
use crate::receipt::{ProcessingStatus, Receipt};

/// A raw receipt row from the database.
#[derive(Debug, Clone)]
pub struct ReceiptRow {
    pub id: String,
    pub user_id: String,
    pub file_path: String,
    pub original_filename: Option<String>,
    pub store_name: Option<String>,
    pub receipt_date: Option<String>,
    pub total_amount: Option<f64>,
    pub currency: String,
    pub ocr_text: Option<String>,
    pub ocr_confidence: Option<f64>,
    pub processing_status: String,
    pub error: Option<String>,
    pub created_at: String,
    pub processed_at: Option<String>,
}

impl ReceiptRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            file_path: row.get("file_path")?,
            original_filename: row.get("original_filename")?,
            store_name: row.get("store_name")?,
            receipt_date: row.get("receipt_date")?,
            total_amount: row.get("total_amount")?,
            currency: row.get("currency")?,
            ocr_text: row.get("ocr_text")?,
            ocr_confidence: row.get("ocr_confidence")?,
            processing_status: row.get("processing_status")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            processed_at: row.get("processed_at")?,
        })
    }

    pub fn from_receipt(receipt: &Receipt) -> Self {
        Self {
            id: receipt.id.clone(),
            user_id: receipt.user_id.clone(),
            file_path: receipt.file_path.to_string_lossy().to_string(),
            original_filename: receipt.original_filename.clone(),
            store_name: receipt.store_name.clone(),
            receipt_date: receipt.receipt_date.map(|d| d.format("%Y-%m-%d").to_string()),
            total_amount: receipt.total_amount,
            currency: receipt.currency.clone(),
            ocr_text: receipt.ocr_text.clone(),
            ocr_confidence: receipt.ocr_confidence.map(f64::from),
            processing_status: receipt.processing_status.as_str().to_string(),
            error: receipt.error.clone(),
            created_at: format_timestamp(receipt.created_at),
            processed_at: receipt.processed_at.map(format_timestamp),
        }
    }

    pub fn into_receipt(self) -> Result<Receipt, DatabaseError> {
        Ok(Receipt {
            id: self.id,
            user_id: self.user_id,
            file_path: PathBuf::from(self.file_path),
            original_filename: self.original_filename,
            store_name: self.store_name,
            receipt_date: self
                .receipt_date
                .as_deref()
                .map(|d| parse_date("receipt_date", d))
                .transpose()?,
            total_amount: self.total_amount,
            currency: self.currency,
            ocr_text: self.ocr_text,
            ocr_confidence: self.ocr_confidence.map(|c| c as f32),
            processing_status: parse_enum("processing_status", &self.processing_status)?,
            error: self.error,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            processed_at: self
                .processed_at
                .as_deref()
                .map(|t| parse_timestamp("processed_at", t))
                .transpose()?,
        })
    }
}

/// Per-user receipt counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiptStats {
    pub total_receipts: u64,
    pub completed_receipts: u64,
    pub failed_receipts: u64,
    pub pending_receipts: u64,
    pub total_spending: f64,
}

/// Inserts a new receipt row.
pub fn insert(db: &Database, receipt: &Receipt) -> Result<(), DatabaseError> {
    let row = ReceiptRow::from_receipt(receipt);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO receipts (id, user_id, file_path, original_filename, store_name,
             receipt_date, total_amount, currency, ocr_text, ocr_confidence, processing_status,
             error, created_at, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                row.id,
                row.user_id,
                row.file_path,
                row.original_filename,
                row.store_name,
                row.receipt_date,
                row.total_amount,
                row.currency,
                row.ocr_text,
                row.ocr_confidence,
                row.processing_status,
                row.error,
                row.created_at,
                row.processed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a receipt by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Receipt>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM receipts WHERE id = ?1",
                params![id],
                ReceiptRow::from_row,
            )
            .optional()?;
        row.map(ReceiptRow::into_receipt).transpose()
    })
}

/// Lists a user's receipts, newest first, returning (receipts, total_count).
pub fn list_for_user(
    db: &Database,
    user_id: &str,
    limit: u64,
    offset: u64,
) -> Result<(Vec<Receipt>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM receipts WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT * FROM receipts WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(
                params![user_id, limit as i64, offset as i64],
                ReceiptRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let receipts = rows
            .into_iter()
            .map(ReceiptRow::into_receipt)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((receipts, total as u64))
    })
}

/// Receipts currently in the given status.
pub fn find_by_status(
    db: &Database,
    status: ProcessingStatus,
) -> Result<Vec<Receipt>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM receipts WHERE processing_status = ?1 ORDER BY rowid")?;
        let rows = stmt
            .query_map(params![status.as_str()], ReceiptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    })
}

/// Moves a receipt from `from` to `to`, failing with `StaleStatus` when the
/// stored status is not `from`.
pub fn transition(
    db: &Database,
    id: &str,
    from: ProcessingStatus,
    to: ProcessingStatus,
    error: Option<&str>,
    processed_at: Option<DateTime<Utc>>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| transition_on(conn, id, from, to, error, processed_at))
}

pub(crate) fn transition_on(
    conn: &Connection,
    id: &str,
    from: ProcessingStatus,
    to: ProcessingStatus,
    error: Option<&str>,
    processed_at: Option<DateTime<Utc>>,
) -> Result<(), DatabaseError> {
    if !from.can_transition_to(to) {
        return Err(DatabaseError::IllegalTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }

    let changed = conn.execute(
        "UPDATE receipts SET processing_status = ?3, error = ?4, processed_at = ?5
         WHERE id = ?1 AND processing_status = ?2",
        params![
            id,
            from.as_str(),
            to.as_str(),
            error,
            processed_at.map(format_timestamp),
        ],
    )?;

    if changed == 1 {
        return Ok(());
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM receipts WHERE id = ?1)",
        params![id],
        |r| r.get(0),
    )?;
    if exists {
        Err(DatabaseError::StaleStatus {
            id: id.to_string(),
            expected: from.as_str().to_string(),
        })
    } else {
        Err(DatabaseError::NotFound { id: id.to_string() })
    }
}

/// Stores OCR output. Header facts only fill fields the uploader left empty.
pub fn save_ocr_text(
    db: &Database,
    id: &str,
    text: &str,
    confidence: f32,
    header: &ReceiptHeader,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE receipts SET ocr_text = ?2, ocr_confidence = ?3,
             store_name = COALESCE(store_name, ?4),
             receipt_date = COALESCE(receipt_date, ?5),
             total_amount = COALESCE(total_amount, ?6)
             WHERE id = ?1",
            params![
                id,
                text,
                f64::from(confidence),
                header.store_name,
                header.date.map(|d| d.format("%Y-%m-%d").to_string()),
                header.total,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { id: id.to_string() });
        }
        Ok(())
    })
}

/// Deletes a user's receipt. Inventory items go with it via the foreign
/// key cascade. Returns the deleted receipt, or `None` if it was not found.
pub fn delete(db: &Database, id: &str, user_id: &str) -> Result<Option<Receipt>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM receipts WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                ReceiptRow::from_row,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        conn.execute(
            "DELETE FROM receipts WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        row.into_receipt().map(Some)
    })
}

pub fn stats(db: &Database, user_id: &str) -> Result<ReceiptStats, DatabaseError> {
    db.with_conn(|conn| {
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN processing_status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN processing_status = 'failed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN processing_status IN ('pending', 'processing') THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(total_amount), 0.0)
             FROM receipts WHERE user_id = ?1",
            params![user_id],
            |r| {
                Ok(ReceiptStats {
                    total_receipts: r.get::<_, i64>(0)? as u64,
                    completed_receipts: r.get::<_, i64>(1)? as u64,
                    failed_receipts: r.get::<_, i64>(2)? as u64,
                    pending_receipts: r.get::<_, i64>(3)? as u64,
                    total_spending: r.get(4)?,
                })
            },
        )?;
        Ok(stats)
    })
}
