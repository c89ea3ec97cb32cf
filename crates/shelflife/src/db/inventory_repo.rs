//! Inventory repository: operations on the `inventory_items` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::{format_timestamp, parse_enum, parse_timestamp, Database, DatabaseError};
use crate::inventory::{status_at, InventoryItem, InventoryStats, ItemStatus};

/// A raw inventory row from the database.
#[derive(Debug, Clone)]
pub struct ItemRow {
    pub id: String,
    pub user_id: String,
    pub receipt_id: Option<String>,
    pub name: String,
    pub category: String,
    pub brand: Option<String>,
    pub quantity: f64,
    pub unit: String,
    pub purchase_price: Option<f64>,
    pub purchase_date: String,
    pub store_name: Option<String>,
    pub predicted_expiry_date: String,
    pub confidence_score: f64,
    pub expiry_confidence: f64,
    pub status: String,
    pub source: String,
    pub created_at: String,
    pub last_updated: String,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            receipt_id: row.get("receipt_id")?,
            name: row.get("name")?,
            category: row.get("category")?,
            brand: row.get("brand")?,
            quantity: row.get("quantity")?,
            unit: row.get("unit")?,
            purchase_price: row.get("purchase_price")?,
            purchase_date: row.get("purchase_date")?,
            store_name: row.get("store_name")?,
            predicted_expiry_date: row.get("predicted_expiry_date")?,
            confidence_score: row.get("confidence_score")?,
            expiry_confidence: row.get("expiry_confidence")?,
            status: row.get("status")?,
            source: row.get("source")?,
            created_at: row.get("created_at")?,
            last_updated: row.get("last_updated")?,
        })
    }

    pub fn from_item(item: &InventoryItem) -> Self {
        Self {
            id: item.id.clone(),
            user_id: item.user_id.clone(),
            receipt_id: item.receipt_id.clone(),
            name: item.name.clone(),
            category: item.category.as_str().to_string(),
            brand: item.brand.clone(),
            quantity: item.quantity,
            unit: item.unit.clone(),
            purchase_price: item.purchase_price,
            purchase_date: format_timestamp(item.purchase_date),
            store_name: item.store_name.clone(),
            predicted_expiry_date: format_timestamp(item.predicted_expiry_date),
            confidence_score: f64::from(item.confidence_score),
            expiry_confidence: f64::from(item.expiry_confidence),
            status: item.status.as_str().to_string(),
            source: item.source.as_str().to_string(),
            created_at: format_timestamp(item.created_at),
            last_updated: format_timestamp(item.last_updated),
        }
    }

    pub fn into_item(self) -> Result<InventoryItem, DatabaseError> {
        Ok(InventoryItem {
            id: self.id,
            user_id: self.user_id,
            receipt_id: self.receipt_id,
            name: self.name,
            category: parse_enum("category", &self.category)?,
            brand: self.brand,
            quantity: self.quantity,
            unit: self.unit,
            purchase_price: self.purchase_price,
            purchase_date: parse_timestamp("purchase_date", &self.purchase_date)?,
            store_name: self.store_name,
            predicted_expiry_date: parse_timestamp(
                "predicted_expiry_date",
                &self.predicted_expiry_date,
            )?,
            confidence_score: self.confidence_score as f32,
            expiry_confidence: self.expiry_confidence as f32,
            status: parse_enum("status", &self.status)?,
            source: parse_enum("source", &self.source)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            last_updated: parse_timestamp("last_updated", &self.last_updated)?,
        })
    }
}

/// Counts of items moved by a status sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: u64,
    pub nearing: u64,
}

/// Inserts items on an existing connection or transaction.
pub(crate) fn insert_on(conn: &Connection, items: &[InventoryItem]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO inventory_items (id, user_id, receipt_id, name, category, brand, quantity,
         unit, purchase_price, purchase_date, store_name, predicted_expiry_date,
         confidence_score, expiry_confidence, status, source, created_at, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
    )?;

    for item in items {
        let row = ItemRow::from_item(item);
        stmt.execute(params![
            row.id,
            row.user_id,
            row.receipt_id,
            row.name,
            row.category,
            row.brand,
            row.quantity,
            row.unit,
            row.purchase_price,
            row.purchase_date,
            row.store_name,
            row.predicted_expiry_date,
            row.confidence_score,
            row.expiry_confidence,
            row.status,
            row.source,
            row.created_at,
            row.last_updated,
        ])?;
    }
    Ok(())
}

pub(crate) fn delete_for_receipt_on(
    conn: &Connection,
    receipt_id: &str,
) -> Result<usize, DatabaseError> {
    Ok(conn.execute(
        "DELETE FROM inventory_items WHERE receipt_id = ?1",
        params![receipt_id],
    )?)
}

/// Inserts items in a single transaction.
pub fn insert_all(db: &Database, items: &[InventoryItem]) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| insert_on(tx, items))
}

/// Deletes every item derived from `receipt_id` and inserts `items`, atomically.
pub fn replace_for_receipt(
    db: &Database,
    receipt_id: &str,
    items: &[InventoryItem],
) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        delete_for_receipt_on(tx, receipt_id)?;
        insert_on(tx, items)
    })
}

/// Items derived from a receipt, in creation order.
pub fn list_for_receipt(db: &Database, receipt_id: &str) -> Result<Vec<InventoryItem>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM inventory_items WHERE receipt_id = ?1 ORDER BY rowid")?;
        let rows = stmt
            .query_map(params![receipt_id], ItemRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ItemRow::into_item).collect()
    })
}

/// A user's items, soonest expiry first, optionally filtered by status.
pub fn list_for_user(
    db: &Database,
    user_id: &str,
    status: Option<ItemStatus>,
) -> Result<Vec<InventoryItem>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM inventory_items
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY predicted_expiry_date ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(
                params![user_id, status.map(|s| s.as_str())],
                ItemRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ItemRow::into_item).collect()
    })
}

/// Marks a user's item as used. Returns `false` if no such item exists.
pub fn mark_used(
    db: &Database,
    item_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE inventory_items SET status = 'used', last_updated = ?3
             WHERE id = ?1 AND user_id = ?2",
            params![item_id, user_id, format_timestamp(now)],
        )?;
        Ok(changed > 0)
    })
}

/// Re-evaluates `fresh` and `nearing` items against `now`.
pub fn sweep(
    db: &Database,
    now: DateTime<Utc>,
    nearing_days: u32,
) -> Result<SweepReport, DatabaseError> {
    db.with_transaction(|tx| {
        let candidates: Vec<(String, String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT id, status, predicted_expiry_date FROM inventory_items
                 WHERE status IN ('fresh', 'nearing')",
            )?;
            let rows = stmt
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut report = SweepReport::default();
        let stamp = format_timestamp(now);
        let mut update = tx.prepare(
            "UPDATE inventory_items SET status = ?2, last_updated = ?3 WHERE id = ?1",
        )?;

        for (id, status, expiry) in candidates {
            let current: ItemStatus = parse_enum("status", &status)?;
            let expiry = parse_timestamp("predicted_expiry_date", &expiry)?;
            let next = status_at(current, expiry, now, nearing_days);
            if next == current {
                continue;
            }
            update.execute(params![id, next.as_str(), stamp])?;
            match next {
                ItemStatus::Expired => report.expired += 1,
                ItemStatus::Nearing => report.nearing += 1,
                _ => {}
            }
        }

        log::info!(
            "Inventory sweep: {} expired, {} nearing expiry",
            report.expired,
            report.nearing
        );
        Ok(report)
    })
}

pub fn stats(db: &Database, user_id: &str) -> Result<InventoryStats, DatabaseError> {
    db.with_conn(|conn| {
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'fresh' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'nearing' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'expired' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'used' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status != 'used' THEN purchase_price ELSE 0 END), 0.0)
             FROM inventory_items WHERE user_id = ?1",
            params![user_id],
            |r| {
                Ok(InventoryStats {
                    total_items: r.get::<_, i64>(0)? as u64,
                    fresh_items: r.get::<_, i64>(1)? as u64,
                    nearing_expiry: r.get::<_, i64>(2)? as u64,
                    expired_items: r.get::<_, i64>(3)? as u64,
                    used_items: r.get::<_, i64>(4)? as u64,
                    estimated_value: r.get(5)?,
                })
            },
        )?;
        Ok(stats)
    })
}
