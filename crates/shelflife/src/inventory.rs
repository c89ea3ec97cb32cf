//! Inventory records produced from receipts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::categorizer::FoodCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Fresh,
    Nearing,
    Expired,
    Used,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Fresh => "fresh",
            ItemStatus::Nearing => "nearing",
            ItemStatus::Expired => "expired",
            ItemStatus::Used => "used",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fresh" => Ok(ItemStatus::Fresh),
            "nearing" => Ok(ItemStatus::Nearing),
            "expired" => Ok(ItemStatus::Expired),
            "used" => Ok(ItemStatus::Used),
            other => Err(format!("unknown item status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    Receipt,
    Photo,
    Manual,
}

impl ItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemSource::Receipt => "receipt",
            ItemSource::Photo => "photo",
            ItemSource::Manual => "manual",
        }
    }
}

impl FromStr for ItemSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipt" => Ok(ItemSource::Receipt),
            "photo" => Ok(ItemSource::Photo),
            "manual" => Ok(ItemSource::Manual),
            other => Err(format!("unknown item source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub user_id: String,
    pub receipt_id: Option<String>,
    pub name: String,
    pub category: FoodCategory,
    pub brand: Option<String>,
    pub quantity: f64,
    pub unit: String,
    pub purchase_price: Option<f64>,
    pub purchase_date: DateTime<Utc>,
    pub store_name: Option<String>,
    pub predicted_expiry_date: DateTime<Utc>,
    /// How well the source line was read (parse confidence, 0-1).
    pub confidence_score: f32,
    /// How much the predicted expiry date can be trusted (0-1).
    pub expiry_confidence: f32,
    pub status: ItemStatus,
    pub source: ItemSource,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Status an unused item should have at `now`.
///
/// Past expiry is `expired`; expiring within `nearing_days` is `nearing`.
/// Used items never change.
pub fn status_at(
    current: ItemStatus,
    predicted_expiry: DateTime<Utc>,
    now: DateTime<Utc>,
    nearing_days: u32,
) -> ItemStatus {
    if current == ItemStatus::Used {
        return current;
    }
    if predicted_expiry < now {
        ItemStatus::Expired
    } else if now
        .checked_add_signed(Duration::days(i64::from(nearing_days)))
        .map_or(true, |limit| predicted_expiry <= limit)
    {
        ItemStatus::Nearing
    } else {
        current
    }
}

/// Counts of a user's items by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventoryStats {
    pub total_items: u64,
    pub fresh_items: u64,
    pub nearing_expiry: u64,
    pub expired_items: u64,
    pub used_items: u64,
    /// Sum of purchase prices of items not yet used.
    pub estimated_value: f64,
}
