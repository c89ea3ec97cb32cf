pub mod model;
pub mod normalize;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::categorizer::FoodCategory;
use crate::shelf_life::{LookupMatch, ShelfLifeTable, StorageLocation};

pub use model::{HeuristicModel, IdentityModel, ModelFeatures, ShelfLifeModel};
pub use normalize::normalize_name;

const BASE_CONFIDENCE: f32 = 0.5;
const KNOWN_CATEGORY_BONUS: f32 = 0.2;
const EXACT_NAME_BONUS: f32 = 0.3;
const BRAND_BONUS: f32 = 0.1;
const MODEL_BONUS: f32 = 0.2;

const PREMIUM_BRANDS: &[&str] = &["organic valley", "whole foods", "trader joe", "horizon"];
const PREMIUM_BRAND_FACTOR: f64 = 1.1;

/// Upper bound on any predicted shelf life, about a century. Table files
/// and models are not trusted to stay within calendar range.
pub const MAX_SHELF_LIFE_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct PredictionRequest<'a> {
    pub name: &'a str,
    pub category: FoodCategory,
    pub brand: Option<&'a str>,
    pub purchase_date: DateTime<Utc>,
    pub storage: StorageLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiryPrediction {
    pub predicted_expiry_date: DateTime<Utc>,
    pub confidence: f32,
    pub shelf_life_days: u32,
    pub factors: Vec<String>,
}

/// Predicts expiry from a versioned shelf-life table and an optional model.
///
/// The table is shared read-only; swapping in a newer table version means
/// building a new predictor, so in-flight predictions keep a consistent view.
#[derive(Clone)]
pub struct ExpiryPredictor {
    table: Arc<ShelfLifeTable>,
    model: Arc<dyn ShelfLifeModel>,
}

impl ExpiryPredictor {
    pub fn new(table: Arc<ShelfLifeTable>) -> Self {
        Self::with_model(table, Arc::new(IdentityModel))
    }

    pub fn with_model(table: Arc<ShelfLifeTable>, model: Arc<dyn ShelfLifeModel>) -> Self {
        Self { table, model }
    }

    pub fn table(&self) -> &Arc<ShelfLifeTable> {
        &self.table
    }

    pub fn table_version(&self) -> u64 {
        self.table.version()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn predict(&self, request: &PredictionRequest<'_>) -> ExpiryPrediction {
        let normalized = normalize_name(request.name);
        let lookup = self
            .table
            .lookup(request.category, &normalized, request.storage);

        let mut days = lookup.days;
        if self.model.is_informative() {
            let features = ModelFeatures {
                name: request.name,
                normalized_name: &normalized,
                category: request.category,
                brand: request.brand,
                storage: request.storage,
            };
            days = self.model.adjust(days, &features);
        }
        days = apply_brand_adjustment(days, request.brand).min(MAX_SHELF_LIFE_DAYS);

        let mut confidence = BASE_CONFIDENCE;
        if self.table.contains_category(request.category) {
            confidence += KNOWN_CATEGORY_BONUS;
        }
        if lookup.matched == LookupMatch::Exact {
            confidence += EXACT_NAME_BONUS;
        }
        if request.brand.is_some_and(|b| !b.trim().is_empty()) {
            confidence += BRAND_BONUS;
        }
        if self.model.is_informative() {
            confidence += MODEL_BONUS;
        }

        ExpiryPrediction {
            predicted_expiry_date: expiry_after(request.purchase_date, days),
            confidence: confidence.min(1.0),
            shelf_life_days: days,
            factors: factors(request),
        }
    }
}

/// Falls back to the latest representable instant when the purchase date
/// is itself near the end of the calendar.
fn expiry_after(purchase_date: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    purchase_date
        .checked_add_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn apply_brand_adjustment(days: u32, brand: Option<&str>) -> u32 {
    let Some(brand) = brand else {
        return days;
    };
    let brand = brand.to_lowercase();
    if PREMIUM_BRANDS.iter().any(|p| brand.contains(p)) {
        (f64::from(days) * PREMIUM_BRAND_FACTOR) as u32
    } else {
        days
    }
}

fn factors(request: &PredictionRequest<'_>) -> Vec<String> {
    let mut factors = vec![
        format!("Category: {}", request.category.title()),
        format!("Storage: {}", request.storage.title()),
    ];

    if let Some(brand) = request.brand.filter(|b| !b.trim().is_empty()) {
        factors.push(format!("Brand: {}", brand));
    }

    match request.storage {
        StorageLocation::Refrigerator => {
            factors.push("Refrigeration extends shelf life".to_string())
        }
        StorageLocation::Freezer => {
            factors.push("Freezing significantly extends shelf life".to_string())
        }
        StorageLocation::Pantry => {}
    }

    if request.name.to_lowercase().contains("organic") {
        factors.push("Organic products may have shorter shelf life".to_string());
    }

    factors
}
