use crate::categorizer::FoodCategory;
use crate::shelf_life::StorageLocation;

const ORGANIC_FACTOR: f64 = 0.8;
const PREMIUM_FACTOR: f64 = 1.2;
const PREMIUM_BRAND_MARKERS: &[&str] = &["premium", "high quality"];

/// Inputs a shelf-life model may use to adjust the table baseline.
#[derive(Debug, Clone)]
pub struct ModelFeatures<'a> {
    pub name: &'a str,
    pub normalized_name: &'a str,
    pub category: FoodCategory,
    pub brand: Option<&'a str>,
    pub storage: StorageLocation,
}

/// Learned or heuristic adjustment of a baseline shelf life.
pub trait ShelfLifeModel: Send + Sync {
    fn name(&self) -> &str;

    fn adjust(&self, base_days: u32, features: &ModelFeatures<'_>) -> u32;

    /// Whether predictions were actually informed by this model.
    fn is_informative(&self) -> bool {
        true
    }
}

/// No model: the baseline is returned unchanged.
#[derive(Debug, Default)]
pub struct IdentityModel;

impl ShelfLifeModel for IdentityModel {
    fn name(&self) -> &str {
        "identity"
    }

    fn adjust(&self, base_days: u32, _features: &ModelFeatures<'_>) -> u32 {
        base_days
    }

    fn is_informative(&self) -> bool {
        false
    }
}

/// Rule-of-thumb model: organic produce keeps for less time, premium
/// brands for longer.
#[derive(Debug, Default)]
pub struct HeuristicModel;

impl ShelfLifeModel for HeuristicModel {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn adjust(&self, base_days: u32, features: &ModelFeatures<'_>) -> u32 {
        if features.name.to_lowercase().contains("organic") {
            return ((f64::from(base_days) * ORGANIC_FACTOR) as u32).max(1);
        }

        let premium = features
            .brand
            .map(|b| b.trim().to_lowercase())
            .is_some_and(|b| PREMIUM_BRAND_MARKERS.contains(&b.as_str()));
        if premium {
            (f64::from(base_days) * PREMIUM_FACTOR) as u32
        } else {
            base_days
        }
    }
}
