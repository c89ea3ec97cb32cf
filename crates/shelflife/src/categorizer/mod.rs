pub mod matcher;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use matcher::Categorizer;

/// Closed set of food categories assigned to receipt line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodCategory {
    Dairy,
    Meat,
    Vegetables,
    Fruits,
    Bakery,
    Pantry,
}

impl FoodCategory {
    pub const ALL: [FoodCategory; 6] = [
        FoodCategory::Dairy,
        FoodCategory::Meat,
        FoodCategory::Vegetables,
        FoodCategory::Fruits,
        FoodCategory::Bakery,
        FoodCategory::Pantry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FoodCategory::Dairy => "dairy",
            FoodCategory::Meat => "meat",
            FoodCategory::Vegetables => "vegetables",
            FoodCategory::Fruits => "fruits",
            FoodCategory::Bakery => "bakery",
            FoodCategory::Pantry => "pantry",
        }
    }

    /// Human-readable label, e.g. `"Dairy"`.
    pub fn title(&self) -> &'static str {
        match self {
            FoodCategory::Dairy => "Dairy",
            FoodCategory::Meat => "Meat",
            FoodCategory::Vegetables => "Vegetables",
            FoodCategory::Fruits => "Fruits",
            FoodCategory::Bakery => "Bakery",
            FoodCategory::Pantry => "Pantry",
        }
    }
}

impl fmt::Display for FoodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FoodCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        FoodCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| format!("unknown food category '{}'", s))
    }
}
