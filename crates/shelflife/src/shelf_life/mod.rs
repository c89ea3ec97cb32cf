//! Versioned shelf-life reference table.
//!
//! The table maps category -> food name -> days per storage location. It is
//! immutable once built: [`ShelfLifeTable::with_observation`] returns a new
//! version instead of mutating in place, so concurrent predictions holding an
//! `Arc<ShelfLifeTable>` always see a consistent snapshot.

mod defaults;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::categorizer::FoodCategory;
use crate::error::ConfigError;
use crate::predictor::normalize_name;

pub use defaults::category_default;

/// Where an item is kept after purchase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    Pantry,
    #[default]
    Refrigerator,
    Freezer,
}

impl StorageLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageLocation::Pantry => "pantry",
            StorageLocation::Refrigerator => "refrigerator",
            StorageLocation::Freezer => "freezer",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StorageLocation::Pantry => "Pantry",
            StorageLocation::Refrigerator => "Refrigerator",
            StorageLocation::Freezer => "Freezer",
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pantry" => Ok(StorageLocation::Pantry),
            "refrigerator" | "fridge" => Ok(StorageLocation::Refrigerator),
            "freezer" => Ok(StorageLocation::Freezer),
            other => Err(format!("unknown storage location '{}'", other)),
        }
    }
}

/// Expected shelf life of one food in days, per storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfLifeEntry {
    pub pantry_days: u32,
    pub refrigerator_days: u32,
    pub freezer_days: u32,
}

impl ShelfLifeEntry {
    pub const fn new(pantry_days: u32, refrigerator_days: u32, freezer_days: u32) -> Self {
        Self {
            pantry_days,
            refrigerator_days,
            freezer_days,
        }
    }

    pub fn days(&self, storage: StorageLocation) -> u32 {
        match storage {
            StorageLocation::Pantry => self.pantry_days,
            StorageLocation::Refrigerator => self.refrigerator_days,
            StorageLocation::Freezer => self.freezer_days,
        }
    }
}

/// How a shelf-life value was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMatch {
    /// The normalized name is a key of the category table.
    Exact,
    /// A key is a substring of the name, or the name a substring of a key.
    Partial,
    /// No entry matched; the per-category default was used.
    CategoryDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShelfLifeLookup {
    pub days: u32,
    pub matched: LookupMatch,
}

/// On-disk representation:
/// `{ "version": 2, "categories": { "dairy": [{ "name": "milk", "pantry_days": 1, ... }] } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableFile {
    #[serde(default)]
    version: u64,
    categories: HashMap<FoodCategory, Vec<NamedEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NamedEntry {
    name: String,
    #[serde(flatten)]
    entry: ShelfLifeEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShelfLifeTable {
    version: u64,
    // Entry order matters for partial matching; kept as inserted.
    categories: HashMap<FoodCategory, Vec<(String, ShelfLifeEntry)>>,
}

impl Default for ShelfLifeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ShelfLifeTable {
    /// The built-in reference dataset, version 1.
    pub fn builtin() -> Self {
        let categories = defaults::BUILTIN
            .iter()
            .map(|(category, entries)| {
                (
                    *category,
                    entries
                        .iter()
                        .map(|(name, entry)| (name.to_string(), *entry))
                        .collect(),
                )
            })
            .collect();

        Self {
            version: 1,
            categories,
        }
    }

    /// An empty table; every lookup falls through to the category defaults.
    pub fn empty() -> Self {
        Self {
            version: 0,
            categories: HashMap::new(),
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let file: TableFile = serde_json::from_str(content)?;
        let categories = file
            .categories
            .into_iter()
            .map(|(category, entries)| {
                (
                    category,
                    entries
                        .into_iter()
                        .map(|e| (e.name.trim().to_lowercase(), e.entry))
                        .collect(),
                )
            })
            .collect();

        Ok(Self {
            version: file.version,
            categories,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains_category(&self, category: FoodCategory) -> bool {
        self.categories.contains_key(&category)
    }

    pub fn entry(&self, category: FoodCategory, name: &str) -> Option<&ShelfLifeEntry> {
        self.categories
            .get(&category)
            .and_then(|entries| entries.iter().find(|(n, _)| n == name).map(|(_, e)| e))
    }

    pub fn is_exact_key(&self, category: FoodCategory, name: &str) -> bool {
        self.entry(category, name).is_some()
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves shelf life for an already-normalized name.
    ///
    /// Tries an exact key, then a substring match in either direction, then
    /// the fixed per-category default.
    pub fn lookup(
        &self,
        category: FoodCategory,
        normalized_name: &str,
        storage: StorageLocation,
    ) -> ShelfLifeLookup {
        if let Some(entries) = self.categories.get(&category) {
            if let Some((_, entry)) = entries.iter().find(|(n, _)| n == normalized_name) {
                return ShelfLifeLookup {
                    days: entry.days(storage),
                    matched: LookupMatch::Exact,
                };
            }

            // An empty name is a substring of every key; skip partial matching.
            if !normalized_name.is_empty() {
                let partial = entries.iter().find(|(n, _)| {
                    normalized_name.contains(n.as_str()) || n.contains(normalized_name)
                });
                if let Some((_, entry)) = partial {
                    return ShelfLifeLookup {
                        days: entry.days(storage),
                        matched: LookupMatch::Partial,
                    };
                }
            }
        }

        ShelfLifeLookup {
            days: category_default(category).days(storage),
            matched: LookupMatch::CategoryDefault,
        }
    }

    /// Folds a real-world observation into a new table version.
    ///
    /// `product_name` is normalized the same way predictions normalize item
    /// names, so "Organic Kefir" is recorded under `kefir`. New names get `pantry = refrigerator = actual_days` and
    /// `freezer = 3 * actual_days`. Known names average their refrigerator
    /// value with the observation.
    pub fn with_observation(
        &self,
        product_name: &str,
        category: FoodCategory,
        actual_days: u32,
    ) -> Self {
        let normalized = normalize_name(product_name);
        let mut next = self.clone();
        next.version = self.version + 1;

        let entries = next.categories.entry(category).or_default();
        match entries.iter_mut().find(|(n, _)| *n == normalized) {
            Some((_, entry)) => {
                let sum = u64::from(entry.refrigerator_days) + u64::from(actual_days);
                entry.refrigerator_days = (sum / 2) as u32;
            }
            None => entries.push((
                normalized,
                ShelfLifeEntry::new(actual_days, actual_days, actual_days.saturating_mul(3)),
            )),
        }

        next
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let file = TableFile {
            version: self.version,
            categories: self
                .categories
                .iter()
                .map(|(category, entries)| {
                    (
                        *category,
                        entries
                            .iter()
                            .map(|(name, entry)| NamedEntry {
                                name: name.clone(),
                                entry: *entry,
                            })
                            .collect(),
                    )
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file)
    }
}
