use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

const DEFAULT_UNIT: &str = "item";

/// Unit keyword patterns, checked in order. The first match names the unit.
const UNIT_PATTERNS: &[(&str, &str)] = &[
    ("lb", r"\b(?:lbs?|pounds?)\b"),
    ("oz", r"\b(?:oz|ounces?)\b"),
    ("kg", r"\b(?:kgs?|kilograms?)\b"),
    ("g", r"\b(?:g|grams?)\b"),
    ("ml", r"\b(?:ml|milliliters?)\b"),
    ("l", r"\b(?:l|liters?|litres?)\b"),
    ("gallon", r"\b(?:gal|gallons?)\b"),
    ("quart", r"\b(?:qt|quarts?)\b"),
    ("pint", r"\b(?:pt|pints?)\b"),
    ("pack", r"\b(?:pack|pkg)\b"),
    ("box", r"\b(?:box|package)\b"),
    ("bag", r"\bbags?\b"),
    ("can", r"\bcans?\b"),
    ("bottle", r"\bbottles?\b"),
];

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

static UNITS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    UNIT_PATTERNS
        .iter()
        .map(|(unit, pattern)| {
            let re = Regex::new(&format!("(?i){}", pattern)).unwrap();
            (*unit, re)
        })
        .collect()
});

/// Numeric amount and unit decoded from a quantity token such as `"2"`,
/// `"1.5 lb"` or `"3 cans"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quantity {
    pub amount: f64,
    pub unit: String,
}

impl Default for Quantity {
    fn default() -> Self {
        Self {
            amount: 1.0,
            unit: DEFAULT_UNIT.to_string(),
        }
    }
}

impl Quantity {
    /// Missing or unreadable parts fall back to `1` and `"item"`.
    pub fn parse(token: Option<&str>) -> Self {
        let Some(token) = token else {
            return Self::default();
        };

        let amount = NUMBER
            .find(token)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|a| *a > 0.0)
            .unwrap_or(1.0);

        Self {
            amount,
            unit: parse_unit(token).unwrap_or(DEFAULT_UNIT).to_string(),
        }
    }
}

/// Canonical unit named in `text`, if any.
pub fn parse_unit(text: &str) -> Option<&'static str> {
    UNITS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(unit, _)| *unit)
}
