pub mod header;
pub mod quantity;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::categorizer::FoodCategory;

pub use header::ReceiptHeader;
pub use quantity::{parse_unit, Quantity};

/// Lines containing any of these (case-insensitive) are receipt chrome,
/// not purchased items.
///
/// Matching is by substring, so item names that embed a keyword are dropped
/// too: `CASHEWS` hits `cash`, `MEDJOOL DATES` hits `date`.
pub const NOISE_KEYWORDS: &[&str] = &[
    "receipt",
    "thank you",
    "total",
    "subtotal",
    "tax",
    "change",
    "cashier",
    "store",
    "phone",
    "address",
    "date",
    "time",
    "balance",
    "payment",
    "visa",
    "mastercard",
    "cash",
    "tender",
    "refund",
    "discount",
    "coupon",
    "save",
    "member",
    "rewards",
    "points",
    "expires",
    "valid",
];

const MIN_LINE_CHARS: usize = 3;
const NAME_ONLY_MIN_CHARS: usize = 4;

const QTY_NAME_PRICE_CONFIDENCE: f32 = 0.9;
const NAME_PRICE_CONFIDENCE: f32 = 0.8;
const NAME_ONLY_CONFIDENCE: f32 = 0.5;

static QTY_NAME_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(.+?)\s+\$?(\d+\.\d{2})$").unwrap());

static NAME_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+\$?(\d+\.\d{2})$").unwrap());

/// One candidate purchased item recovered from a line of receipt text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedLineItem {
    pub name: String,
    /// Raw quantity token as printed, e.g. `"2"`.
    pub quantity: Option<String>,
    pub unit: Option<String>,
    pub price: Option<f64>,
    pub category: Option<FoodCategory>,
    pub confidence: f32,
    pub raw_line: String,
}

impl ParsedLineItem {
    fn new(name: &str, quantity: Option<&str>, price: Option<f64>, confidence: f32, raw: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            quantity: quantity.map(str::to_string),
            unit: quantity.and_then(parse_unit).map(str::to_string),
            price,
            category: None,
            confidence,
            raw_line: raw.to_string(),
        }
    }

    pub fn decoded_quantity(&self) -> Quantity {
        Quantity::parse(self.quantity.as_deref())
    }
}

/// Recognizes item lines with three ordered patterns:
/// `<qty> <name> <price>`, then `<name> [$]<price>`, then a bare name.
#[derive(Debug, Clone)]
pub struct LineParser {
    noise_keywords: Vec<String>,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    pub fn new() -> Self {
        Self::with_noise_keywords(NOISE_KEYWORDS.iter().map(|k| k.to_string()).collect())
    }

    pub fn with_noise_keywords(keywords: Vec<String>) -> Self {
        Self {
            noise_keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Parses every line of `text` in order. Categories are left unset.
    pub fn parse(&self, text: &str) -> Vec<ParsedLineItem> {
        let _span = tracing::debug_span!("parser.lines").entered();

        let items: Vec<ParsedLineItem> = text.lines().filter_map(|l| self.parse_line(l)).collect();
        tracing::debug!(items = items.len(), "Parsed receipt lines");
        items
    }

    pub fn parse_line(&self, line: &str) -> Option<ParsedLineItem> {
        let line = line.trim();
        if line.chars().count() < MIN_LINE_CHARS || self.is_noise(line) {
            return None;
        }

        if let Some(caps) = QTY_NAME_PRICE.captures(line) {
            return Some(ParsedLineItem::new(
                &caps[2],
                Some(&caps[1]),
                caps[3].parse().ok(),
                QTY_NAME_PRICE_CONFIDENCE,
                line,
            ));
        }

        if let Some(caps) = NAME_PRICE.captures(line) {
            return Some(ParsedLineItem::new(
                &caps[1],
                None,
                caps[2].parse().ok(),
                NAME_PRICE_CONFIDENCE,
                line,
            ));
        }

        let has_letters = line.chars().any(char::is_alphabetic);
        if line.chars().count() >= NAME_ONLY_MIN_CHARS && has_letters {
            return Some(ParsedLineItem::new(line, None, None, NAME_ONLY_CONFIDENCE, line));
        }

        None
    }

    pub fn is_noise(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.noise_keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_name_price() {
        let item = LineParser::new().parse_line("2 BANANAS 1.99").unwrap();
        assert_eq!(item.name, "BANANAS");
        assert_eq!(item.quantity.as_deref(), Some("2"));
        assert_eq!(item.price, Some(1.99));
        assert_eq!(item.confidence, 0.9);
        assert_eq!(item.decoded_quantity().amount, 2.0);
        assert_eq!(item.decoded_quantity().unit, "item");
    }

    #[test]
    fn test_name_price_with_and_without_dollar() {
        let parser = LineParser::new();

        let item = parser.parse_line("WHOLE MILK 3.49").unwrap();
        assert_eq!(item.name, "WHOLE MILK");
        assert_eq!(item.price, Some(3.49));
        assert_eq!(item.quantity, None);
        assert_eq!(item.confidence, 0.8);

        let item = parser.parse_line("EGGS $4.29").unwrap();
        assert_eq!(item.name, "EGGS");
        assert_eq!(item.price, Some(4.29));
        assert_eq!(item.confidence, 0.8);
    }

    #[test]
    fn test_name_only_line() {
        let item = LineParser::new().parse_line("ROMAINE LETTUCE").unwrap();
        assert_eq!(item.name, "ROMAINE LETTUCE");
        assert_eq!(item.price, None);
        assert_eq!(item.confidence, 0.5);
    }

    #[test]
    fn test_noise_lines_are_skipped() {
        let parser = LineParser::new();
        assert!(parser.parse_line("TOTAL 12.34").is_none());
        assert!(parser.parse_line("SUBTOTAL 10.00").is_none());
        assert!(parser.parse_line("VISA ****1234").is_none());
        assert!(parser.parse_line("Thank You for shopping!").is_none());
        assert!(parser.parse_line("Cashier: Pat").is_none());
    }

    #[test]
    fn test_noise_substring_drops_lookalike_items() {
        let parser = LineParser::new();
        assert!(parser.parse_line("CASHEWS 4.99").is_none());
        assert!(parser.parse_line("MEDJOOL DATES 5.99").is_none());
        assert!(parser.parse_line("SAVEUR MAGAZINE 6.99").is_none());
        assert!(parser.parse_line("WALNUTS 4.99").is_some());
    }

    #[test]
    fn test_short_and_numeric_lines_are_skipped() {
        let parser = LineParser::new();
        assert!(parser.parse_line("ab").is_none());
        assert!(parser.parse_line("   ").is_none());
        assert!(parser.parse_line("12.99").is_none());
        assert!(parser.parse_line("0000123").is_none());
        assert!(parser.parse_line("ABC").is_none());
    }

    #[test]
    fn test_parse_keeps_line_order() {
        let text = "SAFEWAY\nTOTAL 12.34\nBREAD 2.50\nVISA ****1234\n2 APPLES 3.00";
        let items = LineParser::new().parse(text);
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["SAFEWAY", "BREAD", "APPLES"]);
        assert!(items.iter().all(|i| i.category.is_none()));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(LineParser::new().parse("").is_empty());
    }

    #[test]
    fn test_custom_noise_keywords() {
        let parser = LineParser::with_noise_keywords(vec!["BAGS".to_string()]);
        assert!(parser.parse_line("PLASTIC BAGS 0.10").is_none());
        assert!(parser.parse_line("TOTAL 12.34").is_some());
    }
}
