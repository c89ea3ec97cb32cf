use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

static STORES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Walmart", r"(?i)\bwal[-\s]*mart\b"),
        ("Target", r"(?i)\btarget\b"),
        ("Kroger", r"(?i)\bkroger\b"),
        ("Safeway", r"(?i)\bsafeway\b"),
        ("Whole Foods", r"(?i)\bwhole\s*foods\b"),
        ("Trader Joe's", r"(?i)\btrader\s*joe"),
        ("Costco", r"(?i)\bcostco\b"),
        ("CVS", r"(?i)\bcvs\b"),
        ("Walgreens", r"(?i)\bwalgreens\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}[/-]\d{1,2}[/-]\d{1,2}|\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\b").unwrap()
});

static TOTALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\btotal[:\s]*\$?(\d+\.\d{2})",
        r"(?i)\bamount[:\s]*\$?(\d+\.\d{2})",
        r"(?i)\$(\d+\.\d{2})\s*(?:total|amount)\b",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Store-level facts read from the receipt text: merchant, date and total.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceiptHeader {
    pub store_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub raw_date: Option<String>,
    pub total: Option<f64>,
}

impl ReceiptHeader {
    pub fn extract(text: &str) -> Self {
        let store_name = STORES
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.to_string());

        let raw_date = DATE
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let date = raw_date.as_deref().and_then(parse_date);

        let total = TOTALS.iter().find_map(|re| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
        });

        Self {
            store_name,
            date,
            raw_date,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.store_name.is_none() && self.raw_date.is_none() && self.total.is_none()
    }
}

/// Year-first dates are ISO ordered; otherwise month-first (US receipts),
/// falling back to day-first when the month-first reading is impossible.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let normalized = raw.replace('-', "/");
    let first = normalized.split('/').next()?;
    let last = normalized.rsplit('/').next()?;

    let formats: &[&str] = match (first.len(), last.len()) {
        (4, _) => &["%Y/%m/%d"],
        (_, 4) => &["%m/%d/%Y", "%d/%m/%Y"],
        (_, 2) => &["%m/%d/%y", "%d/%m/%y"],
        _ => &[],
    };
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_store_date_and_total() {
        let text = "WAL-MART SUPERCENTER\n03/14/2026 14:22\nMILK 3.49\nSUBTOTAL 3.49\nTOTAL 3.71";
        let header = ReceiptHeader::extract(text);

        assert_eq!(header.store_name.as_deref(), Some("Walmart"));
        assert_eq!(header.raw_date.as_deref(), Some("03/14/2026"));
        assert_eq!(header.date, NaiveDate::from_ymd_opt(2026, 3, 14));
        assert_eq!(header.total, Some(3.71));
    }

    #[test]
    fn test_iso_date_and_dollar_total() {
        let header = ReceiptHeader::extract("Trader Joes #123\n2026-01-05\nTOTAL: $12.34");
        assert_eq!(header.store_name.as_deref(), Some("Trader Joe's"));
        assert_eq!(header.date, NaiveDate::from_ymd_opt(2026, 1, 5));
        assert_eq!(header.total, Some(12.34));
    }

    #[test]
    fn test_two_digit_year() {
        let header = ReceiptHeader::extract("KROGER 7/4/26");
        assert_eq!(header.date, NaiveDate::from_ymd_opt(2026, 7, 4));
    }

    #[test]
    fn test_day_first_fallback() {
        let header = ReceiptHeader::extract("25/12/2025");
        assert_eq!(header.date, NaiveDate::from_ymd_opt(2025, 12, 25));
    }

    #[test]
    fn test_three_digit_year_is_kept_raw_only() {
        let header = ReceiptHeader::extract("1/2/202");
        assert_eq!(header.raw_date.as_deref(), Some("1/2/202"));
        assert_eq!(header.date, None);
    }

    #[test]
    fn test_amount_fallback() {
        let header = ReceiptHeader::extract("AMOUNT 8.00");
        assert_eq!(header.total, Some(8.0));
    }

    #[test]
    fn test_nothing_found() {
        let header = ReceiptHeader::extract("BANANAS 1.99");
        assert!(header.is_empty());
        assert_eq!(header, ReceiptHeader::default());
    }
}
