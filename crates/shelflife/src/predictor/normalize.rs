use std::sync::LazyLock;

use regex::Regex;

static DESCRIPTORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:organic|fresh|frozen|canned|whole|low fat|fat free|skim)\b|\b2%").unwrap()
});

static BRANDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:kraft|nestle|pepsi|coca cola|kellogs|general mills|unilever)\b").unwrap()
});

/// Lower-cases a product name and strips descriptors and well-known brand
/// words so it can be matched against shelf-life table keys.
///
/// Names without descriptors or brands only change in case and spacing.
pub fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let stripped = DESCRIPTORS.replace_all(&lower, " ");
    let stripped = BRANDS.replace_all(&stripped, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
