use super::FoodCategory;

/// Ordered category keyword table. The first category with a matching
/// keyword wins, so order here is the tie-break.
const CATEGORY_KEYWORDS: &[(FoodCategory, &[&str])] = &[
    (
        FoodCategory::Dairy,
        &["milk", "cheese", "yogurt", "butter", "cream"],
    ),
    (
        FoodCategory::Meat,
        &["chicken", "beef", "pork", "turkey", "fish", "salmon"],
    ),
    (
        FoodCategory::Vegetables,
        &["lettuce", "spinach", "carrot", "broccoli", "tomato"],
    ),
    (
        FoodCategory::Fruits,
        &["banana", "apple", "orange", "grape", "berry"],
    ),
    (
        FoodCategory::Bakery,
        &["bread", "roll", "bagel", "muffin", "cake"],
    ),
    (
        FoodCategory::Pantry,
        &["pasta", "rice", "bean", "cereal", "soup", "sauce"],
    ),
];

/// Assigns a food category to an item name by keyword substring match.
#[derive(Debug, Clone)]
pub struct Categorizer {
    table: Vec<(FoodCategory, Vec<String>)>,
    fallback: FoodCategory,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Categorizer {
    pub fn new() -> Self {
        let table = CATEGORY_KEYWORDS
            .iter()
            .map(|(category, keywords)| {
                (*category, keywords.iter().map(|k| k.to_string()).collect())
            })
            .collect();

        Self {
            table,
            fallback: FoodCategory::Pantry,
        }
    }

    /// Builds a categorizer over a custom ordered keyword table.
    /// Keywords are matched lower-cased.
    pub fn with_table(table: Vec<(FoodCategory, Vec<String>)>, fallback: FoodCategory) -> Self {
        let table = table
            .into_iter()
            .map(|(category, keywords)| {
                (
                    category,
                    keywords.into_iter().map(|k| k.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { table, fallback }
    }

    pub fn categorize(&self, name: &str) -> FoodCategory {
        let lower = name.to_lowercase();

        for (category, keywords) in &self.table {
            if keywords.iter().any(|k| lower.contains(k.as_str())) {
                return *category;
            }
        }

        self.fallback
    }
}
