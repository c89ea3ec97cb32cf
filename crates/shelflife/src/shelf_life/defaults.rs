use crate::categorizer::FoodCategory;

use super::ShelfLifeEntry;

type Entries = &'static [(&'static str, ShelfLifeEntry)];

pub(super) const BUILTIN: &[(FoodCategory, Entries)] = &[
    (
        FoodCategory::Dairy,
        &[
            ("milk", ShelfLifeEntry::new(1, 7, 90)),
            ("yogurt", ShelfLifeEntry::new(1, 14, 60)),
            ("cheese", ShelfLifeEntry::new(1, 30, 180)),
            ("butter", ShelfLifeEntry::new(2, 60, 365)),
            ("cream", ShelfLifeEntry::new(1, 10, 90)),
        ],
    ),
    (
        FoodCategory::Meat,
        &[
            ("chicken", ShelfLifeEntry::new(0, 2, 365)),
            ("beef", ShelfLifeEntry::new(0, 3, 365)),
            ("pork", ShelfLifeEntry::new(0, 3, 180)),
            ("fish", ShelfLifeEntry::new(0, 2, 180)),
            ("ground meat", ShelfLifeEntry::new(0, 1, 120)),
        ],
    ),
    (
        FoodCategory::Vegetables,
        &[
            ("lettuce", ShelfLifeEntry::new(1, 7, 30)),
            ("spinach", ShelfLifeEntry::new(1, 5, 30)),
            ("carrots", ShelfLifeEntry::new(3, 30, 365)),
            ("potatoes", ShelfLifeEntry::new(30, 60, 365)),
            ("tomatoes", ShelfLifeEntry::new(7, 14, 90)),
            ("onions", ShelfLifeEntry::new(30, 60, 180)),
        ],
    ),
    (
        FoodCategory::Fruits,
        &[
            ("bananas", ShelfLifeEntry::new(5, 7, 180)),
            ("apples", ShelfLifeEntry::new(14, 60, 365)),
            ("oranges", ShelfLifeEntry::new(7, 30, 365)),
            ("berries", ShelfLifeEntry::new(1, 7, 365)),
            ("grapes", ShelfLifeEntry::new(3, 14, 365)),
        ],
    ),
    (
        FoodCategory::Bakery,
        &[
            ("bread", ShelfLifeEntry::new(3, 7, 90)),
            ("rolls", ShelfLifeEntry::new(2, 5, 90)),
            ("bagels", ShelfLifeEntry::new(3, 7, 180)),
            ("croissants", ShelfLifeEntry::new(1, 3, 60)),
        ],
    ),
    (
        FoodCategory::Pantry,
        &[
            ("pasta", ShelfLifeEntry::new(730, 730, 730)),
            ("rice", ShelfLifeEntry::new(1095, 1095, 1095)),
            ("beans", ShelfLifeEntry::new(365, 365, 365)),
            ("cereal", ShelfLifeEntry::new(180, 180, 180)),
            ("crackers", ShelfLifeEntry::new(90, 90, 90)),
        ],
    ),
];

/// Fallback shelf life when no table entry matches.
pub fn category_default(category: FoodCategory) -> ShelfLifeEntry {
    match category {
        FoodCategory::Dairy => ShelfLifeEntry::new(1, 7, 90),
        FoodCategory::Meat => ShelfLifeEntry::new(0, 2, 180),
        FoodCategory::Vegetables => ShelfLifeEntry::new(3, 14, 90),
        FoodCategory::Fruits => ShelfLifeEntry::new(5, 14, 180),
        FoodCategory::Bakery => ShelfLifeEntry::new(3, 7, 90),
        FoodCategory::Pantry => ShelfLifeEntry::new(365, 365, 365),
    }
}
