//! The fixed demonstration corpus: a small menu of named items with
//! categories and prices. Seeded once per store, read-only afterwards; item
//! names double as the learning alphabet and categories as target concepts.

use crate::store::Item;

fn item(name: &str, category: &str, price: f64) -> Item {
    Item {
        name: name.to_string(),
        category: category.to_string(),
        price,
    }
}

/// The demo catalog. Several entries per category so that replay accuracy
/// numbers are not trivially 0 or 1.
pub fn demo_items() -> Vec<Item> {
    vec![
        item("Margherita Pizza", "pizza", 12.5),
        item("Pepperoni Pizza", "pizza", 14.0),
        item("Quattro Stagioni Pizza", "pizza", 15.5),
        item("Caesar Salad", "salad", 9.0),
        item("Greek Salad", "salad", 8.5),
        item("Tiramisu", "dessert", 6.5),
        item("Panna Cotta", "dessert", 6.0),
        item("Espresso", "drink", 2.5),
        item("Aranciata", "drink", 3.5),
    ]
}

/// Names of the items belonging to the given category.
pub fn category_members<'a>(items: &'a [Item], category: &str) -> Vec<&'a str> {
    let category = category.to_string();
    items
        .iter()
        .filter(move |item| item.category == category)
        .map(|item| item.name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_corpus_covers_the_scenario_items() {
        let items = demo_items();
        assert!(category_members(&items, "pizza").contains(&"Margherita Pizza"));
        assert!(category_members(&items, "salad").contains(&"Caesar Salad"));
        assert!(category_members(&items, "sushi").is_empty());
    }
}
