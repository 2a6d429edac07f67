//! Small food taxonomy used across integration tests
//!
//! Levels:
//! - 0: beverages, dairies, meals, plant-based-foods-and-beverages, ghost
//! - 1: hot-beverages, cheeses, soups, plant-based-foods
//! - 2: teas, coffees, vegetables, fruits, cheddar, tomato-soups
//! - 3: tomatoes, cucumbers, green-teas, black-teas, fr:infusions

use mealtax_ai::taxonomy::{LoadOptions, TaxonomyIndex};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FIXTURE_JSON: &str = r#"{
  "en:beverages": { "name": { "en": "Beverages", "ru": "Напитки" } },
  "en:dairies": { "name": { "en": "Dairies", "ru": "Молочные продукты" } },
  "en:meals": { "name": { "en": "Meals" } },
  "en:plant-based-foods-and-beverages": { "name": { "en": "Plant-based foods and beverages" } },
  "en:ghost": { "name": { "en": "Ghost" }, "parents": ["en:missing"] },

  "en:hot-beverages": { "name": { "en": "Hot beverages" }, "parents": ["en:beverages"] },
  "en:cheeses": { "name": { "en": "Cheeses", "ru": "Сыры" }, "parents": ["en:dairies"] },
  "en:soups": { "name": { "en": "Soups", "ru": "Супы" }, "parents": ["en:meals"] },
  "en:plant-based-foods": {
    "name": { "en": "Plant-based foods" },
    "parents": ["en:plant-based-foods-and-beverages"]
  },

  "en:teas": { "name": { "en": "Tea", "ru": "Чай", "fr": "Thé" }, "parents": ["en:hot-beverages"] },
  "en:coffees": { "name": { "en": "Coffees", "ru": "Кофе" }, "parents": ["en:hot-beverages"] },
  "en:vegetables": { "name": { "en": "Vegetables", "ru": "Овощи" }, "parents": ["en:plant-based-foods"] },
  "en:fruits": { "name": { "en": "Fruits", "ru": "Фрукты" }, "parents": ["en:plant-based-foods"] },
  "en:cheddar": { "name": { "en": "Cheddar" }, "parents": ["en:cheeses"] },
  "en:tomato-soups": {
    "name": { "en": "Tomato soups", "ru": "Томатные супы" },
    "parents": ["en:soups", "en:vegetables"]
  },

  "en:tomatoes": { "name": { "en": "Tomatoes", "ru": "Помидоры" }, "parents": ["en:vegetables", "en:fruits"] },
  "en:cucumbers": { "name": { "en": "Cucumbers", "ru": "Огурцы" }, "parents": ["en:vegetables"] },
  "en:green-teas": { "name": { "en": "Green teas", "ru": "Зелёный чай" }, "parents": ["en:teas"] },
  "en:black-teas": { "name": { "en": "Black teas" }, "parents": ["en:teas"] },
  "fr:infusions": { "name": { "fr": "Infusions", "de": "Kräutertees" }, "parents": ["en:teas"] }
}"#;

pub fn fixture_index() -> Arc<TaxonomyIndex> {
    Arc::new(TaxonomyIndex::from_json_str(FIXTURE_JSON, &LoadOptions::default()).unwrap())
}

/// Write the fixture into `dir` and return its path
pub fn write_fixture(dir: &Path) -> PathBuf {
    let path = dir.join("categories.json");
    std::fs::write(&path, FIXTURE_JSON).unwrap();
    path
}
