//! Extracted items and their category links

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of food/drink mention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Dish,
    Ingredient,
    Drink,
    Product,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Dish => "dish",
            ItemType::Ingredient => "ingredient",
            ItemType::Drink => "drink",
            ItemType::Product => "product",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    /// Case-insensitive, whitespace-tolerant
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dish" => Ok(ItemType::Dish),
            "ingredient" => Ok(ItemType::Ingredient),
            "drink" => Ok(ItemType::Drink),
            "product" => Ok(ItemType::Product),
            other => Err(format!("unknown item type: {}", other)),
        }
    }
}

/// One food/drink mention within a meal note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub item_type: ItemType,
    /// Verbatim substring of the note
    pub text_span: String,
    /// Canonical name in the note's language
    pub normalized_primary: String,
    /// Canonical name in English, when the service supplied one
    pub normalized_secondary: Option<String>,
    pub modifiers: Vec<String>,
    /// Extraction confidence (0.0-1.0)
    pub confidence: f64,
}

impl ExtractedItem {
    /// Deduplication key: type plus case-insensitive primary name
    pub fn dedup_key(&self) -> (ItemType, String) {
        (self.item_type, self.normalized_primary.to_lowercase())
    }

    /// Distinct non-empty names to search the taxonomy with, primary first
    pub fn search_queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = Vec::with_capacity(2);
        let names = std::iter::once(self.normalized_primary.as_str())
            .chain(self.normalized_secondary.as_deref());
        for name in names {
            let trimmed = name.trim();
            if !trimmed.is_empty() && !queries.iter().any(|q| q == trimmed) {
                queries.push(trimmed.to_string());
            }
        }
        queries
    }
}

/// Outcome for one (item, category) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedCategory {
    pub category_id: String,
    pub label: String,
    /// Rerank confidence (0.0-1.0)
    pub score: f64,
    pub level: u32,
}

/// An item with its ranked categories (0-3 entries)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLinkResult {
    pub item: ExtractedItem,
    pub top3: Vec<LinkedCategory>,
    pub abstain: bool,
    pub abstain_reason: Option<String>,
}

impl ItemLinkResult {
    /// Build a result, enforcing that an abstained item carries no categories
    pub fn new(
        item: ExtractedItem,
        top3: Vec<LinkedCategory>,
        abstain: bool,
        abstain_reason: Option<String>,
    ) -> Self {
        let top3 = if abstain { Vec::new() } else { top3 };
        Self {
            item,
            top3,
            abstain,
            abstain_reason,
        }
    }

    /// Score of the first-ranked category, 0.0 when there is none
    pub fn top1_score(&self) -> f64 {
        self.top3.first().map(|c| c.score).unwrap_or(0.0)
    }
}
