//! Hierarchical food category index
//!
//! Loading, level computation, multilingual labels, fuzzy search and
//! level-aware candidate diversification.

pub mod diversify;
pub mod index;
pub mod shared;
pub mod similarity;
pub mod stats;

pub use diversify::{diversify_by_level, DiversifyOptions};
pub use index::{DisconnectedPolicy, LoadOptions, TaxonomyError, TaxonomyIndex, TaxonomyNode};
pub use stats::TaxonomyStats;

use serde::{Deserialize, Serialize};

/// A taxonomy node proposed as a match for an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCandidate {
    pub category_id: String,
    /// English-preferred display label
    pub label: String,
    /// Fuzzy match score, 0-100
    pub lexical_score: u8,
    pub level: u32,
    /// First few parent ids, for display
    pub parent_ids: Vec<String>,
}
