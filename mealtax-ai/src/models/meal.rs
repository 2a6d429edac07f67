//! Stored meal notes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Languages the prompts and summaries are written for
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["en", "ru"];

/// Map any language tag onto a supported one, defaulting to English
pub fn normalize_language(lang: &str) -> &'static str {
    let lang = lang.trim().to_lowercase();
    let primary = lang.split(['-', '_']).next().unwrap_or("");
    SUPPORTED_LANGUAGES
        .iter()
        .copied()
        .find(|supported| *supported == primary)
        .unwrap_or("en")
}

/// A logged meal note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub id: String,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
    pub notes_text: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl Meal {
    /// New meal with a fresh id, occurring now
    pub fn new(user_id: impl Into<String>, notes_text: impl Into<String>, language: &str) -> Self {
        let now = Utc::now();
        Self {
            id: mealtax_common::uuid_utils::generate_string(),
            user_id: user_id.into(),
            occurred_at: now,
            notes_text: notes_text.into(),
            language: normalize_language(language).to_string(),
            created_at: now,
        }
    }
}
