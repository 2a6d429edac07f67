//! Data models for meal classification

pub mod meal;
pub mod meal_item;

pub use meal::{normalize_language, Meal, SUPPORTED_LANGUAGES};
pub use meal_item::{ExtractedItem, ItemLinkResult, ItemType, LinkedCategory};
