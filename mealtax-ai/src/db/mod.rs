//! Database access for mealtax-ai
//!
//! The schema itself lives in `mealtax_common::db`; these modules read and
//! write the tables the classification pipeline owns.

pub mod audit;
pub mod meal_items;
pub mod meals;
pub mod settings;

pub use mealtax_common::db::init_database;
