//! mealtax-ai library interface
//!
//! Taxonomy index, classification services and the meal pipeline. The
//! `mealtax-ai` binary is a thin CLI over these modules; integration tests
//! use them directly.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod taxonomy;
pub mod utils;
pub mod workflow;

pub use crate::error::{ClassifyError, ClassifyResult};
