//! # mealtax Common Library
//!
//! Shared code for the mealtax crates including:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - SQLite schema initialization
//! - Audit event types and the in-process event bus

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod uuid_utils;

pub use error::{Error, Result};
