//! Error types for mealtax-ai

use crate::services::InferenceError;
use crate::taxonomy::TaxonomyError;
use thiserror::Error;

/// Classification run error
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Transport or service failure after retries
    #[error("Inference failed: {0}")]
    Inference(InferenceError),

    /// Reply was not the JSON shape the prompt asked for
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Persistence or audit write failed
    #[error("Storage error: {0}")]
    Storage(#[from] mealtax_common::Error),

    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] TaxonomyError),
}

impl From<InferenceError> for ClassifyError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::Contract(detail) => ClassifyError::Contract(detail),
            other => ClassifyError::Inference(other),
        }
    }
}

impl From<sqlx::Error> for ClassifyError {
    fn from(e: sqlx::Error) -> Self {
        ClassifyError::Storage(mealtax_common::Error::Database(e))
    }
}

/// Classification result type
pub type ClassifyResult<T> = Result<T, ClassifyError>;
