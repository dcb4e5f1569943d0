use thiserror::Error;

use pricewatch_core::ProductId;

/// Observation store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt observation row: {0}")]
    Corrupt(String),
}

/// Product registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("product not found: {0}")]
    NotFound(ProductId),

    #[error("product registry unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected product registry response: {0}")]
    Decode(String),
}
