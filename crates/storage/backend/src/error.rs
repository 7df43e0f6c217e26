//! Error types for the backend.

use hyla_traits::StoreError;
use thiserror::Error;

/// Error type for backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Stored bytes do not decode.
    #[error("decode error: {0}")]
    Decode(#[from] commonware_codec::Error),

    /// Stored JSON does not parse.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A key image is already spent.
    #[error("key image already spent: {0}")]
    KeyImageSpent(alloy_primitives::B256),
}
