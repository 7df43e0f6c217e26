//! Error types for key-value storage.

use thiserror::Error;

/// Error type for key-value store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend I/O failure.
    #[error("storage error: {0}")]
    Backend(String),

    /// Stored bytes do not decode.
    #[error("corrupt value under key {key}: {reason}")]
    Corrupt {
        /// Hex encoded key.
        key: String,
        /// Decode failure.
        reason: String,
    },

    /// The store has been closed.
    #[error("store closed")]
    Closed,
}

impl StoreError {
    /// Builds a [`StoreError::Corrupt`] for `key`.
    pub fn corrupt(key: &[u8], reason: impl ToString) -> Self {
        let key = key.iter().map(|b| format!("{b:02x}")).collect();
        Self::Corrupt { key, reason: reason.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_display() {
        let err = StoreError::Backend("disk full".to_string());
        assert_eq!(err.to_string(), "storage error: disk full");
    }

    #[test]
    fn corrupt_display_hex_encodes_key() {
        let err = StoreError::corrupt(&[0x68, 0x01], "short read");
        assert_eq!(err.to_string(), "corrupt value under key 6801: short read");
    }

    #[test]
    fn closed_display() {
        assert_eq!(StoreError::Closed.to_string(), "store closed");
    }

    #[test]
    fn error_debug_impl() {
        assert!(format!("{:?}", StoreError::Closed).contains("Closed"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
    }
}
