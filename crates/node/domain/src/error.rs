//! Static validity errors for domain types.

use alloy_primitives::Address;
use thiserror::Error;

/// Errors raised while decoding, signing or statically checking transactions.
#[derive(Debug, Error)]
pub enum TxError {
    /// Transaction bytes could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] commonware_codec::Error),

    /// Encoded transaction exceeds the size limit.
    #[error("transaction too large: {size} > {max}")]
    TooLarge {
        /// Encoded size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// A signature did not recover to a public key.
    #[error("invalid signature")]
    InvalidSignature,

    /// A public key is not a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signing failed.
    #[error("signing failed")]
    Signing,

    /// Gas price differs from the protocol price.
    #[error("invalid gas price")]
    InvalidGasPrice,

    /// Gas limit is out of range.
    #[error("invalid gas limit: {0}")]
    InvalidGasLimit(u64),

    /// Plain transfers move only the native token.
    #[error("transfer must use the native token")]
    NonNativeTransfer,

    /// Transaction requires a recipient.
    #[error("missing recipient")]
    MissingRecipient,

    /// Token transfers must name a token.
    #[error("token transfer requires a token")]
    MissingToken,

    /// Contract creation or upgrade without code.
    #[error("empty contract code")]
    EmptyCode,

    /// UTXO transaction without inputs or outputs.
    #[error("utxo transaction requires inputs and outputs")]
    EmptyUtxo,

    /// More than one account input in a UTXO transaction.
    #[error("utxo transaction has more than one account input")]
    MultipleAccountInputs,

    /// Account input present without a transaction signature.
    #[error("account input requires a transaction signature")]
    MissingSignature,

    /// Non-native UTXO transactions require an account input to pay gas.
    #[error("non-native token requires an account input")]
    NonNativeWithoutAccount,

    /// Inputs and outputs do not balance.
    #[error("utxo value not conserved")]
    NotConserved,

    /// The revealed one-time key does not match the output address.
    #[error("one-time address mismatch at input {0}")]
    OneTimeAddressMismatch(usize),

    /// The revealed amount does not match the output commitment.
    #[error("commitment mismatch at input {0}")]
    CommitmentMismatch(usize),

    /// The key image is not derived from the revealed one-time key.
    #[error("key image mismatch at input {0}")]
    KeyImageMismatch(usize),

    /// The same key image appears twice in one transaction.
    #[error("duplicate key image in transaction")]
    DuplicateKeyImage,

    /// Signed power is below the required threshold.
    #[error("insufficient signer power: got {got}, needed {needed}")]
    InsufficientSignerPower {
        /// Power of valid signatures.
        got: i64,
        /// Required power.
        needed: i64,
    },

    /// A signature is from an address outside the authorized set.
    #[error("unknown signer {0}")]
    UnknownSigner(Address),

    /// A signer signed more than once.
    #[error("duplicate signer {0}")]
    DuplicateSigner(Address),

    /// No authorized signer set is configured.
    #[error("no authorized signers")]
    NoSigners,

    /// The sender's own signature is missing from a multi-signed transaction.
    #[error("sender {0} did not sign")]
    SenderNotSigned(Address),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_error_display() {
        let err = TxError::TooLarge { size: 10, max: 5 };
        assert_eq!(err.to_string(), "transaction too large: 10 > 5");

        let err = TxError::InsufficientSignerPower { got: 1, needed: 3 };
        assert_eq!(err.to_string(), "insufficient signer power: got 1, needed 3");

        let err = TxError::UnknownSigner(Address::ZERO);
        assert!(err.to_string().starts_with("unknown signer 0x"));
    }

    #[test]
    fn tx_error_from_codec() {
        let err: TxError = commonware_codec::Error::EndOfBuffer.into();
        assert!(matches!(err, TxError::Decode(_)));
    }

    #[test]
    fn tx_error_debug() {
        let err = TxError::InvalidSignature;
        assert!(format!("{err:?}").contains("InvalidSignature"));
    }

    #[test]
    fn tx_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TxError>();
    }
}
