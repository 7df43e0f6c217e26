//! Election error types.

use hyla_state::StateError;
use thiserror::Error;

/// Errors raised while scoring or ranking candidates.
#[derive(Debug, Error)]
pub enum ElectionError {
    /// State access failed.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// A stored deposit does not fit the ranking arithmetic.
    #[error("deposit of {0} out of range")]
    DepositOutOfRange(alloy_primitives::Address),
}
