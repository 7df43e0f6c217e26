//! Virtual machine error types.

use hyla_state::StateError;
use thiserror::Error;

/// Errors raised while executing contract code.
///
/// Every variant except [`VmError::State`] is local to the transaction: the call
/// reverts and the transaction still pays for gas. A state error means the store
/// failed underneath the machine and the block cannot be processed.
#[derive(Debug, Error)]
pub enum VmError {
    /// World state failure.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Gas exhausted.
    #[error("out of gas")]
    OutOfGas,

    /// Not enough gas left to store the created code.
    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,

    /// Call depth limit exceeded.
    #[error("max call depth exceeded")]
    Depth,

    /// Caller cannot cover the transferred value.
    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    /// Creator nonce is exhausted.
    #[error("nonce uint64 overflow")]
    NonceUintOverflow,

    /// Created address already holds code or a nonce.
    #[error("contract address collision")]
    ContractAddressCollision,

    /// Execution stopped by the `REVERT` opcode or host call.
    #[error("execution reverted")]
    Reverted,

    /// Returned code is larger than the maximum code size.
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,

    /// Jump to an invalid destination.
    #[error("invalid jump destination")]
    InvalidJump,

    /// State modification inside a static call.
    #[error("write protection")]
    WriteProtection,

    /// Return data read past its end.
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,

    /// Gas arithmetic overflowed.
    #[error("gas uint64 overflow")]
    GasUintOverflow,

    /// Not enough stack items.
    #[error("stack underflow ({have} <=> {need})")]
    StackUnderflow {
        /// Items on the stack.
        have: usize,
        /// Items required.
        need: usize,
    },

    /// Stack limit reached.
    #[error("stack limit reached {0}")]
    StackOverflow(usize),

    /// Undefined opcode.
    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Execution cancelled through the abort flag.
    #[error("execution interrupted")]
    Interrupted,

    /// No virtual machine is attached for the callee's code.
    #[error("no compatible virtual machine for code")]
    NoCompatibleVm,

    /// Precompiled contract rejected its input.
    #[error("precompile failed: {0}")]
    Precompile(&'static str),

    /// Wasm module could not be prepared or instantiated.
    #[error("invalid wasm module: {0}")]
    WasmModule(String),

    /// Wasm execution trapped.
    #[error("wasm trap: {0}")]
    WasmTrap(String),

    /// Wasm host function received malformed arguments.
    #[error("invalid host call arguments: {0}")]
    InvalidApiArgs(&'static str),

    /// Contract balance too low for a transfer requested by the contract itself.
    #[error("balance not enough")]
    BalanceNotEnough,
}

impl VmError {
    /// Returns `true` when the error must abort the whole block.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns `true` when the failing frame keeps its unused gas.
    pub const fn keeps_gas(&self) -> bool {
        matches!(self, Self::Reverted)
    }
}

impl wasmi::HostError for VmError {}

#[cfg(test)]
mod tests {
    use hyla_traits::StoreError;

    use super::*;

    #[test]
    fn state_error_is_fatal() {
        let err: VmError = StateError::Store(StoreError::Closed).into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("state error"));
        assert!(!VmError::OutOfGas.is_fatal());
    }

    #[test]
    fn only_revert_keeps_gas() {
        assert!(VmError::Reverted.keeps_gas());
        assert!(!VmError::OutOfGas.keeps_gas());
        assert!(!VmError::InvalidJump.keeps_gas());
    }

    #[test]
    fn display_strings() {
        assert_eq!(VmError::Depth.to_string(), "max call depth exceeded");
        assert_eq!(VmError::NonceUintOverflow.to_string(), "nonce uint64 overflow");
        assert_eq!(VmError::InvalidOpcode(0xfe).to_string(), "invalid opcode 0xfe");
        assert_eq!(
            VmError::StackUnderflow { have: 1, need: 2 }.to_string(),
            "stack underflow (1 <=> 2)"
        );
        assert_eq!(VmError::Precompile("bad point").to_string(), "precompile failed: bad point");
    }

    #[test]
    fn error_debug() {
        let debug = format!("{:?}", VmError::WriteProtection);
        assert!(debug.contains("WriteProtection"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VmError>();
    }
}
