//! Execution frame shared by both machines.

use alloy_primitives::{Address, B256, Bytes, U256};

use crate::VmError;

/// One contract activation.
#[derive(Debug)]
pub(crate) struct Frame {
    /// Account that initiated the call.
    pub(crate) caller: Address,
    /// Account whose storage and balance the code acts on.
    pub(crate) address: Address,
    /// Account the code was loaded from.
    pub(crate) code_address: Address,
    pub(crate) code: Bytes,
    pub(crate) code_hash: B256,
    pub(crate) input: Bytes,
    pub(crate) value: U256,
    /// Token `value` is denominated in, zero for the native token.
    pub(crate) token: Address,
    /// Gas left.
    pub(crate) gas: u64,
    /// Gas spent storing created code in nested creations.
    pub(crate) byte_code_gas: u64,
    /// Bytes handed back by `RETURN`/`REVERT` or the Wasm return host call.
    pub(crate) output: Bytes,
    /// Running creation code.
    pub(crate) create: bool,
}

impl Frame {
    pub(crate) fn new(caller: Address, address: Address, value: U256, gas: u64) -> Self {
        Self {
            caller,
            address,
            code_address: address,
            code: Bytes::new(),
            code_hash: B256::ZERO,
            input: Bytes::new(),
            value,
            token: Address::ZERO,
            gas,
            byte_code_gas: 0,
            output: Bytes::new(),
            create: false,
        }
    }

    /// Load the code to run and the account it comes from.
    pub(crate) fn with_code(mut self, code_address: Address, code_hash: B256, code: Bytes) -> Self {
        self.code_address = code_address;
        self.code_hash = code_hash;
        self.code = code;
        self
    }

    pub(crate) fn with_input(mut self, input: Bytes) -> Self {
        self.input = input;
        self
    }

    pub(crate) fn with_token(mut self, token: Address) -> Self {
        self.token = token;
        self
    }

    pub(crate) fn use_gas(&mut self, amount: u64) -> Result<(), VmError> {
        if self.gas < amount {
            self.gas = 0;
            return Err(VmError::OutOfGas);
        }
        self.gas -= amount;
        Ok(())
    }
}
