//! Gas schedule of the stack machine.

use alloy_primitives::U256;

use crate::VmError;

pub(crate) const MEMORY_GAS: u64 = 3;
pub(crate) const QUAD_COEFF_DIV: u64 = 512;
pub(crate) const COPY_GAS: u64 = 3;
pub(crate) const SHA3_WORD_GAS: u64 = 6;
pub(crate) const LOG_TOPIC_GAS: u64 = 375;
pub(crate) const LOG_DATA_GAS: u64 = 8;
pub(crate) const SSTORE_SET_GAS: u64 = 20_000;
pub(crate) const SSTORE_RESET_GAS: u64 = 5_000;
pub(crate) const SSTORE_CLEAR_REFUND: u64 = 15_000;
pub(crate) const SELFDESTRUCT_REFUND: u64 = 24_000;
pub(crate) const CALL_VALUE_TRANSFER_GAS: u64 = 9_000;
pub(crate) const CALL_NEW_ACCOUNT_GAS: u64 = 25_000;
pub(crate) const ISSUE_GAS: u64 = 20_000;
pub(crate) const BLOCK_HASH_GAS: u64 = 20;

/// Dynamic opcode prices that changed between forks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasTable {
    /// `EXTCODESIZE` and `EXTCODEHASH`.
    pub ext_code_size: u64,
    /// `EXTCODECOPY` base.
    pub ext_code_copy: u64,
    /// `BALANCE` and `BALANCE_TOKEN`.
    pub balance: u64,
    /// `SLOAD`.
    pub sload: u64,
    /// Call family base.
    pub calls: u64,
    /// `SELFDESTRUCT` base.
    pub suicide: u64,
    /// Per significant byte of an `EXP` exponent.
    pub exp_byte: u64,
    /// `SELFDESTRUCT` to an account that does not exist yet.
    pub create_by_suicide: u64,
}

impl GasTable {
    /// Frontier prices.
    pub const FRONTIER: Self = Self {
        ext_code_size: 20,
        ext_code_copy: 20,
        balance: 20,
        sload: 50,
        calls: 40,
        suicide: 0,
        exp_byte: 10,
        create_by_suicide: 0,
    };

    /// Repriced IO opcodes with the all-but-one-64th call rule.
    pub const EIP150: Self = Self {
        ext_code_size: 700,
        ext_code_copy: 700,
        balance: 400,
        sload: 200,
        calls: 700,
        suicide: 5_000,
        exp_byte: 10,
        create_by_suicide: 25_000,
    };

    /// Whether forwarded call gas is capped at all but one 64th.
    pub const fn caps_call_gas(&self) -> bool {
        self.create_by_suicide > 0
    }
}

impl Default for GasTable {
    fn default() -> Self {
        Self::EIP150
    }
}

/// Number of 32-byte words covering `size` bytes.
pub(crate) const fn to_word_size(size: u64) -> u64 {
    if size > u64::MAX - 31 {
        return u64::MAX / 32 + 1;
    }
    (size + 31) / 32
}

/// Total cost of a memory of `words` words.
pub(crate) const fn memory_cost(words: u64) -> u64 {
    MEMORY_GAS * words + words * words / QUAD_COEFF_DIV
}

/// Cost of growing memory from `current` bytes to cover `new_size` bytes.
pub(crate) fn memory_expansion(current: usize, new_size: u64) -> Result<u64, VmError> {
    if new_size == 0 || new_size <= current as u64 {
        return Ok(0);
    }
    // Sizes past this bound cannot be paid for with a u64 gas counter.
    if new_size > 0x1f_ffff_ffe0 {
        return Err(VmError::GasUintOverflow);
    }
    let new_words = to_word_size(new_size);
    let old_words = to_word_size(current as u64);
    Ok(memory_cost(new_words) - memory_cost(old_words))
}

/// Per-word cost of copying `size` bytes.
pub(crate) fn copy_cost(size: u64, per_word: u64) -> Result<u64, VmError> {
    to_word_size(size).checked_mul(per_word).ok_or(VmError::GasUintOverflow)
}

/// Gas forwarded to a sub-call.
///
/// With the EIP-150 table the request is capped at all but one 64th of what is left
/// after paying `base`; without it the full request must be available.
pub(crate) fn call_gas(table: &GasTable, available: u64, base: u64, requested: U256) -> Result<u64, VmError> {
    if table.caps_call_gas() {
        let left = available.checked_sub(base).ok_or(VmError::OutOfGas)?;
        let cap = left - left / 64;
        if requested < U256::from(cap) {
            return Ok(requested.to::<u64>());
        }
        return Ok(cap);
    }
    if requested > U256::from(u64::MAX) {
        return Err(VmError::GasUintOverflow);
    }
    Ok(requested.to::<u64>())
}

/// Dynamic cost of `EXP` for `exponent`.
pub(crate) fn exp_cost(table: &GasTable, exponent: U256) -> u64 {
    let bytes = (exponent.bit_len() as u64).div_ceil(8);
    table.exp_byte * bytes
}
