//! Gas schedule constants and intrinsic gas.

/// Base gas of a transaction that does not create a contract.
pub const TX_GAS: u64 = 21_000;
/// Base gas of a contract creation transaction.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
/// Gas per zero byte of transaction data.
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Gas per non-zero byte of transaction data.
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;
/// Free gas given to a callee when value is transferred.
pub const CALL_STIPEND: u64 = 2_300;
/// Maximum size of deployed contract code.
pub const MAX_CODE_SIZE: usize = 24_576;
/// Gas per byte of deployed contract code.
pub const CREATE_DATA_GAS: u64 = 200;
/// Maximum call depth.
pub const CALL_CREATE_DEPTH: usize = 1_024;
/// Maximum stack size of the stack machine.
pub const STACK_LIMIT: usize = 1_024;

/// Computes the intrinsic gas of `data`.
///
/// The result is divided by `gas_rate` when it is non-zero and never drops below one.
/// Returns `None` if the computation overflows.
pub fn intrinsic_gas(data: &[u8], create: bool, gas_rate: u64) -> Option<u64> {
    let mut gas = if create { TX_GAS_CONTRACT_CREATION } else { TX_GAS };
    if !data.is_empty() {
        let non_zero = data.iter().filter(|b| **b != 0).count() as u64;
        let zero = data.len() as u64 - non_zero;
        gas = gas.checked_add(non_zero.checked_mul(TX_DATA_NON_ZERO_GAS)?)?;
        gas = gas.checked_add(zero.checked_mul(TX_DATA_ZERO_GAS)?)?;
    }
    if gas_rate > 0 {
        gas = (gas / gas_rate).max(1);
    }
    Some(gas)
}
