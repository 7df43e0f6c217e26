//! Fee arithmetic for value transfers.
//!
//! Moving native value costs gas proportional to the number of whole coins moved,
//! so the fee is known before execution and independent of the recipient's code.

use alloy_primitives::U256;

/// Upper bound for any transaction gas limit.
pub const MAX_GAS_LIMIT: u64 = 5_000_000_000;

/// Lower bound charged for any native value transfer to an account.
pub const MIN_GAS_LIMIT: u64 = 500_000;

/// Gas charged per whole native coin moved.
pub const GAS_PER_COIN: u64 = 50_000;

/// Default gas price accepted from user transactions.
pub const GAS_PRICE: u64 = 100_000_000_000;

/// Gas price used for protocol-level fee arithmetic.
pub const PAR_GAS_PRICE: u64 = 100_000_000_000;

/// Base units in one native coin (10^18).
pub const COIN: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

fn coins_ceil(value: U256) -> U256 {
    let (coins, rem) = value.div_rem(COIN);
    if rem.is_zero() { coins } else { coins + U256::from(1) }
}

fn unit_gas(value: U256) -> u64 {
    let gas = coins_ceil(value).saturating_mul(U256::from(GAS_PER_COIN));
    if gas > U256::from(MAX_GAS_LIMIT) { MAX_GAS_LIMIT } else { gas.to::<u64>() }
}

/// Gas owed for transferring `value` native units to an account without code.
///
/// Clamped to `[MIN_GAS_LIMIT, MAX_GAS_LIMIT]`.
pub fn cal_new_amount_gas(value: U256) -> u64 {
    unit_gas(value).max(MIN_GAS_LIMIT)
}

/// Gas owed for transferring `value` native units into a contract.
///
/// Same unit price as [`cal_new_amount_gas`] without the lower clamp, since the
/// call itself already pays for execution.
pub fn cal_new_contract_amount_gas(value: U256) -> u64 {
    if value.is_zero() {
        return 0;
    }
    unit_gas(value)
}

/// Native fee for `gas` at `price`.
pub fn gas_fee(gas: u64, price: U256) -> U256 {
    U256::from(gas).saturating_mul(price)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn coins(n: u64) -> U256 {
        U256::from(n) * COIN
    }

    #[rstest]
    #[case::zero(U256::ZERO, MIN_GAS_LIMIT)]
    #[case::one_unit(U256::from(1), MIN_GAS_LIMIT)]
    #[case::ten_coins(coins(10), MIN_GAS_LIMIT)]
    #[case::hundred_coins(coins(100), 5_000_000)]
    #[case::partial_coin_rounds_up(coins(100) + U256::from(1), 5_050_000)]
    fn new_amount_gas(#[case] value: U256, #[case] expected: u64) {
        assert_eq!(cal_new_amount_gas(value), expected);
    }

    #[test]
    fn new_amount_gas_is_capped() {
        assert_eq!(cal_new_amount_gas(U256::MAX), MAX_GAS_LIMIT);
        assert_eq!(cal_new_contract_amount_gas(U256::MAX), MAX_GAS_LIMIT);
    }

    #[test]
    fn contract_amount_gas_has_no_floor() {
        assert_eq!(cal_new_contract_amount_gas(U256::ZERO), 0);
        assert_eq!(cal_new_contract_amount_gas(coins(1)), GAS_PER_COIN);
    }

    #[test]
    fn coin_constant() {
        assert_eq!(COIN, U256::from(10u64).pow(U256::from(18)));
    }

    #[test]
    fn gas_fee_multiplies() {
        assert_eq!(gas_fee(21_000, U256::from(PAR_GAS_PRICE)), U256::from(21_000u64 * PAR_GAS_PRICE));
    }
}
