//! UTXO fee requirements.

use alloy_primitives::U256;
use hyla_domain::{UtxoKind, UtxoTx};
use hyla_primitives::{PAR_GAS_PRICE, cal_new_amount_gas};

/// Gas a UTXO transaction must buy with its fee.
///
/// Covers the value leaving the account input, value credited to accounts out of spent
/// outputs, and `utxo_fee` when spent outputs fund new ones.
pub fn required_utxo_gas(tx: &UtxoTx, utxo_fee: u64) -> u64 {
    let kind = tx.kind();
    let mut gas = 0u64;
    if let Some((_, amount)) = tx.account_input()
        && tx.is_native()
        && amount > tx.fee
    {
        gas = gas.saturating_add(cal_new_amount_gas(amount - tx.fee));
    }
    if kind.contains(UtxoKind::UIN) {
        let account_out = tx.account_output_amount();
        if !account_out.is_zero() {
            gas = gas.saturating_add(cal_new_amount_gas(account_out));
        }
        if kind.contains(UtxoKind::UOUT) {
            gas = gas.saturating_add(utxo_fee);
        }
    }
    gas
}

/// Native fee a UTXO transaction must carry.
pub fn required_utxo_fee(tx: &UtxoTx, utxo_fee: u64) -> U256 {
    U256::from(required_utxo_gas(tx, utxo_fee)) * U256::from(PAR_GAS_PRICE)
}
