//! Transaction and block outcome types.

use alloy_primitives::{Address, B256, Bloom, Bytes, U256};
use hyla_domain::{
    BalanceRecord, BlockBalanceRecords, BlockId, KeyImage, Log, MultiSignAccountTx, Receipt, UtxoOutput,
};
use hyla_election::CandidateList;
use hyla_vm::VmError;

/// Result of applying one transaction.
#[derive(Debug, Default)]
pub struct TransitionOutcome {
    /// Bytes returned by the last contract the transaction ran.
    pub output: Bytes,
    /// Gas charged to the transaction.
    pub gas_used: u64,
    /// Gas spent storing contract code.
    pub byte_code_gas: u64,
    /// Native fee paid.
    pub fee: U256,
    /// Contract created by the transaction.
    pub contract_address: Option<Address>,
    /// Transaction-local failure; the transaction's effects were reverted.
    pub vm_err: Option<VmError>,
    /// Value movements in execution order.
    pub records: Vec<BalanceRecord>,
    /// Call data sent to contracts.
    pub payloads: Vec<Bytes>,
}

impl TransitionOutcome {
    /// Whether the transaction succeeded.
    pub const fn is_success(&self) -> bool {
        self.vm_err.is_none()
    }
}

/// Deterministic result of processing a block.
#[derive(Clone, Debug, Default)]
pub struct ProcessResult {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub block_hash: BlockId,
    /// Receipts in transaction order.
    pub receipts: Vec<Receipt>,
    /// Logs of every transaction in emission order.
    pub logs: Vec<Log>,
    /// Total gas used.
    pub gas_used: u64,
    /// State root after the block.
    pub state_root: B256,
    /// Merkle root over the receipts.
    pub receipt_root: B256,
    /// Union of the receipt blooms.
    pub logs_bloom: Bloom,
    /// Signer set updates carried by the block.
    pub specials: Vec<MultiSignAccountTx>,
    /// New stealth outputs in transaction order.
    pub utxo_outputs: Vec<UtxoOutput>,
    /// Key images spent by the block in transaction order.
    pub key_images: Vec<KeyImage>,
    /// Candidate list after the block's evidence.
    pub candidates: CandidateList,
    /// Value movements, when balance records are enabled.
    pub balance_records: Option<BlockBalanceRecords>,
}

impl ProcessResult {
    /// Whether the header fields computed for the block match `gas_used`, `state_root`
    /// and `receipt_root`.
    pub fn matches(&self, gas_used: u64, state_root: &B256, receipt_root: &B256) -> bool {
        self.gas_used == gas_used && self.state_root == *state_root && self.receipt_root == *receipt_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_outcome_is_success() {
        let outcome = TransitionOutcome::default();
        assert!(outcome.is_success());
        assert_eq!(outcome.gas_used, 0);
    }

    #[test]
    fn failed_outcome() {
        let outcome = TransitionOutcome { vm_err: Some(VmError::OutOfGas), ..Default::default() };
        assert!(!outcome.is_success());
    }

    #[test]
    fn result_matches_header_fields() {
        let result = ProcessResult {
            gas_used: 21_000,
            state_root: B256::repeat_byte(1),
            receipt_root: B256::repeat_byte(2),
            ..Default::default()
        };
        assert!(result.matches(21_000, &B256::repeat_byte(1), &B256::repeat_byte(2)));
        assert!(!result.matches(21_001, &B256::repeat_byte(1), &B256::repeat_byte(2)));
        assert!(!result.matches(21_000, &B256::ZERO, &B256::repeat_byte(2)));
    }
}
