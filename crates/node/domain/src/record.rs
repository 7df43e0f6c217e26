//! Balance records: an audit trail of value movements.

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Classification of a value movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Plain value transfer.
    Transfer,
    /// Value moved by a contract call.
    Contract,
    /// Endowment of a created contract.
    CreateContract,
    /// Gas fee.
    Fee,
    /// Token issuance.
    Issue,
}

/// Kind of a record endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    /// Account without code.
    Account,
    /// Contract account.
    Contract,
    /// UTXO output.
    Utxo,
    /// Private endpoint.
    Private,
    /// No endpoint.
    Empty,
}

/// One value movement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// Source.
    pub from: Address,
    /// Destination.
    pub to: Address,
    /// Source kind.
    pub from_type: AddressType,
    /// Destination kind.
    pub to_type: AddressType,
    /// Classification.
    pub kind: RecordKind,
    /// Token moved.
    pub token: Address,
    /// Amount moved.
    pub amount: U256,
}

impl BalanceRecord {
    /// Builds a record.
    pub const fn new(
        from: Address,
        to: Address,
        from_type: AddressType,
        to_type: AddressType,
        kind: RecordKind,
        token: Address,
        amount: U256,
    ) -> Self {
        Self { from, to, from_type, to_type, kind, token, amount }
    }
}

/// Records of one transaction with its envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBalanceRecords {
    /// Transaction hash.
    pub hash: B256,
    /// Transaction kind name.
    pub tx_type: String,
    /// Value movements in execution order.
    pub records: Vec<BalanceRecord>,
    /// Output payloads.
    pub payloads: Vec<Bytes>,
    /// Sender nonce.
    pub nonce: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price.
    pub gas_price: U256,
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Token moved.
    pub token: Address,
}

impl TxBalanceRecords {
    /// Returns `true` when no movement was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Records of one block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBalanceRecords {
    /// Block height.
    pub height: u64,
    /// Block hash.
    pub block_hash: B256,
    /// Block time.
    pub time: u64,
    /// Per-transaction records in block order.
    pub tx_records: Vec<TxBalanceRecords>,
}
