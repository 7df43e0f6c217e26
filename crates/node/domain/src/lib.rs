//! Transactions, blocks, receipts and other domain types for hyla.
#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod account;
pub use account::AccountTx;

mod block;
pub use block::{Block, BlockCfg, Commit, Evidence, Header, MAX_EVIDENCE, Vote};

mod candidate;
pub use candidate::{CalRate, CandidateInOrder, CandidateState, Coefficient, Validator, VoteRate};

mod contract;
pub use contract::{
    CONTRACT_TX_GAS, ContractCreateTx, ContractUpgradeTx, MAX_SIGNATURES, MULTI_SIGN_NONCE_ADDRESS,
    MultiSignAccountTx, SignerEntry, SignersInfo, ValidatorSign,
};

mod error;
pub use error::TxError;

mod events;
pub use events::{LedgerEvent, LedgerEvents};

mod genesis;
pub use genesis::{Genesis, GenesisAccount, GenesisError, GenesisValidator};

mod idents;
pub use idents::{BlockId, Idents, KeyImage, TxId};

mod receipt;
pub use receipt::{
    Log, MAX_LOG_DATA, MAX_LOGS, MAX_TOPICS, Receipt, block_bloom, logs_bloom, receipts_root,
};

mod record;
pub use record::{AddressType, BalanceRecord, BlockBalanceRecords, RecordKind, TxBalanceRecords};

mod signature;
pub use signature::{PubKey, TxSignature, address_of};

mod stealth;
pub use stealth::{
    OwnedOutput, StealthAddress, StealthKeys, amount_commitment, key_image, one_time_address,
};

mod tx;
pub use tx::{MAX_TX_BYTES, Transaction, TxCfg, TxKind};

mod utxo;
pub use utxo::{MAX_UTXO_ENTRIES, TxOutput, UtxoInput, UtxoKind, UtxoOutput, UtxoSpend, UtxoTx};
