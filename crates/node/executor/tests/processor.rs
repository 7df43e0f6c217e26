//! Block processing scenarios over a fresh in-memory state.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use hyla_backend::{MemoryStore, UtxoStore};
use hyla_domain::{
    AccountTx, Block, Commit, Header, PubKey, RecordKind, StealthKeys, Transaction, TxKind, TxOutput, UtxoInput,
    UtxoTx,
};
use hyla_election::CandidateList;
use hyla_executor::{BlockExecutor, BlockProcessor, ExecutorConfig, ProcessError, ProcessResult};
use hyla_primitives::{COIN, MAX_GAS_LIMIT, PAR_GAS_PRICE, SystemContract, cal_new_amount_gas, gas_fee};
use hyla_state::WorldState;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rstest::rstest;

const BLOCK_GAS_LIMIT: u64 = 100 * MAX_GAS_LIMIT;
const COINBASE: Address = Address::repeat_byte(0xcc);
const RECEIVER: Address = Address::repeat_byte(0xbb);
const CONTRACT: Address = Address::repeat_byte(0xc0);

/// `SSTORE(0, CALLDATALOAD(0))`.
const STORE_RUNTIME: [u8; 7] = [0x60, 0x00, 0x35, 0x60, 0x00, 0x55, 0x00];

/// `PUSH1 0 PUSH1 0 REVERT`.
const REVERT_RUNTIME: [u8; 5] = [0x60, 0x00, 0x60, 0x00, 0xfd];

fn coins(n: u64) -> U256 {
    U256::from(n) * COIN
}

fn init_balance() -> U256 {
    U256::from(1u128 << 108)
}

fn price() -> U256 {
    U256::from(PAR_GAS_PRICE)
}

/// Stack code returning `payload`; doubles as init code deploying `payload`.
fn returning(payload: &[u8]) -> Bytes {
    let len = u8::try_from(payload.len()).unwrap();
    let mut code = vec![0x60, len, 0x60, 0x0c, 0x60, 0x00, 0x39, 0x60, len, 0x60, 0x00, 0xf3];
    code.extend_from_slice(payload);
    code.into()
}

/// Call data for `set(0)`.
fn set_zero() -> Bytes {
    let mut data = vec![0x60, 0xfe, 0x47, 0xb1];
    data.extend_from_slice(&[0u8; 32]);
    data.into()
}

struct Chain {
    state: WorldState,
    utxos: UtxoStore,
    processor: BlockProcessor,
    key: SigningKey,
    sender: Address,
}

impl Chain {
    fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    fn with_config(config: ExecutorConfig) -> Self {
        let db = Arc::new(MemoryStore::new());
        let key = SigningKey::random(&mut OsRng);
        let sender = PubKey::from_signing_key(&key).address().unwrap();
        let mut state = WorldState::new(db.clone());
        state.add_balance(sender, Address::ZERO, init_balance()).unwrap();
        let utxos = UtxoStore::new(db);
        let processor = BlockProcessor::new(config, Default::default(), utxos.clone());
        Self { state, utxos, processor, key, sender }
    }

    fn signed(&self, nonce: u64, to: Option<Address>, value: U256, gas_limit: u64, data: Bytes) -> Transaction {
        let mut tx = AccountTx::new(nonce, to, value, gas_limit, data);
        tx.sign(TxKind::Transfer, &self.key).unwrap();
        Transaction::Transfer(tx)
    }

    fn process(&mut self, txs: Vec<Transaction>) -> Result<ProcessResult, ProcessError> {
        let header = Header {
            height: 1,
            time: 1_700_000_000,
            gas_limit: BLOCK_GAS_LIMIT,
            coinbase: COINBASE,
            ..Default::default()
        };
        let block = Block::new(header, txs, Vec::new(), Commit::default());
        self.processor.process(&block, &mut self.state, CandidateList::default(), &[])
    }

    fn balance(&self, address: &Address) -> U256 {
        self.state.get_balance(address, &Address::ZERO).unwrap()
    }

    fn nonce(&self) -> u64 {
        self.state.get_nonce(&self.sender).unwrap()
    }
}

#[test]
fn account_to_account_transfer() {
    let mut chain = Chain::new();
    let amount = coins(100);
    let gas = cal_new_amount_gas(amount);
    let tx = chain.signed(0, Some(RECEIVER), amount, gas, Bytes::new());

    let result = chain.process(vec![tx]).unwrap();
    assert_eq!(chain.balance(&RECEIVER), amount);
    assert_eq!(chain.balance(&chain.sender), init_balance() - amount - gas_fee(gas, price()));
    assert_eq!(chain.nonce(), 1);
    assert_eq!(result.receipts.len(), 1);
    assert!(result.receipts[0].success);
    assert_eq!(result.gas_used, gas);
    assert!(result.utxo_outputs.is_empty());
    assert!(result.key_images.is_empty());
}

#[test]
fn contract_creation_charges_exact_gas() {
    let config = ExecutorConfig::default().with_test_mode(true);
    let code = returning(&STORE_RUNTIME);

    let mut dry = Chain::with_config(config.clone());
    let tx = dry.signed(0, None, U256::ZERO, 10_000_000, code.clone());
    let measured = dry.process(vec![tx]).unwrap().gas_used;

    let mut chain = Chain::with_config(config);
    let tx = chain.signed(0, None, U256::ZERO, measured, code);
    let result = chain.process(vec![tx]).unwrap();

    assert_eq!(result.receipts.len(), 1);
    let receipt = &result.receipts[0];
    assert!(receipt.success);
    let created = receipt.contract_address.unwrap();
    assert_eq!(chain.nonce(), 1);
    assert_eq!(chain.balance(&chain.sender), init_balance() - gas_fee(measured, price()));
    assert_eq!(chain.state.get_code(&created).unwrap(), Bytes::from_static(&STORE_RUNTIME));
}

#[rstest]
#[case::exact_gas(0, true)]
#[case::one_gas_short(1, false)]
fn contract_call_with_value(#[case] short: u64, #[case] success: bool) {
    let amount = coins(100);

    let mut dry = Chain::new();
    dry.state.set_code(CONTRACT, Bytes::from_static(&STORE_RUNTIME)).unwrap();
    let tx = dry.signed(0, Some(CONTRACT), amount, cal_new_amount_gas(amount) + 100_000, set_zero());
    let measured = dry.process(vec![tx]).unwrap().gas_used;

    let mut chain = Chain::new();
    chain.state.set_code(CONTRACT, Bytes::from_static(&STORE_RUNTIME)).unwrap();
    let tx = chain.signed(0, Some(CONTRACT), amount, measured - short, set_zero());
    let result = chain.process(vec![tx]).unwrap();

    assert_eq!(result.receipts.len(), 1);
    let receipt = &result.receipts[0];
    assert_eq!(receipt.success, success);
    assert_eq!(chain.nonce(), 1);
    let gas_cost = gas_fee(receipt.gas_used, price());
    if success {
        assert_eq!(receipt.gas_used, measured);
        assert_eq!(chain.balance(&CONTRACT), amount);
        assert_eq!(chain.balance(&chain.sender), init_balance() - amount - gas_cost);
    } else {
        assert!(receipt.gas_used < measured - short);
        assert_eq!(chain.balance(&CONTRACT), U256::ZERO);
        assert_eq!(chain.balance(&chain.sender), init_balance() - gas_cost);
    }
}

#[test]
fn account_split_into_two_utxos() {
    let mut chain = Chain::new();
    let alice = StealthKeys::random(&mut OsRng);
    let bob = StealthKeys::random(&mut OsRng);
    let ephemeral = SigningKey::random(&mut OsRng);
    let fee = coins(1);
    let first = coins(50);
    let second = coins(100) - fee - first;
    let (out_a, _) = alice.address().pay(&ephemeral, 0, first).unwrap();
    let (out_b, _) = bob.address().pay(&ephemeral, 1, second).unwrap();

    let mut tx = UtxoTx::new(
        Address::ZERO,
        vec![UtxoInput::Account { nonce: 0, amount: coins(100) }],
        vec![TxOutput::Utxo { amount: first, output: out_a }, TxOutput::Utxo { amount: second, output: out_b }],
        fee,
    );
    tx.sign_account(&chain.key).unwrap();

    let result = chain.process(vec![Transaction::Utxo(tx)]).unwrap();
    assert!(result.receipts[0].success);
    assert_eq!(result.utxo_outputs.len(), 2);
    assert_eq!(chain.nonce(), 1);
    assert_eq!(chain.balance(&chain.sender), init_balance() - coins(100));
    assert_eq!(alice.scan(&result.utxo_outputs[0], 0).unwrap().amount, first);
    assert_eq!(bob.scan(&result.utxo_outputs[1], 1).unwrap().amount, second);
    assert!(alice.scan(&result.utxo_outputs[1], 1).is_none());
}

#[test]
fn failed_account_funded_utxo_tx_drops_outputs() {
    let mut chain = Chain::new();
    chain.state.set_code(CONTRACT, Bytes::from_static(&REVERT_RUNTIME)).unwrap();
    let alice = StealthKeys::random(&mut OsRng);
    let ephemeral = SigningKey::random(&mut OsRng);
    let fee = coins(1);
    let kept = coins(100) - fee;
    let (output, _) = alice.address().pay(&ephemeral, 0, kept).unwrap();

    let mut tx = UtxoTx::new(
        Address::ZERO,
        vec![UtxoInput::Account { nonce: 0, amount: coins(100) }],
        vec![
            TxOutput::Account { to: CONTRACT, amount: U256::ZERO, data: Bytes::new() },
            TxOutput::Utxo { amount: kept, output },
        ],
        fee,
    );
    tx.sign_account(&chain.key).unwrap();

    let result = chain.process(vec![Transaction::Utxo(tx)]).unwrap();
    assert_eq!(result.receipts.len(), 1);
    assert!(!result.receipts[0].success);
    assert!(result.utxo_outputs.is_empty());
    assert_eq!(chain.nonce(), 1);
}

/// Stores one output of `amount` owned by `owner` and returns a transaction spending it into
/// `to_account` for the chain's sender plus change.
fn spend_stored_output(chain: &Chain, owner: &StealthKeys, amount: U256, to_account: U256, fee: U256) -> UtxoTx {
    let ephemeral = SigningKey::random(&mut OsRng);
    let (stored, _) = owner.address().pay(&ephemeral, 0, amount).unwrap();
    let index = chain.utxos.apply(std::slice::from_ref(&stored), &[]).unwrap();
    let owned = owner.scan(&stored, index).unwrap();

    let change = amount - to_account - fee;
    let (change_output, _) = owner.address().pay(&ephemeral, index + 1, change).unwrap();
    let mut tx = UtxoTx::new(
        Address::ZERO,
        vec![UtxoInput::Utxo(owned.spend(index))],
        vec![
            TxOutput::Account { to: chain.sender, amount: to_account, data: Bytes::new() },
            TxOutput::Utxo { amount: change, output: change_output },
        ],
        fee,
    );
    let signature = owned.sign(&tx.signing_hash()).unwrap();
    tx.set_input_signature(0, signature);
    tx
}

#[test]
fn utxo_spent_into_account_and_change() {
    let mut chain = Chain::new();
    let owner = StealthKeys::random(&mut OsRng);
    let tx = spend_stored_output(&chain, &owner, coins(100), coins(10), coins(60));
    let image = tx.key_images()[0];

    let result = chain.process(vec![Transaction::Utxo(tx)]).unwrap();
    assert!(result.receipts[0].success);
    assert_eq!(result.key_images, vec![image]);
    assert_eq!(result.utxo_outputs.len(), 1);
    assert_eq!(chain.balance(&chain.sender), init_balance() + coins(10));
    assert_eq!(owner.scan(&result.utxo_outputs[0], 1).unwrap().amount, coins(30));
}

#[test]
fn spent_key_image_rejects_later_block() {
    let mut chain = Chain::new();
    let owner = StealthKeys::random(&mut OsRng);
    let tx = Transaction::Utxo(spend_stored_output(&chain, &owner, coins(100), coins(10), coins(60)));

    let mut replay = chain.state.clone();
    let result = chain.process(vec![tx.clone()]).unwrap();
    chain.utxos.apply(&result.utxo_outputs, &result.key_images).unwrap();

    std::mem::swap(&mut chain.state, &mut replay);
    let err = chain.process(vec![tx]).unwrap_err();
    assert!(matches!(err, ProcessError::KeyImageSpent { index: 0, .. }));
}

#[test]
fn same_key_image_twice_in_block_is_rejected() {
    let mut chain = Chain::new();
    let owner = StealthKeys::random(&mut OsRng);
    let tx = Transaction::Utxo(spend_stored_output(&chain, &owner, coins(100), coins(10), coins(60)));

    let err = chain.process(vec![tx.clone(), tx]).unwrap_err();
    assert!(matches!(err, ProcessError::Transition { index: 1, .. }));
}

#[test]
fn fee_distribution_failure_is_swallowed() {
    let mut chain = Chain::new();
    let foundation = SystemContract::Foundation.address();
    chain.state.set_code(foundation, Bytes::from_static(&REVERT_RUNTIME)).unwrap();
    let amount = coins(1);
    let gas = cal_new_amount_gas(amount);
    let tx = chain.signed(0, Some(RECEIVER), amount, gas, Bytes::new());

    let result = chain.process(vec![tx]).unwrap();
    assert!(result.receipts[0].success);
    assert_eq!(chain.balance(&foundation), gas_fee(gas, price()));
    assert_eq!(chain.balance(&RECEIVER), amount);
}

#[test]
fn fee_handling_can_be_disabled() {
    let mut chain = Chain::with_config(ExecutorConfig::default().with_fee_handle(false));
    let amount = coins(1);
    let tx = chain.signed(0, Some(RECEIVER), amount, cal_new_amount_gas(amount), Bytes::new());

    chain.process(vec![tx]).unwrap();
    assert_eq!(chain.balance(&SystemContract::Foundation.address()), U256::ZERO);
}

#[test]
fn blacklist_contract_output_updates_blacklist() {
    let mut chain = Chain::new();
    let banned = Address::repeat_byte(0x66);
    let update = format!(r#"{{"add":["{banned}"],"del":[]}}"#);
    chain.state.set_code(SystemContract::Blacklist.address(), returning(update.as_bytes())).unwrap();

    let tx = chain.signed(0, Some(SystemContract::Blacklist.address()), U256::ZERO, 1_000_000, Bytes::new());
    let result = chain.process(vec![tx]).unwrap();
    assert!(result.receipts[0].success);
    assert!(chain.processor.blacklist().contains(&banned));

    let tx = chain.signed(1, Some(banned), coins(1), cal_new_amount_gas(coins(1)), Bytes::new());
    let err = chain.process(vec![tx]).unwrap_err();
    assert!(matches!(err, ProcessError::Blacklisted { address, .. } if address == banned));
}

#[test]
fn balance_records_follow_transactions() {
    let mut chain = Chain::with_config(ExecutorConfig::default().with_balance_records(true));
    let amount = coins(2);
    let tx = chain.signed(0, Some(RECEIVER), amount, cal_new_amount_gas(amount), Bytes::new());
    let hash = tx.id().0;

    let result = chain.process(vec![tx]).unwrap();
    let block_records = result.balance_records.unwrap();
    assert_eq!(block_records.height, 1);
    assert_eq!(block_records.tx_records.len(), 1);
    let records = &block_records.tx_records[0];
    assert_eq!(records.hash, hash);
    assert_eq!(records.tx_type, "transfer");
    assert_eq!(records.from, chain.sender);
    assert_eq!(records.to, RECEIVER);
    assert!(records.records.iter().any(|r| r.kind == RecordKind::Transfer && r.amount == amount));
    assert!(records.records.iter().any(|r| r.kind == RecordKind::Fee));
}

#[test]
fn block_gas_limit_is_enforced() {
    let mut chain = Chain::new();
    let amount = coins(1);
    let gas = cal_new_amount_gas(amount);
    let header = Header { height: 1, gas_limit: gas, ..Default::default() };
    let txs = vec![
        chain.signed(0, Some(RECEIVER), amount, gas, Bytes::new()),
        chain.signed(1, Some(RECEIVER), amount, gas, Bytes::new()),
    ];
    let block = Block::new(header, txs, Vec::new(), Commit::default());
    let err = chain.processor.process(&block, &mut chain.state, CandidateList::default(), &[]).unwrap_err();
    assert!(matches!(err, ProcessError::GasLimitExceeded { used, limit } if used == 2 * gas && limit == gas));
}

#[test]
fn processing_is_deterministic() {
    let mut a = Chain::new();
    let mut b = Chain::new();
    b.state = a.state.clone();
    b.key = a.key.clone();
    b.sender = a.sender;

    let amount = coins(3);
    let gas = cal_new_amount_gas(amount);
    let ra = a.process(vec![a.signed(0, Some(RECEIVER), amount, gas, Bytes::new())]).unwrap();
    let rb = b.process(vec![b.signed(0, Some(RECEIVER), amount, gas, Bytes::new())]).unwrap();
    assert!(ra.matches(rb.gas_used, &rb.state_root, &rb.receipt_root));
    assert_eq!(ra.logs_bloom, rb.logs_bloom);
}
