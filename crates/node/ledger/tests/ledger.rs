//! Block lifecycle tests for the ledger.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{Address, B256, Bytes, U256};
use hyla_backend::MemoryStore;
use hyla_config::NodeConfig;
use hyla_consensus::{ConsensusError, Mempool as _};
use hyla_domain::{
    AccountTx, Block, CandidateState, Commit, Genesis, GenesisAccount, LedgerEvent, PubKey, Transaction, TxKind,
};
use hyla_ledger::{BLOCK_TIME_DRIFT, LedgerError, LedgerService, LedgerView};
use hyla_primitives::{COIN, MAX_GAS_LIMIT, MIN_GAS_LIMIT, PAR_GAS_PRICE, SystemContract, gas_fee};
use hyla_state::system_key;
use hyla_traits::KvStore;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

const GAS_LIMIT: u64 = 100 * MAX_GAS_LIMIT;
const GENESIS_TIME: u64 = 1_000;
const RECEIVER: Address = Address::repeat_byte(0xbb);

struct Node {
    service: LedgerService,
    key: SigningKey,
    sender: Address,
    db: Arc<dyn KvStore>,
}

impl Node {
    fn view(&self) -> &LedgerView {
        self.service.view()
    }
}

fn genesis_for(key: &SigningKey) -> Genesis {
    let sender = PubKey::from_signing_key(key).address().unwrap();
    Genesis { time: GENESIS_TIME, ..Default::default() }
        .with_account(GenesisAccount::funded(sender, U256::from(1_000) * COIN))
}

fn node_with(key: SigningKey, config: &NodeConfig) -> Node {
    let sender = PubKey::from_signing_key(&key).address().unwrap();
    let db: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let view = LedgerView::with_store(Arc::clone(&db), config, &genesis_for(&key)).unwrap();
    Node { service: LedgerService::new(view), key, sender, db }
}

fn node() -> Node {
    node_with(SigningKey::random(&mut OsRng), &NodeConfig::default())
}

fn transfer(key: &SigningKey, nonce: u64, value: u64) -> Transaction {
    let mut tx = AccountTx::new(nonce, Some(RECEIVER), U256::from(value), MIN_GAS_LIMIT, Bytes::new());
    tx.sign(TxKind::Transfer, key).unwrap();
    Transaction::Transfer(tx)
}

fn seen(block: &Block) -> Commit {
    Commit { height: block.height(), round: 0, block_hash: block.id().0, signatures: Vec::new() }
}

async fn propose(service: &LedgerService, height: u64, time: u64) -> Block {
    let mut block = service.create_block(height, 100, GAS_LIMIT, time).await.unwrap();
    service.pre_run_block(&mut block).await.unwrap();
    block
}

async fn commit(service: &LedgerService, block: Block) {
    let commit = seen(&block);
    service.commit_block(block, commit, false).await.unwrap();
}

#[tokio::test]
async fn lifecycle_commits_transfer() {
    let node = node();
    let mut events = node.service.subscribe();
    let tx = transfer(&node.key, 0, 7_000);
    let id = node.service.submit_tx(tx.clone()).unwrap();

    let block = propose(&node.service, 1, GENESIS_TIME + 1).await;
    assert_eq!(block.txs, vec![tx]);
    assert!(node.service.check_block(&block).await.unwrap());
    let hash = block.id();
    let validators = node.service.commit_block(block, Commit::default(), false).await.unwrap();

    assert!(validators.is_empty());
    let view = node.view();
    assert_eq!(view.height().await, 1);
    assert_eq!(view.head().await.id(), hash);
    assert_eq!(view.get_balance(&RECEIVER, &Address::ZERO).unwrap(), U256::from(7_000));
    assert_eq!(view.get_nonce(&node.sender).unwrap(), 1);
    assert!(view.mempool().is_empty());
    assert!(view.cache().is_empty());

    let receipts = view.receipts(1).unwrap().unwrap();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].success);
    let foundation = SystemContract::Foundation.address();
    assert_eq!(
        view.get_balance(&foundation, &Address::ZERO).unwrap(),
        gas_fee(receipts[0].gas_used, U256::from(PAR_GAS_PRICE))
    );

    let submitted = events.try_next().unwrap().unwrap();
    assert!(matches!(submitted, LedgerEvent::TransactionSubmitted(got) if got == id));
    let committed = events.try_next().unwrap().unwrap();
    assert!(matches!(committed, LedgerEvent::BlockCommitted { height: 1, hash: got } if got == hash.0));
    assert!(events.try_next().is_err());
}

#[tokio::test]
async fn create_block_rejects_wrong_height() {
    let node = node();
    let err = node.service.create_block(2, 10, GAS_LIMIT, GENESIS_TIME).await.unwrap_err();
    assert!(matches!(err, LedgerError::HeightMismatch { expected: 1, got: 2 }));
}

#[tokio::test]
async fn create_block_carries_previous_results() {
    let node = node();
    node.service.submit_tx(transfer(&node.key, 0, 1)).unwrap();
    let first = propose(&node.service, 1, GENESIS_TIME + 1).await;
    let header = first.header.clone();
    commit(&node.service, first).await;

    let next = node.service.create_block(2, 10, GAS_LIMIT, GENESIS_TIME + 2).await.unwrap();
    assert_eq!(next.header.state_hash, header.state_hash);
    assert_eq!(next.header.receipt_hash, header.receipt_hash);
    assert_eq!(next.header.gas_used, header.gas_used);
    assert_eq!(next.last_commit.height, 1);
}

#[tokio::test]
async fn check_block_rejects_tampered_headers() {
    let node = node();
    node.service.submit_tx(transfer(&node.key, 0, 1)).unwrap();
    let block = propose(&node.service, 1, GENESIS_TIME + 1).await;

    let mut wrong_root = block.clone();
    wrong_root.header.state_hash = B256::repeat_byte(1);
    assert!(!node.service.check_block(&wrong_root).await.unwrap());

    let mut wrong_gas = block.clone();
    wrong_gas.header.gas_used += 1;
    assert!(!node.service.check_block(&wrong_gas).await.unwrap());

    let mut wrong_data = block.clone();
    wrong_data.header.data_hash = B256::repeat_byte(2);
    assert!(!node.service.check_block(&wrong_data).await.unwrap());

    let mut wrong_parent = block.clone();
    wrong_parent.header.parent_hash.0 = B256::repeat_byte(3);
    assert!(!node.service.check_block(&wrong_parent).await.unwrap());

    let mut wrong_height = block.clone();
    wrong_height.header.height = 2;
    assert!(!node.service.check_block(&wrong_height).await.unwrap());

    assert!(node.service.check_block(&block).await.unwrap());
}

#[tokio::test]
async fn check_block_rejects_block_far_behind_parent() {
    let node = node();
    let late = propose(&node.service, 1, GENESIS_TIME - BLOCK_TIME_DRIFT).await;
    assert!(!node.service.check_block(&late).await.unwrap());

    let tolerated = propose(&node.service, 1, GENESIS_TIME - BLOCK_TIME_DRIFT + 1).await;
    assert!(node.service.check_block(&tolerated).await.unwrap());
}

#[tokio::test]
async fn validator_checks_and_commits_proposal() {
    let key = SigningKey::random(&mut OsRng);
    let proposer = node_with(key.clone(), &NodeConfig::default());
    let validator = node_with(key, &NodeConfig::default());
    proposer.service.submit_tx(transfer(&proposer.key, 0, 42)).unwrap();
    let block = propose(&proposer.service, 1, GENESIS_TIME + 5).await;

    assert!(validator.service.check_block(&block).await.unwrap());
    assert_eq!(validator.view().cache().len(), 1);
    assert!(validator.service.check_block(&block).await.unwrap());
    assert_eq!(validator.view().cache().len(), 1);

    commit(&validator.service, block.clone()).await;
    commit(&proposer.service, block).await;
    let validator_state = validator.view().latest_state().await;
    let proposer_state = proposer.view().latest_state().await;
    assert_eq!(validator_state.root(), proposer_state.root());
    assert_eq!(validator.view().get_balance(&RECEIVER, &Address::ZERO).unwrap(), U256::from(42));
}

#[tokio::test]
async fn commit_requires_processed_block_unless_fast_sync() {
    let key = SigningKey::random(&mut OsRng);
    let proposer = node_with(key.clone(), &NodeConfig::default());
    let follower = node_with(key, &NodeConfig::default());
    proposer.service.submit_tx(transfer(&proposer.key, 0, 9)).unwrap();
    let block = propose(&proposer.service, 1, GENESIS_TIME + 1).await;

    let err = follower.service.commit_block(block.clone(), seen(&block), false).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotProcessed(hash) if hash == block.id().0));

    follower.service.commit_block(block.clone(), seen(&block), true).await.unwrap();
    assert_eq!(follower.view().height().await, 1);
    assert_eq!(follower.view().latest_state().await.root(), block.header.state_hash);
}

#[tokio::test]
async fn fast_sync_rejects_mismatched_block() {
    let key = SigningKey::random(&mut OsRng);
    let proposer = node_with(key.clone(), &NodeConfig::default());
    let follower = node_with(key, &NodeConfig::default());
    let mut block = propose(&proposer.service, 1, GENESIS_TIME + 1).await;
    block.header.gas_used = 1;

    let err = follower.service.commit_block(block.clone(), seen(&block), true).await.unwrap_err();
    assert!(matches!(err, LedgerError::ResultMismatch { height: 1 }));
    assert_eq!(follower.view().height().await, 0);
}

#[tokio::test]
async fn commit_rejects_wrong_height() {
    let node = node();
    let mut block = propose(&node.service, 1, GENESIS_TIME + 1).await;
    block.header.height = 3;
    let err = node.service.commit_block(block.clone(), seen(&block), true).await.unwrap_err();
    assert!(matches!(err, LedgerError::HeightMismatch { expected: 1, got: 3 }));
}

#[tokio::test]
async fn submit_rejects_stale_and_duplicate_transactions() {
    let node = node();
    let pending = transfer(&node.key, 1, 2);
    node.service.submit_tx(transfer(&node.key, 0, 1)).unwrap();
    let block = propose(&node.service, 1, GENESIS_TIME + 1).await;
    commit(&node.service, block).await;

    let err = node.service.submit_tx(transfer(&node.key, 0, 5)).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Consensus(ConsensusError::StaleNonce { state: 1, tx: 0, address }) if address == node.sender
    ));

    node.service.submit_tx(pending.clone()).unwrap();
    let err = node.service.submit_tx(pending).unwrap_err();
    assert!(matches!(err, LedgerError::Consensus(ConsensusError::Duplicate(_))));
}

#[tokio::test]
async fn pending_state_is_a_copy() {
    let node = node();
    let mut pending = node.view().pending_state();
    pending.add_balance(RECEIVER, Address::ZERO, U256::from(5)).unwrap();

    assert_eq!(node.view().get_balance(&RECEIVER, &Address::ZERO).unwrap(), U256::ZERO);
    assert_eq!(node.view().get_nonce(&node.sender).unwrap(), 0);
    assert!(node.view().get_code(&RECEIVER).unwrap().is_empty());
    assert_eq!(
        node.view().get_storage_root(&node.sender).unwrap(),
        node.view().latest_state().await.storage_root(&node.sender).unwrap()
    );
}

#[tokio::test]
async fn balance_records_follow_config() {
    let mut config = NodeConfig::default();
    config.execution.save_balance_record = true;
    let recording = node_with(SigningKey::random(&mut OsRng), &config);
    recording.service.submit_tx(transfer(&recording.key, 0, 3)).unwrap();
    let block = propose(&recording.service, 1, GENESIS_TIME + 1).await;
    let hash = block.id();
    commit(&recording.service, block).await;

    let records = recording.view().balance_records(1).unwrap().unwrap();
    assert_eq!(records.height, 1);
    assert_eq!(records.block_hash, hash.0);
    assert_eq!(records.time, GENESIS_TIME + 1);
    assert_eq!(records.tx_records.len(), 1);

    let silent = node();
    silent.service.submit_tx(transfer(&silent.key, 0, 3)).unwrap();
    let block = propose(&silent.service, 1, GENESIS_TIME + 1).await;
    commit(&silent.service, block).await;
    assert!(silent.view().balance_records(1).unwrap().is_none());
}

#[tokio::test]
async fn reopen_resumes_from_store() {
    let node = node();
    node.service.submit_tx(transfer(&node.key, 0, 11)).unwrap();
    let block = propose(&node.service, 1, GENESIS_TIME + 1).await;
    let hash = block.id();
    commit(&node.service, block).await;

    let reopened = LedgerView::with_store(Arc::clone(&node.db), &NodeConfig::default(), &Genesis::default()).unwrap();
    assert_eq!(reopened.height().await, 1);
    assert_eq!(reopened.head().await.id(), hash);
    assert_eq!(reopened.get_balance(&RECEIVER, &Address::ZERO).unwrap(), U256::from(11));
    assert_eq!(reopened.get_nonce(&node.sender).unwrap(), 1);
}

fn registered(count: u8) -> GenesisAccount {
    let candidates: Vec<CandidateState> = (1..=count)
        .map(|byte| {
            let pub_key = PubKey::from_signing_key(&SigningKey::from_bytes(&[byte; 32].into()).unwrap());
            CandidateState {
                pub_key,
                address: pub_key.address().unwrap(),
                voting_power: 10,
                coinbase: Address::repeat_byte(byte),
                score: 10,
                punish_height: 0,
            }
        })
        .collect();
    let entry = Bytes::from(serde_json::to_vec(&candidates).unwrap());
    GenesisAccount {
        address: SystemContract::Candidates.address(),
        storage: BTreeMap::from([(system_key("candidates"), entry)]),
        ..Default::default()
    }
}

#[tokio::test]
async fn reopen_restores_elected_validators() {
    let key = SigningKey::random(&mut OsRng);
    let db: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let genesis = genesis_for(&key).with_account(registered(3));
    let view = LedgerView::with_store(Arc::clone(&db), &NodeConfig::default(), &genesis).unwrap();
    let service = LedgerService::new(view);
    assert!(service.view().validators().await.is_empty());

    let block = propose(&service, 1, GENESIS_TIME + 1).await;
    let elected = service.commit_block(block.clone(), seen(&block), false).await.unwrap();
    assert!(!elected.is_empty());
    assert_eq!(service.view().validators().await, elected);

    let reopened = LedgerView::with_store(Arc::clone(&db), &NodeConfig::default(), &Genesis::default()).unwrap();
    assert_eq!(reopened.height().await, 1);
    assert_eq!(reopened.validators().await, elected);

    let service = LedgerService::new(reopened);
    let next = propose(&service, 2, GENESIS_TIME + 2).await;
    let after = service.commit_block(next.clone(), seen(&next), false).await.unwrap();
    assert_eq!(after, elected);
}

#[tokio::test]
async fn commit_rejects_changed_state_root() {
    let node = node();
    node.service.submit_tx(transfer(&node.key, 0, 5)).unwrap();
    let block = propose(&node.service, 1, GENESIS_TIME + 1).await;
    let hash = block.id();
    let mut processed = node.view().cache().take(&hash).unwrap();
    processed.result.state_root = B256::repeat_byte(7);
    node.view().cache().insert(hash, processed);

    let err = node.service.commit_block(block, Commit::default(), false).await.unwrap_err();
    assert!(matches!(err, LedgerError::RootMismatch { height: 1, expected, .. } if expected == B256::repeat_byte(7)));

    let view = node.view();
    assert_eq!(view.height().await, 0);
    assert!(view.block(1).unwrap().is_none());
    assert!(view.receipts(1).unwrap().is_none());
    assert_eq!(view.get_balance(&RECEIVER, &Address::ZERO).unwrap(), U256::ZERO);
    assert_eq!(view.get_nonce(&node.sender).unwrap(), 0);
}

#[tokio::test]
async fn recover_without_candidates_commits() {
    let node = node();
    let mut block = node.service.create_block(1, 10, GAS_LIMIT, GENESIS_TIME + 1).await.unwrap();
    block.header.recover = 1;
    node.service.pre_run_block(&mut block).await.unwrap();

    let validators = node.service.commit_block(block.clone(), seen(&block), false).await.unwrap();
    assert!(validators.is_empty());
    assert_eq!(node.view().height().await, 1);
    assert_eq!(node.view().head().await.header.recover, 1);
}

#[tokio::test]
async fn genesis_root_must_match_configured_root() {
    let mut config = NodeConfig::default();
    config.storage.init_state_root = Some(format!("0x{}", "09".repeat(32)));
    let key = SigningKey::random(&mut OsRng);
    let err = LedgerView::open(&config, &genesis_for(&key)).unwrap_err();
    assert!(matches!(err, LedgerError::GenesisRootMismatch { expected, .. } if expected == B256::repeat_byte(9)));
}

#[tokio::test]
async fn commit_prunes_competing_proposals() {
    let node = node();
    let first = propose(&node.service, 1, GENESIS_TIME + 1).await;
    let _second = propose(&node.service, 1, GENESIS_TIME + 2).await;
    assert_eq!(node.view().cache().len(), 2);

    commit(&node.service, first).await;
    assert!(node.view().cache().is_empty());
}

#[tokio::test]
async fn keeps_only_latest_blocks() {
    let mut config = NodeConfig::default();
    config.storage.keep_latest_blocks = 1;
    let node = node_with(SigningKey::random(&mut OsRng), &config);
    for height in 1..=2 {
        let block = propose(&node.service, height, GENESIS_TIME + height).await;
        commit(&node.service, block).await;
    }
    assert!(node.view().block(1).unwrap().is_none());
    assert!(node.view().block(2).unwrap().is_some());
}

#[test]
fn stop_raises_abort_flag() {
    let node = node();
    assert!(!node.view().is_stopped());
    node.service.stop();
    assert!(node.view().is_stopped());
}
