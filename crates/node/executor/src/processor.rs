//! Deterministic execution of a block against world state.

use std::sync::{Arc, atomic::AtomicBool};

use alloy_primitives::{Address, B256, Bytes, U256};
use hyla_backend::UtxoStore;
use hyla_domain::{
    AddressType, BalanceRecord, Block, BlockBalanceRecords, CONTRACT_TX_GAS, Receipt, RecordKind, Transaction,
    TxBalanceRecords, Validator, block_bloom, receipts_root,
};
use hyla_election::CandidateList;
use hyla_primitives::{PAR_GAS_PRICE, SystemContract, gas_fee};
use hyla_state::{StateError, WorldState};
use hyla_vm::{BlockContext, CallOutcome, Machine, Message};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    Blacklist, BlockExecutor, ExecutorConfig, ProcessError, ProcessResult, Transition, TransitionOutcome, Verifier,
};

/// Gas granted to calls the processor makes into system contracts.
pub const SYSTEM_CALL_GAS: u64 = 1_000_000_000;

/// Award allocation runs every this many vote periods.
pub const AWARD_PERIODS: u64 = 10;

/// Executes blocks: verification, transactions, fee distribution and evidence.
#[derive(Clone, Debug)]
pub struct BlockProcessor {
    config: ExecutorConfig,
    blacklist: Blacklist,
    utxos: UtxoStore,
    abort: Arc<AtomicBool>,
}

impl BlockProcessor {
    /// Processor reading spent outputs from `utxos`.
    pub fn new(config: ExecutorConfig, blacklist: Blacklist, utxos: UtxoStore) -> Self {
        Self { config, blacklist, utxos, abort: Arc::default() }
    }

    /// Share an abort flag with the machines this processor builds.
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Execution configuration.
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Address blacklist consulted during verification.
    pub const fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Flag that aborts running contract code when set.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    fn distribute_fee(&self, machine: &mut Machine<'_>, coinbase: Address, gas_used: u64) -> Result<(), StateError> {
        let foundation = SystemContract::Foundation.address();
        let fee = gas_fee(gas_used, U256::from(PAR_GAS_PRICE));
        machine.state_mut().add_balance(foundation, Address::ZERO, fee)?;

        let input = format!("setPoceeds|{}", json!({ "0": coinbase.to_string(), "1": fee.to_string() }));
        let outcome = system_call(machine, foundation, input)?;
        match outcome.error {
            Some(err) => warn!(%coinbase, %fee, %err, "fee distribution failed"),
            None => debug!(%coinbase, %fee, "distributed fee"),
        }
        Ok(())
    }

    fn alloc_award(&self, machine: &mut Machine<'_>, height: u64) -> Result<Option<TxBalanceRecords>, StateError> {
        let foundation = SystemContract::Foundation.address();
        let outcome = system_call(machine, foundation, "allocAward|{}".to_string())?;
        if let Some(err) = outcome.error {
            warn!(height, %err, "award allocation failed");
            return Ok(None);
        }
        let mut records = machine.take_otxs();
        records.push(BalanceRecord::new(
            foundation,
            foundation,
            AddressType::Contract,
            AddressType::Contract,
            RecordKind::Fee,
            Address::ZERO,
            U256::ZERO,
        ));
        info!(height, records = records.len(), "allocated award");
        Ok(Some(TxBalanceRecords {
            tx_type: "allocAward".to_string(),
            records,
            from: foundation,
            to: foundation,
            ..Default::default()
        }))
    }
}

impl BlockExecutor for BlockProcessor {
    fn process(
        &self,
        block: &Block,
        state: &mut WorldState,
        candidates: CandidateList,
        validators: &[Validator],
    ) -> Result<ProcessResult, ProcessError> {
        let header = &block.header;
        let height = header.height;
        let block_hash = block.id();
        let coefficient = state.coefficient()?;

        let senders =
            Verifier::new(&self.config, &self.blacklist, &self.utxos, state, validators).verify_all(&block.txs)?;

        let context = BlockContext::new(header.coinbase, height, header.time, header.gas_limit)
            .with_ancestor(height.saturating_sub(1), header.parent_hash.0);
        let mut machine = Machine::new(state, context, &self.config.vm).with_abort(self.abort_handle());
        let mut transition =
            Transition::new(self.blacklist.clone(), self.config.vm.wasm.gas_rate, coefficient.utxo_fee);

        let mut result = ProcessResult { height, block_hash, candidates, ..Default::default() };
        let mut tx_records = Vec::new();
        for (index, (tx, sender)) in block.txs.iter().zip(senders).enumerate() {
            let tx_hash = tx.id().0;
            machine.state_mut().prepare(tx_hash, block_hash.0, index as u32);
            let outcome = transition
                .apply(&mut machine, tx, sender)
                .map_err(|source| ProcessError::Transition { index, source })?;

            match tx {
                Transaction::MultiSignAccount(multi) => result.specials.push(multi.clone()),
                Transaction::Utxo(utxo) => {
                    result.key_images.extend(utxo.key_images());
                    // A failed account-funded transaction creates no outputs.
                    if outcome.is_success() || utxo.account_input().is_none() {
                        result.utxo_outputs.extend(utxo.utxo_outputs());
                    }
                }
                _ => {}
            }

            result.gas_used += outcome.gas_used;
            if result.gas_used > header.gas_limit {
                return Err(ProcessError::GasLimitExceeded { used: result.gas_used, limit: header.gas_limit });
            }
            if let Some(err) = &outcome.vm_err {
                debug!(height, index, %err, "transaction failed");
            }

            let logs = machine.state().get_logs(&tx_hash);
            result.receipts.push(Receipt::new(
                tx_hash,
                outcome.is_success(),
                result.gas_used,
                outcome.gas_used,
                outcome.contract_address,
                logs.clone(),
            ));
            result.logs.extend(logs);
            if self.config.save_balance_record {
                tx_records.push(tx_balance_records(tx, tx_hash, sender, outcome));
            }
        }

        if self.config.process_fee_handle && result.gas_used > 0 {
            self.distribute_fee(&mut machine, header.coinbase, result.gas_used)?;
        }
        let award_period = coefficient.vote_period.saturating_mul(AWARD_PERIODS);
        if award_period != 0 && height % award_period == 0 && !result.candidates.is_empty()
            && let Some(records) = self.alloc_award(&mut machine, height)?
        {
            tx_records.push(records);
        }
        result.candidates.apply_evidence(machine.state_mut(), &block.evidence, &coefficient, height)?;
        drop(machine);

        result.state_root = state.intermediate_root(false)?;
        result.receipt_root = receipts_root(&result.receipts);
        result.logs_bloom = block_bloom(&result.receipts);
        if self.config.save_balance_record {
            result.balance_records =
                Some(BlockBalanceRecords { height, block_hash: block_hash.0, time: header.time, tx_records });
        }

        info!(
            height,
            txs = block.txs.len(),
            gas_used = result.gas_used,
            state_root = %result.state_root,
            "processed block"
        );
        Ok(result)
    }
}

fn system_call(machine: &mut Machine<'_>, to: Address, input: String) -> Result<CallOutcome, StateError> {
    machine.reset(&Message::new(to, U256::from(PAR_GAS_PRICE), Address::ZERO));
    machine.call(to, to, Address::ZERO, Bytes::from(input.into_bytes()), SYSTEM_CALL_GAS, U256::ZERO)
}

fn tx_balance_records(
    tx: &Transaction,
    hash: B256,
    sender: Option<Address>,
    outcome: TransitionOutcome,
) -> TxBalanceRecords {
    let (gas_limit, gas_price) = match tx {
        Transaction::Transfer(account) | Transaction::TokenTransfer(account) => {
            (account.gas_limit, account.gas_price)
        }
        Transaction::ContractCreate(_) | Transaction::ContractUpgrade(_) => {
            (CONTRACT_TX_GAS, U256::from(PAR_GAS_PRICE))
        }
        Transaction::Utxo(utxo) => (utxo.gas(), U256::from(PAR_GAS_PRICE)),
        Transaction::MultiSignAccount(_) => (0, U256::ZERO),
    };
    TxBalanceRecords {
        hash,
        tx_type: tx.kind().name().to_string(),
        records: outcome.records,
        payloads: outcome.payloads,
        nonce: tx.nonce().unwrap_or_default(),
        gas_limit,
        gas_price,
        from: sender.unwrap_or_default(),
        to: tx.to().or(outcome.contract_address).unwrap_or_default(),
        token: tx.token(),
    }
}
