//! Parallel verification of the transactions of a block.

use std::thread;

use alloy_primitives::Address;
use hyla_backend::UtxoStore;
use hyla_domain::{SignersInfo, Transaction, TxKind, TxOutput, UtxoInput, UtxoTx, Validator};
use hyla_state::WorldState;
use tracing::debug;

use crate::{Blacklist, ExecutorConfig, ProcessError};

/// Read-only view the verification workers share.
#[derive(Debug, Clone, Copy)]
pub struct Verifier<'a> {
    config: &'a ExecutorConfig,
    blacklist: &'a Blacklist,
    utxos: &'a UtxoStore,
    state: &'a WorldState,
    validators: &'a [Validator],
}

impl<'a> Verifier<'a> {
    /// Verifier over the state a block executes on.
    pub const fn new(
        config: &'a ExecutorConfig,
        blacklist: &'a Blacklist,
        utxos: &'a UtxoStore,
        state: &'a WorldState,
        validators: &'a [Validator],
    ) -> Self {
        Self { config, blacklist, utxos, state, validators }
    }

    /// Verify every transaction and recover its sender.
    ///
    /// Transactions are split across workers by stride. When several fail, the error of the
    /// earliest transaction is returned.
    pub fn verify_all(&self, txs: &[Transaction]) -> Result<Vec<Option<Address>>, ProcessError> {
        let workers = self.config.workers_for(txs.len());
        let results: Vec<Result<Vec<(usize, Option<Address>)>, ProcessError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    scope.spawn(move || {
                        txs.iter()
                            .enumerate()
                            .skip(worker)
                            .step_by(workers)
                            .map(|(index, tx)| self.verify(index, tx).map(|sender| (index, sender)))
                            .collect::<Result<Vec<_>, ProcessError>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut senders = vec![None; txs.len()];
        let mut first_err: Option<ProcessError> = None;
        for result in results {
            match result {
                Ok(verified) => {
                    for (index, sender) in verified {
                        senders[index] = sender;
                    }
                }
                Err(err) => {
                    let earlier = match &first_err {
                        Some(current) => err.tx_index() < current.tx_index(),
                        None => true,
                    };
                    if earlier {
                        first_err = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        debug!(txs = txs.len(), workers, "verified transactions");
        Ok(senders)
    }

    /// Verify one transaction at position `index` and recover its sender.
    pub fn verify(&self, index: usize, tx: &Transaction) -> Result<Option<Address>, ProcessError> {
        let invalid = |source| ProcessError::InvalidTx { index, source };
        tx.check_basic(self.config.max_tx_bytes, self.config.test_mode).map_err(invalid)?;
        let sender = tx.sender().map_err(invalid)?;

        let mut touched: Vec<Address> = sender.into_iter().chain(tx.to()).collect();
        if !tx.token().is_zero() {
            touched.push(tx.token());
        }
        if let Transaction::Utxo(utxo) = tx {
            touched.extend(utxo.outputs.iter().filter_map(|output| match output {
                TxOutput::Account { to, .. } => Some(*to),
                TxOutput::Utxo { .. } => None,
            }));
        }
        if let Some(address) = self.blacklist.find(&touched) {
            return Err(ProcessError::Blacklisted { index, address });
        }

        match tx {
            Transaction::Transfer(account) | Transaction::TokenTransfer(account) => {
                let has_code = match account.to {
                    Some(to) => self.state.is_contract(&to)?,
                    None => true,
                };
                account.check_gas(has_code).map_err(invalid)?;
            }
            Transaction::ContractCreate(create) => {
                let signers = self.signers(index, TxKind::ContractCreate)?;
                create.verify(&signers).map_err(invalid)?;
            }
            Transaction::ContractUpgrade(upgrade) => {
                let signers = self.signers(index, TxKind::ContractUpgrade)?;
                upgrade.verify(&signers).map_err(invalid)?;
            }
            Transaction::MultiSignAccount(multi) => multi.verify(self.validators).map_err(invalid)?,
            Transaction::Utxo(utxo) => self.verify_spends(index, utxo)?,
        }
        Ok(sender)
    }

    fn signers(&self, index: usize, kind: TxKind) -> Result<SignersInfo, ProcessError> {
        self.state.signers_info(kind)?.ok_or(ProcessError::MissingSigners { index, kind })
    }

    fn verify_spends(&self, index: usize, tx: &UtxoTx) -> Result<(), ProcessError> {
        let hash = tx.signing_hash();
        for (position, input) in tx.inputs.iter().enumerate() {
            let UtxoInput::Utxo(spend) = input else {
                continue;
            };
            let output = self
                .utxos
                .output(spend.index)?
                .ok_or(ProcessError::UnknownOutput { index, output: spend.index })?;
            spend.verify(&output, &hash, position).map_err(|source| ProcessError::InvalidTx { index, source })?;
            if self.utxos.is_spent(&spend.key_image)? {
                return Err(ProcessError::KeyImageSpent { index, image: spend.key_image });
            }
        }
        Ok(())
    }
}
