//! Genesis allocation.

use alloy_primitives::{Address, B256};
use hyla_domain::{Genesis, Validator};
use tracing::info;

use crate::{StateError, WorldState};

impl WorldState {
    /// Apply a genesis document and commit it at `height`.
    pub fn apply_genesis(&mut self, genesis: &Genesis, height: u64) -> Result<B256, StateError> {
        genesis.validate().map_err(|e| StateError::InvalidGenesis(e.to_string()))?;
        for account in &genesis.accounts {
            self.add_balance(account.address, Address::ZERO, account.balance)?;
            for (token, amount) in &account.tokens {
                self.add_balance(account.address, *token, *amount)?;
            }
            if account.nonce > 0 {
                self.set_nonce(account.address, account.nonce)?;
            }
            if !account.code.is_empty() {
                self.set_code(account.address, account.code.clone())?;
            }
            for (key, value) in &account.storage {
                self.set_storage(account.address, *key, value.clone())?;
            }
        }
        if !genesis.validators.is_empty() {
            let validators = genesis
                .validators
                .iter()
                .map(|v| Validator::new(v.pub_key, v.voting_power))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StateError::InvalidGenesis(e.to_string()))?;
            self.set_white_validators(&validators)?;
        }
        if let Some(coefficient) = &genesis.coefficient {
            self.set_coefficient(coefficient)?;
        }
        let root = self.commit(height)?;
        info!(height, %root, accounts = genesis.accounts.len(), "applied genesis");
        Ok(root)
    }
}
