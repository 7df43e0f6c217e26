//! Genesis allocation.

use std::{collections::BTreeMap, path::Path};

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Coefficient, PubKey};

/// Errors raised while loading a genesis file.
#[derive(Debug, Error)]
pub enum GenesisError {
    /// The file could not be read.
    #[error("failed to read genesis: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid genesis JSON.
    #[error("invalid genesis json: {0}")]
    Json(#[from] serde_json::Error),
    /// The same account is allocated twice.
    #[error("duplicate genesis account {0}")]
    DuplicateAccount(Address),
}

/// Initial state of a single account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisAccount {
    /// Account address.
    pub address: Address,
    /// Native balance.
    pub balance: U256,
    /// Starting nonce.
    pub nonce: u64,
    /// Balances in other tokens.
    pub tokens: BTreeMap<Address, U256>,
    /// Installed code.
    pub code: Bytes,
    /// Storage entries.
    pub storage: BTreeMap<B256, Bytes>,
}

impl GenesisAccount {
    /// Account holding only native balance.
    #[must_use]
    pub fn funded(address: Address, balance: U256) -> Self {
        Self { address, balance, ..Default::default() }
    }
}

/// Initial validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Consensus key.
    pub pub_key: PubKey,
    /// Voting power.
    pub voting_power: u64,
}

/// Genesis document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Genesis {
    /// Genesis time in unix seconds.
    pub time: u64,
    /// Allocated accounts.
    pub accounts: Vec<GenesisAccount>,
    /// White-list validators.
    pub validators: Vec<GenesisValidator>,
    /// Initial coefficients, written to the coefficient contract when set.
    pub coefficient: Option<Coefficient>,
}

impl Genesis {
    /// Parses a genesis document.
    pub fn from_json(json: &str) -> Result<Self, GenesisError> {
        let genesis: Self = serde_json::from_str(json)?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Loads a genesis document from disk.
    pub fn load(path: &Path) -> Result<Self, GenesisError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Rejects duplicate allocations.
    pub fn validate(&self) -> Result<(), GenesisError> {
        let mut seen = std::collections::BTreeSet::new();
        for account in &self.accounts {
            if !seen.insert(account.address) {
                return Err(GenesisError::DuplicateAccount(account.address));
            }
        }
        Ok(())
    }

    /// Adds an account allocation.
    #[must_use]
    pub fn with_account(mut self, account: GenesisAccount) -> Self {
        self.accounts.push(account);
        self
    }
}
