//! Typed access to system contract storage.
//!
//! System contracts keep JSON documents in their storage under `keccak(name)`.

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use hyla_domain::{CandidateState, Coefficient, PubKey, SignersInfo, TxKind, Validator};
use hyla_primitives::SystemContract;
use serde::{Serialize, de::DeserializeOwned};

use crate::{StateError, WorldState};

const CANDIDATES: &str = "candidates";
const COEFFICIENT: &str = "coefficient";
const WHITE_LIST: &str = "white_list";
const CURRENT: &str = "current";
const DEPOSITS: &str = "deposits";
const BLACKLIST: &str = "blacklist";

/// Storage key of a named system entry.
pub fn system_key(name: &str) -> B256 {
    keccak256(name.as_bytes())
}

fn signers_name(kind: TxKind) -> String {
    format!("signers:{}", kind.name())
}

impl WorldState {
    /// Read a JSON entry of a system contract.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        contract: SystemContract,
        name: &str,
    ) -> Result<Option<T>, StateError> {
        let address = contract.address();
        let raw = self.get_storage(&address, &system_key(name))?;
        if raw.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&raw).map(Some).map_err(|e| StateError::InvalidSystemValue {
            contract: address,
            key: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Write a JSON entry of a system contract.
    pub fn set_json<T: Serialize>(
        &mut self,
        contract: SystemContract,
        name: &str,
        value: &T,
    ) -> Result<(), StateError> {
        let address = contract.address();
        let raw = serde_json::to_vec(value).map_err(|e| StateError::InvalidSystemValue {
            contract: address,
            key: name.to_string(),
            reason: e.to_string(),
        })?;
        self.set_storage(address, system_key(name), Bytes::from(raw))
    }

    /// Registered candidates in registration order.
    pub fn candidates(&self) -> Result<Vec<CandidateState>, StateError> {
        Ok(self.get_json(SystemContract::Candidates, CANDIDATES)?.unwrap_or_default())
    }

    /// Replace the candidate registry.
    pub fn set_candidates(&mut self, candidates: &[CandidateState]) -> Result<(), StateError> {
        self.set_json(SystemContract::Candidates, CANDIDATES, &candidates)
    }

    /// Set the score of a registered candidate.
    ///
    /// Returns `false` when the key is not registered.
    pub fn set_candidate_score(
        &mut self,
        pub_key: &PubKey,
        score: i64,
        punish_height: Option<u64>,
    ) -> Result<bool, StateError> {
        let mut candidates = self.candidates()?;
        let Some(candidate) = candidates.iter_mut().find(|c| c.pub_key == *pub_key) else {
            return Ok(false);
        };
        candidate.score = score;
        if let Some(height) = punish_height {
            candidate.punish_height = height;
        }
        self.set_candidates(&candidates)?;
        Ok(true)
    }

    /// Tunable parameters, with defaults when unset.
    pub fn coefficient(&self) -> Result<Coefficient, StateError> {
        Ok(self.get_json(SystemContract::Coefficient, COEFFICIENT)?.unwrap_or_default())
    }

    /// Replace the tunable parameters.
    pub fn set_coefficient(&mut self, coefficient: &Coefficient) -> Result<(), StateError> {
        self.set_json(SystemContract::Coefficient, COEFFICIENT, coefficient)
    }

    /// White-list validators, always part of the validator set.
    pub fn white_validators(&self) -> Result<Vec<Validator>, StateError> {
        Ok(self.get_json(SystemContract::Validators, WHITE_LIST)?.unwrap_or_default())
    }

    /// Replace the white-list validators.
    pub fn set_white_validators(&mut self, validators: &[Validator]) -> Result<(), StateError> {
        self.set_json(SystemContract::Validators, WHITE_LIST, &validators)
    }

    /// Validator set elected at the last commit.
    pub fn current_validators(&self) -> Result<Vec<Validator>, StateError> {
        match self.get_json(SystemContract::Validators, CURRENT)? {
            Some(validators) => Ok(validators),
            None => self.white_validators(),
        }
    }

    /// Record the elected validator set.
    pub fn set_current_validators(&mut self, validators: &[Validator]) -> Result<(), StateError> {
        self.set_json(SystemContract::Validators, CURRENT, &validators)
    }

    /// Deposits by candidate address, in base units.
    pub fn deposits(&self) -> Result<BTreeMap<Address, U256>, StateError> {
        Ok(self.get_json(SystemContract::Pledge, DEPOSITS)?.unwrap_or_default())
    }

    /// Set the deposit of a candidate.
    pub fn set_deposit(&mut self, address: Address, amount: U256) -> Result<(), StateError> {
        let mut deposits = self.deposits()?;
        if amount.is_zero() {
            deposits.remove(&address);
        } else {
            deposits.insert(address, amount);
        }
        self.set_json(SystemContract::Pledge, DEPOSITS, &deposits)
    }

    /// Blacklisted addresses.
    pub fn blacklist(&self) -> Result<BTreeSet<Address>, StateError> {
        Ok(self.get_json(SystemContract::Blacklist, BLACKLIST)?.unwrap_or_default())
    }

    /// Replace the blacklist.
    pub fn set_blacklist(&mut self, addresses: &BTreeSet<Address>) -> Result<(), StateError> {
        self.set_json(SystemContract::Blacklist, BLACKLIST, addresses)
    }

    /// Signers authorized for a privileged transaction kind.
    pub fn signers_info(&self, kind: TxKind) -> Result<Option<SignersInfo>, StateError> {
        self.get_json(SystemContract::Committee, &signers_name(kind))
    }

    /// Replace the signers of a privileged transaction kind.
    pub fn set_signers_info(&mut self, kind: TxKind, info: &SignersInfo) -> Result<(), StateError> {
        self.set_json(SystemContract::Committee, &signers_name(kind), info)
    }
}
