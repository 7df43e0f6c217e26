//! Candidates, validators and election coefficients.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{PubKey, TxError};

/// Validator with voting power.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Consensus key.
    pub pub_key: PubKey,
    /// Address of the consensus key.
    pub address: Address,
    /// Voting power.
    pub voting_power: u64,
    /// Reward address.
    #[serde(default)]
    pub coinbase: Address,
}

impl Validator {
    /// Builds a validator, deriving its address from the key.
    pub fn new(pub_key: PubKey, voting_power: u64) -> Result<Self, TxError> {
        let address = pub_key.address()?;
        Ok(Self { pub_key, address, voting_power, coinbase: address })
    }

    /// Sets the reward address.
    #[must_use]
    pub const fn with_coinbase(mut self, coinbase: Address) -> Self {
        self.coinbase = coinbase;
        self
    }
}

/// A registered candidate as stored by the candidates contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateState {
    /// Consensus key.
    pub pub_key: PubKey,
    /// Address of the consensus key.
    pub address: Address,
    /// Voting power once elected.
    pub voting_power: u64,
    /// Reward address.
    pub coinbase: Address,
    /// Reputation score.
    pub score: i64,
    /// Height of the last punishment.
    #[serde(default)]
    pub punish_height: u64,
}

/// A candidate in election order, with its production history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInOrder {
    /// Consensus key.
    pub pub_key: PubKey,
    /// Address of the consensus key.
    pub address: Address,
    /// Voting power once elected.
    pub voting_power: u64,
    /// Reward address.
    pub coinbase: Address,
    /// Consecutive produced (positive) or missed (negative) rounds.
    pub produce_info: i32,
    /// Deposit in whole coins.
    pub deposit: i64,
    /// Reputation score.
    pub score: i64,
    /// Seeded random tag.
    pub rand: i64,
    /// Position after the last ranking.
    pub rank: usize,
}

impl CandidateInOrder {
    /// Starts tracking a stored candidate.
    pub fn from_state(state: &CandidateState) -> Self {
        Self {
            pub_key: state.pub_key,
            address: state.address,
            voting_power: state.voting_power,
            coinbase: state.coinbase,
            produce_info: 0,
            deposit: 0,
            score: state.score,
            rand: 0,
            rank: 0,
        }
    }

    /// Validator entry for an elected candidate.
    pub fn to_validator(&self) -> Validator {
        Validator {
            pub_key: self.pub_key,
            address: self.address,
            voting_power: self.voting_power,
            coinbase: self.coinbase,
        }
    }
}

/// Validator-count ratio and cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoteRate {
    /// Denominator of the elected share.
    pub deno: u64,
    /// Numerator of the elected share.
    pub nume: u64,
    /// Maximum number of elected candidates.
    pub upper_limit: u64,
}

/// Ranking weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalRate {
    /// Score weight.
    #[serde(rename = "Srate")]
    pub srate: i64,
    /// Deposit weight.
    #[serde(rename = "Drate")]
    pub drate: i64,
    /// Random weight.
    #[serde(rename = "Rrate")]
    pub rrate: i64,
}

/// Tunable consensus parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coefficient {
    /// Blocks between rankings.
    #[serde(rename = "VotePeriod")]
    pub vote_period: u64,
    /// Election share.
    #[serde(rename = "VoteRate")]
    pub vote_rate: VoteRate,
    /// Ranking weights.
    #[serde(rename = "CalRate")]
    pub cal_rate: CalRate,
    /// Score cap.
    #[serde(rename = "MaxScore")]
    pub max_score: i64,
    /// Extra gas owed by transactions spending into new UTXOs.
    #[serde(rename = "UTXOFee")]
    pub utxo_fee: u64,
}

impl Coefficient {
    /// Default blocks between rankings.
    pub const DEFAULT_VOTE_PERIOD: u64 = 1_321;
    /// Default score cap.
    pub const DEFAULT_MAX_SCORE: i64 = 500;
    /// Default UTXO gas.
    pub const DEFAULT_UTXO_FEE: u64 = 500_000_000;

    /// Number of candidates elected out of `candidates`.
    pub const fn elected_count(&self, candidates: usize) -> usize {
        let share = if self.vote_rate.deno == 0 {
            0
        } else {
            candidates as u128 * self.vote_rate.nume as u128 / self.vote_rate.deno as u128
        };
        let limit = self.vote_rate.upper_limit as u128;
        let count = if share < limit { share } else { limit };
        count as usize
    }
}

impl Default for Coefficient {
    fn default() -> Self {
        Self {
            vote_period: Self::DEFAULT_VOTE_PERIOD,
            vote_rate: VoteRate { deno: 5, nume: 3, upper_limit: 12 },
            cal_rate: CalRate { srate: 4, drate: 4, rrate: 2 },
            max_score: Self::DEFAULT_MAX_SCORE,
            utxo_fee: Self::DEFAULT_UTXO_FEE,
        }
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;

    use super::*;

    fn key_from_byte(byte: u8) -> SigningKey {
        let bytes = [byte; 32];
        SigningKey::from_bytes(&bytes.into()).expect("valid key")
    }

    #[test]
    fn coefficient_defaults() {
        let coe = Coefficient::default();
        assert_eq!(coe.vote_period, 1_321);
        assert_eq!(coe.vote_rate, VoteRate { deno: 5, nume: 3, upper_limit: 12 });
        assert_eq!(coe.cal_rate, CalRate { srate: 4, drate: 4, rrate: 2 });
        assert_eq!(coe.max_score, 500);
        assert_eq!(coe.utxo_fee, 500_000_000);
    }

    #[test]
    fn coefficient_json_shape() {
        let json = serde_json::to_value(Coefficient::default()).expect("json");
        assert_eq!(json["VotePeriod"], 1_321);
        assert_eq!(json["VoteRate"]["UpperLimit"], 12);
        assert_eq!(json["CalRate"]["Srate"], 4);
        assert_eq!(json["UTXOFee"], 500_000_000u64);
    }

    #[test]
    fn elected_count_is_capped() {
        let coe = Coefficient::default();
        assert_eq!(coe.elected_count(0), 0);
        assert_eq!(coe.elected_count(5), 3);
        assert_eq!(coe.elected_count(100), 12);
    }

    #[test]
    fn elected_count_with_large_rate() {
        let mut coe = Coefficient::default();
        coe.vote_rate = VoteRate { deno: u64::MAX, nume: u64::MAX, upper_limit: 12 };
        assert_eq!(coe.elected_count(usize::MAX), 12);
        assert_eq!(coe.elected_count(7), 7);

        coe.vote_rate = VoteRate { deno: 2, nume: u64::MAX, upper_limit: u64::MAX };
        assert_eq!(coe.elected_count(4), usize::try_from(u64::MAX).unwrap_or(usize::MAX));
    }

    #[test]
    fn validator_address_from_key() {
        let key = key_from_byte(2);
        let validator = Validator::new(PubKey::from_signing_key(&key), 10).expect("validator");
        assert_eq!(validator.address, crate::address_of(key.verifying_key()));
        assert_eq!(validator.coinbase, validator.address);
    }

    #[test]
    fn candidate_order_from_state() {
        let key = PubKey::from_signing_key(&key_from_byte(3));
        let state = CandidateState {
            pub_key: key,
            address: key.address().expect("address"),
            voting_power: 7,
            coinbase: Address::repeat_byte(1),
            score: 42,
            punish_height: 0,
        };
        let ordered = CandidateInOrder::from_state(&state);
        assert_eq!(ordered.score, 42);
        assert_eq!(ordered.produce_info, 0);
        assert_eq!(ordered.to_validator().coinbase, Address::repeat_byte(1));
    }
}
