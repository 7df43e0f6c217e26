//! Candidate list carried from block to block.

use std::collections::HashSet;

use alloy_primitives::B256;
use hyla_domain::{CandidateInOrder, Coefficient, PubKey, Validator};
use hyla_state::WorldState;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ElectionError, PUNISH_THRESHOLD, THRESHOLD, rank_candidates};

/// Candidates in election order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateList(pub(crate) Vec<CandidateInOrder>);

impl CandidateList {
    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Candidates in order.
    pub fn as_slice(&self) -> &[CandidateInOrder] {
        &self.0
    }

    /// Iterate in order.
    pub fn iter(&self) -> std::slice::Iter<'_, CandidateInOrder> {
        self.0.iter()
    }

    /// Move candidates that missed [`THRESHOLD`] rounds to the end of the list.
    ///
    /// Their counters restart from zero. Candidates punished for double voting leave
    /// the list until the next ranking.
    pub fn demote_faulty(&mut self) {
        let (keep, demoted): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.0).into_iter().partition(|c| c.produce_info > -THRESHOLD);
        let demoted = demoted.into_iter().filter(|c| c.produce_info != PUNISH_THRESHOLD).map(|mut c| {
            c.produce_info = 0;
            c
        });
        self.0 = keep.into_iter().chain(demoted).collect();
    }

    /// Move members of the previous validator set to the end of the list.
    ///
    /// An empty list stays empty.
    pub fn recover(&mut self, last_validators: &[Validator]) {
        let last: HashSet<PubKey> = last_validators.iter().map(|v| v.pub_key).collect();
        let (fresh, previous): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.0).into_iter().partition(|c| !last.contains(&c.pub_key));
        self.0 = fresh.into_iter().chain(previous).collect();
    }

    /// List for the block after `height`: re-ranked every vote period, demoted otherwise.
    pub fn advance(
        mut self,
        state: &WorldState,
        height: u64,
        last_commit_hash: &B256,
        coefficient: &Coefficient,
    ) -> Result<Self, ElectionError> {
        if coefficient.vote_period != 0 && height % coefficient.vote_period == 0 {
            info!(height, "ranking candidates");
            return rank_candidates(state, last_commit_hash, coefficient);
        }
        self.demote_faulty();
        Ok(self)
    }

    /// Validator set: `white` followed by the elected head of the list.
    pub fn elect(&self, coefficient: &Coefficient, white: Vec<Validator>) -> Vec<Validator> {
        let count = coefficient.elected_count(self.0.len()).min(self.0.len());
        let mut validators = white;
        validators.extend(self.0[..count].iter().map(CandidateInOrder::to_validator));
        debug!(elected = count, total = validators.len(), "elected validators");
        validators
    }
}

impl From<Vec<CandidateInOrder>> for CandidateList {
    fn from(candidates: Vec<CandidateInOrder>) -> Self {
        Self(candidates)
    }
}

impl FromIterator<CandidateInOrder> for CandidateList {
    fn from_iter<I: IntoIterator<Item = CandidateInOrder>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a CandidateInOrder;
    type IntoIter = std::slice::Iter<'a, CandidateInOrder>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
