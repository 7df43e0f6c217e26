//! Candidate scoring from block evidence.

use hyla_domain::{CandidateInOrder, Coefficient, Evidence, PubKey};
use hyla_state::WorldState;
use tracing::{debug, warn};

use crate::{CandidateList, ElectionError};

/// Consecutive rounds needed before a score moves.
pub const TWO_CONSECUTIVE: i32 = 2;

/// Missed rounds after which a candidate is moved to the end of the list.
pub const THRESHOLD: i32 = 3;

/// Production counter of a candidate caught double voting.
pub const PUNISH_THRESHOLD: i32 = -10;

/// Score edit mirrored into the candidate registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoreOp {
    /// Reset to zero and record the punishment height.
    Clear,
    /// Increment, capped at the maximum score.
    Add,
    /// Decrement, floored at one.
    Sub,
}

/// Apply `op` to the registered score of `pub_key`.
///
/// Returns `false` when the key is not registered or the score is already at its bound.
pub fn update_candidate_score(
    state: &mut WorldState,
    pub_key: &PubKey,
    op: ScoreOp,
    max_score: i64,
    height: u64,
) -> Result<bool, ElectionError> {
    let Some(current) = state.candidates()?.into_iter().find(|c| c.pub_key == *pub_key) else {
        return Ok(false);
    };
    let updated = match op {
        ScoreOp::Clear => Some((0, Some(height))),
        ScoreOp::Add if current.score < max_score => Some((current.score + 1, None)),
        ScoreOp::Sub if current.score > 1 => Some((current.score - 1, None)),
        ScoreOp::Add | ScoreOp::Sub => None,
    };
    let Some((score, punish_height)) = updated else {
        return Ok(false);
    };
    debug!(%pub_key, ?op, score, "update candidate score");
    Ok(state.set_candidate_score(pub_key, score, punish_height)?)
}

impl CandidateList {
    /// Adjust production counters and scores from the evidence of the block at `height`.
    pub fn apply_evidence(
        &mut self,
        state: &mut WorldState,
        evidence: &[Evidence],
        coefficient: &Coefficient,
        height: u64,
    ) -> Result<(), ElectionError> {
        for item in evidence {
            match item {
                Evidence::DuplicateVote { pub_key, .. } => {
                    if let Some(candidate) = self.find_mut(pub_key) {
                        candidate.produce_info = PUNISH_THRESHOLD;
                        candidate.score = 0;
                        update_candidate_score(state, pub_key, ScoreOp::Clear, coefficient.max_score, height)?;
                        warn!(height, %pub_key, "clear score");
                    }
                }
                Evidence::FaultValidators { proposer, fault_validator, round } => {
                    if let Some(candidate) = self.find_mut(proposer)
                        && reward(candidate, coefficient.max_score)
                    {
                        update_candidate_score(state, proposer, ScoreOp::Add, coefficient.max_score, height)?;
                        debug!(height, %proposer, "increase score");
                    }
                    if *round > 0
                        && let Some(candidate) = self.find_mut(fault_validator)
                        && punish(candidate)
                    {
                        update_candidate_score(state, fault_validator, ScoreOp::Sub, coefficient.max_score, height)?;
                        warn!(height, %fault_validator, "decrease score");
                    }
                }
            }
        }
        Ok(())
    }

    fn find_mut(&mut self, pub_key: &PubKey) -> Option<&mut CandidateInOrder> {
        self.0.iter_mut().find(|c| c.pub_key == *pub_key)
    }
}

/// Count a produced round; returns whether the score should rise.
const fn reward(candidate: &mut CandidateInOrder, max_score: i64) -> bool {
    if candidate.produce_info < 0 {
        candidate.produce_info = 0;
    }
    candidate.produce_info += 1;
    if candidate.produce_info <= TWO_CONSECUTIVE {
        return false;
    }
    candidate.produce_info = 0;
    if candidate.score < max_score {
        candidate.score += 1;
    }
    true
}

/// Count a missed round; returns whether the score should fall.
const fn punish(candidate: &mut CandidateInOrder) -> bool {
    if candidate.produce_info > 0 {
        candidate.produce_info = 0;
    }
    candidate.produce_info -= 1;
    if candidate.produce_info > -TWO_CONSECUTIVE {
        return false;
    }
    if candidate.score > 1 {
        candidate.score -= 1;
    }
    true
}
