//! Core execution traits.

use hyla_domain::{Block, Validator};
use hyla_election::CandidateList;
use hyla_state::WorldState;

use crate::{ProcessError, ProcessResult};

/// Executes blocks against world state.
///
/// Implementations must be deterministic: the same block over the same state yields the same
/// [`ProcessResult`] on every node.
pub trait BlockExecutor: Clone + Send + Sync + 'static {
    /// Execute `block` on `state`, advancing `candidates` with the block's evidence.
    ///
    /// `validators` is the set that signs multi-signed transactions at this height. On error the
    /// state is left partially modified and must be discarded.
    fn process(
        &self,
        block: &Block,
        state: &mut WorldState,
        candidates: CandidateList,
        validators: &[Validator],
    ) -> Result<ProcessResult, ProcessError>;
}
