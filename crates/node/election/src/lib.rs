//! Candidate scoring, ranking and validator election for hyla.
#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hyla-chain/hyla/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::ElectionError;

mod list;
pub use list::CandidateList;

mod rank;
pub use rank::{rand_tag, rank_candidates, rank_of, seed_of, weighted_order};

mod score;
pub use score::{PUNISH_THRESHOLD, ScoreOp, THRESHOLD, TWO_CONSECUTIVE, update_candidate_score};
