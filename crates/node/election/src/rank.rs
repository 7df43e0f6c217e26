//! Periodic ranking of registered candidates.

use alloy_primitives::{B256, U256, keccak256};
use hyla_domain::{CalRate, CandidateInOrder, Coefficient};
use hyla_state::WorldState;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{FromPrimitive, Zero};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::{CandidateList, ElectionError};

const COIN: u64 = 1_000_000_000_000_000_000;

/// First eight bytes of `hash` as a big-endian integer.
pub fn seed_of(hash: &B256) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_be_bytes(bytes)
}

/// Random tag of `address` for the ranking seeded by `hash`.
pub fn rand_tag(hash: &B256, address: &alloy_primitives::Address) -> i64 {
    let mut preimage = Vec::with_capacity(52);
    preimage.extend_from_slice(hash.as_slice());
    preimage.extend_from_slice(address.as_slice());
    (seed_of(&keccak256(preimage)) & i64::MAX as u64) as i64
}

fn ratio(numer: i64, denom: i64) -> BigRational {
    if denom == 0 {
        return BigRational::zero();
    }
    BigRational::new(BigInt::from(numer), BigInt::from(denom))
}

/// Weighted rank of a candidate.
///
/// `srate × score / sub_score + drate × deposit / max_deposit + rrate × rand / i64::MAX`,
/// with the weights normalized to sum to one.
pub fn rank_of(candidate: &CandidateInOrder, rates: &CalRate, max_deposit: i64, sub_score: i64) -> BigRational {
    let total = rates.srate + rates.drate + rates.rrate;
    let score = ratio(rates.srate, total) * ratio(candidate.score, sub_score);
    let deposit = ratio(rates.drate, total) * ratio(candidate.deposit, max_deposit);
    let random = ratio(rates.rrate, total) * ratio(candidate.rand, i64::MAX);
    score + deposit + random
}

/// Draw an order weighted by `ranks`, seeded by `seed`.
///
/// Position `i` is drawn from the remaining candidates with probability proportional
/// to their rank. Returns the permutation as indices into `ranks`.
pub fn weighted_order(ranks: &[BigRational], seed: u64) -> Vec<usize> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..ranks.len()).collect();
    for i in 0..order.len().saturating_sub(1) {
        let draw = BigRational::from_f64(rng.r#gen::<f64>()).unwrap_or_else(BigRational::zero);
        let mut bounds = Vec::with_capacity(order.len() - i);
        let mut acc = BigRational::zero();
        for &index in &order[i..] {
            acc += &ranks[index];
            bounds.push(acc.clone());
        }
        let target = draw * &acc;
        let picked = bounds.iter().position(|bound| target < *bound).unwrap_or(0);
        order.swap(i, i + picked);
    }
    order
}

fn whole_coins(address: &alloy_primitives::Address, amount: U256) -> Result<i64, ElectionError> {
    let coins = amount / U256::from(COIN);
    i64::try_from(coins).map_err(|_| ElectionError::DepositOutOfRange(*address))
}

/// Rank every registered candidate with a positive score.
///
/// Deposits are read from the pledge registry by coinbase.
pub fn rank_candidates(
    state: &WorldState,
    last_commit_hash: &B256,
    coefficient: &Coefficient,
) -> Result<CandidateList, ElectionError> {
    let deposits = state.deposits()?;
    let mut candidates = Vec::new();
    for registered in state.candidates()?.iter().filter(|c| c.score > 0) {
        let mut candidate = CandidateInOrder::from_state(registered);
        candidate.rand = rand_tag(last_commit_hash, &registered.address);
        let deposit = deposits.get(&registered.coinbase).copied().unwrap_or_default();
        candidate.deposit = whole_coins(&registered.coinbase, deposit)?;
        candidates.push(candidate);
    }

    let max_deposit = candidates.iter().map(|c| c.deposit).max().unwrap_or(1).max(1);
    let sub_score = candidates.iter().map(|c| c.score).sum();
    let ranks: Vec<BigRational> =
        candidates.iter().map(|c| rank_of(c, &coefficient.cal_rate, max_deposit, sub_score)).collect();

    let order = weighted_order(&ranks, seed_of(last_commit_hash));
    let mut slots: Vec<Option<CandidateInOrder>> = candidates.into_iter().map(Some).collect();
    let ranked: Vec<CandidateInOrder> = order
        .into_iter()
        .enumerate()
        .filter_map(|(rank, index)| {
            let mut candidate = slots[index].take()?;
            candidate.rank = rank;
            Some(candidate)
        })
        .collect();
    debug!(count = ranked.len(), max_deposit, sub_score, "ranked candidates");
    Ok(ranked.into())
}
