//! Precompiled contracts at the reserved low addresses.

use alloy_primitives::{Address, B256, U256};
use bn::{AffineG1, AffineG2, Fq, Fq2, Fr, G1, G2, Group, Gt};
use hyla_domain::TxSignature;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use super::{gas::to_word_size, memory::padded_slice};
use crate::VmError;

/// Precompiled contracts by address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Precompile {
    EcRecover,
    Sha256,
    Ripemd160,
    Identity,
    ModExp,
    Bn256Add,
    Bn256Mul,
    Bn256Pairing,
}

impl Precompile {
    /// The precompile at `address`, if any.
    pub(crate) fn from_address(address: &Address) -> Option<Self> {
        let bytes = address.as_slice();
        if bytes[..19].iter().any(|b| *b != 0) {
            return None;
        }
        match bytes[19] {
            1 => Some(Self::EcRecover),
            2 => Some(Self::Sha256),
            3 => Some(Self::Ripemd160),
            4 => Some(Self::Identity),
            5 => Some(Self::ModExp),
            6 => Some(Self::Bn256Add),
            7 => Some(Self::Bn256Mul),
            8 => Some(Self::Bn256Pairing),
            _ => None,
        }
    }

    /// Gas charged for running over `input`.
    pub(crate) fn required_gas(self, input: &[u8]) -> u64 {
        let words = to_word_size(input.len() as u64);
        match self {
            Self::EcRecover => 3_000,
            Self::Sha256 => 60 + 12 * words,
            Self::Ripemd160 => 600 + 120 * words,
            Self::Identity => 15 + 3 * words,
            Self::ModExp => modexp_gas(input),
            Self::Bn256Add => 500,
            Self::Bn256Mul => 40_000,
            Self::Bn256Pairing => 100_000 + 80_000 * (input.len() as u64 / 192),
        }
    }

    /// Execute over `input`.
    pub(crate) fn run(self, input: &[u8]) -> Result<Vec<u8>, VmError> {
        match self {
            Self::EcRecover => Ok(ecrecover(input)),
            Self::Sha256 => Ok(Sha256::digest(input).to_vec()),
            Self::Ripemd160 => {
                let mut out = vec![0u8; 12];
                out.extend_from_slice(&Ripemd160::digest(input));
                Ok(out)
            }
            Self::Identity => Ok(input.to_vec()),
            Self::ModExp => Ok(modexp(input)),
            Self::Bn256Add => bn_add(input),
            Self::Bn256Mul => bn_mul(input),
            Self::Bn256Pairing => bn_pairing(input),
        }
    }
}

fn ecrecover(input: &[u8]) -> Vec<u8> {
    let input = padded_slice(input, U256::ZERO, 128);
    let v = U256::from_be_slice(&input[32..64]);
    if v != U256::from(27) && v != U256::from(28) {
        return Vec::new();
    }
    let mut raw = [0u8; 65];
    raw[..64].copy_from_slice(&input[64..128]);
    raw[64] = v.to::<u8>() - 27;
    let hash = B256::from_slice(&input[..32]);
    match TxSignature(raw).recover_address(&hash) {
        Ok(address) => {
            let mut out = vec![0u8; 12];
            out.extend_from_slice(address.as_slice());
            out
        }
        Err(_) => Vec::new(),
    }
}

/// Big-endian length header of a modexp argument, saturating at `u64::MAX`.
fn modexp_len(input: &[u8], offset: usize) -> u64 {
    let word = U256::from_be_slice(&padded_slice(input, U256::from(offset), 32));
    word.try_into().unwrap_or(u64::MAX)
}

fn mult_complexity(x: u128) -> u128 {
    if x <= 64 {
        x * x
    } else if x <= 1_024 {
        x * x / 4 + 96 * x - 3_072
    } else {
        (x * x / 16 + 480 * x).saturating_sub(199_680)
    }
}

fn modexp_gas(input: &[u8]) -> u64 {
    let base_len = modexp_len(input, 0);
    let exp_len = modexp_len(input, 32);
    let mod_len = modexp_len(input, 64);
    // Lengths this large cannot be paid for; the caller runs out of gas.
    if base_len > u32::MAX as u64 || exp_len > u32::MAX as u64 || mod_len > u32::MAX as u64 {
        return u64::MAX;
    }

    let body = input.get(96..).unwrap_or_default();
    let head_len = exp_len.min(32) as usize;
    let exp_head = U256::from_be_slice(&padded_slice(body, U256::from(base_len), head_len));
    let head_bits = exp_head.bit_len().saturating_sub(1) as u128;
    let adjusted = if exp_len <= 32 { head_bits } else { 8 * (exp_len as u128 - 32) + head_bits };

    let gas = mult_complexity(base_len.max(mod_len) as u128) * adjusted.max(1) / 20;
    u64::try_from(gas).unwrap_or(u64::MAX)
}

fn modexp(input: &[u8]) -> Vec<u8> {
    let base_len = modexp_len(input, 0) as usize;
    let exp_len = modexp_len(input, 32) as usize;
    let mod_len = modexp_len(input, 64) as usize;
    if base_len == 0 && mod_len == 0 {
        return Vec::new();
    }
    let body = input.get(96..).unwrap_or_default();
    let base = BigUint::from_bytes_be(&padded_slice(body, U256::ZERO, base_len));
    let exp = BigUint::from_bytes_be(&padded_slice(body, U256::from(base_len), exp_len));
    let modulus =
        BigUint::from_bytes_be(&padded_slice(body, U256::from(base_len.saturating_add(exp_len)), mod_len));

    let result = if modulus.is_zero() || modulus.is_one() {
        BigUint::zero()
    } else {
        base.modpow(&exp, &modulus)
    };
    let bytes = result.to_bytes_be();
    let mut out = vec![0u8; mod_len];
    if bytes.len() <= mod_len && !result.is_zero() {
        out[mod_len - bytes.len()..].copy_from_slice(&bytes);
    }
    out
}

fn read_fq(input: &[u8], offset: usize) -> Result<Fq, VmError> {
    Fq::from_slice(&input[offset..offset + 32]).map_err(|_| VmError::Precompile("invalid field element"))
}

fn read_g1(input: &[u8], offset: usize) -> Result<G1, VmError> {
    let x = read_fq(input, offset)?;
    let y = read_fq(input, offset + 32)?;
    if x == Fq::zero() && y == Fq::zero() {
        return Ok(G1::zero());
    }
    AffineG1::new(x, y).map(Into::into).map_err(|_| VmError::Precompile("invalid curve point"))
}

fn write_g1(point: G1) -> Result<Vec<u8>, VmError> {
    let mut out = vec![0u8; 64];
    if let Some(affine) = AffineG1::from_jacobian(point) {
        affine
            .x()
            .to_big_endian(&mut out[..32])
            .map_err(|_| VmError::Precompile("cannot encode point"))?;
        affine
            .y()
            .to_big_endian(&mut out[32..])
            .map_err(|_| VmError::Precompile("cannot encode point"))?;
    }
    Ok(out)
}

fn bn_add(input: &[u8]) -> Result<Vec<u8>, VmError> {
    let input = padded_slice(input, U256::ZERO, 128);
    let a = read_g1(&input, 0)?;
    let b = read_g1(&input, 64)?;
    write_g1(a + b)
}

fn bn_mul(input: &[u8]) -> Result<Vec<u8>, VmError> {
    let input = padded_slice(input, U256::ZERO, 96);
    let point = read_g1(&input, 0)?;
    let scalar = Fr::from_slice(&input[64..96]).map_err(|_| VmError::Precompile("invalid scalar"))?;
    write_g1(point * scalar)
}

fn bn_pairing(input: &[u8]) -> Result<Vec<u8>, VmError> {
    if input.len() % 192 != 0 {
        return Err(VmError::Precompile("bad pairing input length"));
    }
    let mut pairs = Vec::with_capacity(input.len() / 192);
    for chunk in input.chunks(192) {
        let a = read_g1(chunk, 0)?;
        let x = Fq2::new(read_fq(chunk, 96)?, read_fq(chunk, 64)?);
        let y = Fq2::new(read_fq(chunk, 160)?, read_fq(chunk, 128)?);
        let b = if x == Fq2::zero() && y == Fq2::zero() {
            G2::zero()
        } else {
            AffineG2::new(x, y).map(Into::into).map_err(|_| VmError::Precompile("invalid twist point"))?
        };
        pairs.push((a, b));
    }
    let ok = pairs.is_empty() || bn::pairing_batch(&pairs) == Gt::one();
    let mut out = vec![0u8; 32];
    out[31] = u8::from(ok);
    Ok(out)
}
