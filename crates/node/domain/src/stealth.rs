//! Stealth addressing for UTXO outputs.
//!
//! A recipient publishes a view key `V = vG` and a spend key `S = sG`. A sender with
//! ephemeral secret `r` derives, for output index `i`:
//!
//! - `shared = keccak(compress(rV) ‖ i)`
//! - one-time key `P = H(shared)·G + S`, and one-time address `keccak(compress(P))`
//! - blinding `keccak(shared ‖ "blind")`, commitment `keccak(amount ‖ blinding)`
//! - encrypted amount `amount ⊕ keccak(shared ‖ "amount")`
//!
//! The recipient recovers `shared` as `keccak(compress(vR) ‖ i)` and spends with the one-time
//! secret `H(shared) + s`.

use alloy_primitives::{B256, U256, keccak256};
use k256::{
    FieldBytes, NonZeroScalar, ProjectivePoint, PublicKey, Scalar,
    ecdsa::SigningKey,
    elliptic_curve::{ops::Reduce, rand_core::CryptoRngCore},
};

use crate::{KeyImage, PubKey, TxError, TxSignature, UtxoOutput, UtxoSpend};

const KEY_IMAGE_DOMAIN: &[u8] = b"key-image";
const BLIND_DOMAIN: &[u8] = b"blind";
const AMOUNT_DOMAIN: &[u8] = b"amount";

fn hash_to_scalar(data: &[u8]) -> Scalar {
    <Scalar as Reduce<k256::U256>>::reduce_bytes(&FieldBytes::from(keccak256(data).0))
}

fn scalar_of(key: &SigningKey) -> Scalar {
    **key.as_nonzero_scalar()
}

fn compress(point: &ProjectivePoint) -> Result<PubKey, TxError> {
    let key = PublicKey::from_affine(point.to_affine()).map_err(|_| TxError::InvalidPublicKey)?;
    Ok(PubKey::from_public_key(&key))
}

fn shared_secret(point: &ProjectivePoint, index: u64) -> Result<B256, TxError> {
    let mut buf = Vec::with_capacity(41);
    buf.extend_from_slice(compress(point)?.as_bytes());
    buf.extend_from_slice(&index.to_be_bytes());
    Ok(keccak256(buf))
}

fn domain_hash(shared: &B256, domain: &[u8]) -> B256 {
    let mut buf = shared.to_vec();
    buf.extend_from_slice(domain);
    keccak256(buf)
}

fn xor_amount(amount: &[u8; 32], mask: &B256) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = amount[i] ^ mask[i];
    }
    out
}

/// One-time address committed to by an output.
pub fn one_time_address(key: &PubKey) -> B256 {
    keccak256(key.as_bytes())
}

/// Commitment to a UTXO amount.
pub fn amount_commitment(amount: U256, blinding: &B256) -> B256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(&amount.to_be_bytes::<32>());
    buf[32..].copy_from_slice(blinding.as_slice());
    keccak256(buf)
}

/// Key image of a one-time key, recorded when its output is spent.
pub fn key_image(one_time_key: &PubKey) -> KeyImage {
    let mut buf = KEY_IMAGE_DOMAIN.to_vec();
    buf.extend_from_slice(one_time_key.as_bytes());
    KeyImage(keccak256(buf))
}

/// Public half of a stealth key pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StealthAddress {
    /// View public key.
    pub view: PubKey,
    /// Spend public key.
    pub spend: PubKey,
}

impl StealthAddress {
    /// Derives the output paying `amount` to this address at output `index`.
    ///
    /// Returns the output and its blinding factor.
    pub fn pay(
        &self,
        ephemeral: &SigningKey,
        index: u64,
        amount: U256,
    ) -> Result<(UtxoOutput, B256), TxError> {
        let view = self.view.to_public_key()?.to_projective();
        let spend = self.spend.to_public_key()?.to_projective();
        let shared = shared_secret(&(view * scalar_of(ephemeral)), index)?;

        let one_time_key = compress(&(ProjectivePoint::GENERATOR * hash_to_scalar(shared.as_slice()) + spend))?;
        let blinding = domain_hash(&shared, BLIND_DOMAIN);
        let mask = domain_hash(&shared, AMOUNT_DOMAIN);
        let output = UtxoOutput {
            one_time_address: one_time_address(&one_time_key),
            commitment: amount_commitment(amount, &blinding),
            ephemeral_key: PubKey::from_signing_key(ephemeral),
            encrypted_amount: B256::from(xor_amount(&amount.to_be_bytes::<32>(), &mask)),
        };
        Ok((output, blinding))
    }
}

/// Private view and spend keys of a UTXO owner.
#[derive(Clone, Debug)]
pub struct StealthKeys {
    view: SigningKey,
    spend: SigningKey,
}

impl StealthKeys {
    /// Wraps existing view and spend keys.
    pub const fn new(view: SigningKey, spend: SigningKey) -> Self {
        Self { view, spend }
    }

    /// Generates fresh keys.
    pub fn random(rng: &mut impl CryptoRngCore) -> Self {
        Self::new(SigningKey::random(rng), SigningKey::random(rng))
    }

    /// Public stealth address.
    pub fn address(&self) -> StealthAddress {
        StealthAddress {
            view: PubKey::from_signing_key(&self.view),
            spend: PubKey::from_signing_key(&self.spend),
        }
    }

    /// Detects and opens an output created at `index`.
    ///
    /// Returns `None` when the output does not belong to these keys.
    pub fn scan(&self, output: &UtxoOutput, index: u64) -> Option<OwnedOutput> {
        let ephemeral = output.ephemeral_key.to_public_key().ok()?.to_projective();
        let shared = shared_secret(&(ephemeral * scalar_of(&self.view)), index).ok()?;
        let hs = hash_to_scalar(shared.as_slice());

        let secret = Option::<NonZeroScalar>::from(NonZeroScalar::new(hs + scalar_of(&self.spend)))?;
        let secret = SigningKey::from(secret);
        let one_time_key = PubKey::from_signing_key(&secret);
        if one_time_address(&one_time_key) != output.one_time_address {
            return None;
        }

        let blinding = domain_hash(&shared, BLIND_DOMAIN);
        let mask = domain_hash(&shared, AMOUNT_DOMAIN);
        let amount = U256::from_be_bytes(xor_amount(&output.encrypted_amount.0, &mask));
        if amount_commitment(amount, &blinding) != output.commitment {
            return None;
        }
        Some(OwnedOutput { amount, blinding, one_time_key, secret })
    }
}

/// An output opened by its owner.
#[derive(Clone, Debug)]
pub struct OwnedOutput {
    /// Decrypted amount.
    pub amount: U256,
    /// Blinding factor of the commitment.
    pub blinding: B256,
    /// One-time public key.
    pub one_time_key: PubKey,
    secret: SigningKey,
}

impl OwnedOutput {
    /// Key image recorded when this output is spent.
    pub fn key_image(&self) -> KeyImage {
        key_image(&self.one_time_key)
    }

    /// Builds an unsigned spend of this output stored at global `index`.
    pub fn spend(&self, index: u64) -> UtxoSpend {
        UtxoSpend {
            index,
            one_time_key: self.one_time_key,
            amount: self.amount,
            blinding: self.blinding,
            key_image: self.key_image(),
            signature: TxSignature([0u8; 65]),
        }
    }

    /// Signs `hash` with the one-time secret.
    pub fn sign(&self, hash: &B256) -> Result<TxSignature, TxError> {
        TxSignature::sign(&self.secret, hash)
    }
}
