//! Recoverable secp256k1 signatures and compressed public keys.

use std::{fmt, str::FromStr};

use alloy_primitives::{Address, B256, keccak256};
use bytes::{Buf, BufMut};
use commonware_codec::{Error as CodecError, FixedSize, Read, Write};
use k256::{
    PublicKey,
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::TxError;

/// Derives the account address of a verifying key.
///
/// The address is the last 20 bytes of the keccak of the uncompressed point.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recoverable signature encoded as `r ‖ s ‖ v`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxSignature(pub [u8; 65]);

impl TxSignature {
    /// Signs a prehashed message.
    pub fn sign(key: &SigningKey, hash: &B256) -> Result<Self, TxError> {
        let (sig, recovery_id) =
            key.sign_prehash_recoverable(hash.as_slice()).map_err(|_| TxError::Signing)?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(Self(out))
    }

    /// Recovers the verifying key that produced this signature over `hash`.
    pub fn recover_key(&self, hash: &B256) -> Result<VerifyingKey, TxError> {
        let sig = Signature::from_slice(&self.0[..64]).map_err(|_| TxError::InvalidSignature)?;
        let recovery_id = RecoveryId::try_from(self.0[64]).map_err(|_| TxError::InvalidSignature)?;
        VerifyingKey::recover_from_prehash(hash.as_slice(), &sig, recovery_id)
            .map_err(|_| TxError::InvalidSignature)
    }

    /// Recovers the signer address.
    pub fn recover_address(&self, hash: &B256) -> Result<Address, TxError> {
        self.recover_key(hash).map(|key| address_of(&key))
    }
}

impl fmt::Debug for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxSignature(0x{})", hex::encode(self.0))
    }
}

impl FixedSize for TxSignature {
    const SIZE: usize = 65;
}

impl Write for TxSignature {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }
}

impl Read for TxSignature {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::EndOfBuffer);
        }
        let mut out = [0u8; 65];
        buf.copy_to_slice(&mut out);
        Ok(Self(out))
    }
}

/// Compressed SEC1 secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PubKey(pub [u8; 33]);

impl PubKey {
    /// Compresses a public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let point = key.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        Self(out)
    }

    /// Compresses a verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self::from_public_key(&PublicKey::from(key))
    }

    /// Public key of a signing key.
    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self::from_verifying_key(key.verifying_key())
    }

    /// Decompresses into a curve point.
    pub fn to_public_key(&self) -> Result<PublicKey, TxError> {
        PublicKey::from_sec1_bytes(&self.0).map_err(|_| TxError::InvalidPublicKey)
    }

    /// Decompresses into a verifying key.
    pub fn to_verifying_key(&self) -> Result<VerifyingKey, TxError> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| TxError::InvalidPublicKey)
    }

    /// Account address of this key.
    pub fn address(&self) -> Result<Address, TxError> {
        self.to_verifying_key().map(|key| address_of(&key))
    }

    /// Raw compressed bytes.
    pub const fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({self})")
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for PubKey {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim_start_matches("0x")).map_err(|_| TxError::InvalidPublicKey)?;
        let bytes: [u8; 33] = raw.try_into().map_err(|_| TxError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }
}

impl Serialize for PubKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FixedSize for PubKey {
    const SIZE: usize = 33;
}

impl Write for PubKey {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }
}

impl Read for PubKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        if buf.remaining() < Self::SIZE {
            return Err(CodecError::EndOfBuffer);
        }
        let mut out = [0u8; 33];
        buf.copy_to_slice(&mut out);
        Ok(Self(out))
    }
}

#[cfg(test)]
mod tests {
    use commonware_codec::{DecodeExt, Encode};

    use super::*;

    fn key_from_byte(byte: u8) -> SigningKey {
        let bytes = [byte; 32];
        SigningKey::from_bytes(&bytes.into()).expect("valid key")
    }

    #[test]
    fn sign_and_recover() {
        let key = key_from_byte(7);
        let hash = keccak256(b"payload");
        let sig = TxSignature::sign(&key, &hash).expect("sign");
        let recovered = sig.recover_address(&hash).expect("recover");
        assert_eq!(recovered, address_of(key.verifying_key()));
    }

    #[test]
    fn recover_with_other_hash_yields_other_address() {
        let key = key_from_byte(7);
        let sig = TxSignature::sign(&key, &keccak256(b"a")).expect("sign");
        let other = sig.recover_address(&keccak256(b"b"));
        assert_ne!(other.ok(), Some(address_of(key.verifying_key())));
    }

    #[test]
    fn bad_recovery_byte_is_rejected() {
        let key = key_from_byte(9);
        let hash = keccak256(b"x");
        let mut sig = TxSignature::sign(&key, &hash).expect("sign");
        sig.0[64] = 9;
        assert!(matches!(sig.recover_address(&hash), Err(TxError::InvalidSignature)));
    }

    #[test]
    fn pubkey_address_matches_signer() {
        let key = key_from_byte(3);
        let pubkey = PubKey::from_signing_key(&key);
        assert_eq!(pubkey.address().expect("address"), address_of(key.verifying_key()));
        assert!(pubkey.0[0] == 0x02 || pubkey.0[0] == 0x03);
    }

    #[test]
    fn pubkey_hex_roundtrip() {
        let pubkey = PubKey::from_signing_key(&key_from_byte(5));
        let parsed: PubKey = pubkey.to_string().parse().expect("parse");
        assert_eq!(parsed, pubkey);

        let json = serde_json::to_string(&pubkey).expect("json");
        let back: PubKey = serde_json::from_str(&json).expect("json back");
        assert_eq!(back, pubkey);
    }

    #[test]
    fn invalid_pubkey_is_rejected() {
        let pubkey = PubKey([0xff; 33]);
        assert!(matches!(pubkey.address(), Err(TxError::InvalidPublicKey)));
        assert!("0x1234".parse::<PubKey>().is_err());
    }

    #[test]
    fn signature_codec() {
        let sig = TxSignature::sign(&key_from_byte(1), &B256::ZERO).expect("sign");
        assert_eq!(sig.encode().len(), TxSignature::SIZE);
        assert_eq!(TxSignature::decode(sig.encode()).expect("decode"), sig);
    }
}
