//! Multi-signature authorized transactions.
//!
//! Contract creation and upgrade are signed by the sender plus enough members of the signer
//! set configured for their kind. The signer sets themselves are installed by a
//! [`MultiSignAccountTx`] signed by more than two thirds of the validator voting power.

use std::collections::HashSet;

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, RangeCfg, Read, ReadExt, Write};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};

use crate::{Idents, TxCfg, TxError, TxKind, TxSignature, Validator};

/// Gas budget of contract creation and upgrade transactions.
pub const CONTRACT_TX_GAS: u64 = 100_000_000;

/// Maximum number of signatures carried by one transaction.
pub const MAX_SIGNATURES: usize = 256;

/// Account holding the multi-sign nonce and signer sets.
pub const MULTI_SIGN_NONCE_ADDRESS: Address = {
    let mut bytes = [0u8; 20];
    bytes[17] = b'm';
    bytes[18] = b's';
    bytes[19] = b't';
    Address::new(bytes)
};

/// One authorized signer and its power.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEntry {
    /// Signer address.
    #[serde(rename = "addr")]
    pub address: Address,
    /// Signer power.
    pub power: u32,
}

/// Signer set authorizing one kind of privileged transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignersInfo {
    /// Power required for authorization.
    pub min_signer_power: u32,
    /// Authorized signers.
    pub signers: Vec<SignerEntry>,
}

impl SignersInfo {
    /// Verifies that `signatures` over `hash` include `sender` and reach the minimum power.
    pub fn verify_sender(
        &self,
        sender: Address,
        hash: &B256,
        signatures: &[TxSignature],
    ) -> Result<(), TxError> {
        if self.signers.is_empty() {
            return Err(TxError::NoSigners);
        }
        let mut seen = HashSet::new();
        let mut power = 0u32;
        let mut sender_signed = false;
        for signature in signatures {
            let Ok(signer) = signature.recover_address(hash) else {
                continue;
            };
            if !seen.insert(signer) {
                continue;
            }
            power = power.saturating_add(
                self.signers.iter().filter(|s| s.address == signer).map(|s| s.power).sum(),
            );
            sender_signed |= signer == sender;
            if sender_signed && power >= self.min_signer_power {
                return Ok(());
            }
        }
        if !sender_signed {
            return Err(TxError::SenderNotSigned(sender));
        }
        Err(TxError::InsufficientSignerPower {
            got: i64::from(power),
            needed: i64::from(self.min_signer_power),
        })
    }
}

impl Write for SignerEntry {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_address(&self.address, buf);
        self.power.write(buf);
    }
}

impl EncodeSize for SignerEntry {
    fn encode_size(&self) -> usize {
        20 + self.power.encode_size()
    }
}

impl Read for SignerEntry {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        Ok(Self { address: Idents::read_address(buf)?, power: u32::read(buf)? })
    }
}

impl Write for SignersInfo {
    fn write(&self, buf: &mut impl BufMut) {
        self.min_signer_power.write(buf);
        self.signers.write(buf);
    }
}

impl EncodeSize for SignersInfo {
    fn encode_size(&self) -> usize {
        self.min_signer_power.encode_size() + self.signers.encode_size()
    }
}

impl Read for SignersInfo {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        let min_signer_power = u32::read(buf)?;
        let signers = Vec::<SignerEntry>::read_cfg(buf, &(RangeCfg::new(0..=MAX_SIGNATURES), ()))?;
        Ok(Self { min_signer_power, signers })
    }
}

fn signing_hash(kind: TxKind, write: impl FnOnce(&mut Vec<u8>)) -> B256 {
    let mut buf = vec![kind as u8];
    write(&mut buf);
    keccak256(buf)
}

fn read_signatures(buf: &mut impl Buf) -> Result<Vec<TxSignature>, CodecError> {
    Vec::<TxSignature>::read_cfg(buf, &(RangeCfg::new(0..=MAX_SIGNATURES), ()))
}

/// Multi-signed contract deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractCreateTx {
    /// Deployer, who must be among the signers.
    pub from: Address,
    /// Deployer nonce.
    pub nonce: u64,
    /// Native value endowed to the new contract.
    pub value: U256,
    /// Init code.
    pub code: Bytes,
    /// Signatures over the signing hash.
    pub signatures: Vec<TxSignature>,
}

impl ContractCreateTx {
    /// Builds an unsigned deployment.
    pub const fn new(from: Address, nonce: u64, value: U256, code: Bytes) -> Self {
        Self { from, nonce, value, code, signatures: Vec::new() }
    }

    /// Hash signed by every signer.
    pub fn signing_hash(&self) -> B256 {
        signing_hash(TxKind::ContractCreate, |buf| self.write_unsigned(buf))
    }

    /// Appends a signature by `key`.
    pub fn add_signature(&mut self, key: &SigningKey) -> Result<(), TxError> {
        self.signatures.push(TxSignature::sign(key, &self.signing_hash())?);
        Ok(())
    }

    /// Verifies the signatures against the signer set for contract creation.
    pub fn verify(&self, signers: &SignersInfo) -> Result<(), TxError> {
        signers.verify_sender(self.from, &self.signing_hash(), &self.signatures)
    }

    fn write_unsigned(&self, buf: &mut impl BufMut) {
        Idents::write_address(&self.from, buf);
        self.nonce.write(buf);
        Idents::write_u256(&self.value, buf);
        Idents::write_bytes(&self.code, buf);
    }
}

impl Write for ContractCreateTx {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_unsigned(buf);
        self.signatures.write(buf);
    }
}

impl EncodeSize for ContractCreateTx {
    fn encode_size(&self) -> usize {
        20 + self.nonce.encode_size()
            + 32
            + Idents::bytes_size(&self.code)
            + self.signatures.encode_size()
    }
}

impl Read for ContractCreateTx {
    type Cfg = TxCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        let from = Idents::read_address(buf)?;
        let nonce = u64::read(buf)?;
        let value = Idents::read_u256(buf)?;
        let code = Idents::read_bytes(buf, cfg.max_tx_bytes)?;
        let signatures = read_signatures(buf)?;
        Ok(Self { from, nonce, value, code, signatures })
    }
}

/// Multi-signed replacement of a contract's code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractUpgradeTx {
    /// Upgrader, who must be among the signers.
    pub from: Address,
    /// Contract being upgraded.
    pub contract: Address,
    /// Upgrader nonce.
    pub nonce: u64,
    /// Replacement code.
    pub code: Bytes,
    /// Signatures over the signing hash.
    pub signatures: Vec<TxSignature>,
}

impl ContractUpgradeTx {
    /// Builds an unsigned upgrade.
    pub const fn new(from: Address, contract: Address, nonce: u64, code: Bytes) -> Self {
        Self { from, contract, nonce, code, signatures: Vec::new() }
    }

    /// Hash signed by every signer.
    pub fn signing_hash(&self) -> B256 {
        signing_hash(TxKind::ContractUpgrade, |buf| self.write_unsigned(buf))
    }

    /// Appends a signature by `key`.
    pub fn add_signature(&mut self, key: &SigningKey) -> Result<(), TxError> {
        self.signatures.push(TxSignature::sign(key, &self.signing_hash())?);
        Ok(())
    }

    /// Verifies the signatures against the signer set for contract upgrade.
    pub fn verify(&self, signers: &SignersInfo) -> Result<(), TxError> {
        signers.verify_sender(self.from, &self.signing_hash(), &self.signatures)
    }

    fn write_unsigned(&self, buf: &mut impl BufMut) {
        Idents::write_address(&self.from, buf);
        Idents::write_address(&self.contract, buf);
        self.nonce.write(buf);
        Idents::write_bytes(&self.code, buf);
    }
}

impl Write for ContractUpgradeTx {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_unsigned(buf);
        self.signatures.write(buf);
    }
}

impl EncodeSize for ContractUpgradeTx {
    fn encode_size(&self) -> usize {
        40 + self.nonce.encode_size() + Idents::bytes_size(&self.code) + self.signatures.encode_size()
    }
}

impl Read for ContractUpgradeTx {
    type Cfg = TxCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        let from = Idents::read_address(buf)?;
        let contract = Idents::read_address(buf)?;
        let nonce = u64::read(buf)?;
        let code = Idents::read_bytes(buf, cfg.max_tx_bytes)?;
        let signatures = read_signatures(buf)?;
        Ok(Self { from, contract, nonce, code, signatures })
    }
}

/// A validator's signature on a [`MultiSignAccountTx`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorSign {
    /// Claimed validator address.
    pub address: Address,
    /// Signature over the signing hash.
    pub signature: TxSignature,
}

impl Write for ValidatorSign {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_address(&self.address, buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for ValidatorSign {
    fn encode_size(&self) -> usize {
        20 + self.signature.encode_size()
    }
}

impl Read for ValidatorSign {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        Ok(Self { address: Idents::read_address(buf)?, signature: TxSignature::read(buf)? })
    }
}

/// Installs the signer set for one privileged transaction kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiSignAccountTx {
    /// Nonce of [`MULTI_SIGN_NONCE_ADDRESS`].
    pub nonce: u64,
    /// Kind governed by the new signer set.
    pub kind: TxKind,
    /// The new signer set.
    pub signers: SignersInfo,
    /// Validator signatures.
    pub signatures: Vec<ValidatorSign>,
}

impl MultiSignAccountTx {
    /// Builds an unsigned signer-set update.
    pub const fn new(nonce: u64, kind: TxKind, signers: SignersInfo) -> Self {
        Self { nonce, kind, signers, signatures: Vec::new() }
    }

    /// Hash signed by the validators.
    pub fn signing_hash(&self) -> B256 {
        signing_hash(TxKind::MultiSignAccount, |buf| self.write_unsigned(buf))
    }

    /// Appends a validator signature by `key`.
    pub fn add_signature(&mut self, key: &SigningKey) -> Result<(), TxError> {
        let signature = TxSignature::sign(key, &self.signing_hash())?;
        let address = crate::address_of(key.verifying_key());
        self.signatures.push(ValidatorSign { address, signature });
        Ok(())
    }

    /// Verifies that more than two thirds of the validator power signed.
    ///
    /// Signatures that do not recover to their claimed address are skipped.
    pub fn verify(&self, validators: &[Validator]) -> Result<(), TxError> {
        if validators.is_empty() {
            return Err(TxError::NoSigners);
        }
        let total: i64 = validators.iter().map(|v| v.voting_power as i64).sum();
        let needed = total * 2 / 3;
        let hash = self.signing_hash();
        let mut seen = HashSet::new();
        let mut power = 0i64;
        for sign in &self.signatures {
            if !seen.insert(sign.address) {
                return Err(TxError::DuplicateSigner(sign.address));
            }
            let validator = validators
                .iter()
                .find(|v| v.address == sign.address)
                .ok_or(TxError::UnknownSigner(sign.address))?;
            if sign.signature.recover_address(&hash).ok() != Some(sign.address) {
                continue;
            }
            power += validator.voting_power as i64;
            if power > needed {
                return Ok(());
            }
        }
        Err(TxError::InsufficientSignerPower { got: power, needed: needed + 1 })
    }

    fn write_unsigned(&self, buf: &mut impl BufMut) {
        self.nonce.write(buf);
        buf.put_u8(self.kind as u8);
        self.signers.write(buf);
    }
}

impl Write for MultiSignAccountTx {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_unsigned(buf);
        self.signatures.write(buf);
    }
}

impl EncodeSize for MultiSignAccountTx {
    fn encode_size(&self) -> usize {
        self.nonce.encode_size() + 1 + self.signers.encode_size() + self.signatures.encode_size()
    }
}

impl Read for MultiSignAccountTx {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        let nonce = u64::read(buf)?;
        let kind = TxKind::try_from(Idents::read_u8(buf)?)?;
        let signers = SignersInfo::read(buf)?;
        let signatures =
            Vec::<ValidatorSign>::read_cfg(buf, &(RangeCfg::new(0..=MAX_SIGNATURES), ()))?;
        Ok(Self { nonce, kind, signers, signatures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PubKey, address_of};

    fn key_from_byte(byte: u8) -> SigningKey {
        let bytes = [byte; 32];
        SigningKey::from_bytes(&bytes.into()).expect("valid key")
    }

    fn addr(key: &SigningKey) -> Address {
        address_of(key.verifying_key())
    }

    fn signers(keys: &[&SigningKey], min: u32) -> SignersInfo {
        SignersInfo {
            min_signer_power: min,
            signers: keys.iter().map(|k| SignerEntry { address: addr(k), power: 1 }).collect(),
        }
    }

    fn validator(key: &SigningKey, power: u64) -> Validator {
        Validator::new(PubKey::from_signing_key(key), power).expect("validator")
    }

    #[test]
    fn multi_sign_nonce_address_is_mst() {
        assert_eq!(&MULTI_SIGN_NONCE_ADDRESS.as_slice()[17..], b"mst");
    }

    #[test]
    fn create_requires_sender_signature() {
        let (a, b) = (key_from_byte(1), key_from_byte(2));
        let info = signers(&[&a, &b], 1);

        let mut tx = ContractCreateTx::new(addr(&a), 0, U256::ZERO, Bytes::from_static(&[1]));
        tx.add_signature(&b).expect("sign");
        assert!(matches!(tx.verify(&info), Err(TxError::SenderNotSigned(_))));

        tx.add_signature(&a).expect("sign");
        assert!(tx.verify(&info).is_ok());
    }

    #[test]
    fn create_requires_min_power() {
        let (a, b, c) = (key_from_byte(1), key_from_byte(2), key_from_byte(3));
        let info = signers(&[&a, &b, &c], 2);

        let mut tx = ContractCreateTx::new(addr(&a), 0, U256::ZERO, Bytes::from_static(&[1]));
        tx.add_signature(&a).expect("sign");
        tx.add_signature(&a).expect("sign");
        assert!(matches!(
            tx.verify(&info),
            Err(TxError::InsufficientSignerPower { got: 1, needed: 2 })
        ));

        tx.add_signature(&c).expect("sign");
        assert!(tx.verify(&info).is_ok());
    }

    #[test]
    fn upgrade_signature_does_not_authorize_create() {
        let a = key_from_byte(1);
        let info = signers(&[&a], 1);
        let mut upgrade =
            ContractUpgradeTx::new(addr(&a), Address::repeat_byte(9), 0, Bytes::from_static(&[1]));
        upgrade.add_signature(&a).expect("sign");
        assert!(upgrade.verify(&info).is_ok());

        let create = ContractCreateTx {
            signatures: upgrade.signatures.clone(),
            ..ContractCreateTx::new(addr(&a), 0, U256::ZERO, Bytes::from_static(&[1]))
        };
        assert!(create.verify(&info).is_err());
    }

    #[test]
    fn multi_sign_needs_two_thirds() {
        let keys: Vec<_> = (1..=3).map(key_from_byte).collect();
        let validators: Vec<_> = keys.iter().map(|k| validator(k, 10)).collect();
        let mut tx = MultiSignAccountTx::new(0, TxKind::ContractCreate, signers(&[&keys[0]], 1));

        tx.add_signature(&keys[0]).expect("sign");
        tx.add_signature(&keys[1]).expect("sign");
        assert!(matches!(tx.verify(&validators), Err(TxError::InsufficientSignerPower { .. })));

        tx.add_signature(&keys[2]).expect("sign");
        assert!(tx.verify(&validators).is_ok());
    }

    #[test]
    fn multi_sign_rejects_unknown_and_duplicate() {
        let keys: Vec<_> = (1..=2).map(key_from_byte).collect();
        let validators = vec![validator(&keys[0], 1)];
        let mut tx = MultiSignAccountTx::new(0, TxKind::ContractUpgrade, SignersInfo::default());
        tx.add_signature(&keys[1]).expect("sign");
        assert!(matches!(tx.verify(&validators), Err(TxError::UnknownSigner(_))));

        let mut tx = MultiSignAccountTx::new(0, TxKind::ContractUpgrade, SignersInfo::default());
        tx.add_signature(&keys[0]).expect("sign");
        tx.signatures.push(tx.signatures[0].clone());
        let strong = vec![validator(&keys[0], 1), validator(&keys[1], 10)];
        assert!(matches!(tx.verify(&strong), Err(TxError::DuplicateSigner(_))));
    }

    #[test]
    fn signers_info_json_shape() {
        let info = SignersInfo {
            min_signer_power: 2,
            signers: vec![SignerEntry { address: Address::repeat_byte(1), power: 3 }],
        };
        let json = serde_json::to_value(&info).expect("json");
        assert_eq!(json["minSignerPower"], 2);
        assert_eq!(json["signers"][0]["power"], 3);
        assert!(json["signers"][0]["addr"].is_string());
    }
}
