//! Hybrid UTXO transactions.

use std::{collections::HashSet, fmt, ops::BitOr};

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, RangeCfg, Read, ReadExt, Write};
use hyla_primitives::PAR_GAS_PRICE;
use k256::ecdsa::SigningKey;

use crate::{
    Idents, KeyImage, PubKey, TxCfg, TxError, TxKind, TxSignature, amount_commitment, key_image,
    one_time_address,
};

/// Maximum number of inputs or outputs of a UTXO transaction.
pub const MAX_UTXO_ENTRIES: usize = 64;

/// Input/output mix of a UTXO transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UtxoKind(u8);

impl UtxoKind {
    /// No inputs or outputs.
    pub const EMPTY: Self = Self(0);
    /// Spends a UTXO.
    pub const UIN: Self = Self(0x01);
    /// Debits an account.
    pub const AIN: Self = Self(0x02);
    /// Creates a UTXO.
    pub const UOUT: Self = Self(0x04);
    /// Credits an account.
    pub const AOUT: Self = Self(0x08);

    /// Raw flag bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` when every flag of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` when any flag of `other` is set.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for UtxoKind {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for UtxoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [(Self::UIN, "Uin"), (Self::AIN, "Ain"), (Self::UOUT, "Uout"), (Self::AOUT, "Aout")];
        let set: Vec<_> = names.iter().filter(|(k, _)| self.contains(*k)).map(|(_, n)| *n).collect();
        write!(f, "UtxoKind({})", set.join("|"))
    }
}

/// A stealth output as stored in the UTXO set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoOutput {
    /// Keccak of the one-time public key.
    pub one_time_address: B256,
    /// Commitment to the amount.
    pub commitment: B256,
    /// Sender's ephemeral public key.
    pub ephemeral_key: PubKey,
    /// Amount masked with the shared secret.
    pub encrypted_amount: B256,
}

impl Write for UtxoOutput {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_b256(&self.one_time_address, buf);
        Idents::write_b256(&self.commitment, buf);
        self.ephemeral_key.write(buf);
        Idents::write_b256(&self.encrypted_amount, buf);
    }
}

impl FixedSize for UtxoOutput {
    const SIZE: usize = 32 + 32 + PubKey::SIZE + 32;
}

impl Read for UtxoOutput {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        Ok(Self {
            one_time_address: Idents::read_b256(buf)?,
            commitment: Idents::read_b256(buf)?,
            ephemeral_key: PubKey::read(buf)?,
            encrypted_amount: Idents::read_b256(buf)?,
        })
    }
}

/// Spend of a stored UTXO, opened by its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoSpend {
    /// Global index of the spent output.
    pub index: u64,
    /// One-time public key of the spent output.
    pub one_time_key: PubKey,
    /// Opened amount.
    pub amount: U256,
    /// Opened blinding factor.
    pub blinding: B256,
    /// Key image of the one-time key.
    pub key_image: KeyImage,
    /// Signature by the one-time secret over the transaction signing hash.
    pub signature: TxSignature,
}

impl UtxoSpend {
    /// Verifies this spend against the output it references.
    ///
    /// `position` is the input position, used in error reporting.
    pub fn verify(&self, output: &UtxoOutput, hash: &B256, position: usize) -> Result<(), TxError> {
        if one_time_address(&self.one_time_key) != output.one_time_address {
            return Err(TxError::OneTimeAddressMismatch(position));
        }
        if amount_commitment(self.amount, &self.blinding) != output.commitment {
            return Err(TxError::CommitmentMismatch(position));
        }
        self.verify_signature(hash, position)
    }

    /// Verifies the key image derivation and the owner signature.
    pub fn verify_signature(&self, hash: &B256, position: usize) -> Result<(), TxError> {
        if key_image(&self.one_time_key) != self.key_image {
            return Err(TxError::KeyImageMismatch(position));
        }
        if self.signature.recover_address(hash)? != self.one_time_key.address()? {
            return Err(TxError::InvalidSignature);
        }
        Ok(())
    }

    fn write_unsigned(&self, buf: &mut impl BufMut) {
        self.index.write(buf);
        self.one_time_key.write(buf);
        Idents::write_u256(&self.amount, buf);
        Idents::write_b256(&self.blinding, buf);
        self.key_image.write(buf);
    }
}

/// Input of a UTXO transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UtxoInput {
    /// Debit of the signing account.
    Account {
        /// Sender nonce.
        nonce: u64,
        /// Amount debited in the transaction token.
        amount: U256,
    },
    /// Spend of a stored output.
    Utxo(UtxoSpend),
}

impl UtxoInput {
    /// Amount contributed by this input.
    pub const fn amount(&self) -> U256 {
        match self {
            Self::Account { amount, .. } => *amount,
            Self::Utxo(spend) => spend.amount,
        }
    }

    fn write_unsigned(&self, buf: &mut impl BufMut) {
        match self {
            Self::Account { nonce, amount } => {
                buf.put_u8(0);
                nonce.write(buf);
                Idents::write_u256(amount, buf);
            }
            Self::Utxo(spend) => {
                buf.put_u8(1);
                spend.write_unsigned(buf);
            }
        }
    }
}

impl Write for UtxoInput {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_unsigned(buf);
        if let Self::Utxo(spend) = self {
            spend.signature.write(buf);
        }
    }
}

impl EncodeSize for UtxoInput {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Account { .. } => 8 + 32,
            Self::Utxo(_) => 8 + PubKey::SIZE + 32 + 32 + KeyImage::SIZE + TxSignature::SIZE,
        }
    }
}

impl Read for UtxoInput {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        match Idents::read_u8(buf)? {
            0 => Ok(Self::Account { nonce: u64::read(buf)?, amount: Idents::read_u256(buf)? }),
            1 => Ok(Self::Utxo(UtxoSpend {
                index: u64::read(buf)?,
                one_time_key: PubKey::read(buf)?,
                amount: Idents::read_u256(buf)?,
                blinding: Idents::read_b256(buf)?,
                key_image: KeyImage::read(buf)?,
                signature: TxSignature::read(buf)?,
            })),
            tag => Err(CodecError::InvalidEnum(tag)),
        }
    }
}

/// Output of a UTXO transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOutput {
    /// Credit to an account, calling it when it holds code.
    Account {
        /// Recipient.
        to: Address,
        /// Amount credited.
        amount: U256,
        /// Call data for contract recipients.
        data: Bytes,
    },
    /// New stealth output.
    Utxo {
        /// Amount locked in the output.
        amount: U256,
        /// Stored output.
        output: UtxoOutput,
    },
}

impl TxOutput {
    /// Amount carried by this output.
    pub const fn amount(&self) -> U256 {
        match self {
            Self::Account { amount, .. } | Self::Utxo { amount, .. } => *amount,
        }
    }
}

impl Write for TxOutput {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Self::Account { to, amount, data } => {
                buf.put_u8(0);
                Idents::write_address(to, buf);
                Idents::write_u256(amount, buf);
                Idents::write_bytes(data, buf);
            }
            Self::Utxo { amount, output } => {
                buf.put_u8(1);
                Idents::write_u256(amount, buf);
                output.write(buf);
            }
        }
    }
}

impl EncodeSize for TxOutput {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Account { data, .. } => 20 + 32 + Idents::bytes_size(data),
            Self::Utxo { .. } => 32 + UtxoOutput::SIZE,
        }
    }
}

impl Read for TxOutput {
    type Cfg = TxCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        match Idents::read_u8(buf)? {
            0 => Ok(Self::Account {
                to: Idents::read_address(buf)?,
                amount: Idents::read_u256(buf)?,
                data: Idents::read_bytes(buf, cfg.max_tx_bytes)?,
            }),
            1 => Ok(Self::Utxo { amount: Idents::read_u256(buf)?, output: UtxoOutput::read(buf)? }),
            tag => Err(CodecError::InvalidEnum(tag)),
        }
    }
}

/// Transaction mixing account and UTXO inputs and outputs in a single token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoTx {
    /// Token moved; [`Address::ZERO`] for the native token.
    pub token: Address,
    /// Inputs.
    pub inputs: Vec<UtxoInput>,
    /// Outputs.
    pub outputs: Vec<TxOutput>,
    /// Fee in native units.
    pub fee: U256,
    /// Account signature, present iff there is an account input.
    pub signature: Option<TxSignature>,
}

impl UtxoTx {
    /// Builds an unsigned transaction.
    pub const fn new(token: Address, inputs: Vec<UtxoInput>, outputs: Vec<TxOutput>, fee: U256) -> Self {
        Self { token, inputs, outputs, fee, signature: None }
    }

    /// Input/output mix.
    pub fn kind(&self) -> UtxoKind {
        let inputs = self.inputs.iter().map(|input| match input {
            UtxoInput::Account { .. } => UtxoKind::AIN,
            UtxoInput::Utxo(_) => UtxoKind::UIN,
        });
        let outputs = self.outputs.iter().map(|output| match output {
            TxOutput::Account { .. } => UtxoKind::AOUT,
            TxOutput::Utxo { .. } => UtxoKind::UOUT,
        });
        inputs.chain(outputs).fold(UtxoKind::EMPTY, BitOr::bitor)
    }

    /// Returns `true` when the transaction moves the native token.
    pub fn is_native(&self) -> bool {
        self.token.is_zero()
    }

    /// Gas bought by the fee at the protocol price.
    pub fn gas(&self) -> u64 {
        let gas = self.fee / U256::from(PAR_GAS_PRICE);
        gas.try_into().unwrap_or(u64::MAX)
    }

    /// Nonce and amount of the account input.
    pub fn account_input(&self) -> Option<(u64, U256)> {
        self.inputs.iter().find_map(|input| match input {
            UtxoInput::Account { nonce, amount } => Some((*nonce, *amount)),
            UtxoInput::Utxo(_) => None,
        })
    }

    /// Spent outputs.
    pub fn spends(&self) -> impl Iterator<Item = &UtxoSpend> {
        self.inputs.iter().filter_map(|input| match input {
            UtxoInput::Utxo(spend) => Some(spend),
            UtxoInput::Account { .. } => None,
        })
    }

    /// Key images of the spent outputs, in input order.
    pub fn key_images(&self) -> Vec<KeyImage> {
        self.spends().map(|spend| spend.key_image).collect()
    }

    /// New stealth outputs, in output order.
    pub fn utxo_outputs(&self) -> Vec<UtxoOutput> {
        self.outputs
            .iter()
            .filter_map(|output| match output {
                TxOutput::Utxo { output, .. } => Some(output.clone()),
                TxOutput::Account { .. } => None,
            })
            .collect()
    }

    /// Sum of account outputs.
    pub fn account_output_amount(&self) -> U256 {
        self.outputs
            .iter()
            .filter(|output| matches!(output, TxOutput::Account { .. }))
            .fold(U256::ZERO, |acc, output| acc.saturating_add(output.amount()))
    }

    /// Hash signed by the account and by every spent output's owner.
    pub fn signing_hash(&self) -> B256 {
        let mut buf = vec![TxKind::Utxo as u8];
        Idents::write_address(&self.token, &mut buf);
        (self.inputs.len() as u32).write(&mut buf);
        for input in &self.inputs {
            input.write_unsigned(&mut buf);
        }
        self.outputs.write(&mut buf);
        Idents::write_u256(&self.fee, &mut buf);
        keccak256(buf)
    }

    /// Signs the account input.
    pub fn sign_account(&mut self, key: &SigningKey) -> Result<(), TxError> {
        self.signature = Some(TxSignature::sign(key, &self.signing_hash())?);
        Ok(())
    }

    /// Stores the owner signature of input `position`.
    pub fn set_input_signature(&mut self, position: usize, signature: TxSignature) {
        if let Some(UtxoInput::Utxo(spend)) = self.inputs.get_mut(position) {
            spend.signature = signature;
        }
    }

    /// Account sender, if the transaction has an account input.
    pub fn sender(&self) -> Result<Option<Address>, TxError> {
        if self.account_input().is_none() {
            return Ok(None);
        }
        let signature = self.signature.as_ref().ok_or(TxError::MissingSignature)?;
        signature.recover_address(&self.signing_hash()).map(Some)
    }

    /// Stateless validity: shape, value conservation, key images and signatures.
    ///
    /// Commitments of spent outputs are checked against the UTXO set by the executor.
    pub fn check_basic(&self) -> Result<(), TxError> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(TxError::EmptyUtxo);
        }
        let kind = self.kind();
        let account_inputs =
            self.inputs.iter().filter(|input| matches!(input, UtxoInput::Account { .. })).count();
        if account_inputs > 1 {
            return Err(TxError::MultipleAccountInputs);
        }
        if !self.is_native() && !kind.contains(UtxoKind::AIN) {
            return Err(TxError::NonNativeWithoutAccount);
        }

        let total_in = self.inputs.iter().try_fold(U256::ZERO, |acc, i| acc.checked_add(i.amount()));
        let total_out = self.outputs.iter().try_fold(U256::ZERO, |acc, o| acc.checked_add(o.amount()));
        let (Some(total_in), Some(total_out)) = (total_in, total_out) else {
            return Err(TxError::NotConserved);
        };
        let expected = if self.is_native() { total_out.checked_add(self.fee) } else { Some(total_out) };
        if expected != Some(total_in) {
            return Err(TxError::NotConserved);
        }

        let mut images = HashSet::new();
        if !self.spends().all(|spend| images.insert(spend.key_image)) {
            return Err(TxError::DuplicateKeyImage);
        }
        let hash = self.signing_hash();
        for (position, input) in self.inputs.iter().enumerate() {
            if let UtxoInput::Utxo(spend) = input {
                spend.verify_signature(&hash, position)?;
            }
        }
        self.sender().map(|_| ())
    }
}

impl Write for UtxoTx {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_address(&self.token, buf);
        self.inputs.write(buf);
        self.outputs.write(buf);
        Idents::write_u256(&self.fee, buf);
        match &self.signature {
            Some(signature) => {
                buf.put_u8(1);
                signature.write(buf);
            }
            None => buf.put_u8(0),
        }
    }
}

impl EncodeSize for UtxoTx {
    fn encode_size(&self) -> usize {
        20 + self.inputs.encode_size()
            + self.outputs.encode_size()
            + 32
            + 1
            + self.signature.map_or(0, |_| TxSignature::SIZE)
    }
}

impl Read for UtxoTx {
    type Cfg = TxCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        let token = Idents::read_address(buf)?;
        let range = RangeCfg::new(0..=MAX_UTXO_ENTRIES);
        let inputs = Vec::<UtxoInput>::read_cfg(buf, &(range, ()))?;
        let outputs = Vec::<TxOutput>::read_cfg(buf, &(RangeCfg::new(0..=MAX_UTXO_ENTRIES), *cfg))?;
        let fee = Idents::read_u256(buf)?;
        let signature = match Idents::read_u8(buf)? {
            0 => None,
            1 => Some(TxSignature::read(buf)?),
            tag => return Err(CodecError::InvalidEnum(tag)),
        };
        Ok(Self { token, inputs, outputs, fee, signature })
    }
}
