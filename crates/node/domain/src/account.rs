//! Account-to-account transactions.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write};
use hyla_primitives::{MAX_GAS_LIMIT, MIN_GAS_LIMIT, PAR_GAS_PRICE, cal_new_amount_gas};
use k256::ecdsa::SigningKey;

use crate::{Idents, TxCfg, TxError, TxKind, TxSignature};

/// Signed account transaction used by [`TxKind::Transfer`] and [`TxKind::TokenTransfer`].
///
/// A missing recipient deploys `data` as contract code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountTx {
    /// Sender nonce.
    pub nonce: u64,
    /// Price per unit of gas in native units.
    pub gas_price: U256,
    /// Gas limit.
    pub gas_limit: u64,
    /// Recipient, or `None` for contract creation.
    pub to: Option<Address>,
    /// Token moved; [`Address::ZERO`] for the native token.
    pub token: Address,
    /// Amount moved.
    pub value: U256,
    /// Call data or init code.
    pub data: Bytes,
    /// Sender signature over the signing hash.
    pub signature: TxSignature,
}

impl AccountTx {
    /// Builds an unsigned native transfer at the protocol gas price.
    pub fn new(nonce: u64, to: Option<Address>, value: U256, gas_limit: u64, data: Bytes) -> Self {
        Self {
            nonce,
            gas_price: U256::from(PAR_GAS_PRICE),
            gas_limit,
            to,
            token: Address::ZERO,
            value,
            data,
            signature: TxSignature([0u8; 65]),
        }
    }

    /// Sets the token moved by this transaction.
    #[must_use]
    pub const fn with_token(mut self, token: Address) -> Self {
        self.token = token;
        self
    }

    /// Sets the gas price.
    #[must_use]
    pub const fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Returns `true` when the transaction moves the native token.
    pub fn is_native(&self) -> bool {
        self.token.is_zero()
    }

    /// Hash signed by the sender.
    pub fn signing_hash(&self, kind: TxKind) -> B256 {
        let mut buf = Vec::with_capacity(self.unsigned_size() + 1);
        buf.put_u8(kind as u8);
        self.write_unsigned(&mut buf);
        keccak256(buf)
    }

    /// Signs the transaction in place.
    pub fn sign(&mut self, kind: TxKind, key: &SigningKey) -> Result<(), TxError> {
        self.signature = TxSignature::sign(key, &self.signing_hash(kind))?;
        Ok(())
    }

    /// Recovers the sender.
    pub fn sender(&self, kind: TxKind) -> Result<Address, TxError> {
        self.signature.recover_address(&self.signing_hash(kind))
    }

    /// Stateless validity for a transaction of `kind`.
    pub fn check_basic(&self, kind: TxKind, test_mode: bool) -> Result<(), TxError> {
        match kind {
            TxKind::Transfer => {
                if !self.is_native() {
                    return Err(TxError::NonNativeTransfer);
                }
                if self.to.is_none() {
                    if !test_mode {
                        return Err(TxError::MissingRecipient);
                    }
                    if self.data.is_empty() {
                        return Err(TxError::EmptyCode);
                    }
                }
            }
            _ => {
                if self.is_native() {
                    return Err(TxError::MissingToken);
                }
                if self.to.is_none() {
                    return Err(TxError::MissingRecipient);
                }
            }
        }
        if self.gas_limit == 0 || self.gas_limit > MAX_GAS_LIMIT {
            return Err(TxError::InvalidGasLimit(self.gas_limit));
        }
        self.sender(kind).map(|_| ())
    }

    /// Gas a transfer of this value requires, given whether the recipient has code.
    pub fn transfer_gas(&self, has_code: bool) -> u64 {
        match (has_code, self.is_native()) {
            (_, true) => cal_new_amount_gas(self.value),
            (true, false) => 0,
            (false, false) => MIN_GAS_LIMIT,
        }
    }

    /// Validates gas price and gas limit against the recipient kind.
    ///
    /// A transfer to an account without code must carry exactly the transfer gas.
    pub fn check_gas(&self, has_code: bool) -> Result<(), TxError> {
        if self.gas_price != U256::from(PAR_GAS_PRICE) {
            return Err(TxError::InvalidGasPrice);
        }
        if self.to.is_none() {
            return Ok(());
        }
        let required = self.transfer_gas(has_code);
        if !self.value.is_zero() && required > self.gas_limit {
            return Err(TxError::InvalidGasLimit(self.gas_limit));
        }
        if !has_code && required != self.gas_limit {
            return Err(TxError::InvalidGasLimit(self.gas_limit));
        }
        Ok(())
    }

    fn write_unsigned(&self, buf: &mut impl BufMut) {
        self.nonce.write(buf);
        Idents::write_u256(&self.gas_price, buf);
        self.gas_limit.write(buf);
        Idents::write_opt_address(&self.to, buf);
        Idents::write_address(&self.token, buf);
        Idents::write_u256(&self.value, buf);
        Idents::write_bytes(&self.data, buf);
    }

    fn unsigned_size(&self) -> usize {
        self.nonce.encode_size()
            + 32
            + self.gas_limit.encode_size()
            + 1
            + self.to.map_or(0, |_| 20)
            + 20
            + 32
            + Idents::bytes_size(&self.data)
    }
}

impl Write for AccountTx {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_unsigned(buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for AccountTx {
    fn encode_size(&self) -> usize {
        self.unsigned_size() + TxSignature::SIZE
    }
}

impl Read for AccountTx {
    type Cfg = TxCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        let nonce = u64::read(buf)?;
        let gas_price = Idents::read_u256(buf)?;
        let gas_limit = u64::read(buf)?;
        let to = Idents::read_opt_address(buf)?;
        let token = Idents::read_address(buf)?;
        let value = Idents::read_u256(buf)?;
        let data = Idents::read_bytes(buf, cfg.max_tx_bytes)?;
        let signature = TxSignature::read(buf)?;
        Ok(Self { nonce, gas_price, gas_limit, to, token, value, data, signature })
    }
}
