//! Transactions

use alloy_primitives::{Address, U256, keccak256};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error as CodecError, Read, ReadExt, Write};

use crate::{
    AccountTx, ContractCreateTx, ContractUpgradeTx, Idents, MULTI_SIGN_NONCE_ADDRESS,
    MultiSignAccountTx, TxError, TxId, UtxoTx,
};

/// Default maximum encoded transaction size (256 KiB).
pub const MAX_TX_BYTES: usize = 256 * 1024;

#[derive(Clone, Copy, Debug)]
/// Configuration used when decoding transactions from bytes.
pub struct TxCfg {
    /// Maximum encoded transaction size accepted by the codec.
    pub max_tx_bytes: usize,
}

impl Default for TxCfg {
    fn default() -> Self {
        Self { max_tx_bytes: MAX_TX_BYTES }
    }
}

/// Wire tag of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TxKind {
    /// Native account transfer or contract call.
    Transfer = 1,
    /// Token account transfer or contract call.
    TokenTransfer = 2,
    /// Multi-signed contract deployment.
    ContractCreate = 3,
    /// Multi-signed contract upgrade.
    ContractUpgrade = 4,
    /// Validator-signed signer-set update.
    MultiSignAccount = 5,
    /// Hybrid UTXO transaction.
    Utxo = 6,
}

impl TxKind {
    /// Human readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::TokenTransfer => "token_transfer",
            Self::ContractCreate => "contract_create",
            Self::ContractUpgrade => "contract_upgrade",
            Self::MultiSignAccount => "multi_sign_account",
            Self::Utxo => "utxo",
        }
    }
}

impl TryFrom<u8> for TxKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            1 => Self::Transfer,
            2 => Self::TokenTransfer,
            3 => Self::ContractCreate,
            4 => Self::ContractUpgrade,
            5 => Self::MultiSignAccount,
            6 => Self::Utxo,
            _ => return Err(CodecError::InvalidEnum(tag)),
        })
    }
}

/// A transaction of any kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transaction {
    /// Native account transfer, call or test-mode deployment.
    Transfer(AccountTx),
    /// Token account transfer or call.
    TokenTransfer(AccountTx),
    /// Multi-signed deployment.
    ContractCreate(ContractCreateTx),
    /// Multi-signed upgrade.
    ContractUpgrade(ContractUpgradeTx),
    /// Signer-set update.
    MultiSignAccount(MultiSignAccountTx),
    /// Hybrid UTXO transaction.
    Utxo(UtxoTx),
}

impl Transaction {
    /// Wire tag.
    pub const fn kind(&self) -> TxKind {
        match self {
            Self::Transfer(_) => TxKind::Transfer,
            Self::TokenTransfer(_) => TxKind::TokenTransfer,
            Self::ContractCreate(_) => TxKind::ContractCreate,
            Self::ContractUpgrade(_) => TxKind::ContractUpgrade,
            Self::MultiSignAccount(_) => TxKind::MultiSignAccount,
            Self::Utxo(_) => TxKind::Utxo,
        }
    }

    /// Compute the transaction identifier from its encoded contents.
    pub fn id(&self) -> TxId {
        TxId(keccak256(self.encode()))
    }

    /// The account whose nonce this transaction consumes, if any.
    ///
    /// UTXO transactions without an account input have no sender.
    pub fn sender(&self) -> Result<Option<Address>, TxError> {
        match self {
            Self::Transfer(tx) | Self::TokenTransfer(tx) => tx.sender(self.kind()).map(Some),
            Self::ContractCreate(tx) => Ok(Some(tx.from)),
            Self::ContractUpgrade(tx) => Ok(Some(tx.from)),
            Self::MultiSignAccount(_) => Ok(Some(MULTI_SIGN_NONCE_ADDRESS)),
            Self::Utxo(tx) => tx.sender(),
        }
    }

    /// Nonce consumed from the sender, if any.
    pub fn nonce(&self) -> Option<u64> {
        match self {
            Self::Transfer(tx) | Self::TokenTransfer(tx) => Some(tx.nonce),
            Self::ContractCreate(tx) => Some(tx.nonce),
            Self::ContractUpgrade(tx) => Some(tx.nonce),
            Self::MultiSignAccount(tx) => Some(tx.nonce),
            Self::Utxo(tx) => tx.account_input().map(|(nonce, _)| nonce),
        }
    }

    /// Recipient of an account transaction.
    pub const fn to(&self) -> Option<Address> {
        match self {
            Self::Transfer(tx) | Self::TokenTransfer(tx) => tx.to,
            Self::ContractUpgrade(tx) => Some(tx.contract),
            _ => None,
        }
    }

    /// Token moved by the transaction.
    pub const fn token(&self) -> Address {
        match self {
            Self::Transfer(tx) | Self::TokenTransfer(tx) => tx.token,
            Self::Utxo(tx) => tx.token,
            _ => Address::ZERO,
        }
    }

    /// Value moved by an account transaction.
    pub const fn value(&self) -> U256 {
        match self {
            Self::Transfer(tx) | Self::TokenTransfer(tx) => tx.value,
            Self::ContractCreate(tx) => tx.value,
            _ => U256::ZERO,
        }
    }

    /// Stateless validity.
    ///
    /// Signatures of multi-signed transactions depend on chain state and are verified by the
    /// executor.
    pub fn check_basic(&self, max_tx_bytes: usize, test_mode: bool) -> Result<(), TxError> {
        let size = self.encode_size();
        if size > max_tx_bytes {
            return Err(TxError::TooLarge { size, max: max_tx_bytes });
        }
        match self {
            Self::Transfer(tx) | Self::TokenTransfer(tx) => tx.check_basic(self.kind(), test_mode),
            Self::ContractCreate(tx) if tx.code.is_empty() => Err(TxError::EmptyCode),
            Self::ContractUpgrade(tx) if tx.code.is_empty() => Err(TxError::EmptyCode),
            Self::ContractCreate(_) | Self::ContractUpgrade(_) | Self::MultiSignAccount(_) => Ok(()),
            Self::Utxo(tx) => tx.check_basic(),
        }
    }
}

impl Write for Transaction {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.kind() as u8);
        match self {
            Self::Transfer(tx) | Self::TokenTransfer(tx) => tx.write(buf),
            Self::ContractCreate(tx) => tx.write(buf),
            Self::ContractUpgrade(tx) => tx.write(buf),
            Self::MultiSignAccount(tx) => tx.write(buf),
            Self::Utxo(tx) => tx.write(buf),
        }
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Transfer(tx) | Self::TokenTransfer(tx) => tx.encode_size(),
            Self::ContractCreate(tx) => tx.encode_size(),
            Self::ContractUpgrade(tx) => tx.encode_size(),
            Self::MultiSignAccount(tx) => tx.encode_size(),
            Self::Utxo(tx) => tx.encode_size(),
        }
    }
}

impl Read for Transaction {
    type Cfg = TxCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        let tx = match TxKind::try_from(Idents::read_u8(buf)?)? {
            TxKind::Transfer => Self::Transfer(AccountTx::read_cfg(buf, cfg)?),
            TxKind::TokenTransfer => Self::TokenTransfer(AccountTx::read_cfg(buf, cfg)?),
            TxKind::ContractCreate => Self::ContractCreate(ContractCreateTx::read_cfg(buf, cfg)?),
            TxKind::ContractUpgrade => Self::ContractUpgrade(ContractUpgradeTx::read_cfg(buf, cfg)?),
            TxKind::MultiSignAccount => Self::MultiSignAccount(MultiSignAccountTx::read(buf)?),
            TxKind::Utxo => Self::Utxo(UtxoTx::read_cfg(buf, cfg)?),
        };
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Bytes;
    use commonware_codec::Decode;
    use k256::ecdsa::SigningKey;

    use super::*;
    use crate::{SignersInfo, address_of};

    fn key_from_byte(byte: u8) -> SigningKey {
        let bytes = [byte; 32];
        SigningKey::from_bytes(&bytes.into()).expect("valid key")
    }

    fn signed_transfer() -> Transaction {
        let mut tx = AccountTx::new(3, Some(Address::repeat_byte(2)), U256::from(1), 500_000, Bytes::new());
        tx.sign(TxKind::Transfer, &key_from_byte(1)).expect("sign");
        Transaction::Transfer(tx)
    }

    #[test]
    fn tx_id_is_deterministic() {
        let tx = signed_transfer();
        assert_eq!(tx.id(), tx.id());
    }

    #[test]
    fn tx_id_differs_by_kind() {
        let Transaction::Transfer(inner) = signed_transfer() else { unreachable!() };
        let token = Transaction::TokenTransfer(inner.clone());
        assert_ne!(Transaction::Transfer(inner).id(), token.id());
    }

    #[test]
    fn decode_roundtrip_preserves_id() {
        let tx = signed_transfer();
        let decoded = Transaction::decode_cfg(tx.encode(), &TxCfg::default()).expect("decode");
        assert_eq!(decoded, tx);
        assert_eq!(decoded.id(), tx.id());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut bytes = signed_transfer().encode().to_vec();
        bytes[0] = 42;
        let err = Transaction::decode_cfg(bytes.as_slice(), &TxCfg::default()).unwrap_err();
        assert!(matches!(err, CodecError::InvalidEnum(42)));
    }

    #[test]
    fn sender_and_nonce() {
        let tx = signed_transfer();
        assert_eq!(tx.sender().expect("sender"), Some(address_of(key_from_byte(1).verifying_key())));
        assert_eq!(tx.nonce(), Some(3));

        let multi = Transaction::MultiSignAccount(MultiSignAccountTx::new(
            9,
            TxKind::ContractCreate,
            SignersInfo::default(),
        ));
        assert_eq!(multi.sender().expect("sender"), Some(MULTI_SIGN_NONCE_ADDRESS));
        assert_eq!(multi.nonce(), Some(9));
    }

    #[test]
    fn oversize_is_rejected() {
        let tx = signed_transfer();
        let err = tx.check_basic(10, false).unwrap_err();
        assert!(matches!(err, TxError::TooLarge { max: 10, .. }));
        assert!(tx.check_basic(MAX_TX_BYTES, false).is_ok());
    }

    #[test]
    fn contract_create_requires_code() {
        let tx = Transaction::ContractCreate(ContractCreateTx::new(
            Address::repeat_byte(1),
            0,
            U256::ZERO,
            Bytes::new(),
        ));
        assert!(matches!(tx.check_basic(MAX_TX_BYTES, false), Err(TxError::EmptyCode)));
    }

    #[test]
    fn kind_tags_roundtrip() {
        for tag in 1..=6u8 {
            assert_eq!(TxKind::try_from(tag).expect("kind") as u8, tag);
        }
        assert!(TxKind::try_from(0).is_err());
    }
}
