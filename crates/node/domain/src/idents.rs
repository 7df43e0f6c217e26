//! Identifiers and primitive encoding helpers.

use alloy_primitives::{Address, B256, Bytes, U256};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, RangeCfg, Read, Write};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Block identifier (32 bytes).
pub struct BlockId(pub B256);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Transaction identifier (32 bytes).
pub struct TxId(pub B256);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Key image of a spent UTXO (32 bytes).
pub struct KeyImage(pub B256);

/// Identifier encoding helpers.
#[derive(Debug)]
pub struct Idents;

impl Idents {
    /// Encode a `B256` into the buffer as raw bytes.
    pub fn write_b256(value: &B256, buf: &mut impl BufMut) {
        buf.put_slice(value.as_slice());
    }

    /// Decode a `B256` from the buffer, returning an error if insufficient bytes remain.
    pub fn read_b256(buf: &mut impl Buf) -> Result<B256, CodecError> {
        if buf.remaining() < 32 {
            return Err(CodecError::EndOfBuffer);
        }
        let mut out = [0u8; 32];
        buf.copy_to_slice(&mut out);
        Ok(B256::from(out))
    }

    /// Encode an `Address` as 20 raw bytes.
    pub fn write_address(value: &Address, buf: &mut impl BufMut) {
        buf.put_slice(value.as_slice());
    }

    /// Decode an `Address` from 20 raw bytes.
    pub fn read_address(buf: &mut impl Buf) -> Result<Address, CodecError> {
        if buf.remaining() < 20 {
            return Err(CodecError::EndOfBuffer);
        }
        let mut out = [0u8; 20];
        buf.copy_to_slice(&mut out);
        Ok(Address::from(out))
    }

    /// Encode an optional address with a presence byte.
    pub fn write_opt_address(value: &Option<Address>, buf: &mut impl BufMut) {
        match value {
            Some(addr) => {
                buf.put_u8(1);
                Self::write_address(addr, buf);
            }
            None => buf.put_u8(0),
        }
    }

    /// Decode an optional address written by [`Self::write_opt_address`].
    pub fn read_opt_address(buf: &mut impl Buf) -> Result<Option<Address>, CodecError> {
        match Self::read_u8(buf)? {
            0 => Ok(None),
            1 => Ok(Some(Self::read_address(buf)?)),
            tag => Err(CodecError::InvalidEnum(tag)),
        }
    }

    /// Encode a `U256` as 32 big-endian bytes.
    pub fn write_u256(value: &U256, buf: &mut impl BufMut) {
        buf.put_slice(&value.to_be_bytes::<32>());
    }

    /// Decode a `U256` from 32 big-endian bytes.
    pub fn read_u256(buf: &mut impl Buf) -> Result<U256, CodecError> {
        Ok(U256::from_be_bytes(Self::read_b256(buf)?.0))
    }

    /// Decode a single byte.
    pub fn read_u8(buf: &mut impl Buf) -> Result<u8, CodecError> {
        if !buf.has_remaining() {
            return Err(CodecError::EndOfBuffer);
        }
        Ok(buf.get_u8())
    }

    /// Encode length-prefixed bytes.
    pub fn write_bytes(value: &Bytes, buf: &mut impl BufMut) {
        value.as_ref().write(buf);
    }

    /// Encoded size of length-prefixed bytes.
    pub fn bytes_size(value: &Bytes) -> usize {
        value.as_ref().encode_size()
    }

    /// Decode length-prefixed bytes of at most `max` bytes.
    pub fn read_bytes(buf: &mut impl Buf, max: usize) -> Result<Bytes, CodecError> {
        let data = Vec::<u8>::read_cfg(buf, &(RangeCfg::new(0..=max), ()))?;
        Ok(Bytes::from(data))
    }
}

impl FixedSize for BlockId {
    const SIZE: usize = 32;
}

impl FixedSize for TxId {
    const SIZE: usize = 32;
}

impl FixedSize for KeyImage {
    const SIZE: usize = 32;
}

impl Write for BlockId {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_b256(&self.0, buf);
    }
}

impl Read for BlockId {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        Ok(Self(Idents::read_b256(buf)?))
    }
}

impl Write for TxId {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_b256(&self.0, buf);
    }
}

impl Read for TxId {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        Ok(Self(Idents::read_b256(buf)?))
    }
}

impl Write for KeyImage {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_b256(&self.0, buf);
    }
}

impl Read for KeyImage {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        Ok(Self(Idents::read_b256(buf)?))
    }
}
