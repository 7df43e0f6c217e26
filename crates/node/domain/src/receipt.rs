//! Receipts and logs.

use alloy_primitives::{Address, B256, Bloom, Bytes};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error as CodecError, RangeCfg, Read, ReadExt, Write};
use hyla_primitives::merkle_root;

use crate::Idents;

/// Maximum topics per log.
pub const MAX_TOPICS: usize = 4;

/// Maximum logs per receipt.
pub const MAX_LOGS: usize = 4_096;

/// Maximum log data size.
pub const MAX_LOG_DATA: usize = 1 << 20;

/// Event emitted by a contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<B256>,
    /// Opaque data.
    pub data: Bytes,
    /// Block height.
    pub height: u64,
    /// Block time.
    pub time: u64,
    /// Transaction that emitted the log.
    pub tx_hash: B256,
    /// Transaction position in the block.
    pub tx_index: u32,
    /// Log position in the block.
    pub index: u32,
}

impl Write for Log {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_address(&self.address, buf);
        (self.topics.len() as u8).write(buf);
        for topic in &self.topics {
            Idents::write_b256(topic, buf);
        }
        Idents::write_bytes(&self.data, buf);
        self.height.write(buf);
        self.time.write(buf);
        Idents::write_b256(&self.tx_hash, buf);
        self.tx_index.write(buf);
        self.index.write(buf);
    }
}

impl EncodeSize for Log {
    fn encode_size(&self) -> usize {
        20 + 1 + 32 * self.topics.len() + Idents::bytes_size(&self.data) + 8 + 8 + 32 + 4 + 4
    }
}

impl Read for Log {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        let address = Idents::read_address(buf)?;
        let count = Idents::read_u8(buf)? as usize;
        if count > MAX_TOPICS {
            return Err(CodecError::InvalidLength(count));
        }
        let topics = (0..count).map(|_| Idents::read_b256(buf)).collect::<Result<_, _>>()?;
        let data = Idents::read_bytes(buf, MAX_LOG_DATA)?;
        Ok(Self {
            address,
            topics,
            data,
            height: u64::read(buf)?,
            time: u64::read(buf)?,
            tx_hash: Idents::read_b256(buf)?,
            tx_index: u32::read(buf)?,
            index: u32::read(buf)?,
        })
    }
}

/// Bloom over the addresses and topics of `logs`.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        bloom.accrue_raw_log(log.address, &log.topics);
    }
    bloom
}

/// Outcome of one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Whether execution succeeded.
    pub success: bool,
    /// Gas used by this and all previous transactions of the block.
    pub cumulative_gas_used: u64,
    /// Gas used by this transaction.
    pub gas_used: u64,
    /// Created contract.
    pub contract_address: Option<Address>,
    /// Emitted logs.
    pub logs: Vec<Log>,
    /// Bloom over the logs.
    pub bloom: Bloom,
}

impl Receipt {
    /// Builds a receipt and its bloom.
    pub fn new(
        tx_hash: B256,
        success: bool,
        cumulative_gas_used: u64,
        gas_used: u64,
        contract_address: Option<Address>,
        logs: Vec<Log>,
    ) -> Self {
        let bloom = logs_bloom(&logs);
        Self { tx_hash, success, cumulative_gas_used, gas_used, contract_address, logs, bloom }
    }
}

/// Merkle root over the encoded receipts.
pub fn receipts_root(receipts: &[Receipt]) -> B256 {
    merkle_root(receipts.iter().map(|receipt| receipt.encode()))
}

/// Union of the receipt blooms.
pub fn block_bloom(receipts: &[Receipt]) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for receipt in receipts {
        bloom.accrue_bloom(&receipt.bloom);
    }
    bloom
}

impl Write for Receipt {
    fn write(&self, buf: &mut impl BufMut) {
        Idents::write_b256(&self.tx_hash, buf);
        self.success.write(buf);
        self.cumulative_gas_used.write(buf);
        self.gas_used.write(buf);
        Idents::write_opt_address(&self.contract_address, buf);
        self.logs.write(buf);
        buf.put_slice(self.bloom.as_slice());
    }
}

impl EncodeSize for Receipt {
    fn encode_size(&self) -> usize {
        32 + 1 + 8 + 8 + 1 + self.contract_address.map_or(0, |_| 20) + self.logs.encode_size() + 256
    }
}

impl Read for Receipt {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        let tx_hash = Idents::read_b256(buf)?;
        let success = bool::read(buf)?;
        let cumulative_gas_used = u64::read(buf)?;
        let gas_used = u64::read(buf)?;
        let contract_address = Idents::read_opt_address(buf)?;
        let logs = Vec::<Log>::read_cfg(buf, &(RangeCfg::new(0..=MAX_LOGS), ()))?;
        if buf.remaining() < 256 {
            return Err(CodecError::EndOfBuffer);
        }
        let mut bloom = [0u8; 256];
        buf.copy_to_slice(&mut bloom);
        Ok(Self {
            tx_hash,
            success,
            cumulative_gas_used,
            gas_used,
            contract_address,
            logs,
            bloom: Bloom::from(bloom),
        })
    }
}

#[cfg(test)]
mod tests {
    use commonware_codec::DecodeExt;
    use hyla_primitives::EMPTY_ROOT_HASH;

    use super::*;

    fn sample_log() -> Log {
        Log {
            address: Address::repeat_byte(0xaa),
            topics: vec![B256::repeat_byte(1), B256::repeat_byte(2)],
            data: Bytes::from_static(b"hello"),
            height: 7,
            time: 100,
            tx_hash: B256::repeat_byte(9),
            tx_index: 0,
            index: 0,
        }
    }

    #[test]
    fn receipt_bloom_contains_log() {
        let log = sample_log();
        let receipt = Receipt::new(B256::ZERO, true, 21_000, 21_000, None, vec![log.clone()]);
        let mut expected = Bloom::ZERO;
        expected.accrue_raw_log(log.address, &log.topics);
        assert_eq!(receipt.bloom, expected);
        assert_ne!(receipt.bloom, Bloom::ZERO);
    }

    #[test]
    fn block_bloom_is_union() {
        let a = Receipt::new(B256::ZERO, true, 1, 1, None, vec![sample_log()]);
        let b = Receipt::new(B256::ZERO, false, 2, 1, None, vec![]);
        assert_eq!(block_bloom(&[a.clone(), b]), a.bloom);
    }

    #[test]
    fn receipts_root_depends_on_status() {
        let ok = Receipt::new(B256::ZERO, true, 1, 1, None, vec![]);
        let failed = Receipt { success: false, ..ok.clone() };
        assert_ne!(receipts_root(&[ok]), receipts_root(&[failed]));
        assert_eq!(receipts_root(&[]), EMPTY_ROOT_HASH);
    }

    #[test]
    fn receipt_codec() {
        let receipt =
            Receipt::new(B256::repeat_byte(3), true, 10, 5, Some(Address::repeat_byte(4)), vec![sample_log()]);
        assert_eq!(receipt.encode_size(), receipt.encode().len());
        assert_eq!(Receipt::decode(receipt.encode()).expect("decode"), receipt);
    }

    #[test]
    fn too_many_topics_rejected() {
        let mut log = sample_log();
        log.topics = vec![B256::ZERO; 5];
        assert!(matches!(Log::decode(log.encode()), Err(CodecError::InvalidLength(5))));
    }
}
