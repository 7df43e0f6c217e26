//! Block types

use alloy_primitives::{Address, B256, Bloom, keccak256};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error as CodecError, RangeCfg, Read, ReadExt, Write};
use hyla_primitives::merkle_root;
use k256::ecdsa::SigningKey;

use crate::{BlockId, Idents, PubKey, Transaction, TxCfg, TxError, TxSignature};

/// Maximum evidence entries in a block.
pub const MAX_EVIDENCE: usize = 1_024;

#[derive(Clone, Copy, Debug)]
/// Configuration used when decoding blocks and their transactions.
pub struct BlockCfg {
    /// Maximum number of transactions that can be encoded in a block.
    pub max_txs: usize,
    /// Per-transaction codec configuration.
    pub tx: TxCfg,
}

impl Default for BlockCfg {
    fn default() -> Self {
        Self { max_txs: 10_000, tx: TxCfg::default() }
    }
}

/// Block header.
///
/// `state_hash`, `receipt_hash` and `gas_used` are the expected results of executing the
/// block's transactions against the parent state. The logs bloom is filled in after
/// execution and is not part of the block hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Hash of the parent block.
    pub parent_hash: BlockId,
    /// Height.
    pub height: u64,
    /// Unix time in seconds.
    pub time: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Proposer reward address.
    pub coinbase: Address,
    /// Merkle root of the transaction ids.
    pub data_hash: B256,
    /// Post-state root.
    pub state_hash: B256,
    /// Merkle root of the receipts.
    pub receipt_hash: B256,
    /// Gas used by all transactions.
    pub gas_used: u64,
    /// Bloom over all logs.
    pub logs_bloom: Bloom,
    /// Hash of the commit of the parent block.
    pub last_commit_hash: B256,
    /// Recover mode marker; non-zero rotates previous validators out.
    pub recover: u32,
}

impl Header {
    /// Block hash.
    pub fn hash(&self) -> BlockId {
        let mut buf = Vec::with_capacity(self.encode_size());
        self.write_hashed(&mut buf);
        BlockId(keccak256(buf))
    }

    fn write_hashed(&self, buf: &mut impl BufMut) {
        self.parent_hash.write(buf);
        self.height.write(buf);
        self.time.write(buf);
        self.gas_limit.write(buf);
        Idents::write_address(&self.coinbase, buf);
        Idents::write_b256(&self.data_hash, buf);
        Idents::write_b256(&self.state_hash, buf);
        Idents::write_b256(&self.receipt_hash, buf);
        self.gas_used.write(buf);
        Idents::write_b256(&self.last_commit_hash, buf);
        self.recover.write(buf);
    }
}

impl Write for Header {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_hashed(buf);
        buf.put_slice(self.logs_bloom.as_slice());
    }
}

impl EncodeSize for Header {
    fn encode_size(&self) -> usize {
        32 + 8 + 8 + 8 + 20 + 32 + 32 + 32 + 8 + 32 + 4 + 256
    }
}

impl Read for Header {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        let parent_hash = BlockId::read(buf)?;
        let height = u64::read(buf)?;
        let time = u64::read(buf)?;
        let gas_limit = u64::read(buf)?;
        let coinbase = Idents::read_address(buf)?;
        let data_hash = Idents::read_b256(buf)?;
        let state_hash = Idents::read_b256(buf)?;
        let receipt_hash = Idents::read_b256(buf)?;
        let gas_used = u64::read(buf)?;
        let last_commit_hash = Idents::read_b256(buf)?;
        let recover = u32::read(buf)?;
        if buf.remaining() < 256 {
            return Err(CodecError::EndOfBuffer);
        }
        let mut bloom = [0u8; 256];
        buf.copy_to_slice(&mut bloom);
        Ok(Self {
            parent_hash,
            height,
            time,
            gas_limit,
            coinbase,
            data_hash,
            state_hash,
            receipt_hash,
            gas_used,
            logs_bloom: Bloom::from(bloom),
            last_commit_hash,
            recover,
        })
    }
}

/// A signed prevote or precommit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    /// Height voted on.
    pub height: u64,
    /// Round voted in.
    pub round: u32,
    /// Block voted for.
    pub block_hash: B256,
    /// Validator signature.
    pub signature: TxSignature,
}

impl Vote {
    /// Signs a vote.
    pub fn sign(key: &SigningKey, height: u64, round: u32, block_hash: B256) -> Result<Self, TxError> {
        let signature = TxSignature::sign(key, &Self::signing_hash(height, round, &block_hash))?;
        Ok(Self { height, round, block_hash, signature })
    }

    fn signing_hash(height: u64, round: u32, block_hash: &B256) -> B256 {
        let mut buf = Vec::with_capacity(44);
        buf.extend_from_slice(&height.to_be_bytes());
        buf.extend_from_slice(&round.to_be_bytes());
        buf.extend_from_slice(block_hash.as_slice());
        keccak256(buf)
    }

    /// Address that signed the vote.
    pub fn signer(&self) -> Result<Address, TxError> {
        self.signature.recover_address(&Self::signing_hash(self.height, self.round, &self.block_hash))
    }
}

impl Write for Vote {
    fn write(&self, buf: &mut impl BufMut) {
        self.height.write(buf);
        self.round.write(buf);
        Idents::write_b256(&self.block_hash, buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for Vote {
    fn encode_size(&self) -> usize {
        8 + 4 + 32 + 65
    }
}

impl Read for Vote {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        Ok(Self {
            height: u64::read(buf)?,
            round: u32::read(buf)?,
            block_hash: Idents::read_b256(buf)?,
            signature: TxSignature::read(buf)?,
        })
    }
}

/// Proof of validator misbehaviour or of missed rounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evidence {
    /// A validator signed two conflicting votes at the same height and round.
    DuplicateVote {
        /// Offending validator.
        pub_key: PubKey,
        /// First vote.
        vote_a: Vote,
        /// Second vote.
        vote_b: Vote,
    },
    /// The proposer of `round` and a validator that failed to produce in an earlier round.
    FaultValidators {
        /// Proposer of the committed round.
        proposer: PubKey,
        /// Proposer of the failed round.
        fault_validator: PubKey,
        /// Committed round.
        round: u32,
    },
}

impl Evidence {
    /// Checks that duplicate votes conflict and are both signed by the accused key.
    pub fn verify(&self) -> Result<(), TxError> {
        match self {
            Self::DuplicateVote { pub_key, vote_a, vote_b } => {
                let address = pub_key.address()?;
                if vote_a.height != vote_b.height
                    || vote_a.round != vote_b.round
                    || vote_a.block_hash == vote_b.block_hash
                    || vote_a.signer()? != address
                    || vote_b.signer()? != address
                {
                    return Err(TxError::InvalidSignature);
                }
                Ok(())
            }
            Self::FaultValidators { .. } => Ok(()),
        }
    }
}

impl Write for Evidence {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Self::DuplicateVote { pub_key, vote_a, vote_b } => {
                buf.put_u8(0);
                pub_key.write(buf);
                vote_a.write(buf);
                vote_b.write(buf);
            }
            Self::FaultValidators { proposer, fault_validator, round } => {
                buf.put_u8(1);
                proposer.write(buf);
                fault_validator.write(buf);
                round.write(buf);
            }
        }
    }
}

impl EncodeSize for Evidence {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::DuplicateVote { vote_a, vote_b, .. } => 33 + vote_a.encode_size() + vote_b.encode_size(),
            Self::FaultValidators { .. } => 33 + 33 + 4,
        }
    }
}

impl Read for Evidence {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        match Idents::read_u8(buf)? {
            0 => Ok(Self::DuplicateVote {
                pub_key: PubKey::read(buf)?,
                vote_a: Vote::read(buf)?,
                vote_b: Vote::read(buf)?,
            }),
            1 => Ok(Self::FaultValidators {
                proposer: PubKey::read(buf)?,
                fault_validator: PubKey::read(buf)?,
                round: u32::read(buf)?,
            }),
            tag => Err(CodecError::InvalidEnum(tag)),
        }
    }
}

/// Precommit signatures finalizing a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Commit {
    /// Committed height.
    pub height: u64,
    /// Committed round.
    pub round: u32,
    /// Committed block.
    pub block_hash: B256,
    /// Precommit signatures.
    pub signatures: Vec<TxSignature>,
}

impl Commit {
    /// Commit hash, used as the election seed of the next block.
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }
}

impl Write for Commit {
    fn write(&self, buf: &mut impl BufMut) {
        self.height.write(buf);
        self.round.write(buf);
        Idents::write_b256(&self.block_hash, buf);
        self.signatures.write(buf);
    }
}

impl EncodeSize for Commit {
    fn encode_size(&self) -> usize {
        8 + 4 + 32 + self.signatures.encode_size()
    }
}

impl Read for Commit {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, CodecError> {
        let height = u64::read(buf)?;
        let round = u32::read(buf)?;
        let block_hash = Idents::read_b256(buf)?;
        let signatures = Vec::<TxSignature>::read_cfg(buf, &(RangeCfg::new(0..=MAX_EVIDENCE), ()))?;
        Ok(Self { height, round, block_hash, signatures })
    }
}

/// A block: header, ordered transactions, evidence and the parent's commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    /// Header.
    pub header: Header,
    /// Transactions in execution order.
    pub txs: Vec<Transaction>,
    /// Evidence applied after the transactions.
    pub evidence: Vec<Evidence>,
    /// Commit of the parent block.
    pub last_commit: Commit,
}

impl Block {
    /// Builds a block, filling in the data hash and the last commit hash.
    pub fn new(mut header: Header, txs: Vec<Transaction>, evidence: Vec<Evidence>, last_commit: Commit) -> Self {
        header.data_hash = Self::compute_data_hash(&txs);
        header.last_commit_hash = last_commit.hash();
        Self { header, txs, evidence, last_commit }
    }

    /// Block identifier.
    pub fn id(&self) -> BlockId {
        self.header.hash()
    }

    /// Height.
    pub const fn height(&self) -> u64 {
        self.header.height
    }

    /// Merkle root of the transaction ids.
    pub fn compute_data_hash(txs: &[Transaction]) -> B256 {
        merkle_root(txs.iter().map(|tx| tx.id().0))
    }
}

impl Write for Block {
    fn write(&self, buf: &mut impl BufMut) {
        self.header.write(buf);
        self.txs.write(buf);
        self.evidence.write(buf);
        self.last_commit.write(buf);
    }
}

impl EncodeSize for Block {
    fn encode_size(&self) -> usize {
        self.header.encode_size()
            + self.txs.encode_size()
            + self.evidence.encode_size()
            + self.last_commit.encode_size()
    }
}

impl Read for Block {
    type Cfg = BlockCfg;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        let header = Header::read(buf)?;
        let txs = Vec::<Transaction>::read_cfg(buf, &(RangeCfg::new(0..=cfg.max_txs), cfg.tx))?;
        let evidence = Vec::<Evidence>::read_cfg(buf, &(RangeCfg::new(0..=MAX_EVIDENCE), ()))?;
        let last_commit = Commit::read(buf)?;
        Ok(Self { header, txs, evidence, last_commit })
    }
}
