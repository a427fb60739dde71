//! Block header and block types.

use vgld_consensus::constants::VOTE_BIT_APPROVE_PARENT;
use vgld_consensus::Hash256;

use crate::encoding::{DecodeError, Decoder, Encoder};
use crate::hash::sha256d;
use crate::transaction::Transaction;

pub const CURRENT_VERSION: i32 = 9;

/// Serialized header length in bytes.
pub const HEADER_LEN: usize = 4 + 32 + 32 + 32 + 2 + 2 + 1 + 1 + 4 + 4 + 4 + 4;

#[derive(Clone, Debug, PartialEq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub stake_root: Hash256,
    pub vote_bits: u16,
    pub voters: u16,
    pub fresh_stake: u8,
    pub revocations: u8,
    pub height: u32,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Whether the votes in this block approve the regular tree of its parent.
    pub fn approves_parent(&self) -> bool {
        self.vote_bits & VOTE_BIT_APPROVE_PARENT != 0
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(HEADER_LEN);
        self.encode_into(&mut encoder);
        encoder.into_inner()
    }

    fn encode_into(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_hash(&self.prev_block);
        encoder.write_hash(&self.merkle_root);
        encoder.write_hash(&self.stake_root);
        encoder.write_u16_le(self.vote_bits);
        encoder.write_u16_le(self.voters);
        encoder.write_u8(self.fresh_stake);
        encoder.write_u8(self.revocations);
        encoder.write_u32_le(self.height);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = Self::consensus_decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(header)
    }

    pub fn consensus_decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            prev_block: decoder.read_hash()?,
            merkle_root: decoder.read_hash()?,
            stake_root: decoder.read_hash()?,
            vote_bits: decoder.read_u16_le()?,
            voters: decoder.read_u16_le()?,
            fresh_stake: decoder.read_u8()?,
            revocations: decoder.read_u8()?,
            height: decoder.read_u32_le()?,
            time: decoder.read_u32_le()?,
            bits: decoder.read_u32_le()?,
            nonce: decoder.read_u32_le()?,
        })
    }
}

/// A block with its regular and stake transaction trees.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub stake_transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        self.header.encode_into(&mut encoder);
        for tree in [&self.transactions, &self.stake_transactions] {
            encoder.write_varint(tree.len() as u64);
            for tx in tree {
                encoder.write_bytes(&tx.consensus_encode());
            }
        }
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = BlockHeader::consensus_decode_from(&mut decoder)?;
        let transactions = decode_tree(&mut decoder)?;
        let stake_transactions = decode_tree(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            header,
            transactions,
            stake_transactions,
        })
    }
}

fn decode_tree(decoder: &mut Decoder) -> Result<Vec<Transaction>, DecodeError> {
    // version, two counts, lock time, expiry and the witness count.
    let count = decoder.read_count(2 + 1 + 1 + 4 + 4 + 1)?;
    let mut txs = Vec::with_capacity(count);
    for _ in 0..count {
        txs.push(Transaction::decode_from(decoder)?);
    }
    Ok(txs)
}
