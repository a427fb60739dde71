//! Transaction outpoint type.

use std::fmt;

use vgld_consensus::constants::NULL_OUTPOINT_INDEX;
use vgld_consensus::{Hash256, ZERO_HASH};

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::hash_to_hex;

/// Which of a block's two transaction trees an output lives in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TxTree {
    #[default]
    Regular,
    Stake,
}

impl TxTree {
    pub fn as_u8(self) -> u8 {
        match self {
            TxTree::Regular => 0,
            TxTree::Stake => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TxTree::Regular),
            1 => Some(TxTree::Stake),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
    pub tree: TxTree,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u32, tree: TxTree) -> Self {
        Self { hash, index, tree }
    }

    pub fn null() -> Self {
        Self {
            hash: ZERO_HASH,
            index: NULL_OUTPOINT_INDEX,
            tree: TxTree::Regular,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == NULL_OUTPOINT_INDEX && self.hash == ZERO_HASH
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            hash_to_hex(&self.hash),
            self.index,
            self.tree.as_u8()
        )
    }
}

impl Encodable for OutPoint {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash(&self.hash);
        encoder.write_u32_le(self.index);
        encoder.write_u8(self.tree.as_u8());
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let hash = decoder.read_hash()?;
        let index = decoder.read_u32_le()?;
        let tree = TxTree::from_u8(decoder.read_u8()?)
            .ok_or(DecodeError::InvalidData("invalid transaction tree"))?;
        Ok(Self { hash, index, tree })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode, encode};

    #[test]
    fn tree_is_part_of_identity() {
        let regular = OutPoint::new([7u8; 32], 1, TxTree::Regular);
        let stake = OutPoint::new([7u8; 32], 1, TxTree::Stake);
        assert_ne!(regular, stake);
    }

    #[test]
    fn rejects_unknown_tree() {
        let mut bytes = encode(&OutPoint::new([1u8; 32], 0, TxTree::Stake));
        *bytes.last_mut().expect("tree byte") = 9;
        assert!(matches!(
            decode::<OutPoint>(&bytes),
            Err(DecodeError::InvalidData(_))
        ));
    }

    #[test]
    fn null_outpoint() {
        assert!(OutPoint::null().is_null());
        assert!(!OutPoint::new([0u8; 32], 0, TxTree::Regular).is_null());
    }
}
