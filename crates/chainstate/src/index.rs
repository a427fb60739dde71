//! Main chain bookkeeping: stored blocks, the height index and the tip.

use std::sync::Arc;

use vgld_consensus::Hash256;
use vgld_primitives::block::Block;
use vgld_storage::{Column, KeyValueStore, WriteBatch};

use crate::state::ChainStateError;

const META_BEST_BLOCK_KEY: &[u8] = b"best_block";
const BEST_BLOCK_LEN: usize = 32 + 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainTip {
    pub hash: Hash256,
    pub height: u32,
}

impl ChainTip {
    fn encode(&self) -> [u8; BEST_BLOCK_LEN] {
        let mut out = [0u8; BEST_BLOCK_LEN];
        out[..32].copy_from_slice(&self.hash);
        out[32..].copy_from_slice(&self.height.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != BEST_BLOCK_LEN {
            return None;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        let mut height = [0u8; 4];
        height.copy_from_slice(&bytes[32..]);
        Some(Self {
            hash,
            height: u32::from_le_bytes(height),
        })
    }
}

pub struct ChainIndex<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> ChainIndex<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn best_block(&self) -> Result<Option<ChainTip>, ChainStateError> {
        match self.store.get(Column::Meta, META_BEST_BLOCK_KEY)? {
            Some(bytes) => ChainTip::decode(&bytes)
                .map(Some)
                .ok_or(ChainStateError::CorruptIndex("invalid best block record")),
            None => Ok(None),
        }
    }

    pub fn set_best_block(&self, batch: &mut WriteBatch, tip: &ChainTip) {
        batch.put(Column::Meta, META_BEST_BLOCK_KEY, tip.encode().to_vec());
    }

    pub fn block(&self, hash: &Hash256) -> Result<Option<Block>, ChainStateError> {
        match self.store.get(Column::Block, hash)? {
            Some(bytes) => Ok(Some(Block::consensus_decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_block(&self, batch: &mut WriteBatch, hash: &Hash256, block: &Block) {
        batch.put(Column::Block, hash, block.consensus_encode());
    }

    pub fn hash_at_height(&self, height: u32) -> Result<Option<Hash256>, ChainStateError> {
        match self.store.get(Column::HeightIndex, &height_key(height))? {
            Some(bytes) => {
                let hash: Hash256 = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| ChainStateError::CorruptIndex("invalid height index entry"))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    pub fn set_height(&self, batch: &mut WriteBatch, height: u32, hash: &Hash256) {
        batch.put(Column::HeightIndex, &height_key(height), hash.to_vec());
    }

    pub fn clear_height(&self, batch: &mut WriteBatch, height: u32) {
        batch.delete(Column::HeightIndex, &height_key(height));
    }
}

/// Big-endian so the index iterates in height order.
pub fn height_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgld_storage::memory::MemoryStore;

    #[test]
    fn best_block_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let index = ChainIndex::new(Arc::clone(&store));
        assert_eq!(index.best_block().expect("read"), None);

        let tip = ChainTip {
            hash: [4u8; 32],
            height: 300,
        };
        let mut batch = WriteBatch::new();
        index.set_best_block(&mut batch, &tip);
        index.set_height(&mut batch, tip.height, &tip.hash);
        store.write_batch(&batch).expect("write");

        assert_eq!(index.best_block().expect("read"), Some(tip));
        assert_eq!(index.hash_at_height(300).expect("read"), Some(tip.hash));
        assert_eq!(index.hash_at_height(301).expect("read"), None);
    }

    #[test]
    fn rejects_short_best_block() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(Column::Meta, META_BEST_BLOCK_KEY, &[1, 2, 3])
            .expect("put");
        let index = ChainIndex::new(store);
        assert!(matches!(
            index.best_block(),
            Err(ChainStateError::CorruptIndex(_))
        ));
    }

    #[test]
    fn height_keys_sort_by_height() {
        assert!(height_key(255) < height_key(256));
    }
}
