//! Per-block journal of spent outputs.
//!
//! Connecting a block appends one [`SpentTxOut`] per consumed input, stake
//! tree first and regular tree second. Disconnect walks the same list from
//! the tail, so the order is part of the format.

use vgld_consensus::{AgendaFlags, Hash256};
use vgld_primitives::block::Block;
use vgld_primitives::encoding::Decoder;
use vgld_primitives::stake::{determine_tx_type, TxType};
use vgld_storage::{Column, KeyValueStore, WriteBatch};

use crate::compress::{
    compressed_txout_size, decode_compressed_txout, put_compressed_txout, put_vlq, read_vlq,
    vlq_size, CompressError,
};
use crate::ticket::TicketMinOuts;
use crate::utxo::{read_u32_vlq, TxFlags, UtxoEntry, UtxoState};
use crate::view::ViewError;

/// Set in the serialized flags when ticket minimal outputs follow.
const STXO_FLAG_HAS_TICKET: u64 = 0x40;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpentTxOut {
    pub amount: i64,
    pub pk_script: Vec<u8>,
    pub ticket_min_outs: Option<TicketMinOuts>,
    pub block_height: u32,
    pub block_index: u32,
    pub script_version: u16,
    pub flags: TxFlags,
}

impl SpentTxOut {
    /// Captures everything needed to resurrect `entry`. Must run before the
    /// entry is spent.
    pub fn from_entry(entry: &UtxoEntry) -> Self {
        Self {
            amount: entry.amount(),
            pk_script: entry.pk_script().to_vec(),
            ticket_min_outs: entry.ticket_min_outs().cloned(),
            block_height: entry.block_height(),
            block_index: entry.block_index(),
            script_version: entry.script_version(),
            flags: entry.tx_flags(),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.flags.is_coinbase()
    }

    /// Rebuilds the entry this record was taken from, marked modified.
    pub fn to_entry(&self) -> UtxoEntry {
        UtxoEntry::new(
            self.amount,
            self.pk_script.clone(),
            self.script_version,
            self.block_height,
            self.block_index,
            self.flags,
            self.ticket_min_outs.clone(),
            UtxoState::MODIFIED,
        )
    }

    fn serialized_len(&self) -> usize {
        let ticket_len = self.ticket_min_outs.as_ref().map_or(0, |ticket| {
            let len = ticket.as_bytes().len();
            vlq_size(len as u64) + len
        });
        vlq_size(u64::from(self.flags.bits()) | STXO_FLAG_HAS_TICKET)
            + vlq_size(u64::from(self.block_height))
            + vlq_size(u64::from(self.block_index))
            + compressed_txout_size(self.amount, self.script_version, &self.pk_script, true)
            + ticket_len
    }

    fn put(&self, out: &mut Vec<u8>) {
        let mut flags = u64::from(self.flags.bits());
        if self.ticket_min_outs.is_some() {
            flags |= STXO_FLAG_HAS_TICKET;
        }
        put_vlq(out, flags);
        put_vlq(out, u64::from(self.block_height));
        put_vlq(out, u64::from(self.block_index));
        put_compressed_txout(out, self.amount, self.script_version, &self.pk_script, true);
        if let Some(ticket) = &self.ticket_min_outs {
            put_vlq(out, ticket.as_bytes().len() as u64);
            out.extend_from_slice(ticket.as_bytes());
        }
    }

    fn read(decoder: &mut Decoder) -> Result<Self, CompressError> {
        let raw_flags = read_vlq(decoder)?;
        let has_ticket = raw_flags & STXO_FLAG_HAS_TICKET != 0;
        let flags = u8::try_from(raw_flags & !STXO_FLAG_HAS_TICKET)
            .ok()
            .and_then(TxFlags::from_bits)
            .ok_or(CompressError::Invalid("invalid spent output flags"))?;
        let block_height = read_u32_vlq(decoder)?;
        let block_index = read_u32_vlq(decoder)?;
        let (amount, script_version, pk_script) = decode_compressed_txout(decoder, true)?;
        let ticket_min_outs = if has_ticket {
            let len = usize::try_from(read_vlq(decoder)?).map_err(|_| CompressError::Truncated)?;
            Some(TicketMinOuts::from_bytes(decoder.read_slice(len)?.to_vec())?)
        } else {
            None
        };
        Ok(Self {
            amount,
            pk_script,
            ticket_min_outs,
            block_height,
            block_index,
            script_version,
            flags,
        })
    }
}

pub fn encode_spend_journal(stxos: &[SpentTxOut]) -> Vec<u8> {
    let len = vlq_size(stxos.len() as u64)
        + stxos.iter().map(SpentTxOut::serialized_len).sum::<usize>();
    let mut out = Vec::with_capacity(len);
    put_vlq(&mut out, stxos.len() as u64);
    for stxo in stxos {
        stxo.put(&mut out);
    }
    out
}

pub fn decode_spend_journal(bytes: &[u8]) -> Result<Vec<SpentTxOut>, CompressError> {
    let mut decoder = Decoder::new(bytes);
    let count = usize::try_from(read_vlq(&mut decoder)?).map_err(|_| CompressError::Truncated)?;
    // Every record takes at least four bytes.
    if count.saturating_mul(4) > decoder.remaining() {
        return Err(CompressError::Truncated);
    }
    let mut stxos = Vec::with_capacity(count);
    for _ in 0..count {
        stxos.push(SpentTxOut::read(&mut decoder)?);
    }
    if !decoder.is_empty() {
        return Err(CompressError::Invalid("trailing spend journal data"));
    }
    Ok(stxos)
}

/// Inputs consumed by the regular tree. The coinbase has none.
pub fn count_spent_regular_outputs(block: &Block) -> usize {
    block
        .transactions
        .iter()
        .skip(1)
        .map(|tx| tx.vin.len())
        .sum()
}

/// Inputs consumed by the stake tree: votes spend only their ticket, the
/// leading treasury base and treasury spends consume nothing.
pub fn count_spent_stake_outputs(block: &Block, flags: AgendaFlags) -> usize {
    block
        .stake_transactions
        .iter()
        .enumerate()
        .map(|(index, tx)| match determine_tx_type(tx) {
            TxType::Vote => tx.vin.len().saturating_sub(1),
            TxType::TreasuryBase if flags.treasury_enabled && index == 0 => 0,
            TxType::TreasurySpend if flags.treasury_enabled => 0,
            _ => tx.vin.len(),
        })
        .sum()
}

pub fn count_spent_outputs(block: &Block, flags: AgendaFlags) -> usize {
    count_spent_regular_outputs(block) + count_spent_stake_outputs(block, flags)
}

/// Source of spend journals for blocks that are being disconnected.
pub trait SpendJournalReader {
    fn fetch_spend_journal(
        &self,
        block: &Block,
        flags: AgendaFlags,
    ) -> Result<Vec<SpentTxOut>, ViewError>;
}

pub struct SpendJournal<S> {
    store: S,
}

impl<S> SpendJournal<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> SpendJournal<S> {
    pub fn get(&self, block_hash: &Hash256) -> Result<Option<Vec<SpentTxOut>>, ViewError> {
        match self.store.get(Column::SpendJournal, block_hash)? {
            Some(bytes) => Ok(Some(decode_spend_journal(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, batch: &mut WriteBatch, block_hash: &Hash256, stxos: &[SpentTxOut]) {
        batch.put(Column::SpendJournal, block_hash, encode_spend_journal(stxos));
    }

    pub fn delete(&self, batch: &mut WriteBatch, block_hash: &Hash256) {
        batch.delete(Column::SpendJournal, block_hash);
    }
}

impl<S: KeyValueStore> SpendJournalReader for SpendJournal<S> {
    fn fetch_spend_journal(
        &self,
        block: &Block,
        flags: AgendaFlags,
    ) -> Result<Vec<SpentTxOut>, ViewError> {
        let hash = block.hash();
        match self.get(&hash)? {
            Some(stxos) => Ok(stxos),
            // Blocks that spend nothing may have had an empty journal skipped.
            None if count_spent_outputs(block, flags) == 0 => Ok(Vec::new()),
            None => Err(ViewError::Assert(format!(
                "missing spend journal for block at height {}",
                block.height()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgld_primitives::outpoint::{OutPoint, TxTree};
    use vgld_primitives::transaction::{Transaction, TxIn, TxOut};

    fn p2pkh(tag: u8) -> Vec<u8> {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&[tag; 20]);
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }

    fn ticket_tx() -> Transaction {
        let mut submission = vec![0xba];
        submission.extend_from_slice(&p2pkh(3));
        Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::new([1u8; 32], 0, TxTree::Regular), 200)],
            vout: vec![
                TxOut::new(100, submission),
                TxOut::new(0, vec![0x6a, 0x1e, 0x01]),
            ],
            lock_time: 0,
            expiry: 0,
        }
    }

    #[test]
    fn journal_keeps_order_and_tickets() {
        let plain = SpentTxOut {
            amount: 10,
            pk_script: p2pkh(1),
            ticket_min_outs: None,
            block_height: 7,
            block_index: 0,
            script_version: 0,
            flags: TxFlags::new(true, false, TxType::Regular),
        };
        let ticket = SpentTxOut {
            amount: 100,
            pk_script: ticket_tx().vout[0].pk_script.clone(),
            ticket_min_outs: Some(TicketMinOuts::from_tx(&ticket_tx())),
            block_height: 9,
            block_index: 2,
            script_version: 0,
            flags: TxFlags::new(false, false, TxType::Ticket),
        };
        let stxos = vec![plain, ticket];
        let bytes = encode_spend_journal(&stxos);
        assert_eq!(decode_spend_journal(&bytes).expect("decode"), stxos);
    }

    fn treasury_base() -> Transaction {
        Transaction {
            version: 3,
            vin: vec![TxIn::new(OutPoint::null(), 0)],
            vout: vec![TxOut::new(40, vec![0xc1]), TxOut::new(0, vec![0x6a, 0x01, 0x00])],
            lock_time: 0,
            expiry: 0,
        }
    }

    #[test]
    fn treasury_base_spends_nothing_only_at_index_zero() {
        use vgld_primitives::block::BlockHeader;

        let header = BlockHeader {
            version: 9,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            stake_root: [0u8; 32],
            vote_bits: 1,
            voters: 0,
            fresh_stake: 0,
            revocations: 0,
            height: 5,
            time: 0,
            bits: 0,
            nonce: 0,
        };
        let mut block = Block {
            header,
            transactions: Vec::new(),
            stake_transactions: vec![treasury_base(), ticket_tx()],
        };
        let treasury = AgendaFlags::with_treasury();
        assert_eq!(count_spent_stake_outputs(&block, treasury), 1);
        assert_eq!(count_spent_stake_outputs(&block, AgendaFlags::none()), 2);

        block.stake_transactions.reverse();
        assert_eq!(count_spent_stake_outputs(&block, treasury), 2);
    }

    #[test]
    fn empty_journal_is_one_byte() {
        assert_eq!(encode_spend_journal(&[]), vec![0x00]);
        assert!(decode_spend_journal(&[0x00]).expect("decode").is_empty());
    }

    #[test]
    fn rejects_truncated_journal() {
        let stxo = SpentTxOut {
            amount: 5,
            pk_script: p2pkh(4),
            ticket_min_outs: None,
            block_height: 1,
            block_index: 1,
            script_version: 0,
            flags: TxFlags::default(),
        };
        let bytes = encode_spend_journal(&[stxo]);
        assert!(decode_spend_journal(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn to_entry_is_modified_not_spent() {
        let stxo = SpentTxOut {
            amount: 10,
            pk_script: p2pkh(1),
            ticket_min_outs: None,
            block_height: 3,
            block_index: 4,
            script_version: 0,
            flags: TxFlags::new(true, false, TxType::Regular),
        };
        let entry = stxo.to_entry();
        assert!(entry.is_modified());
        assert!(!entry.is_spent());
        assert!(!entry.is_fresh());
        assert_eq!(SpentTxOut::from_entry(&entry), stxo);
    }
}
