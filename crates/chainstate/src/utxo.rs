//! Unspent output entries and their persisted form.

use vgld_primitives::encoding::Decoder;
use vgld_primitives::outpoint::OutPoint;
use vgld_primitives::stake::TxType;

use crate::compress::{
    compressed_txout_size, decode_compressed_txout, put_compressed_txout, put_vlq, read_vlq,
    vlq_size, CompressError,
};
use crate::ticket::TicketMinOuts;

pub const OUTPOINT_KEY_LEN: usize = 37;

const FLAG_COINBASE: u8 = 1 << 0;
const FLAG_HAS_EXPIRY: u8 = 1 << 1;
const FLAG_TX_TYPE_SHIFT: u8 = 2;
const FLAG_TX_TYPE_MASK: u8 = 0x0f << FLAG_TX_TYPE_SHIFT;

/// Transaction provenance packed into one byte: bit 0 coinbase, bit 1 has
/// expiry, bits 2..=5 transaction type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct TxFlags(u8);

impl TxFlags {
    pub fn new(is_coinbase: bool, has_expiry: bool, tx_type: TxType) -> Self {
        let mut bits = tx_type.as_u8() << FLAG_TX_TYPE_SHIFT;
        if is_coinbase {
            bits |= FLAG_COINBASE;
        }
        if has_expiry {
            bits |= FLAG_HAS_EXPIRY;
        }
        Self(bits)
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        if bits & !(FLAG_COINBASE | FLAG_HAS_EXPIRY | FLAG_TX_TYPE_MASK) != 0 {
            return None;
        }
        TxType::from_u8((bits & FLAG_TX_TYPE_MASK) >> FLAG_TX_TYPE_SHIFT)?;
        Some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_coinbase(self) -> bool {
        self.0 & FLAG_COINBASE != 0
    }

    pub fn has_expiry(self) -> bool {
        self.0 & FLAG_HAS_EXPIRY != 0
    }

    pub fn tx_type(self) -> TxType {
        TxType::from_u8((self.0 & FLAG_TX_TYPE_MASK) >> FLAG_TX_TYPE_SHIFT).unwrap_or_default()
    }
}

/// In-memory bookkeeping bits. Never persisted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct UtxoState(u8);

impl UtxoState {
    /// Logically absent; the slot stays so later steps see the visit.
    pub const SPENT: UtxoState = UtxoState(1 << 0);
    /// Differs from the backing store.
    pub const MODIFIED: UtxoState = UtxoState(1 << 1);
    /// Not present in the backing store, so spending it needs no delete.
    pub const FRESH: UtxoState = UtxoState(1 << 2);
    /// Spent later in the same block's regular tree that created it.
    pub const SPENT_BY_ZERO_CONF: UtxoState = UtxoState(1 << 3);

    pub const fn empty() -> Self {
        UtxoState(0)
    }

    pub fn contains(self, other: UtxoState) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: UtxoState) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: UtxoState) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for UtxoState {
    type Output = UtxoState;

    fn bitor(self, rhs: UtxoState) -> UtxoState {
        UtxoState(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtxoEntry {
    amount: i64,
    pk_script: Vec<u8>,
    script_version: u16,
    block_height: u32,
    block_index: u32,
    flags: TxFlags,
    ticket_min_outs: Option<TicketMinOuts>,
    state: UtxoState,
}

impl UtxoEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        amount: i64,
        pk_script: Vec<u8>,
        script_version: u16,
        block_height: u32,
        block_index: u32,
        flags: TxFlags,
        ticket_min_outs: Option<TicketMinOuts>,
        state: UtxoState,
    ) -> Self {
        Self {
            amount,
            pk_script,
            script_version,
            block_height,
            block_index,
            flags,
            ticket_min_outs,
            state,
        }
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn pk_script(&self) -> &[u8] {
        &self.pk_script
    }

    pub fn script_version(&self) -> u16 {
        self.script_version
    }

    pub fn block_height(&self) -> u32 {
        self.block_height
    }

    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    pub fn tx_flags(&self) -> TxFlags {
        self.flags
    }

    pub fn is_coinbase(&self) -> bool {
        self.flags.is_coinbase()
    }

    pub fn has_expiry(&self) -> bool {
        self.flags.has_expiry()
    }

    pub fn tx_type(&self) -> TxType {
        self.flags.tx_type()
    }

    pub fn ticket_min_outs(&self) -> Option<&TicketMinOuts> {
        self.ticket_min_outs.as_ref()
    }

    pub fn state(&self) -> UtxoState {
        self.state
    }

    pub fn is_spent(&self) -> bool {
        self.state.contains(UtxoState::SPENT)
    }

    pub fn is_modified(&self) -> bool {
        self.state.contains(UtxoState::MODIFIED)
    }

    pub fn is_fresh(&self) -> bool {
        self.state.contains(UtxoState::FRESH)
    }

    pub fn is_spent_by_zero_conf(&self) -> bool {
        self.state.contains(UtxoState::SPENT_BY_ZERO_CONF)
    }

    /// Marks the output spent. Callers capture anything they need for the
    /// spend journal first.
    pub fn spend(&mut self) {
        if self.is_spent() {
            return;
        }
        self.state.insert(UtxoState::SPENT | UtxoState::MODIFIED);
    }

    pub(crate) fn state_mut(&mut self) -> &mut UtxoState {
        &mut self.state
    }

    /// Overwrites every persisted field; state bits are left to the caller.
    pub(crate) fn replace_output(
        &mut self,
        amount: i64,
        pk_script: &[u8],
        script_version: u16,
        block_height: u32,
        block_index: u32,
        flags: TxFlags,
        ticket_min_outs: Option<TicketMinOuts>,
    ) {
        self.amount = amount;
        self.script_version = script_version;
        self.block_height = block_height;
        self.block_index = block_index;
        self.flags = flags;
        self.ticket_min_outs = ticket_min_outs;
        if self.pk_script != pk_script {
            self.pk_script = pk_script.to_vec();
        }
    }

    pub fn encoded_len(&self) -> usize {
        vlq_size(u64::from(self.block_height))
            + vlq_size(u64::from(self.block_index))
            + vlq_size(u64::from(self.flags.bits()))
            + compressed_txout_size(self.amount, self.script_version, &self.pk_script, true)
            + self.ticket_min_outs.as_ref().map_or(0, |t| t.as_bytes().len())
    }

    /// `VLQ(height) VLQ(index) VLQ(flags) compressed-txout [ticket-min-outs]`
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        put_vlq(&mut out, u64::from(self.block_height));
        put_vlq(&mut out, u64::from(self.block_index));
        put_vlq(&mut out, u64::from(self.flags.bits()));
        put_compressed_txout(
            &mut out,
            self.amount,
            self.script_version,
            &self.pk_script,
            true,
        );
        if let Some(ticket) = &self.ticket_min_outs {
            out.extend_from_slice(ticket.as_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CompressError> {
        let mut decoder = Decoder::new(bytes);
        let block_height = read_u32_vlq(&mut decoder)?;
        let block_index = read_u32_vlq(&mut decoder)?;
        let flags = u8::try_from(read_vlq(&mut decoder)?)
            .ok()
            .and_then(TxFlags::from_bits)
            .ok_or(CompressError::Invalid("invalid utxo flags"))?;
        let (amount, script_version, pk_script) = decode_compressed_txout(&mut decoder, true)?;
        let ticket_min_outs = if decoder.is_empty() {
            None
        } else {
            if flags.tx_type() != TxType::Ticket {
                return Err(CompressError::Invalid("trailing data after utxo entry"));
            }
            Some(TicketMinOuts::from_bytes(decoder.rest().to_vec())?)
        };
        Ok(Self {
            amount,
            pk_script,
            script_version,
            block_height,
            block_index,
            flags,
            ticket_min_outs,
            state: UtxoState::empty(),
        })
    }
}

pub(crate) fn read_u32_vlq(decoder: &mut Decoder) -> Result<u32, CompressError> {
    u32::try_from(read_vlq(decoder)?).map_err(|_| CompressError::VlqOverflow)
}

/// Store key for an outpoint: hash, little-endian index, tree byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct OutPointKey([u8; OUTPOINT_KEY_LEN]);

impl OutPointKey {
    pub fn new(outpoint: &OutPoint) -> Self {
        let mut bytes = [0u8; OUTPOINT_KEY_LEN];
        bytes[..32].copy_from_slice(&outpoint.hash);
        bytes[32..36].copy_from_slice(&outpoint.index.to_le_bytes());
        bytes[36] = outpoint.tree.as_u8();
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgld_primitives::outpoint::TxTree;

    fn p2pkh(tag: u8) -> Vec<u8> {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&[tag; 20]);
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }

    #[test]
    fn flags_pack_into_one_byte() {
        let flags = TxFlags::new(true, true, TxType::TreasuryBase);
        assert!(flags.is_coinbase());
        assert!(flags.has_expiry());
        assert_eq!(flags.tx_type(), TxType::TreasuryBase);
        assert_eq!(flags.bits(), 0b0001_1011);
        assert_eq!(TxFlags::from_bits(flags.bits()), Some(flags));
        assert_eq!(TxFlags::from_bits(0x40), None);
        assert_eq!(TxFlags::from_bits(7 << 2), None);
    }

    #[test]
    fn spend_is_idempotent() {
        let mut entry = UtxoEntry::new(
            10,
            p2pkh(1),
            0,
            5,
            1,
            TxFlags::default(),
            None,
            UtxoState::FRESH,
        );
        entry.spend();
        assert!(entry.is_spent() && entry.is_modified() && entry.is_fresh());
        let state = entry.state();
        entry.spend();
        assert_eq!(entry.state(), state);
    }

    #[test]
    fn persisted_form_drops_state() {
        let entry = UtxoEntry::new(
            546,
            p2pkh(7),
            0,
            12_345,
            3,
            TxFlags::new(false, true, TxType::Regular),
            None,
            UtxoState::MODIFIED | UtxoState::FRESH,
        );
        let decoded = UtxoEntry::decode(&entry.encode()).expect("decode");
        assert_eq!(decoded.amount(), 546);
        assert_eq!(decoded.pk_script(), entry.pk_script());
        assert_eq!(decoded.block_height(), 12_345);
        assert_eq!(decoded.block_index(), 3);
        assert!(decoded.has_expiry());
        assert_eq!(decoded.state(), UtxoState::empty());
        assert_eq!(entry.encode().len(), entry.encoded_len());
    }

    #[test]
    fn decode_rejects_stray_ticket_data() {
        let entry = UtxoEntry::new(
            1,
            p2pkh(2),
            0,
            1,
            0,
            TxFlags::default(),
            None,
            UtxoState::empty(),
        );
        let mut bytes = entry.encode();
        bytes.push(0x00);
        assert!(UtxoEntry::decode(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_overflowing_amount() {
        let mut bytes = Vec::new();
        put_vlq(&mut bytes, 7);
        put_vlq(&mut bytes, 1);
        put_vlq(&mut bytes, 0);
        put_vlq(&mut bytes, u64::MAX - 5);
        put_vlq(&mut bytes, 0);
        bytes.push(0x00);
        bytes.extend_from_slice(&[3u8; 20]);
        assert!(matches!(
            UtxoEntry::decode(&bytes),
            Err(CompressError::Invalid(_))
        ));
    }

    #[test]
    fn key_includes_tree() {
        let regular = OutPointKey::new(&OutPoint::new([9u8; 32], 2, TxTree::Regular));
        let stake = OutPointKey::new(&OutPoint::new([9u8; 32], 2, TxTree::Stake));
        assert_ne!(regular, stake);
        assert_eq!(&regular.as_bytes()[32..36], &2u32.to_le_bytes());
    }
}
