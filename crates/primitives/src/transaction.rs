//! Transaction types and serialization.
//!
//! A transaction serializes as a prefix (inputs' outpoints and sequences,
//! outputs, lock time, expiry) followed by a witness section carrying each
//! input's fraud-proof fields and signature script. The transaction hash
//! commits to the prefix only.

use vgld_consensus::constants::NO_EXPIRY_VALUE;
use vgld_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

/// Minimum serialized size of one input in the prefix.
const MIN_TXIN_PREFIX_LEN: usize = 32 + 4 + 1 + 4;
/// Minimum serialized size of one output.
const MIN_TXOUT_LEN: usize = 8 + 2 + 1;

#[derive(Clone, Debug, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub sequence: u32,
    /// Fraud proof: amount of the referenced output.
    pub value_in: i64,
    /// Fraud proof: height of the block holding the referenced output.
    pub block_height: u32,
    /// Fraud proof: index of the referenced transaction within its tree.
    pub block_index: u32,
    pub signature_script: Vec<u8>,
}

impl TxIn {
    pub fn new(prevout: OutPoint, value_in: i64) -> Self {
        Self {
            prevout,
            sequence: u32::MAX,
            value_in,
            block_height: 0,
            block_index: u32::MAX,
            signature_script: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub version: u16,
    pub pk_script: Vec<u8>,
}

impl TxOut {
    pub fn new(value: i64, pk_script: Vec<u8>) -> Self {
        Self {
            value,
            version: 0,
            pk_script,
        }
    }
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_u16_le(self.version);
        encoder.write_var_bytes(&self.pk_script);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let version = decoder.read_u16_le()?;
        let pk_script = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            version,
            pk_script,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: u16,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
    pub expiry: u32,
}

impl Transaction {
    pub fn has_expiry(&self) -> bool {
        self.expiry != NO_EXPIRY_VALUE
    }

    pub fn txid(&self) -> Hash256 {
        let mut encoder = Encoder::with_capacity(self.prefix_size_hint());
        self.encode_prefix(&mut encoder);
        sha256d(&encoder.into_inner())
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(self.prefix_size_hint() * 2);
        self.encode_prefix(&mut encoder);
        self.encode_witness(&mut encoder);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(tx)
    }

    fn prefix_size_hint(&self) -> usize {
        16 + self.vin.len() * MIN_TXIN_PREFIX_LEN
            + self
                .vout
                .iter()
                .map(|out| MIN_TXOUT_LEN + out.pk_script.len())
                .sum::<usize>()
    }

    fn encode_prefix(&self, encoder: &mut Encoder) {
        encoder.write_u16_le(self.version);
        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.prevout.consensus_encode(encoder);
            encoder.write_u32_le(input.sequence);
        }
        encoder.write_varint(self.vout.len() as u64);
        for output in &self.vout {
            output.consensus_encode(encoder);
        }
        encoder.write_u32_le(self.lock_time);
        encoder.write_u32_le(self.expiry);
    }

    fn encode_witness(&self, encoder: &mut Encoder) {
        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            encoder.write_i64_le(input.value_in);
            encoder.write_u32_le(input.block_height);
            encoder.write_u32_le(input.block_index);
            encoder.write_var_bytes(&input.signature_script);
        }
    }

    pub fn decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_u16_le()?;
        let vin_len = decoder.read_count(MIN_TXIN_PREFIX_LEN)?;
        let mut vin = Vec::with_capacity(vin_len);
        for _ in 0..vin_len {
            let prevout = OutPoint::consensus_decode(decoder)?;
            let sequence = decoder.read_u32_le()?;
            vin.push(TxIn {
                prevout,
                sequence,
                value_in: 0,
                block_height: 0,
                block_index: 0,
                signature_script: Vec::new(),
            });
        }
        let vout_len = decoder.read_count(MIN_TXOUT_LEN)?;
        let mut vout = Vec::with_capacity(vout_len);
        for _ in 0..vout_len {
            vout.push(TxOut::consensus_decode(decoder)?);
        }
        let lock_time = decoder.read_u32_le()?;
        let expiry = decoder.read_u32_le()?;

        let witness_len = decoder.read_count(1)?;
        if witness_len != vin.len() {
            return Err(DecodeError::InvalidData(
                "witness count does not match input count",
            ));
        }
        for input in &mut vin {
            input.value_in = decoder.read_i64_le()?;
            input.block_height = decoder.read_u32_le()?;
            input.block_index = decoder.read_u32_le()?;
            input.signature_script = decoder.read_var_bytes()?;
        }

        Ok(Self {
            version,
            vin,
            vout,
            lock_time,
            expiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outpoint::TxTree;

    fn sample_tx() -> Transaction {
        let mut input = TxIn::new(OutPoint::new([3u8; 32], 1, TxTree::Stake), 5_000);
        input.block_height = 12;
        input.block_index = 2;
        input.signature_script = vec![0x51];
        Transaction {
            version: 1,
            vin: vec![input],
            vout: vec![TxOut::new(4_000, vec![0x76, 0xa9])],
            lock_time: 0,
            expiry: 0,
        }
    }

    #[test]
    fn txid_ignores_witness_data() {
        let tx = sample_tx();
        let mut other = tx.clone();
        other.vin[0].signature_script = vec![0x00, 0x01];
        other.vin[0].value_in = 1;
        assert_eq!(tx.txid(), other.txid());

        let mut changed = tx.clone();
        changed.vout[0].value = 3_999;
        assert_ne!(tx.txid(), changed.txid());
    }

    #[test]
    fn decode_restores_witness_fields() {
        let tx = sample_tx();
        let decoded = Transaction::consensus_decode(&tx.consensus_encode()).expect("decode");
        assert_eq!(decoded, tx);
    }

    #[test]
    fn decode_rejects_witness_count_mismatch() {
        let tx = sample_tx();
        let mut bytes = tx.consensus_encode();
        // The witness count follows the prefix; the prefix of this tx is fixed length.
        let prefix_len = 2 + 1 + (32 + 4 + 1 + 4) + 1 + (8 + 2 + 1 + 2) + 4 + 4;
        bytes[prefix_len] = 2;
        assert!(Transaction::consensus_decode(&bytes).is_err());
    }
}
