//! Minimal commitment outputs kept alongside a ticket's submission output.

use vgld_primitives::encoding::Decoder;
use vgld_primitives::transaction::Transaction;

use crate::compress::{compress_amount, put_vlq, read_compressed_amount, read_vlq, CompressError};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MinimalOutput {
    pub amount: i64,
    pub version: u16,
    pub pk_script: Vec<u8>,
}

/// Serialized minimal form of every output of a ticket purchase:
/// `VLQ(count)` then `VLQ(compressed amount) VLQ(version) VLQ(len) script`
/// per output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TicketMinOuts {
    data: Vec<u8>,
}

impl TicketMinOuts {
    pub fn from_tx(tx: &Transaction) -> Self {
        let mut data = Vec::new();
        put_vlq(&mut data, tx.vout.len() as u64);
        for output in &tx.vout {
            put_vlq(&mut data, compress_amount(output.value as u64));
            put_vlq(&mut data, u64::from(output.version));
            put_vlq(&mut data, output.pk_script.len() as u64);
            data.extend_from_slice(&output.pk_script);
        }
        Self { data }
    }

    /// Wraps already serialized data after checking that it parses.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, CompressError> {
        let mut decoder = Decoder::new(&data);
        read_outputs(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(CompressError::Invalid("trailing ticket output data"));
        }
        Ok(Self { data })
    }

    /// Reads one serialized value from `decoder`, leaving it positioned after
    /// the last output.
    pub fn read_from(decoder: &mut Decoder) -> Result<Self, CompressError> {
        let start = decoder.rest();
        read_outputs(decoder)?;
        let consumed = start.len() - decoder.remaining();
        Ok(Self {
            data: start[..consumed].to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn outputs(&self) -> Result<Vec<MinimalOutput>, CompressError> {
        read_outputs(&mut Decoder::new(&self.data))
    }
}

fn read_outputs(decoder: &mut Decoder) -> Result<Vec<MinimalOutput>, CompressError> {
    let count = usize::try_from(read_vlq(decoder)?).map_err(|_| CompressError::Truncated)?;
    if count > decoder.remaining() {
        return Err(CompressError::Truncated);
    }
    let mut outputs = Vec::with_capacity(count);
    for _ in 0..count {
        let amount = read_compressed_amount(decoder)?;
        let version = u16::try_from(read_vlq(decoder)?).map_err(|_| CompressError::VlqOverflow)?;
        let len = usize::try_from(read_vlq(decoder)?).map_err(|_| CompressError::Truncated)?;
        let pk_script = decoder.read_slice(len)?.to_vec();
        outputs.push(MinimalOutput {
            amount,
            version,
            pk_script,
        });
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgld_primitives::outpoint::{OutPoint, TxTree};
    use vgld_primitives::stake::{OP_RETURN, OP_SSTX, OP_SSTXCHANGE};
    use vgld_primitives::transaction::{TxIn, TxOut};

    fn ticket() -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::new([1u8; 32], 0, TxTree::Regular), 200_000_000)],
            vout: vec![
                TxOut::new(100_000_000, vec![OP_SSTX, 0x76, 0xa9]),
                TxOut::new(0, vec![OP_RETURN, 0x1e, 0x01, 0x02]),
                TxOut::new(0, vec![OP_SSTXCHANGE, 0x76]),
            ],
            lock_time: 0,
            expiry: 0,
        }
    }

    #[test]
    fn outputs_survive_serialization() {
        let tx = ticket();
        let min_outs = TicketMinOuts::from_tx(&tx);
        let outputs = min_outs.outputs().expect("decode");
        assert_eq!(outputs.len(), 3);
        for (output, original) in outputs.iter().zip(&tx.vout) {
            assert_eq!(output.amount, original.value);
            assert_eq!(output.version, original.version);
            assert_eq!(output.pk_script, original.pk_script);
        }
    }

    #[test]
    fn read_from_stops_after_last_output() {
        let min_outs = TicketMinOuts::from_tx(&ticket());
        let mut bytes = min_outs.as_bytes().to_vec();
        bytes.extend_from_slice(&[0xaa, 0xbb]);
        let mut decoder = Decoder::new(&bytes);
        let read = TicketMinOuts::read_from(&mut decoder).expect("read");
        assert_eq!(read, min_outs);
        assert_eq!(decoder.rest(), &[0xaa, 0xbb]);
        assert!(TicketMinOuts::from_bytes(bytes).is_err());
    }
}
