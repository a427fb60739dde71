//! Transaction classification by stake tagging opcodes.

use vgld_consensus::constants::COINBASE_TX_VERSION_TREASURY;
use vgld_consensus::AgendaFlags;

use crate::transaction::Transaction;

pub const OP_RETURN: u8 = 0x6a;
pub const OP_SSTX: u8 = 0xba;
pub const OP_SSGEN: u8 = 0xbb;
pub const OP_SSRTX: u8 = 0xbc;
pub const OP_SSTXCHANGE: u8 = 0xbd;
pub const OP_TADD: u8 = 0xc1;
pub const OP_TSPEND: u8 = 0xc2;
pub const OP_TGEN: u8 = 0xc3;

/// Transaction type as recorded in the packed utxo flags (4 bits).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum TxType {
    #[default]
    Regular,
    Ticket,
    Vote,
    Revocation,
    TreasuryAdd,
    TreasurySpend,
    TreasuryBase,
}

impl TxType {
    pub fn as_u8(self) -> u8 {
        match self {
            TxType::Regular => 0,
            TxType::Ticket => 1,
            TxType::Vote => 2,
            TxType::Revocation => 3,
            TxType::TreasuryAdd => 4,
            TxType::TreasurySpend => 5,
            TxType::TreasuryBase => 6,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => TxType::Regular,
            1 => TxType::Ticket,
            2 => TxType::Vote,
            3 => TxType::Revocation,
            4 => TxType::TreasuryAdd,
            5 => TxType::TreasurySpend,
            6 => TxType::TreasuryBase,
            _ => return None,
        })
    }

    /// Whether transactions of this type live in the stake tree.
    pub fn is_stake(self) -> bool {
        self != TxType::Regular
    }
}

fn leading_opcode(script: &[u8]) -> Option<u8> {
    script.first().copied()
}

fn has_single_null_input(tx: &Transaction) -> bool {
    tx.vin.len() == 1 && tx.vin[0].prevout.is_null()
}

pub fn determine_tx_type(tx: &Transaction) -> TxType {
    let first = tx.vout.first().and_then(|out| leading_opcode(&out.pk_script));
    match first {
        Some(OP_SSTX) => return TxType::Ticket,
        Some(OP_TADD) => {
            return if has_single_null_input(tx) {
                TxType::TreasuryBase
            } else {
                TxType::TreasuryAdd
            }
        }
        Some(OP_RETURN)
            if tx.vout.len() > 1
                && tx.vout[1..]
                    .iter()
                    .all(|out| leading_opcode(&out.pk_script) == Some(OP_TGEN)) =>
        {
            return TxType::TreasurySpend
        }
        _ => {}
    }
    let any_tagged = |op: u8| {
        tx.vout
            .iter()
            .any(|out| leading_opcode(&out.pk_script) == Some(op))
    };
    if any_tagged(OP_SSGEN) {
        TxType::Vote
    } else if any_tagged(OP_SSRTX) {
        TxType::Revocation
    } else {
        TxType::Regular
    }
}

/// Coinbase check. Once the treasury agenda is active the coinbase must also
/// carry the treasury coinbase version.
pub fn is_coinbase_tx(tx: &Transaction, flags: AgendaFlags) -> bool {
    if !has_single_null_input(tx) || determine_tx_type(tx) != TxType::Regular {
        return false;
    }
    !flags.treasury_enabled || tx.version == COINBASE_TX_VERSION_TREASURY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outpoint::{OutPoint, TxTree};
    use crate::transaction::{TxIn, TxOut};

    fn tx_with_outputs(inputs: Vec<TxIn>, scripts: &[&[u8]]) -> Transaction {
        Transaction {
            version: 1,
            vin: inputs,
            vout: scripts
                .iter()
                .map(|script| TxOut::new(10, script.to_vec()))
                .collect(),
            lock_time: 0,
            expiry: 0,
        }
    }

    fn spend_input() -> TxIn {
        TxIn::new(OutPoint::new([4u8; 32], 0, TxTree::Regular), 10)
    }

    #[test]
    fn classifies_stake_types() {
        let ticket = tx_with_outputs(vec![spend_input()], &[&[OP_SSTX, 0x76], &[OP_RETURN]]);
        assert_eq!(determine_tx_type(&ticket), TxType::Ticket);

        let vote = tx_with_outputs(
            vec![TxIn::new(OutPoint::null(), 0), spend_input()],
            &[&[OP_RETURN], &[OP_RETURN], &[OP_SSGEN, 0x76]],
        );
        assert_eq!(determine_tx_type(&vote), TxType::Vote);

        let revocation = tx_with_outputs(vec![spend_input()], &[&[OP_SSRTX, 0x76]]);
        assert_eq!(determine_tx_type(&revocation), TxType::Revocation);

        let tbase = tx_with_outputs(vec![TxIn::new(OutPoint::null(), 0)], &[&[OP_TADD]]);
        assert_eq!(determine_tx_type(&tbase), TxType::TreasuryBase);

        let tadd = tx_with_outputs(vec![spend_input()], &[&[OP_TADD]]);
        assert_eq!(determine_tx_type(&tadd), TxType::TreasuryAdd);

        let tspend = tx_with_outputs(
            vec![TxIn::new(OutPoint::null(), 0)],
            &[&[OP_RETURN, 0x20], &[OP_TGEN, 0x76]],
        );
        assert_eq!(determine_tx_type(&tspend), TxType::TreasurySpend);
    }

    #[test]
    fn coinbase_version_gate() {
        let mut coinbase = tx_with_outputs(vec![TxIn::new(OutPoint::null(), 0)], &[&[0x51]]);
        assert!(is_coinbase_tx(&coinbase, AgendaFlags::none()));
        assert!(!is_coinbase_tx(&coinbase, AgendaFlags::with_treasury()));
        coinbase.version = COINBASE_TX_VERSION_TREASURY;
        assert!(is_coinbase_tx(&coinbase, AgendaFlags::with_treasury()));

        let regular = tx_with_outputs(vec![spend_input()], &[&[0x51]]);
        assert!(!is_coinbase_tx(&regular, AgendaFlags::none()));
    }

    #[test]
    fn type_codes_fit_four_bits() {
        for code in 0..=6u8 {
            let tx_type = TxType::from_u8(code).expect("known type");
            assert_eq!(tx_type.as_u8(), code);
            assert!(tx_type.as_u8() < 16);
            assert_eq!(tx_type.is_stake(), code != 0);
        }
        assert_eq!(TxType::from_u8(7), None);
    }
}
