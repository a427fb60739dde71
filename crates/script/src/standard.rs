//! Standard script classification utilities.

use vgld_consensus::constants::MAX_SCRIPT_SIZE;

use crate::secp::{is_valid_pubkey, COMPRESSED_PUBKEY_LEN, UNCOMPRESSED_PUBKEY_LEN};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptType {
    P2Pkh,
    P2Sh,
    P2PkCompressed,
    P2PkUncompressed,
    NullData,
    Unknown,
}

pub const OP_DATA_20: u8 = 0x14;
pub const OP_DATA_33: u8 = 0x21;
pub const OP_DATA_65: u8 = 0x41;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

const P2PKH_LEN: usize = 25;
const P2SH_LEN: usize = 23;

pub fn classify_script_pubkey(script: &[u8]) -> ScriptType {
    if extract_p2pkh_hash(script).is_some() {
        ScriptType::P2Pkh
    } else if extract_p2sh_hash(script).is_some() {
        ScriptType::P2Sh
    } else if let Some(pubkey) = extract_pubkey(script) {
        if pubkey.len() == COMPRESSED_PUBKEY_LEN {
            ScriptType::P2PkCompressed
        } else {
            ScriptType::P2PkUncompressed
        }
    } else if script.first() == Some(&OP_RETURN) {
        ScriptType::NullData
    } else {
        ScriptType::Unknown
    }
}

pub fn extract_p2pkh_hash(script: &[u8]) -> Option<&[u8]> {
    let matches = script.len() == P2PKH_LEN
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == OP_DATA_20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG;
    matches.then(|| &script[3..23])
}

pub fn extract_p2sh_hash(script: &[u8]) -> Option<&[u8]> {
    let matches = script.len() == P2SH_LEN
        && script[0] == OP_HASH160
        && script[1] == OP_DATA_20
        && script[22] == OP_EQUAL;
    matches.then(|| &script[2..22])
}

/// Returns the serialized key of a pay-to-pubkey script, only when the key
/// parses as a valid curve point.
pub fn extract_pubkey(script: &[u8]) -> Option<&[u8]> {
    let key = match (script.len(), script.first().copied()) {
        (len, Some(OP_DATA_33)) if len == COMPRESSED_PUBKEY_LEN + 2 => {
            let key = &script[1..1 + COMPRESSED_PUBKEY_LEN];
            if key[0] != 0x02 && key[0] != 0x03 {
                return None;
            }
            key
        }
        (len, Some(OP_DATA_65)) if len == UNCOMPRESSED_PUBKEY_LEN + 2 => {
            let key = &script[1..1 + UNCOMPRESSED_PUBKEY_LEN];
            if key[0] != 0x04 {
                return None;
            }
            key
        }
        _ => return None,
    };
    if script[script.len() - 1] != OP_CHECKSIG || !is_valid_pubkey(key) {
        return None;
    }
    Some(key)
}

pub fn p2pkh_script(hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(P2PKH_LEN);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, OP_DATA_20]);
    script.extend_from_slice(hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

pub fn p2sh_script(hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(P2SH_LEN);
    script.extend_from_slice(&[OP_HASH160, OP_DATA_20]);
    script.extend_from_slice(hash);
    script.push(OP_EQUAL);
    script
}

pub fn p2pk_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(pubkey.len() + 2);
    script.push(pubkey.len() as u8);
    script.extend_from_slice(pubkey);
    script.push(OP_CHECKSIG);
    script
}

/// Outputs that can never be spent are not tracked in the utxo set: zero
/// amounts, oversized scripts and provably pruneable `OP_RETURN` scripts.
pub fn is_unspendable(amount: i64, script: &[u8]) -> bool {
    amount == 0 || script.len() > MAX_SCRIPT_SIZE || script.first() == Some(&OP_RETURN)
}
