//! Domain-specific compression for persisted outputs.
//!
//! Three layers, each building on the previous one:
//!
//! * VLQ: MSB-first base-128 integers where every continuation byte adds one,
//!   so each value has exactly one encoding.
//! * Amounts: trailing decimal zeros are folded into an exponent, which makes
//!   round coin values encode in one or two bytes.
//! * Scripts: the common standard forms of version 0 scripts collapse into a
//!   one byte type followed by the hash or key x coordinate; anything else is
//!   stored raw behind a `len + 64` prefix.

use std::fmt;

use vgld_primitives::encoding::{DecodeError, Decoder};
use vgld_script::secp::decompress_pubkey;
use vgld_script::standard::{
    extract_p2pkh_hash, extract_p2sh_hash, extract_pubkey, p2pk_script, p2pkh_script, p2sh_script,
};

const SCRIPT_P2PKH: u64 = 0;
const SCRIPT_P2SH: u64 = 1;
const SCRIPT_P2PK_COMPRESSED_EVEN: u64 = 2;
const SCRIPT_P2PK_COMPRESSED_ODD: u64 = 3;
const SCRIPT_P2PK_UNCOMPRESSED_EVEN: u64 = 4;
const SCRIPT_P2PK_UNCOMPRESSED_ODD: u64 = 5;
/// Script type values below this are reserved for special forms.
const NUM_SPECIAL_SCRIPTS: u64 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressError {
    Truncated,
    VlqOverflow,
    ReservedScriptType(u64),
    InvalidPubKey,
    Invalid(&'static str),
}

impl fmt::Display for CompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressError::Truncated => write!(f, "unexpected end of compressed data"),
            CompressError::VlqOverflow => write!(f, "variable length quantity overflows u64"),
            CompressError::ReservedScriptType(kind) => {
                write!(f, "reserved compressed script type {kind}")
            }
            CompressError::InvalidPubKey => write!(f, "compressed script holds invalid pubkey"),
            CompressError::Invalid(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for CompressError {}

impl From<DecodeError> for CompressError {
    fn from(_: DecodeError) -> Self {
        CompressError::Truncated
    }
}

pub fn vlq_size(mut value: u64) -> usize {
    let mut size = 1;
    while value > 0x7f {
        size += 1;
        value = (value >> 7) - 1;
    }
    size
}

pub fn put_vlq(out: &mut Vec<u8>, mut value: u64) {
    let mut buf = [0u8; 10];
    let mut pos = buf.len() - 1;
    buf[pos] = (value & 0x7f) as u8;
    while value > 0x7f {
        value = (value >> 7) - 1;
        pos -= 1;
        buf[pos] = (value & 0x7f) as u8 | 0x80;
    }
    out.extend_from_slice(&buf[pos..]);
}

pub fn read_vlq(decoder: &mut Decoder) -> Result<u64, CompressError> {
    let mut value = 0u64;
    loop {
        let byte = decoder.read_u8()?;
        if value > u64::MAX >> 7 {
            return Err(CompressError::VlqOverflow);
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        value = value.checked_add(1).ok_or(CompressError::VlqOverflow)?;
    }
}

pub fn compress_amount(amount: u64) -> u64 {
    if amount == 0 {
        return 0;
    }
    let mut n = amount;
    let mut exponent = 0;
    while n % 10 == 0 && exponent < 9 {
        n /= 10;
        exponent += 1;
    }
    if exponent < 9 {
        let last_digit = n % 10;
        n /= 10;
        1 + (n * 9 + last_digit - 1) * 10 + exponent
    } else {
        1 + (n - 1) * 10 + 9
    }
}

/// Inverse of [`compress_amount`]. Values that decode past `u64` are rejected.
pub fn decompress_amount(compressed: u64) -> Result<u64, CompressError> {
    const OVERFLOW: CompressError = CompressError::Invalid("compressed amount overflows");
    if compressed == 0 {
        return Ok(0);
    }
    let mut x = compressed - 1;
    let exponent = x % 10;
    x /= 10;
    let mut n = if exponent < 9 {
        let last_digit = x % 9 + 1;
        x /= 9;
        x.checked_mul(10)
            .and_then(|n| n.checked_add(last_digit))
            .ok_or(OVERFLOW)?
    } else {
        x + 1
    };
    for _ in 0..exponent {
        n = n.checked_mul(10).ok_or(OVERFLOW)?;
    }
    Ok(n)
}

/// Reads one compressed amount and checks it fits an `i64`.
pub fn read_compressed_amount(decoder: &mut Decoder) -> Result<i64, CompressError> {
    let amount = decompress_amount(read_vlq(decoder)?)?;
    i64::try_from(amount).map_err(|_| CompressError::Invalid("amount exceeds i64 range"))
}

enum SpecialScript<'a> {
    Hash(u64, &'a [u8]),
    Key(u64, &'a [u8]),
}

fn special_form(version: u16, script: &[u8]) -> Option<SpecialScript<'_>> {
    if version != 0 {
        return None;
    }
    if let Some(hash) = extract_p2pkh_hash(script) {
        return Some(SpecialScript::Hash(SCRIPT_P2PKH, hash));
    }
    if let Some(hash) = extract_p2sh_hash(script) {
        return Some(SpecialScript::Hash(SCRIPT_P2SH, hash));
    }
    let key = extract_pubkey(script)?;
    match key.len() {
        33 => Some(SpecialScript::Key(u64::from(key[0]), &key[1..33])),
        _ => {
            let kind = SCRIPT_P2PK_UNCOMPRESSED_EVEN | u64::from(key[64] & 1);
            Some(SpecialScript::Key(kind, &key[1..33]))
        }
    }
}

pub fn compressed_script_size(version: u16, script: &[u8]) -> usize {
    match special_form(version, script) {
        Some(SpecialScript::Hash(_, hash)) => 1 + hash.len(),
        Some(SpecialScript::Key(_, x)) => 1 + x.len(),
        None => vlq_size(script.len() as u64 + NUM_SPECIAL_SCRIPTS) + script.len(),
    }
}

pub fn put_compressed_script(out: &mut Vec<u8>, version: u16, script: &[u8]) {
    match special_form(version, script) {
        Some(SpecialScript::Hash(kind, bytes)) | Some(SpecialScript::Key(kind, bytes)) => {
            out.push(kind as u8);
            out.extend_from_slice(bytes);
        }
        None => {
            put_vlq(out, script.len() as u64 + NUM_SPECIAL_SCRIPTS);
            out.extend_from_slice(script);
        }
    }
}

/// Decodes one compressed script. Running out of input before the type byte
/// yields an empty script.
pub fn decode_compressed_script(decoder: &mut Decoder) -> Result<Vec<u8>, CompressError> {
    if decoder.is_empty() {
        return Ok(Vec::new());
    }
    let kind = read_vlq(decoder)?;
    match kind {
        SCRIPT_P2PKH => Ok(p2pkh_script(decoder.read_slice(20)?)),
        SCRIPT_P2SH => Ok(p2sh_script(decoder.read_slice(20)?)),
        SCRIPT_P2PK_COMPRESSED_EVEN | SCRIPT_P2PK_COMPRESSED_ODD => {
            let mut key = [0u8; 33];
            key[0] = kind as u8;
            key[1..].copy_from_slice(decoder.read_slice(32)?);
            Ok(p2pk_script(&key))
        }
        SCRIPT_P2PK_UNCOMPRESSED_EVEN | SCRIPT_P2PK_UNCOMPRESSED_ODD => {
            let x: [u8; 32] = decoder.read_fixed()?;
            let key = decompress_pubkey(&x, kind == SCRIPT_P2PK_UNCOMPRESSED_ODD)
                .ok_or(CompressError::InvalidPubKey)?;
            Ok(p2pk_script(&key))
        }
        kind if kind < NUM_SPECIAL_SCRIPTS => Err(CompressError::ReservedScriptType(kind)),
        kind => {
            let len = usize::try_from(kind - NUM_SPECIAL_SCRIPTS)
                .map_err(|_| CompressError::Truncated)?;
            Ok(decoder.read_slice(len)?.to_vec())
        }
    }
}

pub fn compressed_txout_size(amount: i64, version: u16, script: &[u8], with_amount: bool) -> usize {
    let amount_size = if with_amount {
        vlq_size(compress_amount(amount as u64))
    } else {
        0
    };
    amount_size + vlq_size(u64::from(version)) + compressed_script_size(version, script)
}

/// Writes `[VLQ(compressed amount)] VLQ(script version) compressed-script`.
pub fn put_compressed_txout(
    out: &mut Vec<u8>,
    amount: i64,
    version: u16,
    script: &[u8],
    with_amount: bool,
) {
    if with_amount {
        put_vlq(out, compress_amount(amount as u64));
    }
    put_vlq(out, u64::from(version));
    put_compressed_script(out, version, script);
}

pub fn decode_compressed_txout(
    decoder: &mut Decoder,
    with_amount: bool,
) -> Result<(i64, u16, Vec<u8>), CompressError> {
    let amount = if with_amount {
        read_compressed_amount(decoder)?
    } else {
        0
    };
    let version = u16::try_from(read_vlq(decoder)?).map_err(|_| CompressError::VlqOverflow)?;
    let script = decode_compressed_script(decoder)?;
    Ok((amount, version, script))
}
