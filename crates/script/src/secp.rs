use secp256k1::PublicKey;

pub const COMPRESSED_PUBKEY_LEN: usize = 33;
pub const UNCOMPRESSED_PUBKEY_LEN: usize = 65;

/// Parses a serialized secp256k1 public key in either encoding.
pub fn parse_pubkey(bytes: &[u8]) -> Option<PublicKey> {
    PublicKey::from_slice(bytes).ok()
}

pub fn is_valid_pubkey(bytes: &[u8]) -> bool {
    parse_pubkey(bytes).is_some()
}

/// Expands a 32-byte x coordinate and y parity into the uncompressed
/// 65-byte serialization. Returns `None` when x is not on the curve.
pub fn decompress_pubkey(x: &[u8; 32], odd_y: bool) -> Option<[u8; UNCOMPRESSED_PUBKEY_LEN]> {
    let mut compressed = [0u8; COMPRESSED_PUBKEY_LEN];
    compressed[0] = if odd_y { 0x03 } else { 0x02 };
    compressed[1..].copy_from_slice(x);
    parse_pubkey(&compressed).map(|key| key.serialize_uncompressed())
}
