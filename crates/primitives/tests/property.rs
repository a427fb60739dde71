use vgld_consensus::Hash256;
use vgld_primitives::block::{Block, BlockHeader};
use vgld_primitives::encoding::{DecodeError, Decoder, Encoder};
use vgld_primitives::outpoint::{OutPoint, TxTree};
use vgld_primitives::transaction::{Transaction, TxIn, TxOut};

const MAX_COMPACT_SIZE: u64 = 0x0200_0000;

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u8(&mut self) -> u8 {
        self.next_u64() as u8
    }

    fn gen_range(&mut self, max: usize) -> usize {
        if max == 0 {
            0
        } else {
            (self.next_u64() % max as u64) as usize
        }
    }
}

fn random_hash(rng: &mut Lcg) -> Hash256 {
    std::array::from_fn(|_| rng.next_u8())
}

fn random_vec(rng: &mut Lcg, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(max_len + 1);
    (0..len).map(|_| rng.next_u8()).collect()
}

fn random_transaction(rng: &mut Lcg) -> Transaction {
    let vin = (0..rng.gen_range(4))
        .map(|_| {
            let tree = if rng.next_u8() & 1 == 0 {
                TxTree::Regular
            } else {
                TxTree::Stake
            };
            TxIn {
                prevout: OutPoint::new(random_hash(rng), rng.next_u32(), tree),
                sequence: rng.next_u32(),
                value_in: (rng.next_u64() >> 12) as i64,
                block_height: rng.next_u32(),
                block_index: rng.next_u32(),
                signature_script: random_vec(rng, 80),
            }
        })
        .collect();
    let vout = (0..rng.gen_range(4))
        .map(|_| TxOut {
            value: (rng.next_u64() >> 12) as i64,
            version: rng.next_u8() as u16,
            pk_script: random_vec(rng, 60),
        })
        .collect();
    Transaction {
        version: (rng.next_u32() & 0x3) as u16,
        vin,
        vout,
        lock_time: rng.next_u32(),
        expiry: rng.next_u32(),
    }
}

#[test]
fn compactsize_roundtrip_random() {
    let mut rng = Lcg::new(0x5eed);
    for _ in 0..1_000 {
        let value = rng.next_u64() % MAX_COMPACT_SIZE;
        let mut encoder = Encoder::new();
        encoder.write_varint(value);
        let bytes = encoder.into_inner();
        let mut decoder = Decoder::new(&bytes);
        let decoded = decoder.read_varint().expect("decode compactsize");
        assert_eq!(decoded, value);
        assert!(decoder.is_empty());
    }
}

#[test]
fn compactsize_rejects_noncanonical() {
    let cases = [
        vec![0xfd, 0xfc, 0x00],
        vec![0xfe, 0xff, 0x00, 0x00, 0x00],
        vec![0xff, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    ];
    for bytes in cases {
        let mut decoder = Decoder::new(&bytes);
        let err = decoder.read_varint().expect_err("noncanonical compactsize");
        assert_eq!(err, DecodeError::NonCanonicalVarInt);
    }
}

#[test]
fn randomized_transaction_roundtrip() {
    let mut rng = Lcg::new(0x1234_5678);
    for _ in 0..200 {
        let tx = random_transaction(&mut rng);
        let encoded = tx.consensus_encode();
        let decoded = Transaction::consensus_decode(&encoded).expect("decode random tx");
        assert_eq!(decoded, tx);
    }
}

#[test]
fn truncated_transactions_fail_to_decode() {
    let mut rng = Lcg::new(0xdead_beef);
    for _ in 0..50 {
        let tx = random_transaction(&mut rng);
        let encoded = tx.consensus_encode();
        let cut = rng.gen_range(encoded.len());
        assert!(Transaction::consensus_decode(&encoded[..cut]).is_err());
    }
}

#[test]
fn randomized_block_roundtrip() {
    let mut rng = Lcg::new(0x0b10c);
    for _ in 0..20 {
        let block = Block {
            header: BlockHeader {
                version: 9,
                prev_block: random_hash(&mut rng),
                merkle_root: random_hash(&mut rng),
                stake_root: random_hash(&mut rng),
                vote_bits: rng.next_u32() as u16,
                voters: rng.next_u32() as u16,
                fresh_stake: rng.next_u8(),
                revocations: rng.next_u8(),
                height: rng.next_u32(),
                time: rng.next_u32(),
                bits: rng.next_u32(),
                nonce: rng.next_u32(),
            },
            transactions: (0..rng.gen_range(4))
                .map(|_| random_transaction(&mut rng))
                .collect(),
            stake_transactions: (0..rng.gen_range(3))
                .map(|_| random_transaction(&mut rng))
                .collect(),
        };
        let decoded = Block::consensus_decode(&block.consensus_encode()).expect("decode block");
        assert_eq!(decoded, block);
    }
}
