//! Header sequence-number obfuscation.
//!
//! Record headers travel in cleartext, so the 64-bit sequence is passed
//! through a keyed bijection before hitting the wire: observers see values
//! indistinguishable from random, while the receiver inverts the map
//! statelessly.
//!
//! The bijection is a 4-round balanced Feistel network over the two 32-bit
//! halves of the sequence. The round function takes the first four
//! keystream bytes of ChaCha20 keyed with the session's obfuscation key,
//! using the round index as the nonce and the input half as the block
//! counter. Any fixed key yields a permutation of the u64 space; inversion
//! runs the rounds backwards.

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::ChaCha20;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_SIZE;

/// Number of Feistel rounds.
const ROUNDS: u8 = 4;

/// ChaCha20 block size in bytes, used to turn a half into a block counter.
const BLOCK_SIZE: u64 = 64;

/// Keyed bijection on u64 sequence numbers.
///
/// The key is direction-specific and derived alongside the AEAD keys; it is
/// zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SequenceObfuscator {
    key: [u8; KEY_SIZE],
}

impl SequenceObfuscator {
    /// Create an obfuscator from a derived 32-byte key.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Map a sequence number to its on-wire form.
    pub fn obfuscate(&self, seq: u64) -> u64 {
        let mut left = (seq >> 32) as u32;
        let mut right = seq as u32;

        for round in 0..ROUNDS {
            let mixed = left ^ self.round_value(round, right);
            left = right;
            right = mixed;
        }

        ((left as u64) << 32) | right as u64
    }

    /// Invert [`obfuscate`](Self::obfuscate).
    pub fn deobfuscate(&self, obf: u64) -> u64 {
        let mut left = (obf >> 32) as u32;
        let mut right = obf as u32;

        for round in (0..ROUNDS).rev() {
            let mixed = right ^ self.round_value(round, left);
            right = left;
            left = mixed;
        }

        ((left as u64) << 32) | right as u64
    }

    /// Feistel round function: four keystream bytes of ChaCha20 with the
    /// round index in the nonce and the input half as block counter.
    fn round_value(&self, round: u8, half: u32) -> u32 {
        let mut nonce = [0u8; 12];
        nonce[0] = round;

        let mut cipher = ChaCha20::new((&self.key).into(), (&nonce).into());
        cipher.seek(half as u64 * BLOCK_SIZE);

        let mut buf = [0u8; 4];
        cipher.apply_keystream(&mut buf);
        u32::from_be_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecureRandom;

    const SAMPLE_SEQUENCES: [u64; 10] = [
        0,
        1,
        255,
        256,
        65_535,
        65_536,
        0xDEAD_BEEF,
        0x7FFF_FFFF_FFFF_FFFF,
        0x8000_0000_0000_0000,
        u64::MAX,
    ];

    #[test]
    fn test_roundtrip() {
        let obfuscator = SequenceObfuscator::new(SecureRandom::bytes());

        for seq in SAMPLE_SEQUENCES {
            let obf = obfuscator.obfuscate(seq);
            assert_eq!(obfuscator.deobfuscate(obf), seq, "seq {seq:#x}");
        }

        for seq in 0..10_000u64 {
            assert_eq!(obfuscator.deobfuscate(obfuscator.obfuscate(seq)), seq);
        }
    }

    #[test]
    fn test_injective_on_dense_range() {
        let obfuscator = SequenceObfuscator::new([0x17u8; KEY_SIZE]);

        let mut seen = std::collections::HashSet::new();
        for seq in 0..10_000u64 {
            assert!(seen.insert(obfuscator.obfuscate(seq)), "collision at {seq}");
        }
    }

    #[test]
    fn test_deterministic() {
        let obfuscator = SequenceObfuscator::new([0x42u8; KEY_SIZE]);
        assert_eq!(obfuscator.obfuscate(12345), obfuscator.obfuscate(12345));
    }

    #[test]
    fn test_key_separates_mappings() {
        let a = SequenceObfuscator::new([0x01u8; KEY_SIZE]);
        let b = SequenceObfuscator::new([0x02u8; KEY_SIZE]);

        let differing = SAMPLE_SEQUENCES
            .iter()
            .filter(|&&seq| a.obfuscate(seq) != b.obfuscate(seq))
            .count();
        assert!(differing >= SAMPLE_SEQUENCES.len() - 1);
    }

    #[test]
    fn test_output_not_identity() {
        let obfuscator = SequenceObfuscator::new(SecureRandom::bytes());

        let unchanged = (0..1000u64)
            .filter(|&seq| obfuscator.obfuscate(seq) == seq)
            .count();
        // A random permutation fixes a given point with probability 2^-64
        assert_eq!(unchanged, 0);
    }
}
