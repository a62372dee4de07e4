//! Base64 over a password-derived permuted alphabet.
//!
//! The source alphabet is the URL-safe Base64 set plus `+` as the 65th
//! character, which serves as the padding marker. The per-password alphabet
//! is produced by an RC4-style key schedule over the 65-element index space
//! (not 256), keyed with `SHA-256(outward ∥ "mix64")`.

use crate::error::{CryptoError, Result};
use sha2::{Digest, Sha256};

/// The unshuffled 65-character alphabet. Index 64 is the padding marker.
pub const SOURCE_ALPHABET: &[u8; 65] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-~+";

const ALPHABET_LEN: usize = 65;
const PAD_INDEX: u8 = 64;

/// Base64 codec over a shuffled alphabet.
#[derive(Clone)]
pub struct MixBase64 {
    chars: [u8; ALPHABET_LEN],
    // Reverse map, 0xFF for characters outside the alphabet.
    decode: [u8; 256],
}

impl MixBase64 {
    /// Build the codec for an outward key.
    pub fn new(outward: &str) -> Self {
        let chars = shuffle_alphabet(outward);
        let mut decode = [0xFFu8; 256];
        for (idx, &c) in chars.iter().enumerate() {
            decode[c as usize] = idx as u8;
        }
        Self { chars, decode }
    }

    /// The shuffled alphabet (64 data characters + padding character).
    pub fn alphabet(&self) -> &[u8; ALPHABET_LEN] {
        &self.chars
    }

    /// Encode bytes, classical Base64 grouping with this alphabet's pad char.
    pub fn encode(&self, data: &[u8]) -> String {
        let mut out = Vec::with_capacity(data.len().div_ceil(3) * 4);
        let mut chunks = data.chunks_exact(3);
        for group in &mut chunks {
            let [b0, b1, b2] = [group[0], group[1], group[2]];
            out.push(self.chars[(b0 >> 2) as usize]);
            out.push(self.chars[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize]);
            out.push(self.chars[(((b1 & 0x0F) << 2) | (b2 >> 6)) as usize]);
            out.push(self.chars[(b2 & 0x3F) as usize]);
        }
        match *chunks.remainder() {
            [b0] => {
                out.push(self.chars[(b0 >> 2) as usize]);
                out.push(self.chars[((b0 & 0x03) << 4) as usize]);
                out.push(self.chars[PAD_INDEX as usize]);
                out.push(self.chars[PAD_INDEX as usize]);
            }
            [b0, b1] => {
                out.push(self.chars[(b0 >> 2) as usize]);
                out.push(self.chars[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize]);
                out.push(self.chars[((b1 & 0x0F) << 2) as usize]);
                out.push(self.chars[PAD_INDEX as usize]);
            }
            _ => {}
        }
        // The alphabet is ASCII.
        String::from_utf8(out).expect("alphabet is ASCII")
    }

    /// Decode an encoded string. Rejects characters outside the alphabet and
    /// lengths that are not a whole number of quartets.
    pub fn decode(&self, encoded: &str) -> Result<Vec<u8>> {
        let bytes = encoded.as_bytes();
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        if bytes.len() % 4 != 0 {
            return Err(CryptoError::InvalidName("length not a multiple of 4"));
        }

        let pad = self.chars[PAD_INDEX as usize];
        let mut size = bytes.len() / 4 * 3;
        if bytes.ends_with(&[pad, pad]) {
            size -= 2;
        } else if bytes.ends_with(&[pad]) {
            size -= 1;
        }

        let mut out = Vec::with_capacity(size);
        for quartet in bytes.chunks_exact(4) {
            let mut idx = [0u8; 4];
            for (slot, &c) in idx.iter_mut().zip(quartet) {
                let v = self.decode[c as usize];
                if v == 0xFF {
                    return Err(CryptoError::InvalidName("character outside alphabet"));
                }
                *slot = v;
            }
            out.push((idx[0] << 2) | (idx[1] >> 4));
            if idx[2] != PAD_INDEX && out.len() < size {
                out.push(((idx[1] & 0x0F) << 4) | (idx[2] >> 2));
            }
            if idx[3] != PAD_INDEX && out.len() < size {
                out.push(((idx[2] & 0x03) << 6) | idx[3]);
            }
        }
        Ok(out)
    }
}

/// Shuffle the source alphabet with a KSA keyed by `SHA-256(outward ∥ "mix64")`
/// cycled to the alphabet length.
fn shuffle_alphabet(outward: &str) -> [u8; ALPHABET_LEN] {
    let key = Sha256::digest(format!("{outward}mix64").as_bytes());

    let mut sbox: [usize; ALPHABET_LEN] = std::array::from_fn(|i| i);
    let mut j = 0usize;
    for i in 0..ALPHABET_LEN {
        j = (j + sbox[i] + key[i % key.len()] as usize) % ALPHABET_LEN;
        sbox.swap(i, j);
    }

    std::array::from_fn(|i| SOURCE_ALPHABET[sbox[i]])
}
