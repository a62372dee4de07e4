//! Segmented RC4-MD5 (legacy cipher).
//!
//! RC4 has no random access, so the stream is divided into segments of
//! exactly 1_000_000 bytes (decimal — an interop constant, not 2^20). Each
//! segment runs a fresh RC4 state whose key is the 16-byte base key with its
//! last 4 bytes XORed against the big-endian truncation of the segment's
//! starting offset. Seeking costs at most one segment of keystream discards.
//!
//! Base key: `MD5(outward ∥ decimal(size))`, where a 32-character password
//! is taken as the outward key verbatim and anything else is derived via
//! `hex(PBKDF2(password, "RC4", 1000, 16))`.

use crate::cipher::SeekableCipher;
use crate::error::Result;
use crate::kdf;
use md5::{Digest, Md5};

/// Segment length in bytes.
pub const SEGMENT_SIZE: u64 = 1_000_000;

/// Seekable segmented RC4 keystream.
pub struct Rc4Md5Cipher {
    base_key: [u8; 16],
    state: Rc4State,
    position: u64,
}

impl Rc4Md5Cipher {
    /// Derive the base key for `(password, total_size)` and start the
    /// keystream at position 0.
    pub fn new(password: &str, total_size: u64) -> Self {
        let outward = if password.len() == 32 {
            password.to_string()
        } else {
            kdf::outward_key(password, b"RC4", 16)
        };

        let base_key: [u8; 16] =
            Md5::digest(format!("{outward}{total_size}").as_bytes()).into();

        // Segment 0's tweak is zero, so the base key doubles as its key.
        Self {
            base_key,
            state: Rc4State::new(&base_key),
            position: 0,
        }
    }

    fn segment_key(&self, segment: u64) -> [u8; 16] {
        let mut key = self.base_key;
        let tweak = (segment.wrapping_mul(SEGMENT_SIZE) as u32).to_be_bytes();
        for (byte, t) in key[12..].iter_mut().zip(tweak) {
            *byte ^= t;
        }
        key
    }

    fn rekey(&mut self, segment: u64) {
        self.state = Rc4State::new(&self.segment_key(segment));
    }
}

impl SeekableCipher for Rc4Md5Cipher {
    fn set_position(&mut self, position: u64) -> Result<()> {
        self.rekey(position / SEGMENT_SIZE);
        self.state.skip((position % SEGMENT_SIZE) as usize);
        self.position = position;
        Ok(())
    }

    fn apply_keystream(&mut self, mut data: &mut [u8]) {
        while !data.is_empty() {
            let left_in_segment = (SEGMENT_SIZE - self.position % SEGMENT_SIZE) as usize;
            let n = data.len().min(left_in_segment);
            let (chunk, rest) = data.split_at_mut(n);
            self.state.apply_keystream(chunk);
            self.position += n as u64;
            data = rest;
            if self.position % SEGMENT_SIZE == 0 {
                self.rekey(self.position / SEGMENT_SIZE);
            }
        }
    }
}

/// Plain RC4: KSA over a 256-byte S-box, PRGA XOR.
struct Rc4State {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4State {
    fn new(key: &[u8]) -> Self {
        let mut s: [u8; 256] = std::array::from_fn(|i| i as u8);
        let mut j: u8 = 0;
        for i in 0..256usize {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[idx as usize]
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        for b in data {
            *b ^= self.next_byte();
        }
    }

    fn skip(&mut self, n: usize) {
        for _ in 0..n {
            let _ = self.next_byte();
        }
    }
}
