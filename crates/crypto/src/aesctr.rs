//! AES-128-CTR with byte-level seeking.
//!
//! Keying binds the file's total length into both the key and the IV:
//!
//! - `key = MD5(hex(PBKDF2(password, "AES-CTR", 1000, 16)) ∥ decimal(size))`
//! - `iv  = MD5(decimal(size))`
//!
//! The IV doubles as a big-endian 128-bit block counter, so seeking to byte
//! `p` advances the counter by `p / 16` and discards `p % 16` keystream
//! bytes — exactly what `ctr`'s keystream seek performs.

use crate::cipher::SeekableCipher;
use crate::error::{CryptoError, Result};
use crate::kdf;
use aes::Aes128;
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use md5::{Digest, Md5};

type Aes128Ctr128BE = Ctr128BE<Aes128>;

/// Seekable AES-128-CTR keystream.
pub struct AesCtrCipher {
    inner: Aes128Ctr128BE,
}

impl AesCtrCipher {
    /// Derive the key material for `(password, total_size)` and start the
    /// keystream at position 0.
    pub fn new(password: &str, total_size: u64) -> Self {
        let outward = kdf::outward_key(password, b"AES-CTR", 16);
        let size_text = total_size.to_string();

        let key: [u8; 16] = Md5::digest(format!("{outward}{size_text}").as_bytes()).into();
        let iv: [u8; 16] = Md5::digest(size_text.as_bytes()).into();

        Self {
            inner: Aes128Ctr128BE::new(&key.into(), &iv.into()),
        }
    }
}

impl SeekableCipher for AesCtrCipher {
    fn set_position(&mut self, position: u64) -> Result<()> {
        self.inner
            .try_seek(position)
            .map_err(|_| CryptoError::PositionOverflow(position))
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }
}
