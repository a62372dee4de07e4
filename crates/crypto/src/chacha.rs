//! ChaCha20 (RFC 8439) with byte-level seeking.
//!
//! Keying:
//!
//! - `key   = SHA-256(hex(PBKDF2(password, "ChaCha20", 1000, 32)) ∥ decimal(size))`
//! - `nonce = MD5(decimal(size))[..12]`
//!
//! Seeking to byte `p` sets the 32-bit block counter to `p / 64` and
//! discards `p % 64` keystream bytes. Positions whose block index exceeds
//! `u32::MAX` are unaddressable (files past 256 GiB).

use crate::cipher::SeekableCipher;
use crate::error::{CryptoError, Result};
use crate::kdf;
use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use md5::{Digest, Md5};
use sha2::Sha256;

/// Seekable ChaCha20 keystream.
pub struct ChaCha20Cipher {
    inner: ChaCha20,
}

impl ChaCha20Cipher {
    /// Derive the key material for `(password, total_size)` and start the
    /// keystream at position 0.
    pub fn new(password: &str, total_size: u64) -> Self {
        let outward = kdf::outward_key(password, b"ChaCha20", 32);
        let size_text = total_size.to_string();

        let key: [u8; 32] = Sha256::digest(format!("{outward}{size_text}").as_bytes()).into();
        let nonce_hash = Md5::digest(size_text.as_bytes());
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&nonce_hash[..12]);

        Self {
            inner: ChaCha20::new(&key.into(), &nonce.into()),
        }
    }
}

impl SeekableCipher for ChaCha20Cipher {
    fn set_position(&mut self, position: u64) -> Result<()> {
        self.inner
            .try_seek(position)
            .map_err(|_| CryptoError::PositionOverflow(position))
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }
}
