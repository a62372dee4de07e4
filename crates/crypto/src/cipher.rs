//! Unified cipher interface and stream wrappers.
//!
//! All three algorithms are stream ciphers: encryption and decryption are
//! the same XOR, so one `apply_keystream` serves both directions and a
//! reader wrapper used for decryption behaves identically to one used for
//! encryption at the same position.

use crate::aesctr::AesCtrCipher;
use crate::chacha::ChaCha20Cipher;
use crate::error::Result;
use crate::rc4md5::Rc4Md5Cipher;
use shroud_core::EncType;
use std::io::{self, Read, Write};

/// A keystream that can be repositioned to any absolute byte offset.
pub trait SeekableCipher: Send {
    /// Reposition the keystream. After return, XORing `n` bytes transforms
    /// absolute offsets `[position, position + n)`. Positions past the end
    /// of the file are legal and produce an empty effective keystream.
    fn set_position(&mut self, position: u64) -> Result<()>;

    /// XOR the keystream over `data` in place, advancing the position by
    /// `data.len()`.
    fn apply_keystream(&mut self, data: &mut [u8]);
}

/// Algorithm-dispatched cipher instance.
///
/// One instance serves exactly one request body; instances are never shared
/// across requests.
pub enum ContentCipher {
    AesCtr(AesCtrCipher),
    ChaCha20(ChaCha20Cipher),
    Rc4Md5(Rc4Md5Cipher),
}

impl ContentCipher {
    /// Construct the cipher for `(enc_type, password, total_size)`, keyed
    /// and positioned at offset 0.
    pub fn new(enc_type: EncType, password: &str, total_size: u64) -> Self {
        match enc_type {
            EncType::Aesctr => Self::AesCtr(AesCtrCipher::new(password, total_size)),
            EncType::Chacha20 => Self::ChaCha20(ChaCha20Cipher::new(password, total_size)),
            EncType::Rc4md5 => Self::Rc4Md5(Rc4Md5Cipher::new(password, total_size)),
        }
    }
}

impl SeekableCipher for ContentCipher {
    fn set_position(&mut self, position: u64) -> Result<()> {
        match self {
            Self::AesCtr(c) => c.set_position(position),
            Self::ChaCha20(c) => c.set_position(position),
            Self::Rc4Md5(c) => c.set_position(position),
        }
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        match self {
            Self::AesCtr(c) => c.apply_keystream(data),
            Self::ChaCha20(c) => c.apply_keystream(data),
            Self::Rc4Md5(c) => c.apply_keystream(data),
        }
    }
}

/// Reader adapter: transforms every chunk read from the inner reader.
pub struct CipherReader<R> {
    inner: R,
    cipher: ContentCipher,
}

impl<R: Read> CipherReader<R> {
    pub fn new(inner: R, cipher: ContentCipher) -> Self {
        Self { inner, cipher }
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.cipher.apply_keystream(&mut buf[..n]);
        }
        Ok(n)
    }
}

/// Writer adapter: transforms every chunk before it reaches the inner
/// writer. The input slice is copied into a reused scratch buffer so the
/// caller's data is left untouched.
pub struct CipherWriter<W> {
    inner: W,
    cipher: ContentCipher,
    scratch: Vec<u8>,
}

impl<W: Write> CipherWriter<W> {
    pub fn new(inner: W, cipher: ContentCipher) -> Self {
        Self {
            inner,
            cipher,
            scratch: Vec::new(),
        }
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.apply_keystream(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn round_trip_every_algorithm() {
        for enc_type in [EncType::Aesctr, EncType::Chacha20, EncType::Rc4md5] {
            for (size, len) in [(1024u64, 13usize), (1 << 20, 1024), (1024, 64)] {
                let data = pattern(len);

                let mut encrypted = data.clone();
                ContentCipher::new(enc_type, "testpassword", size)
                    .apply_keystream(&mut encrypted);
                assert_ne!(encrypted, data, "{enc_type} should change the data");

                ContentCipher::new(enc_type, "testpassword", size)
                    .apply_keystream(&mut encrypted);
                assert_eq!(encrypted, data, "{enc_type} round trip");
            }
        }
    }

    #[test]
    fn seek_equals_suffix_of_full_decryption() {
        let file_size = 10 * 1024 * 1024u64;
        let data = pattern(4096);

        for enc_type in [EncType::Aesctr, EncType::Chacha20, EncType::Rc4md5] {
            let mut ciphertext = data.clone();
            ContentCipher::new(enc_type, "pw", file_size).apply_keystream(&mut ciphertext);

            for position in [0usize, 16, 100, 1024, 4095] {
                let mut cipher = ContentCipher::new(enc_type, "pw", file_size);
                cipher.set_position(position as u64).unwrap();
                let mut tail = ciphertext[position..].to_vec();
                cipher.apply_keystream(&mut tail);
                assert_eq!(tail, &data[position..], "{enc_type} at {position}");
            }
        }
    }

    #[test]
    fn reader_decrypts_what_writer_encrypted() {
        let data = pattern(100_000);

        for enc_type in [EncType::Aesctr, EncType::Chacha20, EncType::Rc4md5] {
            let mut encrypted = Vec::new();
            {
                let cipher = ContentCipher::new(enc_type, "pw", data.len() as u64);
                let mut writer = CipherWriter::new(&mut encrypted, cipher);
                // Uneven write sizes to exercise the scratch buffer reuse.
                for chunk in data.chunks(977) {
                    writer.write_all(chunk).unwrap();
                }
                writer.flush().unwrap();
            }
            assert_ne!(encrypted, data);

            let cipher = ContentCipher::new(enc_type, "pw", data.len() as u64);
            let mut reader = CipherReader::new(Cursor::new(&encrypted), cipher);
            let mut decrypted = Vec::new();
            reader.read_to_end(&mut decrypted).unwrap();
            assert_eq!(decrypted, data, "{enc_type}");
        }
    }

    #[test]
    fn decrypt_reader_equals_encrypt_reader_semantics() {
        // Stream ciphers: a "decrypting" wrapper is the same operation as an
        // "encrypting" wrapper on the same position.
        let data = pattern(513);
        let cipher = ContentCipher::new(EncType::Aesctr, "pw", 513);
        let mut once = Vec::new();
        CipherReader::new(Cursor::new(&data), cipher)
            .read_to_end(&mut once)
            .unwrap();

        let cipher = ContentCipher::new(EncType::Aesctr, "pw", 513);
        let mut twice = Vec::new();
        CipherReader::new(
            Cursor::new(&once),
            cipher,
        )
        .read_to_end(&mut twice)
        .unwrap();
        assert_eq!(twice, data);
    }
}
