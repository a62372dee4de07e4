//! Outward key derivation.
//!
//! The "outward" key is the hex form of a PBKDF2-SHA256 derivation over the
//! rule password. It feeds both the content cipher keying and the filename
//! codec's alphabet shuffle, and is the only deliberately slow step in the
//! crypto layer — callers cache it (see [`crate::names::NameCodec::cached`]).

use crate::PBKDF2_ITERATIONS;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use shroud_core::EncType;

/// Derive `dk_len` bytes from a password and salt, hex-encoded.
pub fn outward_key(password: &str, salt: &[u8], dk_len: usize) -> String {
    let mut derived = vec![0u8; dk_len];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut derived);
    hex::encode(derived)
}

/// Outward key for the filename codec: always 16 bytes (32 hex chars),
/// salted per encryption type.
pub fn name_outward_key(password: &str, enc_type: EncType) -> String {
    outward_key(password, enc_type.name_salt(), 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outward_key_is_deterministic_hex() {
        let a = outward_key("secret", b"AES-CTR", 16);
        let b = outward_key("secret", b"AES-CTR", 16);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn salts_separate_key_spaces() {
        let aes = name_outward_key("secret", EncType::Aesctr);
        let rc4 = name_outward_key("secret", EncType::Rc4md5);
        let chacha = name_outward_key("secret", EncType::Chacha20);
        assert_ne!(aes, rc4);
        assert_ne!(aes, chacha);
        assert_ne!(rc4, chacha);
    }

    #[test]
    fn dk_len_controls_output_width() {
        assert_eq!(outward_key("p", b"ChaCha20", 32).len(), 64);
    }
}
