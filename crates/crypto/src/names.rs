//! Filename encryption: encode/decode plus display↔real conversion.
//!
//! An encoded name is the MixBase64 body followed by a single CRC-6 check
//! character drawn from the *unshuffled* source alphabet. A name whose check
//! character does not verify is treated as "not ours" and surfaced with the
//! `orig_` prefix rather than as an error.

use crate::crc6;
use crate::kdf;
use crate::mix64::{MixBase64, SOURCE_ALPHABET};
use shroud_core::{EncType, ORIG_PREFIX, path};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Filename codec for one `(password, enc_type)` pair.
pub struct NameCodec {
    outward: String,
    mix: MixBase64,
}

type CodecCache = RwLock<HashMap<(String, EncType), Arc<NameCodec>>>;

fn cache() -> &'static CodecCache {
    static CACHE: OnceLock<CodecCache> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

impl NameCodec {
    /// Derive a codec. Runs PBKDF2; prefer [`NameCodec::cached`] on request
    /// paths.
    pub fn new(password: &str, enc_type: EncType) -> Self {
        let outward = kdf::name_outward_key(password, enc_type);
        let mix = MixBase64::new(&outward);
        Self { outward, mix }
    }

    /// Process-wide cached codec lookup.
    pub fn cached(password: &str, enc_type: EncType) -> Arc<Self> {
        let key = (password.to_string(), enc_type);
        if let Some(codec) = cache().read().expect("codec cache poisoned").get(&key) {
            return codec.clone();
        }
        let codec = Arc::new(Self::new(password, enc_type));
        cache()
            .write()
            .expect("codec cache poisoned")
            .entry(key)
            .or_insert(codec)
            .clone()
    }

    /// The 32-hex outward key backing this codec.
    pub fn outward(&self) -> &str {
        &self.outward
    }

    /// Encode a plaintext name: MixBase64 body + CRC-6 tail character.
    pub fn encode_name(&self, plain: &str) -> String {
        let body = self.mix.encode(plain.as_bytes());
        let mut check_data = Vec::with_capacity(body.len() + self.outward.len());
        check_data.extend_from_slice(body.as_bytes());
        check_data.extend_from_slice(self.outward.as_bytes());
        let tail = SOURCE_ALPHABET[crc6::checksum(&check_data) as usize] as char;
        format!("{body}{tail}")
    }

    /// Decode an encoded name. `None` means the CRC tail or the body failed
    /// to verify — the name is not one of ours.
    pub fn decode_name(&self, encoded: &str) -> Option<String> {
        // Byte-wise split: the input is arbitrary client text and may end
        // in a multibyte character, which is never one of ours.
        let bytes = encoded.as_bytes();
        if bytes.len() < 2 {
            return None;
        }
        let (body_bytes, tail) = bytes.split_at(bytes.len() - 1);

        let mut check_data = Vec::with_capacity(body_bytes.len() + self.outward.len());
        check_data.extend_from_slice(body_bytes);
        check_data.extend_from_slice(self.outward.as_bytes());
        let expected = SOURCE_ALPHABET[crc6::checksum(&check_data) as usize];
        if tail[0] != expected {
            return None;
        }

        let body = std::str::from_utf8(body_bytes).ok()?;
        let decoded = self.mix.decode(body).ok()?;
        String::from_utf8(decoded).ok()
    }

    /// Real (stored) name → display name.
    ///
    /// The decoded plaintext is emitted as-is: whatever the user originally
    /// typed, extension included, was the Base64 input. A CRC mismatch
    /// yields `orig_` + the literal name.
    pub fn show_name(&self, path_text: &str) -> String {
        let decoded = path::percent_decode(path_text);
        let file_name = path::base_name(&decoded);
        let encoded_stem = path::stem(file_name);

        match self.decode_name(encoded_stem) {
            Some(show) => show,
            None => format!("{ORIG_PREFIX}{file_name}"),
        }
    }

    /// Display name → real (stored) name.
    ///
    /// `orig_`-prefixed names pass through with the prefix stripped (the
    /// user explicitly marked them unencrypted). Otherwise the stem is
    /// encoded and suffixed with `enc_suffix` if non-empty, else with the
    /// original extension.
    pub fn real_name(&self, path_text: &str, enc_suffix: &str) -> String {
        let file_name = path::base_name(path_text);
        if let Some(stripped) = file_name.strip_prefix(ORIG_PREFIX) {
            return stripped.to_string();
        }

        let decoded = path::percent_decode(file_name);
        let ext = if enc_suffix.is_empty() {
            path::ext(&decoded)
        } else {
            enc_suffix
        };
        let encoded = self.encode_name(path::stem(&decoded));
        format!("{encoded}{ext}")
    }

    /// Encode a nested folder password as `<encType>_<password>`.
    pub fn encode_folder_name(&self, folder_enc_type: EncType, folder_password: &str) -> String {
        self.encode_name(&format!("{folder_enc_type}_{folder_password}"))
    }

    /// Decode a folder name that may carry a nested password.
    ///
    /// The encoded form is `<anything>_<encoded>`; the decoded plaintext
    /// splits at its first `_` into `(encType, password)`.
    pub fn decode_folder_name(&self, folder_name: &str) -> Option<(EncType, String)> {
        let encoded = folder_name.rsplit('_').next()?;
        if encoded == folder_name && !folder_name.contains('_') {
            // No underscore at all: cannot carry a nested password.
            return None;
        }
        let decoded = self.decode_name(encoded)?;
        let (enc_type, password) = decoded.split_once('_')?;
        Some((EncType::parse_lenient(enc_type), password.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> NameCodec {
        NameCodec::new("testpass", EncType::Aesctr)
    }

    #[test]
    fn name_round_trip() {
        let cases = [
            "movie.mp4",
            "my movie file.mp4",
            "映画.mp4",
            "电影文件.mkv",
            "Movie_2024_日本語.mp4",
            "file-name_v1.2.mp4",
            "this_is_a_very_long_filename_that_exceeds_normal_length.mp4",
        ];
        for enc_type in [EncType::Aesctr, EncType::Rc4md5, EncType::Chacha20] {
            let codec = NameCodec::new("testpass", enc_type);
            for name in cases {
                let encoded = codec.encode_name(name);
                assert_ne!(encoded, name);
                assert_eq!(codec.decode_name(&encoded).as_deref(), Some(name));
            }
        }
    }

    #[test]
    fn wrong_password_never_recovers_the_name() {
        let encoded = codec().encode_name("secret.mp4");
        let other = NameCodec::new("otherpass", EncType::Aesctr);
        // A 1-in-64 accidental CRC pass yields garbage, never the plaintext.
        assert_ne!(other.decode_name(&encoded).as_deref(), Some("secret.mp4"));
    }

    #[test]
    fn single_character_flips_are_caught() {
        let codec = codec();
        let encoded = codec.encode_name("holiday");
        let alphabet = *SOURCE_ALPHABET;

        let mut rejected = 0;
        let mut total = 0;
        for pos in 0..encoded.len() {
            for &candidate in alphabet.iter() {
                let mut flipped = encoded.clone().into_bytes();
                if flipped[pos] == candidate {
                    continue;
                }
                flipped[pos] = candidate;
                let flipped = String::from_utf8(flipped).unwrap();
                total += 1;
                if codec.decode_name(&flipped).is_none() {
                    rejected += 1;
                }
            }
        }
        // CRC-6 must catch at least 63/64 of single-character corruption.
        assert!(
            rejected * 64 >= total * 63,
            "rejected {rejected} of {total}"
        );
    }

    #[test]
    fn show_name_decodes_or_marks_original() {
        let codec = codec();
        let real = codec.real_name("holiday.mp4", "");
        assert!(real.ends_with(".mp4"));
        assert_eq!(codec.show_name(&real), "holiday.mp4");

        assert_eq!(codec.show_name("plain.mp4"), "orig_plain.mp4");
    }

    #[test]
    fn real_name_respects_suffix_and_orig_prefix() {
        let codec = codec();

        let suffixed = codec.real_name("holiday.mp4", ".bin");
        assert!(suffixed.ends_with(".bin"));
        assert_eq!(codec.show_name(&suffixed), "holiday.mp4");

        assert_eq!(codec.real_name("orig_keep.mp4", ".bin"), "keep.mp4");
    }

    #[test]
    fn real_name_without_extension_appends_suffix() {
        let codec = codec();
        let real = codec.real_name("README", ".dat");
        assert!(real.ends_with(".dat"));
        assert_eq!(codec.show_name(&real), "README");
    }

    #[test]
    fn percent_encoded_display_names_decode_first() {
        let codec = codec();
        let real = codec.real_name("my%20movie.mp4", "");
        assert_eq!(codec.show_name(&real), "my movie.mp4");
    }

    #[test]
    fn folder_password_round_trip() {
        let codec = codec();
        let encoded = codec.encode_folder_name(EncType::Chacha20, "folderpw_with_underscore");
        let folder = format!("vacation_{encoded}");
        let (enc_type, password) = codec.decode_folder_name(&folder).unwrap();
        assert_eq!(enc_type, EncType::Chacha20);
        assert_eq!(password, "folderpw_with_underscore");
    }

    #[test]
    fn folder_without_password_reports_none() {
        let codec = codec();
        assert_eq!(codec.decode_folder_name("plain-folder"), None);
        assert_eq!(codec.decode_folder_name("nested_butnotencoded"), None);
    }

    #[test]
    fn cached_codec_is_shared() {
        let a = NameCodec::cached("cachedpass", EncType::Aesctr);
        let b = NameCodec::cached("cachedpass", EncType::Aesctr);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
