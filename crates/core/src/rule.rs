//! Encryption rules: configured form, compiled form, and per-request policy.
//!
//! Rules are an **ordered sequence**; resolution is strictly first-match over
//! the configured order, so they must never be stored keyed by path.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Stream cipher algorithm selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncType {
    /// AES-128-CTR (default).
    #[default]
    Aesctr,
    /// ChaCha20 (RFC 8439, 32-bit block counter).
    Chacha20,
    /// Segmented RC4-MD5 (legacy).
    Rc4md5,
}

impl EncType {
    /// Wire name, as stored in rule configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aesctr => "aesctr",
            Self::Chacha20 => "chacha20",
            Self::Rc4md5 => "rc4md5",
        }
    }

    /// PBKDF2 salt used when deriving the content cipher key.
    pub fn cipher_salt(self) -> &'static [u8] {
        match self {
            Self::Aesctr => b"AES-CTR",
            Self::Chacha20 => b"ChaCha20",
            Self::Rc4md5 => b"RC4",
        }
    }

    /// PBKDF2 salt used when deriving the filename codec's outward key.
    pub fn name_salt(self) -> &'static [u8] {
        match self {
            Self::Aesctr => b"AES-CTR",
            Self::Chacha20 => b"ChaCha20",
            Self::Rc4md5 => b"RC4-MD5",
        }
    }

    /// Parse a wire name. Unknown or empty strings fall back to AES-CTR,
    /// matching the backend's historical behavior for folder passwords.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "chacha20" => Self::Chacha20,
            "rc4md5" => Self::Rc4md5,
            _ => Self::Aesctr,
        }
    }
}

impl std::fmt::Display for EncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One encryption rule as it appears in the configuration file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptRule {
    /// Password the cipher and filename keys are derived from.
    pub password: String,
    /// Cipher algorithm.
    #[serde(default)]
    pub enc_type: EncType,
    /// Also encrypt file names.
    #[serde(default)]
    pub enc_name: bool,
    /// Visible extension applied to encrypted-named files.
    /// Empty means "inherit the source extension".
    #[serde(default)]
    pub enc_suffix: String,
    /// Regex patterns selecting the paths this rule covers (OR).
    pub enc_path: Vec<String>,
    /// Rule toggle.
    #[serde(default = "default_enable")]
    pub enable: bool,
    /// Free-form description.
    #[serde(default)]
    pub describe: String,
}

fn default_enable() -> bool {
    true
}

/// A rule with its patterns compiled.
///
/// Each configured pattern `P` is expanded at compile time so the rule also
/// matches the `/d P`, `/p P` and `/dav P` forms of the same path.
#[derive(Clone, Debug)]
pub struct CompiledRule {
    pub password: String,
    pub enc_type: EncType,
    pub enc_name: bool,
    pub enc_suffix: String,
    pub enable: bool,
    patterns: Vec<Regex>,
}

const PATH_PREFIXES: [&str; 3] = ["/d", "/p", "/dav"];

impl CompiledRule {
    /// Compile a configured rule, expanding the download/preview/WebDAV
    /// prefix variants of every pattern. A leading `^` anchor stays in
    /// front of the injected prefix.
    pub fn compile(rule: &EncryptRule) -> Result<Self> {
        let mut patterns = Vec::with_capacity(rule.enc_path.len() * 4);
        for pattern in &rule.enc_path {
            patterns.push(compile_pattern(pattern)?);
            for prefix in PATH_PREFIXES {
                let expanded = match pattern.strip_prefix('^') {
                    Some(rest) => format!("^{prefix}{rest}"),
                    None => format!("{prefix}{pattern}"),
                };
                patterns.push(compile_pattern(&expanded)?);
            }
        }
        Ok(Self {
            password: rule.password.clone(),
            enc_type: rule.enc_type,
            enc_name: rule.enc_name,
            enc_suffix: rule.enc_suffix.clone(),
            enable: rule.enable,
            patterns,
        })
    }

    /// Whether any pattern matches the request path.
    pub fn matches(&self, url_path: &str) -> bool {
        self.enable && self.patterns.iter().any(|re| re.is_match(url_path))
    }

    /// The rule's policy as seen by a single request.
    pub fn policy(&self) -> Policy {
        Policy {
            password: self.password.clone(),
            enc_type: self.enc_type,
            enc_name: self.enc_name,
            enc_suffix: self.enc_suffix.clone(),
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// The ordered rule list used for resolution.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile a configured rule list, preserving order.
    pub fn compile(rules: &[EncryptRule]) -> Result<Self> {
        let rules = rules.iter().map(CompiledRule::compile).collect::<Result<_>>()?;
        Ok(Self { rules })
    }

    /// First enabled rule matching the path, in declared order.
    pub fn first_match(&self, url_path: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.matches(url_path))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Effective encryption parameters for one request.
///
/// Starts as a copy of the matched rule; a folder password found in the path
/// may override `password` and `enc_type` without touching the stored rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub password: String,
    pub enc_type: EncType,
    pub enc_name: bool,
    pub enc_suffix: String,
}
