//! Core domain types shared across the shroud proxy crates.
//!
//! This crate defines the canonical data model used by the crypto layer and
//! the server:
//! - Encryption rule configuration and its compiled (regex) form
//! - The per-request encryption policy
//! - Application configuration sections
//! - Slash-path helpers matching the backend's path semantics

pub mod config;
pub mod error;
pub mod path;
pub mod rule;

pub use config::{AppConfig, ProxyConfig, ServerConfig, UpstreamConfig};
pub use error::{Error, Result};
pub use rule::{CompiledRule, EncType, EncryptRule, Policy, RuleSet};

/// Marker prefix for entries whose name failed (or skipped) decryption.
pub const ORIG_PREFIX: &str = "orig_";
