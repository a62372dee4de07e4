//! Crypto error type.

/// Errors from cipher seeking and name decoding.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The requested keystream position is beyond what the cipher can
    /// address (ChaCha20's block counter is 32-bit).
    #[error("keystream position {0} exceeds the cipher's addressable range")]
    PositionOverflow(u64),

    /// An encoded name failed structural validation.
    #[error("invalid encoded name: {0}")]
    InvalidName(&'static str),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
