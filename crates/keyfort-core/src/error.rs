//! Error taxonomy shared by all keyfort crates.
//!
//! Every cryptographic failure is caught at a component boundary and
//! re-thrown as one of these kinds with a generic message. Raw library
//! errors (and any data they might echo) never cross that boundary, and
//! no variant ever carries secret material.

use thiserror::Error;

pub type KeyfortResult<T> = Result<T, KeyfortError>;

#[derive(Debug, Error)]
pub enum KeyfortError {
    /// Malformed salt/secret/ciphertext shape, rejected before any crypto call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Verifier mismatch or bad TOTP code. Deliberately generic: the caller
    /// cannot distinguish a wrong secret from an unknown account.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// AEAD tag mismatch, wrong key, or corrupted ciphertext. Fails closed;
    /// no partial plaintext is ever surfaced.
    #[error("decryption failed")]
    DecryptionFailure,

    /// Retryable condition: key cache empty or step-up gate locked. The UI
    /// can prompt to unlock rather than treating this as a hard failure.
    #[error("not ready: {0}")]
    NotReady(String),

    /// A pre-verifier credential format was found where salt+verifier was
    /// expected. Routed to the migration flow, never treated as wrong-password.
    #[error("legacy credential format, migration required")]
    LegacyFormat,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KeyfortError {
    /// Whether the caller may usefully retry after fixing session state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KeyfortError::NotReady(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_generic() {
        // Neither authentication nor decryption failures leak a cause.
        assert_eq!(
            KeyfortError::AuthenticationFailure.to_string(),
            "authentication failed"
        );
        assert_eq!(
            KeyfortError::DecryptionFailure.to_string(),
            "decryption failed"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(KeyfortError::NotReady("protection key not ready".into()).is_retryable());
        assert!(!KeyfortError::DecryptionFailure.is_retryable());
        assert!(!KeyfortError::LegacyFormat.is_retryable());
    }
}
