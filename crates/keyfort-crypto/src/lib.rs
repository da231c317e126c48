//! keyfort-crypto: the zero-knowledge vault core
//!
//! Key hierarchy:
//! ```text
//! Root Material (256-bit, PBKDF2-HMAC-SHA256 from master secret + auth salt, 600k iterations)
//!   ├── Protection Key (HKDF label "enc")  — AES-256-GCM over vault secrets, never exported
//!   ├── Auth Key       (HKDF label "auth") — HMAC-SHA256 verifier the server can check
//!   └── raw root                           — reserved for wrapping recovery material
//! ```
//!
//! The server only ever sees `(auth_salt, auth_verifier)`; the master secret
//! and every derived key stay inside the client session. Recovery escrow runs
//! alongside the primary cipher under an independent, randomly generated key.

pub mod auth;
pub mod cipher;
pub mod kdf;
pub mod recovery;
pub mod scheme;
pub mod session;

pub use auth::{setup_master_key, validate_master_code, verify_master_key, MasterKeySetup};
pub use cipher::{decrypt, encrypt, EncryptedField};
pub use kdf::{derive_master_material, derive_per_secret_key, MasterKeyMaterial, ProtectionKey};
pub use recovery::{generate_recovery_key, unwrap_secret, wrap_secret};
pub use scheme::{DecryptContext, SchemeRegistry};
pub use session::{SessionKeyCache, SessionToken};

/// Size of every derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the random auth salt for the root derivation
pub const AUTH_SALT_SIZE: usize = 32;

/// Size of the per-secret salt used by legacy records
pub const PER_SECRET_SALT_SIZE: usize = 16;

/// Default PBKDF2 iteration count for the root derivation. High on purpose:
/// the human-facing secret is a short numeric code, so the secret space is
/// small and the root derivation carries the entire brute-force cost.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

pub(crate) fn b64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

pub(crate) fn b64_decode(s: &str) -> keyfort_core::KeyfortResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|_| keyfort_core::KeyfortError::InvalidInput("malformed base64 value".into()))
}
