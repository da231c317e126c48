//! Master-key setup and verification.
//!
//! The server stores only `(auth_salt, auth_verifier)` where the verifier
//! is HMAC-SHA256(auth_key, auth_salt). Knowing both reveals nothing about
//! the secret; recomputing the verifier requires re-running the full root
//! derivation, which is where the brute-force cost lives.

use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use keyfort_core::{KeyfortError, KeyfortResult};

use crate::kdf::derive_master_material;
use crate::{b64_decode, b64_encode, AUTH_SALT_SIZE, KEY_SIZE};

/// Human-facing master code length (UI policy, not a protocol requirement).
pub const MASTER_CODE_LEN: usize = 6;

/// The two values safe to persist server-side after setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterKeySetup {
    pub auth_salt: String,
    pub auth_verifier: String,
}

/// First-time master key setup: fresh random salt, verifier over that salt.
///
/// Re-keying an identity that already holds a verifier is a service-level
/// decision (the old secret must verify first); this function is oblivious
/// to prior state.
pub fn setup_master_key(secret: &SecretString, iterations: u32) -> KeyfortResult<MasterKeySetup> {
    let mut salt = [0u8; AUTH_SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let material = derive_master_material(secret, &salt, iterations)?;
    let verifier = material.auth().sign(&salt);

    Ok(MasterKeySetup {
        auth_salt: b64_encode(&salt),
        auth_verifier: b64_encode(&verifier),
    })
}

/// Re-derive the auth key from (secret, stored salt) and compare the
/// recomputed verifier against the stored one in constant time.
///
/// Returns `Ok(false)` on mismatch; the caller maps that to the generic
/// authentication failure so wrong-secret and unknown-account are
/// indistinguishable.
pub fn verify_master_key(
    secret: &SecretString,
    stored_auth_salt: &str,
    stored_auth_verifier: &str,
    iterations: u32,
) -> KeyfortResult<bool> {
    let salt = b64_decode(stored_auth_salt)?;
    if salt.len() != AUTH_SALT_SIZE {
        return Err(KeyfortError::InvalidInput(format!(
            "stored auth salt must be {AUTH_SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }

    let expected = b64_decode(stored_auth_verifier)?;
    if expected.len() != KEY_SIZE {
        // A verifier that is not an HMAC-SHA256 digest is not the current
        // format at all; surface the migration condition, not a mismatch.
        return Err(KeyfortError::LegacyFormat);
    }

    let material = derive_master_material(secret, &salt, iterations)?;
    Ok(material.auth().verify(&salt, &expected))
}

/// UI-level shape check for the human-facing master code. The protocol is
/// agnostic to secret length and alphabet.
pub fn validate_master_code(code: &str) -> KeyfortResult<()> {
    if code.len() != MASTER_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyfortError::InvalidInput(format!(
            "master code must be exactly {MASTER_CODE_LEN} digits"
        )));
    }
    Ok(())
}
