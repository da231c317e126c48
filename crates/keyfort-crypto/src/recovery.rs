//! Recovery escrow: a second, independent ciphertext of each secret.
//!
//! The recovery key is 256 bits of fresh randomness, handed to the user
//! exactly once and never stored server-side. Because it is already
//! high-entropy, the wrap key is a plain SHA-256 of it — a slow KDF would
//! add latency without adding security. Presenting the key back later is
//! a full bypass of the master secret; losing it permanently closes the
//! recovery path for those ciphertexts, which is acceptable.

use rand::RngCore;
use sha2::{Digest, Sha256};

use keyfort_core::types::RecoveryData;
use keyfort_core::{KeyfortError, KeyfortResult};

use crate::cipher::{aead_open, aead_seal};
use crate::{b64_decode, b64_encode, KEY_SIZE, NONCE_SIZE};

/// Generate a fresh recovery key: 32 random bytes, hex-encoded for display.
pub fn generate_recovery_key() -> String {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Encrypt a plaintext under the recovery key, alongside the primary write.
pub fn wrap_secret(plaintext: &str, recovery_key: &str) -> KeyfortResult<RecoveryData> {
    let key = wrap_key(recovery_key)?;
    let (ciphertext, nonce) = aead_seal(&key, plaintext.as_bytes())?;
    Ok(RecoveryData {
        encrypted_data: b64_encode(&ciphertext),
        iv: b64_encode(&nonce),
    })
}

/// Decrypt a recovery ciphertext. Works with no knowledge of the master
/// secret; fails closed on a wrong or mistyped key.
pub fn unwrap_secret(data: &RecoveryData, recovery_key: &str) -> KeyfortResult<String> {
    let key = wrap_key(recovery_key)?;

    let ciphertext = b64_decode(&data.encrypted_data)?;
    let nonce = b64_decode(&data.iv)?;
    if nonce.len() != NONCE_SIZE {
        return Err(KeyfortError::InvalidInput(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }

    let plaintext = aead_open(&key, &nonce, &ciphertext)?;
    String::from_utf8(plaintext).map_err(|_| KeyfortError::DecryptionFailure)
}

/// Deterministic wrap key from the displayed recovery key.
fn wrap_key(recovery_key: &str) -> KeyfortResult<[u8; KEY_SIZE]> {
    let trimmed = recovery_key.trim();
    if trimmed.is_empty() {
        return Err(KeyfortError::InvalidInput("recovery key is empty".into()));
    }
    let digest = Sha256::digest(trimmed.as_bytes());
    Ok(digest.into())
}
