//! Scheme registry: one decoder per historical encryption format.
//!
//! Several generations of records coexist in live data. Each record
//! carries an explicit `SchemeVersion` tag and decryption dispatches on
//! it through this registry — no field-presence sniffing, and adding a
//! migration means adding a decoder.
//!
//! New writes always use `SharedGcm`; everything else is read-only
//! compatibility.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use keyfort_core::types::{SchemeVersion, VaultSecret};
use keyfort_core::{KeyfortError, KeyfortResult};

use crate::cipher::{decrypt, EncryptedField};
use crate::kdf::{derive_per_secret_key, ProtectionKey};
use crate::{b64_decode, PER_SECRET_SALT_SIZE};

/// Key material available to the decoders for one decryption attempt.
pub struct DecryptContext<'a> {
    /// The shared protection key, when the session cache holds one
    pub protection: Option<&'a ProtectionKey>,
    /// The raw master secret, needed only by the legacy per-secret paths
    pub master_secret: Option<&'a SecretString>,
    /// Root-derivation iteration count (legacy records used the full cost)
    pub iterations: u32,
}

trait SchemeDecoder: Send + Sync {
    fn decrypt(&self, record: &VaultSecret, ctx: &DecryptContext) -> KeyfortResult<String>;
}

/// Dispatch table from scheme tag to decoder.
pub struct SchemeRegistry {
    decoders: BTreeMap<SchemeVersion, Box<dyn SchemeDecoder>>,
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        let mut decoders: BTreeMap<SchemeVersion, Box<dyn SchemeDecoder>> = BTreeMap::new();
        decoders.insert(SchemeVersion::SharedGcm, Box::new(SharedGcmDecoder));
        decoders.insert(SchemeVersion::PerSecretGcm, Box::new(PerSecretGcmDecoder));
        decoders.insert(SchemeVersion::LegacyCbc, Box::new(LegacyCbcDecoder));
        decoders.insert(SchemeVersion::LegacyHash, Box::new(LegacyHashDecoder));
        Self { decoders }
    }
}

impl SchemeRegistry {
    pub fn decrypt(&self, record: &VaultSecret, ctx: &DecryptContext) -> KeyfortResult<String> {
        let decoder = self
            .decoders
            .get(&record.scheme)
            .ok_or_else(|| KeyfortError::InvalidInput("unknown encryption scheme".into()))?;
        decoder.decrypt(record, ctx)
    }
}

/// Current format: AES-256-GCM under the shared protection key.
struct SharedGcmDecoder;

impl SchemeDecoder for SharedGcmDecoder {
    fn decrypt(&self, record: &VaultSecret, ctx: &DecryptContext) -> KeyfortResult<String> {
        let key = ctx
            .protection
            .ok_or_else(|| KeyfortError::NotReady("protection key not ready".into()))?;
        let field = EncryptedField {
            encrypted_data: record.encrypted_data.clone(),
            iv: record.iv.clone(),
        };
        decrypt(&field, key)
    }
}

/// One generation back: each record encrypted under its own key, derived
/// at full cost from (master secret, record salt). No key caching existed
/// yet, hence the per-record salt.
struct PerSecretGcmDecoder;

impl SchemeDecoder for PerSecretGcmDecoder {
    fn decrypt(&self, record: &VaultSecret, ctx: &DecryptContext) -> KeyfortResult<String> {
        let secret = ctx
            .master_secret
            .ok_or_else(|| KeyfortError::NotReady("master secret not in session".into()))?;
        let salt_b64 = record
            .salt
            .as_deref()
            .ok_or_else(|| KeyfortError::InvalidInput("per-secret record missing salt".into()))?;
        let salt = b64_decode(salt_b64)?;
        if salt.len() != PER_SECRET_SALT_SIZE {
            return Err(KeyfortError::InvalidInput(format!(
                "per-secret salt must be {PER_SECRET_SALT_SIZE} bytes, got {}",
                salt.len()
            )));
        }

        let key = derive_per_secret_key(secret, &salt, ctx.iterations)?;
        let field = EncryptedField {
            encrypted_data: record.encrypted_data.clone(),
            iv: record.iv.clone(),
        };
        decrypt(&field, &key)
    }
}

/// Two generations back: AES-256-CBC under SHA-256 of the master secret.
/// Unauthenticated, so a wrong key mostly shows up as a padding error;
/// either way it is the same generic decryption failure.
struct LegacyCbcDecoder;

impl SchemeDecoder for LegacyCbcDecoder {
    fn decrypt(&self, record: &VaultSecret, ctx: &DecryptContext) -> KeyfortResult<String> {
        use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
        type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

        let secret = ctx
            .master_secret
            .ok_or_else(|| KeyfortError::NotReady("master secret not in session".into()))?;

        let ciphertext = b64_decode(&record.encrypted_data)?;
        let iv = b64_decode(&record.iv)?;
        if iv.len() != 16 {
            return Err(KeyfortError::InvalidInput(format!(
                "CBC IV must be 16 bytes, got {}",
                iv.len()
            )));
        }

        let key: [u8; 32] = Sha256::digest(secret.expose_secret().as_bytes()).into();
        let plaintext = Aes256CbcDec::new(&key.into(), iv.as_slice().into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| KeyfortError::DecryptionFailure)?;

        String::from_utf8(plaintext).map_err(|_| KeyfortError::DecryptionFailure)
    }
}

/// Oldest records hold only a digest of the value. Nothing to decrypt;
/// the caller routes the user to re-enter and re-encrypt.
struct LegacyHashDecoder;

impl SchemeDecoder for LegacyHashDecoder {
    fn decrypt(&self, _record: &VaultSecret, _ctx: &DecryptContext) -> KeyfortResult<String> {
        Err(KeyfortError::LegacyFormat)
    }
}
