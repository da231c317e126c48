//! Session key cache: the protection key for one client session.
//!
//! One cache per session, created on login and cleared on logout — an
//! explicit object handed to whoever needs it, never process-global
//! state. The cache holds the derived protection key plus the source
//! token it was derived from, so an emptied cache can transparently
//! re-derive on the next operation. Nothing here is serializable and the
//! key itself cannot be exported; the only operations reachable through
//! the cache are encrypt and decrypt.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use keyfort_core::types::VaultSecret;
use keyfort_core::{KeyfortError, KeyfortResult};

use crate::cipher::{decrypt, encrypt, EncryptedField};
use crate::kdf::{derive_master_material, ProtectionKey};
use crate::scheme::{DecryptContext, SchemeRegistry};
use crate::b64_decode;

/// The short-lived client-side token a session re-hydrates from: the
/// master secret plus the public auth salt, JSON-encoded inside a
/// browser-session-scoped cookie. Treated as sensitive; cleared on
/// logout along with the cache.
#[derive(Deserialize)]
pub struct SessionToken {
    master_secret: SecretString,
    master_salt: String,
}

impl SessionToken {
    pub fn new(master_secret: SecretString, master_salt: impl Into<String>) -> Self {
        Self {
            master_secret,
            master_salt: master_salt.into(),
        }
    }

    fn parse(json: &str) -> KeyfortResult<Self> {
        serde_json::from_str(json)
            .map_err(|_| KeyfortError::NotReady("session token malformed".into()))
    }
}

pub struct SessionKeyCache {
    protection: Option<ProtectionKey>,
    source: Option<SessionToken>,
    registry: SchemeRegistry,
    iterations: u32,
}

impl SessionKeyCache {
    pub fn new(iterations: u32) -> Self {
        Self {
            protection: None,
            source: None,
            registry: SchemeRegistry::default(),
            iterations,
        }
    }

    /// Derive and cache the protection key from the master secret and the
    /// identity's stored auth salt (base64). Returns `true` on success,
    /// mirroring a login-time session validation.
    pub fn init(&mut self, master_secret: SecretString, master_salt: &str) -> KeyfortResult<bool> {
        let salt = b64_decode(master_salt)?;
        let material = derive_master_material(&master_secret, &salt, self.iterations)?;

        self.protection = Some(material.into_protection_key());
        self.source = Some(SessionToken::new(master_secret, master_salt));
        tracing::debug!("session protection key derived");
        Ok(true)
    }

    /// Re-hydrate from the serialized session token. A missing or
    /// malformed token is the retryable not-ready condition, never a
    /// silent failure.
    pub fn hydrate(&mut self, token_json: &str) -> KeyfortResult<bool> {
        let token = SessionToken::parse(token_json)?;
        let salt = token.master_salt.clone();
        self.init(token.master_secret, &salt)
    }

    pub fn is_ready(&self) -> bool {
        self.protection.is_some()
    }

    /// Drop all key material and the source token. Called on logout and
    /// account deletion; zeroization happens on drop.
    pub fn clear(&mut self) {
        self.protection = None;
        self.source = None;
        tracing::debug!("session key cache cleared");
    }

    /// Encrypt a field under the session's protection key, re-deriving
    /// from the retained token first if the key was dropped.
    pub fn encrypt_field(&mut self, plaintext: &str) -> KeyfortResult<EncryptedField> {
        let key = self.ensure_key()?;
        encrypt(plaintext, key)
    }

    /// Decrypt a shared-key field.
    pub fn decrypt_field(&mut self, field: &EncryptedField) -> KeyfortResult<String> {
        let key = self.ensure_key()?;
        decrypt(field, key)
    }

    /// Decrypt a stored record through the scheme registry, supplying
    /// whatever key material this session holds.
    pub fn decrypt_record(&mut self, record: &VaultSecret) -> KeyfortResult<String> {
        self.ensure_key()?;
        let ctx = DecryptContext {
            protection: self.protection.as_ref(),
            master_secret: self.source.as_ref().map(|t| &t.master_secret),
            iterations: self.iterations,
        };
        self.registry.decrypt(record, &ctx)
    }

    fn ensure_key(&mut self) -> KeyfortResult<&ProtectionKey> {
        if self.protection.is_none() {
            match self.source.take() {
                Some(token) => {
                    let salt = token.master_salt.clone();
                    self.init(token.master_secret, &salt)?;
                }
                None => {
                    return Err(KeyfortError::NotReady("protection key not ready".into()));
                }
            }
        }
        self.protection
            .as_ref()
            .ok_or_else(|| KeyfortError::NotReady("protection key not ready".into()))
    }
}

impl std::fmt::Debug for SessionKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyCache")
            .field("ready", &self.is_ready())
            .finish()
    }
}
