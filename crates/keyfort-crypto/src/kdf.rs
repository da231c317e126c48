//! Key derivation: master secret → root material → purpose-separated sub-keys
//!
//! The expensive PBKDF2 step runs once, on the root. Sub-keys come from
//! cheap labeled HKDF expansions with disjoint context strings, giving
//! domain separation without repeating the slow derivation per key.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use keyfort_core::{KeyfortError, KeyfortResult};

use crate::{AUTH_SALT_SIZE, KEY_SIZE, PER_SECRET_SALT_SIZE};

const CONTEXT_ENC: &[u8] = b"enc";
const CONTEXT_AUTH: &[u8] = b"auth";

/// The 256-bit root derived from (master secret, auth salt).
///
/// Zeroized on drop. Used only to expand sub-keys and to wrap recovery
/// material; never persisted and never sent anywhere.
#[derive(Clone)]
pub struct RootMaterial {
    bytes: [u8; KEY_SIZE],
}

impl RootMaterial {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for RootMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for RootMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootMaterial")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The AEAD key protecting vault secrets.
///
/// Deliberately non-extractable: the raw bytes are visible only inside
/// this crate, so the only operations reachable from outside are
/// encrypt and decrypt.
#[derive(Clone)]
pub struct ProtectionKey {
    bytes: [u8; KEY_SIZE],
}

impl ProtectionKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ProtectionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ProtectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The MAC key behind the server-checkable verifier. Sign-only: the one
/// operation exposed is HMAC over a salt.
#[derive(Clone)]
pub struct AuthKey {
    bytes: [u8; KEY_SIZE],
}

impl AuthKey {
    /// HMAC-SHA256 over `data`, keyed by this auth key.
    pub(crate) fn sign(&self, data: &[u8]) -> [u8; KEY_SIZE] {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.bytes)
            .expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    /// Constant-time verification of an HMAC over `data`.
    pub(crate) fn verify(&self, data: &[u8], expected: &[u8]) -> bool {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.bytes)
            .expect("HMAC accepts any key length");
        mac.update(data);
        mac.verify_slice(expected).is_ok()
    }
}

impl Drop for AuthKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The full client-side key hierarchy for one session.
#[derive(Debug)]
pub struct MasterKeyMaterial {
    root: RootMaterial,
    protection: ProtectionKey,
    auth: AuthKey,
}

impl MasterKeyMaterial {
    pub fn protection(&self) -> &ProtectionKey {
        &self.protection
    }

    pub fn auth(&self) -> &AuthKey {
        &self.auth
    }

    pub(crate) fn root(&self) -> &RootMaterial {
        &self.root
    }

    /// Move the protection key out, dropping (and zeroizing) the rest.
    pub fn into_protection_key(self) -> ProtectionKey {
        self.protection.clone()
    }
}

/// Derive the full key hierarchy from the master secret and the identity's
/// auth salt.
///
/// The salt is public and stored server-side; it must be exactly
/// [`AUTH_SALT_SIZE`] bytes. The secret never appears in logs or errors.
pub fn derive_master_material(
    secret: &SecretString,
    salt: &[u8],
    iterations: u32,
) -> KeyfortResult<MasterKeyMaterial> {
    if secret.expose_secret().is_empty() {
        return Err(KeyfortError::InvalidInput("master secret is empty".into()));
    }
    if salt.len() != AUTH_SALT_SIZE {
        return Err(KeyfortError::InvalidInput(format!(
            "auth salt must be {AUTH_SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }
    if iterations == 0 {
        return Err(KeyfortError::InvalidInput(
            "iteration count must be positive".into(),
        ));
    }

    let mut root = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret.expose_secret().as_bytes(), salt, iterations, &mut root);

    let protection = ProtectionKey {
        bytes: expand_subkey(&root, CONTEXT_ENC)?,
    };
    let auth = AuthKey {
        bytes: expand_subkey(&root, CONTEXT_AUTH)?,
    };

    Ok(MasterKeyMaterial {
        root: RootMaterial { bytes: root },
        protection,
        auth,
    })
}

/// Cheap labeled sub-key expansion via HKDF-SHA256.
fn expand_subkey(root: &[u8; KEY_SIZE], context: &[u8]) -> KeyfortResult<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, root);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(context, &mut okm)
        .map_err(|_| KeyfortError::Other(anyhow::anyhow!("HKDF expand failed")))?;
    Ok(okm)
}

/// Full-cost derivation of a secret-specific key, for legacy records that
/// were each encrypted under their own salt before the shared protection
/// key existed.
pub fn derive_per_secret_key(
    secret: &SecretString,
    salt: &[u8],
    iterations: u32,
) -> KeyfortResult<ProtectionKey> {
    if secret.expose_secret().is_empty() {
        return Err(KeyfortError::InvalidInput("master secret is empty".into()));
    }
    if salt.len() != PER_SECRET_SALT_SIZE {
        return Err(KeyfortError::InvalidInput(format!(
            "per-secret salt must be {PER_SECRET_SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret.expose_secret().as_bytes(), salt, iterations, &mut key);
    Ok(ProtectionKey { bytes: key })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fast iteration count for tests; production uses DEFAULT_ITERATIONS.
    const TEST_ITERATIONS: u32 = 1000;

    #[test]
    fn test_derivation_deterministic() {
        let secret = SecretString::from("482913");
        let salt = [7u8; AUTH_SALT_SIZE];

        let m1 = derive_master_material(&secret, &salt, TEST_ITERATIONS).unwrap();
        let m2 = derive_master_material(&secret, &salt, TEST_ITERATIONS).unwrap();

        assert_eq!(m1.protection().as_bytes(), m2.protection().as_bytes());
        assert_eq!(m1.auth().sign(&salt), m2.auth().sign(&salt));
        assert_eq!(m1.root().as_bytes(), m2.root().as_bytes());
    }

    #[test]
    fn test_subkeys_are_domain_separated() {
        let secret = SecretString::from("482913");
        let salt = [7u8; AUTH_SALT_SIZE];

        let material = derive_master_material(&secret, &salt, TEST_ITERATIONS).unwrap();

        assert_ne!(material.protection().as_bytes(), material.root().as_bytes());
        // The auth key signs; the protection key encrypts. Their raw bytes
        // must differ even though both come from the same root.
        let auth_probe = material.auth().sign(b"probe");
        assert_ne!(&auth_probe, material.protection().as_bytes());
    }

    #[test]
    fn test_different_secrets_different_keys() {
        let salt = [7u8; AUTH_SALT_SIZE];
        let m1 =
            derive_master_material(&SecretString::from("482913"), &salt, TEST_ITERATIONS).unwrap();
        let m2 =
            derive_master_material(&SecretString::from("482914"), &salt, TEST_ITERATIONS).unwrap();

        assert_ne!(m1.protection().as_bytes(), m2.protection().as_bytes());
    }

    #[test]
    fn test_different_salts_different_keys() {
        let secret = SecretString::from("482913");
        let m1 = derive_master_material(&secret, &[1u8; AUTH_SALT_SIZE], TEST_ITERATIONS).unwrap();
        let m2 = derive_master_material(&secret, &[2u8; AUTH_SALT_SIZE], TEST_ITERATIONS).unwrap();

        assert_ne!(m1.protection().as_bytes(), m2.protection().as_bytes());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = derive_master_material(
            &SecretString::from(""),
            &[0u8; AUTH_SALT_SIZE],
            TEST_ITERATIONS,
        );
        assert!(matches!(result, Err(KeyfortError::InvalidInput(_))));
    }

    #[test]
    fn test_wrong_salt_length_rejected() {
        let result =
            derive_master_material(&SecretString::from("482913"), &[0u8; 8], TEST_ITERATIONS);
        assert!(matches!(result, Err(KeyfortError::InvalidInput(_))));
    }

    #[test]
    fn test_per_secret_key_deterministic() {
        let secret = SecretString::from("482913");
        let salt = [3u8; PER_SECRET_SALT_SIZE];

        let k1 = derive_per_secret_key(&secret, &salt, TEST_ITERATIONS).unwrap();
        let k2 = derive_per_secret_key(&secret, &salt, TEST_ITERATIONS).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_per_secret_salt_length_enforced() {
        let result = derive_per_secret_key(
            &SecretString::from("482913"),
            &[0u8; AUTH_SALT_SIZE],
            TEST_ITERATIONS,
        );
        assert!(matches!(result, Err(KeyfortError::InvalidInput(_))));
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let secret = SecretString::from("482913");
        let salt = [7u8; AUTH_SALT_SIZE];
        let material = derive_master_material(&secret, &salt, TEST_ITERATIONS).unwrap();

        let debug = format!("{:?}", material);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("482913"));
    }
}
