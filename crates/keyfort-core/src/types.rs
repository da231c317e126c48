//! Persistent record types.
//!
//! Only server-safe values appear here: salts, verifiers, nonces, and
//! ciphertexts. The master secret, derived keys, and issued recovery keys
//! never take a serializable form.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One authenticated user, as handed to us by the external identity
/// provider, plus the master-key verification material.
///
/// Invariant: `auth_salt` and `auth_verifier` are set together or not at
/// all. The master secret itself is never stored in any form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    /// Random salt for the root derivation (base64)
    pub auth_salt: Option<String>,
    /// HMAC-SHA256(auth_key, auth_salt) — server-checkable, non-reversible (base64)
    pub auth_verifier: Option<String>,
    pub master_key_set_at: Option<DateTime<Utc>>,
    /// Optional plaintext hint, delivered by the reminder mailer
    pub master_key_reminder: Option<String>,
    /// Pre-verifier credential (a direct hash of the secret) left behind by
    /// old accounts. Its presence routes verification to the migration flow.
    pub legacy_master_key_hash: Option<String>,
}

impl Identity {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            name,
            auth_salt: None,
            auth_verifier: None,
            master_key_set_at: None,
            master_key_reminder: None,
            legacy_master_key_hash: None,
        }
    }

    /// True once a master key has been set up in the current format.
    pub fn has_master_key(&self) -> bool {
        self.auth_salt.is_some() && self.auth_verifier.is_some()
    }
}

/// Encryption scheme of a stored secret, recorded explicitly alongside the
/// ciphertext. Decoding dispatches on this tag; field presence is never
/// sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchemeVersion {
    /// Oldest records: a bare hash of the value, not decryptable at all
    LegacyHash,
    /// AES-256-CBC under a key hashed directly from the master secret
    LegacyCbc,
    /// AES-256-GCM under a key derived per secret from (master secret, salt)
    PerSecretGcm,
    /// AES-256-GCM under the shared protection key — all new writes
    SharedGcm,
}

/// One protected credential entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSecret {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub title: String,
    pub username: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    /// High-sensitivity entries additionally require the step-up gate
    /// to be unlocked for every decrypt/copy/edit/delete.
    pub high_sensitivity: bool,
    pub scheme: SchemeVersion,
    /// Primary ciphertext (base64)
    pub encrypted_data: String,
    /// AEAD nonce (base64, 12 bytes for GCM schemes), unique per encryption
    pub iv: String,
    /// Per-secret derivation salt, only for `PerSecretGcm` records (base64)
    pub salt: Option<String>,
    /// Independent recovery ciphertext of the same plaintext
    pub recovery_data: Option<RecoveryData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Second ciphertext of a secret under the recovery key, decryptable
/// without the master secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryData {
    pub encrypted_data: String,
    pub iv: String,
}

/// Per-identity TOTP second-factor state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepUpState {
    pub enabled: bool,
    /// TOTP shared secret, encrypted at rest under the application key
    pub secret_enc: Option<String>,
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl StepUpState {
    /// Unlock status is derived and time-windowed, recomputed on every
    /// check. There is no background timer to clear it.
    pub fn is_unlocked(&self, now: DateTime<Utc>, unlock_duration_secs: u64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.unlocked_at {
            Some(at) => now - at < Duration::seconds(unlock_duration_secs as i64),
            None => false,
        }
    }
}

/// Server-side record of an issued recovery key. Deliberately holds only
/// metadata: the key itself is shown to the user once and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryGrant {
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Mutation command for a stored secret. The caller states its intent;
/// the service never infers it from which fields happen to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SecretUpdate {
    /// Metadata-only change; ciphertext untouched
    Rename {
        title: Option<String>,
        username: Option<String>,
        url: Option<String>,
        notes: Option<String>,
    },
    /// The stored value changed: fresh ciphertext, always shared-key scheme
    SecretRotation {
        encrypted_data: String,
        iv: String,
        recovery_data: Option<RecoveryData>,
    },
    /// Both metadata and value
    Full {
        title: Option<String>,
        username: Option<String>,
        url: Option<String>,
        notes: Option<String>,
        high_sensitivity: Option<bool>,
        encrypted_data: String,
        iv: String,
        recovery_data: Option<RecoveryData>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_master_key_state() {
        let mut identity = Identity::new("user@example.com", None);
        assert!(!identity.has_master_key());

        identity.auth_salt = Some("c2FsdA==".into());
        identity.auth_verifier = Some("dmVyaWZpZXI=".into());
        assert!(identity.has_master_key());
    }

    #[test]
    fn test_stepup_unlock_window() {
        let now = Utc::now();
        let state = StepUpState {
            enabled: true,
            secret_enc: Some("enc".into()),
            unlocked_at: Some(now - Duration::seconds(100)),
        };

        assert!(state.is_unlocked(now, 300));
        // Past the window: locked again without any explicit lock() call.
        assert!(!state.is_unlocked(now + Duration::seconds(201), 300));
    }

    #[test]
    fn test_stepup_disabled_never_unlocked() {
        let now = Utc::now();
        let state = StepUpState {
            enabled: false,
            secret_enc: None,
            unlocked_at: Some(now),
        };
        assert!(!state.is_unlocked(now, 300));
    }

    #[test]
    fn test_scheme_version_serde() {
        let json = serde_json::to_string(&SchemeVersion::SharedGcm).unwrap();
        let parsed: SchemeVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, SchemeVersion::SharedGcm);
    }

    #[test]
    fn test_vault_secret_roundtrip() {
        let secret = VaultSecret {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            title: "example.com".into(),
            username: Some("user".into()),
            url: Some("https://example.com".into()),
            notes: None,
            high_sensitivity: true,
            scheme: SchemeVersion::PerSecretGcm,
            encrypted_data: "Y2lwaGVydGV4dA==".into(),
            iv: "bm9uY2Vub25jZQ==".into(),
            salt: Some("c2FsdHNhbHQ=".into()),
            recovery_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&secret).unwrap();
        let parsed: VaultSecret = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.scheme, SchemeVersion::PerSecretGcm);
        assert_eq!(parsed.salt.as_deref(), Some("c2FsdHNhbHQ="));
    }
}
