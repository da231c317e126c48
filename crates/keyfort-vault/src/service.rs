//! The vault service: policy and lifecycle over the cryptographic core.
//!
//! Holds no per-user key material itself — sessions own that. The service
//! enforces the rules the crypto layer is oblivious to: re-keying demands
//! the old secret, legacy credentials route to migration instead of
//! failing as wrong-password, high-sensitivity entries check the step-up
//! gate on every operation, and recovery runs against escrow ciphertexts
//! only.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use keyfort_core::config::KeyfortConfig;
use keyfort_core::types::{RecoveryGrant, SecretUpdate, VaultSecret};
use keyfort_core::{KeyfortError, KeyfortResult};
use keyfort_crypto::auth::MasterKeySetup;
use keyfort_crypto::{
    generate_recovery_key, setup_master_key, unwrap_secret, verify_master_key, wrap_secret,
    SessionKeyCache,
};
use keyfort_stepup::{AppKey, StepUpGate, StepUpSetup, StepUpStatus};

use crate::mailer::{ReminderMail, ReminderMailer};
use crate::store::VaultStore;

/// A new entry as submitted by the caller, plaintext still in hand.
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub title: String,
    pub username: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub high_sensitivity: bool,
    pub value: String,
    /// When present, an escrow ciphertext is written alongside the primary.
    pub recovery_key: Option<String>,
}

pub struct VaultService<S, M> {
    store: S,
    mailer: M,
    config: KeyfortConfig,
    gate: StepUpGate,
}

impl<S: VaultStore, M: ReminderMailer> VaultService<S, M> {
    pub fn new(store: S, mailer: M, config: KeyfortConfig, app_key: AppKey) -> Self {
        let gate = StepUpGate::new(config.stepup.clone(), app_key);
        Self {
            store,
            mailer,
            config,
            gate,
        }
    }

    /// The backing store, for collaborators that manage identities
    /// upstream (sign-in creates the record, the vault never does).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// A fresh, empty session cache with this deployment's KDF cost.
    /// Created on login, cleared on logout; one per client runtime.
    pub fn new_session(&self) -> SessionKeyCache {
        SessionKeyCache::new(self.config.kdf.iterations)
    }

    // ---- master key lifecycle ----

    /// First-time setup or re-key. Re-keying an identity that already has
    /// a verifier requires the old secret to verify first. A legacy-format
    /// credential is cleared here: migration is "prove the old credential
    /// upstream, then set a fresh one".
    pub async fn set_master_key(
        &self,
        identity_id: Uuid,
        new_secret: &SecretString,
        old_secret: Option<&SecretString>,
        reminder: Option<String>,
        now: DateTime<Utc>,
    ) -> KeyfortResult<MasterKeySetup> {
        let mut identity = self
            .store
            .get_identity(identity_id)
            .await?
            .ok_or_else(|| KeyfortError::Storage("unknown identity".into()))?;

        if identity.has_master_key() {
            let old = old_secret.ok_or(KeyfortError::AuthenticationFailure)?;
            self.verify_master_key(identity_id, old).await?;
        }

        let setup = setup_master_key(new_secret, self.config.kdf.iterations)?;

        identity.auth_salt = Some(setup.auth_salt.clone());
        identity.auth_verifier = Some(setup.auth_verifier.clone());
        identity.master_key_set_at = Some(now);
        identity.master_key_reminder = reminder;
        identity.legacy_master_key_hash = None;
        self.store.put_identity(identity).await?;

        tracing::info!(identity = %identity_id, "master key verification material stored");
        Ok(setup)
    }

    /// Generic-by-design: an unknown identity, a missing verifier, and a
    /// wrong secret are all the same authentication failure. Only the
    /// legacy credential format is distinguishable, so the caller can
    /// route to migration.
    pub async fn verify_master_key(
        &self,
        identity_id: Uuid,
        secret: &SecretString,
    ) -> KeyfortResult<()> {
        let identity = self
            .store
            .get_identity(identity_id)
            .await?
            .ok_or(KeyfortError::AuthenticationFailure)?;

        match (&identity.auth_salt, &identity.auth_verifier) {
            (Some(salt), Some(verifier)) => {
                if verify_master_key(secret, salt, verifier, self.config.kdf.iterations)? {
                    Ok(())
                } else {
                    Err(KeyfortError::AuthenticationFailure)
                }
            }
            _ if identity.legacy_master_key_hash.is_some() => Err(KeyfortError::LegacyFormat),
            _ => Err(KeyfortError::AuthenticationFailure),
        }
    }

    /// Email the stored reminder hint through the mail seam.
    pub async fn send_reminder(&self, identity_id: Uuid) -> KeyfortResult<()> {
        let identity = self
            .store
            .get_identity(identity_id)
            .await?
            .ok_or_else(|| KeyfortError::Storage("unknown identity".into()))?;

        let hint = identity
            .master_key_reminder
            .as_deref()
            .ok_or_else(|| KeyfortError::InvalidInput("no reminder hint on file".into()))?;

        self.mailer
            .send(ReminderMail {
                to: identity.email.clone(),
                subject: "Your master key reminder".into(),
                html: format!("<p>Your master key reminder: <strong>{hint}</strong></p>"),
            })
            .await?;

        tracing::info!(identity = %identity_id, "reminder mail dispatched");
        Ok(())
    }

    // ---- secrets ----

    /// Encrypt and store a new entry. Always the shared-key scheme; the
    /// escrow ciphertext is produced in the same write when a recovery
    /// key is supplied.
    pub async fn create_secret(
        &self,
        session: &mut SessionKeyCache,
        identity_id: Uuid,
        new: NewSecret,
        now: DateTime<Utc>,
    ) -> KeyfortResult<VaultSecret> {
        let field = session.encrypt_field(&new.value)?;
        let recovery_data = match new.recovery_key.as_deref() {
            Some(rk) => Some(wrap_secret(&new.value, rk)?),
            None => None,
        };

        let secret = VaultSecret {
            id: Uuid::new_v4(),
            identity_id,
            title: new.title,
            username: new.username,
            url: new.url,
            notes: new.notes,
            high_sensitivity: new.high_sensitivity,
            scheme: keyfort_core::types::SchemeVersion::SharedGcm,
            encrypted_data: field.encrypted_data,
            iv: field.iv,
            salt: None,
            recovery_data,
            created_at: now,
            updated_at: now,
        };

        self.store.put_secret(secret.clone()).await?;
        Ok(secret)
    }

    /// Decrypt one entry through the scheme registry. High-sensitivity
    /// entries additionally require the step-up gate unlocked — checked
    /// here, per call, on top of needing a ready session key.
    pub async fn read_secret(
        &self,
        session: &mut SessionKeyCache,
        secret_id: Uuid,
        now: DateTime<Utc>,
    ) -> KeyfortResult<String> {
        let secret = self.load_secret(secret_id).await?;
        self.ensure_gate_allows(&secret, now).await?;
        session.decrypt_record(&secret)
    }

    /// Apply a tagged update command. Every variant on a high-sensitivity
    /// entry is gated; rotation always lands on the shared-key scheme and
    /// drops any legacy salt.
    pub async fn apply_update(
        &self,
        secret_id: Uuid,
        update: SecretUpdate,
        now: DateTime<Utc>,
    ) -> KeyfortResult<VaultSecret> {
        let mut secret = self.load_secret(secret_id).await?;
        self.ensure_gate_allows(&secret, now).await?;

        match update {
            SecretUpdate::Rename {
                title,
                username,
                url,
                notes,
            } => {
                if let Some(t) = title {
                    secret.title = t;
                }
                if let Some(u) = username {
                    secret.username = Some(u);
                }
                if let Some(u) = url {
                    secret.url = Some(u);
                }
                if let Some(n) = notes {
                    secret.notes = Some(n);
                }
            }
            SecretUpdate::SecretRotation {
                encrypted_data,
                iv,
                recovery_data,
            } => {
                secret.scheme = keyfort_core::types::SchemeVersion::SharedGcm;
                secret.encrypted_data = encrypted_data;
                secret.iv = iv;
                secret.salt = None;
                secret.recovery_data = recovery_data;
            }
            SecretUpdate::Full {
                title,
                username,
                url,
                notes,
                high_sensitivity,
                encrypted_data,
                iv,
                recovery_data,
            } => {
                if let Some(t) = title {
                    secret.title = t;
                }
                if let Some(u) = username {
                    secret.username = Some(u);
                }
                if let Some(u) = url {
                    secret.url = Some(u);
                }
                if let Some(n) = notes {
                    secret.notes = Some(n);
                }
                if let Some(h) = high_sensitivity {
                    secret.high_sensitivity = h;
                }
                secret.scheme = keyfort_core::types::SchemeVersion::SharedGcm;
                secret.encrypted_data = encrypted_data;
                secret.iv = iv;
                secret.salt = None;
                secret.recovery_data = recovery_data;
            }
        }

        secret.updated_at = now;
        self.store.put_secret(secret.clone()).await?;
        Ok(secret)
    }

    pub async fn delete_secret(&self, secret_id: Uuid, now: DateTime<Utc>) -> KeyfortResult<()> {
        let secret = self.load_secret(secret_id).await?;
        self.ensure_gate_allows(&secret, now).await?;
        self.store.delete_secret(secret_id).await
    }

    pub async fn list_secrets(&self, identity_id: Uuid) -> KeyfortResult<Vec<VaultSecret>> {
        self.store.list_secrets(identity_id).await
    }

    // ---- recovery ----

    /// Issue a recovery key. The key is returned exactly once; the store
    /// keeps only issuance metadata, from which the key cannot be derived.
    pub async fn generate_recovery(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> KeyfortResult<String> {
        let key = generate_recovery_key();
        self.store
            .put_recovery_grant(
                identity_id,
                RecoveryGrant {
                    created_at: now,
                    last_used_at: None,
                },
            )
            .await?;
        tracing::info!(identity = %identity_id, "recovery key issued");
        Ok(key)
    }

    /// Break-glass decryption of one entry's escrow ciphertext. Works
    /// without the master secret — that is the point — and stamps the
    /// grant so use is visible.
    pub async fn recover_secret(
        &self,
        secret_id: Uuid,
        recovery_key: &str,
        now: DateTime<Utc>,
    ) -> KeyfortResult<String> {
        let secret = self.load_secret(secret_id).await?;
        let escrow = secret
            .recovery_data
            .as_ref()
            .ok_or_else(|| KeyfortError::InvalidInput("secret has no recovery data".into()))?;

        let plaintext = unwrap_secret(escrow, recovery_key)?;

        if let Some(mut grant) = self.store.get_recovery_grant(secret.identity_id).await? {
            grant.last_used_at = Some(now);
            self.store
                .put_recovery_grant(secret.identity_id, grant)
                .await?;
        }
        tracing::warn!(identity = %secret.identity_id, "recovery key used to bypass master secret");

        Ok(plaintext)
    }

    // ---- step-up gate ----

    pub async fn stepup_setup(&self, identity_id: Uuid) -> KeyfortResult<StepUpSetup> {
        let identity = self
            .store
            .get_identity(identity_id)
            .await?
            .ok_or_else(|| KeyfortError::Storage("unknown identity".into()))?;

        let mut state = self.store.get_stepup(identity_id).await?;
        let setup = self.gate.setup(&mut state, &identity.email)?;
        self.store.put_stepup(identity_id, state).await?;
        Ok(setup)
    }

    pub async fn stepup_confirm(
        &self,
        identity_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> KeyfortResult<()> {
        let mut state = self.store.get_stepup(identity_id).await?;
        self.gate.confirm(&mut state, code, now)?;
        self.store.put_stepup(identity_id, state).await
    }

    pub async fn stepup_unlock(
        &self,
        identity_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> KeyfortResult<()> {
        let mut state = self.store.get_stepup(identity_id).await?;
        self.gate.unlock(&mut state, code, now)?;
        self.store.put_stepup(identity_id, state).await
    }

    pub async fn stepup_lock(&self, identity_id: Uuid) -> KeyfortResult<()> {
        let mut state = self.store.get_stepup(identity_id).await?;
        self.gate.lock(&mut state);
        self.store.put_stepup(identity_id, state).await
    }

    pub async fn stepup_disable(&self, identity_id: Uuid) -> KeyfortResult<()> {
        let mut state = self.store.get_stepup(identity_id).await?;
        self.gate.disable(&mut state)?;
        self.store.put_stepup(identity_id, state).await
    }

    pub async fn stepup_status(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> KeyfortResult<StepUpStatus> {
        let state = self.store.get_stepup(identity_id).await?;
        Ok(self.gate.status(&state, now))
    }

    // ---- internals ----

    async fn load_secret(&self, secret_id: Uuid) -> KeyfortResult<VaultSecret> {
        self.store
            .get_secret(secret_id)
            .await?
            .ok_or_else(|| KeyfortError::Storage("secret not found".into()))
    }

    /// High-sensitivity entries demand an unlocked gate for every
    /// operation. When step-up was never enabled there is no factor to
    /// demand, and gating degrades to master-key-only.
    async fn ensure_gate_allows(
        &self,
        secret: &VaultSecret,
        now: DateTime<Utc>,
    ) -> KeyfortResult<()> {
        if !secret.high_sensitivity {
            return Ok(());
        }
        let state = self.store.get_stepup(secret.identity_id).await?;
        let status = self.gate.status(&state, now);
        if status.enabled && !status.unlocked {
            return Err(KeyfortError::NotReady("step-up unlock required".into()));
        }
        Ok(())
    }
}
