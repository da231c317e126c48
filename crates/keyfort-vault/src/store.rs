//! Persistence seam.
//!
//! The core treats storage as at-least-available key-value records scoped
//! per identity: read the current value, compute the next, write it back.
//! No cross-record transactions are assumed. Only server-safe values ever
//! reach this trait — salts, verifiers, ciphertexts, timestamps.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use keyfort_core::types::{Identity, RecoveryGrant, StepUpState, VaultSecret};
use keyfort_core::{KeyfortError, KeyfortResult};

#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn get_identity(&self, id: Uuid) -> KeyfortResult<Option<Identity>>;
    async fn put_identity(&self, identity: Identity) -> KeyfortResult<()>;

    async fn get_secret(&self, id: Uuid) -> KeyfortResult<Option<VaultSecret>>;
    async fn list_secrets(&self, identity_id: Uuid) -> KeyfortResult<Vec<VaultSecret>>;
    async fn put_secret(&self, secret: VaultSecret) -> KeyfortResult<()>;
    async fn delete_secret(&self, id: Uuid) -> KeyfortResult<()>;

    async fn get_stepup(&self, identity_id: Uuid) -> KeyfortResult<StepUpState>;
    async fn put_stepup(&self, identity_id: Uuid, state: StepUpState) -> KeyfortResult<()>;

    async fn get_recovery_grant(&self, identity_id: Uuid) -> KeyfortResult<Option<RecoveryGrant>>;
    async fn put_recovery_grant(
        &self,
        identity_id: Uuid,
        grant: RecoveryGrant,
    ) -> KeyfortResult<()>;
}

/// In-memory store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    identities: RwLock<HashMap<Uuid, Identity>>,
    secrets: RwLock<HashMap<Uuid, VaultSecret>>,
    stepup: RwLock<HashMap<Uuid, StepUpState>>,
    grants: RwLock<HashMap<Uuid, RecoveryGrant>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VaultStore for MemoryStore {
    async fn get_identity(&self, id: Uuid) -> KeyfortResult<Option<Identity>> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn put_identity(&self, identity: Identity) -> KeyfortResult<()> {
        self.identities.write().await.insert(identity.id, identity);
        Ok(())
    }

    async fn get_secret(&self, id: Uuid) -> KeyfortResult<Option<VaultSecret>> {
        Ok(self.secrets.read().await.get(&id).cloned())
    }

    async fn list_secrets(&self, identity_id: Uuid) -> KeyfortResult<Vec<VaultSecret>> {
        let mut out: Vec<VaultSecret> = self
            .secrets
            .read()
            .await
            .values()
            .filter(|s| s.identity_id == identity_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn put_secret(&self, secret: VaultSecret) -> KeyfortResult<()> {
        self.secrets.write().await.insert(secret.id, secret);
        Ok(())
    }

    async fn delete_secret(&self, id: Uuid) -> KeyfortResult<()> {
        self.secrets
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| KeyfortError::Storage("secret not found".into()))
    }

    async fn get_stepup(&self, identity_id: Uuid) -> KeyfortResult<StepUpState> {
        Ok(self
            .stepup
            .read()
            .await
            .get(&identity_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_stepup(&self, identity_id: Uuid, state: StepUpState) -> KeyfortResult<()> {
        self.stepup.write().await.insert(identity_id, state);
        Ok(())
    }

    async fn get_recovery_grant(&self, identity_id: Uuid) -> KeyfortResult<Option<RecoveryGrant>> {
        Ok(self.grants.read().await.get(&identity_id).cloned())
    }

    async fn put_recovery_grant(
        &self,
        identity_id: Uuid,
        grant: RecoveryGrant,
    ) -> KeyfortResult<()> {
        self.grants.write().await.insert(identity_id, grant);
        Ok(())
    }
}
