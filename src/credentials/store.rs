//! Secret store implementations

use super::{CredentialKey, Secret, SecretStore};
use crate::Result;
use crate::db::Database;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Secrets persisted in the certpost database
pub struct DatabaseSecretStore {
    db: Arc<Database>,
}

impl DatabaseSecretStore {
    /// Create a store over an open database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SecretStore for DatabaseSecretStore {
    async fn get(&self, key: &CredentialKey) -> Result<Option<Secret>> {
        let secret = self
            .db
            .get_secret(&key.scope, &key.destination, &key.account)
            .await?;
        Ok(secret.map(Secret::new))
    }

    async fn set(&self, key: &CredentialKey, secret: &Secret) -> Result<()> {
        self.db
            .set_secret(&key.scope, &key.destination, &key.account, secret.expose())
            .await
    }

    async fn delete(&self, key: &CredentialKey) -> Result<()> {
        self.db
            .delete_secret(&key.scope, &key.destination, &key.account)
            .await
    }

    fn name(&self) -> &'static str {
        "database"
    }
}

/// Process-local store; secrets are lost on exit
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<CredentialKey, Secret>>,
}

impl MemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with secrets
    pub fn with_secrets(secrets: impl IntoIterator<Item = (CredentialKey, Secret)>) -> Self {
        Self {
            secrets: Mutex::new(secrets.into_iter().collect()),
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &CredentialKey) -> Result<Option<Secret>> {
        let secrets = self
            .secrets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(secrets.get(key).cloned())
    }

    async fn set(&self, key: &CredentialKey, secret: &Secret) -> Result<()> {
        self.secrets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone(), secret.clone());
        Ok(())
    }

    async fn delete(&self, key: &CredentialKey) -> Result<()> {
        self.secrets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
