//! Destination credentials
//!
//! Resolution is split in two steps so the interactive part stays isolated:
//! 1. [`CredentialResolver::lookup`] checks the process cache and the backing
//!    [`SecretStore`], and never prompts
//! 2. [`CredentialResolver::prompt_and_store`] asks the [`Prompter`] and persists the
//!    answer under the same key
//!
//! [`CredentialResolver::resolve`] chains both for the delivery channel.

use crate::config::{CredentialConfig, DestinationConfig};
use crate::error::{CredentialError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

mod prompt;
mod store;

pub use prompt::{Prompter, StaticPrompter, TerminalPrompter};
pub use store::{DatabaseSecretStore, MemorySecretStore};

/// A secret value. Its `Debug` output is redacted and it has no `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The secret text, for handing to the mount command only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Identifies a credential in the store
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    /// Store scope
    pub scope: String,
    /// Namespaced destination name
    pub destination: String,
    /// Account on the remote
    pub account: String,
}

impl CredentialKey {
    /// Key for a configured destination
    pub fn for_destination(config: &CredentialConfig, destination: &DestinationConfig) -> Self {
        Self {
            scope: config.scope.clone(),
            destination: format!("{}.{}", config.namespace, destination.name),
            account: destination.account.clone(),
        }
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.scope, self.destination, self.account)
    }
}

/// Backing store for secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stored secret for `key`, or None
    async fn get(&self, key: &CredentialKey) -> Result<Option<Secret>>;

    /// Persist `secret` under `key`, replacing any previous value
    async fn set(&self, key: &CredentialKey, secret: &Secret) -> Result<()>;

    /// Remove the secret stored under `key`; removing a missing key is not an error
    async fn delete(&self, key: &CredentialKey) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Result of a non-interactive lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Secret available
    Found(Secret),
    /// Nothing cached or stored; the caller decides whether to prompt
    Missing,
}

/// Resolves destination credentials, caching them for the process
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
    prompter: Arc<dyn Prompter>,
    cache: Mutex<HashMap<CredentialKey, Secret>>,
}

impl CredentialResolver {
    /// Create a resolver over a store and a prompter
    pub fn new(store: Arc<dyn SecretStore>, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            store,
            prompter,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a secret without prompting
    ///
    /// A store failure is reported as [`CredentialError::StoreUnavailable`].
    pub async fn lookup(&self, key: &CredentialKey) -> Result<Lookup> {
        if let Some(secret) = self.cached(key) {
            return Ok(Lookup::Found(secret));
        }

        let stored = self.store.get(key).await.map_err(|e| {
            CredentialError::StoreUnavailable {
                destination: key.destination.clone(),
                reason: e.to_string(),
            }
        })?;

        match stored {
            Some(secret) => {
                debug!(key = %key, store = self.store.name(), "credential found in store");
                self.remember(key, &secret);
                Ok(Lookup::Found(secret))
            }
            None => Ok(Lookup::Missing),
        }
    }

    /// Ask for the secret and persist it
    ///
    /// An empty answer is accepted; the mount attempt decides whether it is right.
    /// If persisting fails the secret is still returned, but not cached, so the
    /// question comes back on the next run.
    pub async fn prompt_and_store(&self, key: &CredentialKey) -> Result<Secret> {
        info!(key = %key, "credential not stored, prompting");
        let secret = self.prompter.prompt(key).await?;

        match self.store.set(key, &secret).await {
            Ok(()) => self.remember(key, &secret),
            Err(e) => warn!(
                key = %key,
                store = self.store.name(),
                error = %e,
                "could not persist credential, it will be asked again next run"
            ),
        }

        Ok(secret)
    }

    /// Lookup, then prompt on a miss
    pub async fn resolve(&self, key: &CredentialKey) -> Result<Secret> {
        match self.lookup(key).await? {
            Lookup::Found(secret) => Ok(secret),
            Lookup::Missing => self.prompt_and_store(key).await,
        }
    }

    /// Drop a secret the remote refused, from the cache and the store
    ///
    /// The next [`CredentialResolver::resolve`] for `key` prompts again.
    pub async fn forget(&self, key: &CredentialKey) -> Result<()> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);

        self.store.delete(key).await.map_err(|e| {
            CredentialError::StoreUnavailable {
                destination: key.destination.clone(),
                reason: e.to_string(),
            }
        })?;
        info!(key = %key, store = self.store.name(), "forgot rejected credential");
        Ok(())
    }

    fn cached(&self, key: &CredentialKey) -> Option<Secret> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn remember(&self, key: &CredentialKey, secret: &Secret) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone(), secret.clone());
    }
}
