//! Credential resolution with stale-credential flagging.
//!
//! ```rust
//! use tprovider::{CredentialStore, InMemoryCredentialStore};
//!
//! let store = InMemoryCredentialStore::new();
//! store.insert("key-1", "sk-test").expect("key should store");
//! assert_eq!(store.resolve("key-1").expect("resolves").expose(), "sk-test");
//!
//! store.mark_stale("key-1");
//! assert!(store.is_stale("key-1"));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::ProviderError;

#[derive(PartialEq, Eq)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn expose(&self) -> &str {
        self.value.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        // SAFETY: zero bytes are valid UTF-8 and the string is dropped right after.
        unsafe {
            self.value.as_mut_vec().fill(0);
        }
    }
}

/// Decrypts credentials by key id and remembers which ones upstream rejected.
///
/// A credential flagged stale makes later turns fail fast instead of retrying
/// a dead key against the provider.
pub trait CredentialStore: Send + Sync {
    fn resolve(&self, key_id: &str) -> Result<SecretString, ProviderError>;

    fn mark_stale(&self, key_id: &str);

    fn is_stale(&self, key_id: &str) -> bool;
}

/// Secrets live as [`SecretString`] so replaced or dropped keys are zeroed.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    secrets: Mutex<HashMap<String, SecretString>>,
    stale: Mutex<HashSet<String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        key_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<(), ProviderError> {
        let key_id = key_id.into();
        let secret = SecretString::new(secret);
        if secret.is_empty() {
            return Err(ProviderError::authentication("credential must not be empty"));
        }

        self.secrets_mut()?.insert(key_id.clone(), secret);
        self.stale_mut()?.remove(&key_id);
        Ok(())
    }

    pub fn remove(&self, key_id: &str) -> Result<bool, ProviderError> {
        let removed = self.secrets_mut()?.remove(key_id).is_some();
        self.stale_mut()?.remove(key_id);
        Ok(removed)
    }

    fn secrets_mut(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, SecretString>>, ProviderError> {
        self.secrets
            .lock()
            .map_err(|_| ProviderError::unclassified("credential store lock poisoned"))
    }

    fn stale_mut(&self) -> Result<MutexGuard<'_, HashSet<String>>, ProviderError> {
        self.stale
            .lock()
            .map_err(|_| ProviderError::unclassified("credential store lock poisoned"))
    }
}

impl std::fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCredentialStore")
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn resolve(&self, key_id: &str) -> Result<SecretString, ProviderError> {
        self.secrets_mut()?
            .get(key_id)
            .cloned()
            .ok_or_else(|| ProviderError::authentication(format!("no credential for '{key_id}'")))
    }

    fn mark_stale(&self, key_id: &str) {
        if let Ok(mut stale) = self.stale_mut() {
            stale.insert(key_id.to_string());
        }
    }

    fn is_stale(&self, key_id: &str) -> bool {
        self.stale_mut()
            .map(|stale| stale.contains(key_id))
            .unwrap_or(false)
    }
}
