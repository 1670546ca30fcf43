//! Active key ownership and out-of-band key recovery.
//!
//! A [`KeyManager`] holds the key used by the container codec. Setting a
//! key also publishes the secret to a [`SecretStore`], so a separate reader
//! process sharing that channel (for example a training job started later
//! in the same shell) can recover it without being given the secret again.

use std::env;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::debug;

use super::Key;
use crate::error::{MepError, Result};

/// Environment variable used by [`EnvSecretStore::default`].
pub const KEY_ENV_VAR: &str = "MEP_KEY";

/// Side channel the active secret is published to and recovered from.
pub trait SecretStore: Send + Sync {
    /// Returns the stored secret, if any.
    fn get(&self) -> Option<String>;

    /// Replaces the stored secret.
    fn set(&self, secret: &str);

    /// Human-readable name of the channel, used in error messages.
    fn describe(&self) -> String;
}

/// Stores the secret in a process environment variable.
///
/// The secret becomes visible to anything that can read this process's
/// environment, including every child process it spawns. Use
/// [`MemorySecretStore`] when that is not acceptable.
#[derive(Clone, Debug)]
pub struct EnvSecretStore {
    var: String,
}

impl EnvSecretStore {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new(KEY_ENV_VAR)
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self) -> Option<String> {
        env::var(&self.var).ok().filter(|value| !value.is_empty())
    }

    fn set(&self, secret: &str) {
        env::set_var(&self.var, secret);
    }

    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }
}

/// Process-local store that never touches the environment.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secret: Mutex<Option<String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Mutex::new(Some(secret.into())),
        }
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self) -> Option<String> {
        self.secret
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|value| !value.is_empty())
    }

    fn set(&self, secret: &str) {
        *self.secret.lock().unwrap_or_else(PoisonError::into_inner) = Some(secret.to_string());
    }

    fn describe(&self) -> String {
        "in-memory secret store".to_string()
    }
}

/// Outcome of [`KeyManager::recover`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRecovery {
    /// A key was already installed; nothing was read from the store.
    AlreadyPresent,
    /// This call read the store and installed the key.
    Installed,
    /// No key is installed and the store holds none.
    Unavailable,
}

/// Owns the active key.
pub struct KeyManager {
    store: Box<dyn SecretStore>,
    active: RwLock<Option<Arc<Key>>>,
    // Serializes check-then-install during recovery.
    install: Mutex<()>,
}

impl KeyManager {
    pub fn new(store: impl SecretStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            active: RwLock::new(None),
            install: Mutex::new(()),
        }
    }

    /// Manager backed by the `MEP_KEY` environment variable.
    pub fn from_env() -> Self {
        Self::new(EnvSecretStore::default())
    }

    /// Installs `secret` as the active key and publishes it to the store.
    pub fn set_key(&self, secret: &str) -> Result<()> {
        let key = Key::from_secret(secret)?;
        let _guard = self.install.lock().unwrap_or_else(PoisonError::into_inner);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(key));
        self.store.set(secret);
        debug!("installed key and published it to {}", self.store.describe());
        Ok(())
    }

    /// Returns true when no key is installed and none can be recovered.
    ///
    /// Recovers and installs the stored key as a side effect.
    pub fn is_key_missing(&self) -> bool {
        self.recover() == KeyRecovery::Unavailable
    }

    /// Installs the stored secret if no key is active yet.
    ///
    /// Concurrent callers are serialized; exactly one of them reports
    /// [`KeyRecovery::Installed`] and the rest observe the installed key.
    pub fn recover(&self) -> KeyRecovery {
        if self.installed().is_some() {
            return KeyRecovery::AlreadyPresent;
        }

        let _guard = self.install.lock().unwrap_or_else(PoisonError::into_inner);
        if self.installed().is_some() {
            return KeyRecovery::AlreadyPresent;
        }

        let Some(secret) = self.store.get() else {
            return KeyRecovery::Unavailable;
        };
        let Ok(key) = Key::from_secret(&secret) else {
            return KeyRecovery::Unavailable;
        };

        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(key));
        debug!("recovered key from {}", self.store.describe());
        KeyRecovery::Installed
    }

    /// The active key, recovering it from the store if necessary.
    pub fn active_key(&self) -> Result<Arc<Key>> {
        if self.is_key_missing() {
            return Err(MepError::NoKey {
                channel: self.store.describe(),
            });
        }
        self.installed().ok_or_else(|| MepError::NoKey {
            channel: self.store.describe(),
        })
    }

    fn installed(&self) -> Option<Arc<Key>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
