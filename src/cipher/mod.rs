//! Repeating-key XOR stream transform.
//!
//! The transform is an involution: applying it twice with the same key
//! returns the original bytes, so the same function both obfuscates and
//! restores a payload. It offers no confidentiality against anyone who
//! can guess part of the plaintext; it only keeps container contents from
//! being recognizable at a glance.

pub mod key;

pub use key::{EnvSecretStore, KeyManager, KeyRecovery, MemorySecretStore, SecretStore};

use std::fmt;

use crate::error::{MepError, Result};

/// Non-empty key material for [`transform`].
#[derive(Clone, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    /// Builds a key from raw bytes. Empty input is rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(MepError::InvalidKey);
        }
        Ok(Self(bytes))
    }

    /// Builds a key from the UTF-8 bytes of a secret string.
    pub fn from_secret(secret: &str) -> Result<Self> {
        Self::new(secret.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the key holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Never print key material.
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(<{} bytes>)", self.0.len())
    }
}

/// XORs every byte of `data` with the key byte at the same position
/// modulo the key length. Output length equals input length.
pub fn transform(data: &[u8], key: &Key) -> Vec<u8> {
    let mut out = data.to_vec();
    transform_in_place(&mut out, key);
    out
}

/// In-place variant of [`transform`].
pub fn transform_in_place(data: &mut [u8], key: &Key) {
    let key = key.as_bytes();
    for (byte, k) in data.iter_mut().zip(key.iter().cycle()) {
        *byte ^= k;
    }
}
