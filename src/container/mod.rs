//! The `.mep` container convention.
//!
//! A container file is the stream transform of a payload (an image file's
//! bytes or a re-encoded picture buffer) with no header, version tag or
//! magic number. Files are recognized purely by their extension.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use log::trace;

use crate::cipher::{self, KeyManager};
use crate::error::Result;

/// Extension of container files, without the leading dot.
pub const CONTAINER_EXTENSION: &str = "mep";

/// Reserved name for a dataset manifest. Nothing reads or writes it yet.
pub const METADATA_FILENAME: &str = "md.mep";

/// Returns true if `path` carries the container extension.
pub fn is_container_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == CONTAINER_EXTENSION)
        .unwrap_or(false)
}

/// Encodes and decodes container payloads with the manager's active key.
#[derive(Clone, Copy)]
pub struct ContainerCodec<'a> {
    keys: &'a KeyManager,
}

impl<'a> ContainerCodec<'a> {
    pub fn new(keys: &'a KeyManager) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &'a KeyManager {
        self.keys
    }

    /// Transforms `payload` into container bytes.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let key = self.keys.active_key()?;
        Ok(cipher::transform(payload, &key))
    }

    /// Reads `path` and transforms its bytes into container bytes.
    pub fn encode_file(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.keys.active_key()?;
        let mut data = fs::read(path)?;
        cipher::transform_in_place(&mut data, &key);
        Ok(data)
    }

    /// Reads the container at `path` and returns its plaintext as a
    /// seekable in-memory stream.
    pub fn decode(&self, path: &Path) -> Result<Cursor<Vec<u8>>> {
        let key = self.keys.active_key()?;
        let mut data = fs::read(path)?;
        trace!("decoding {} bytes from {}", data.len(), path.display());
        cipher::transform_in_place(&mut data, &key);
        Ok(Cursor::new(data))
    }

    /// True iff a key is available and `path` is a container path.
    pub fn should_decode(&self, path: &Path) -> bool {
        is_container_path(path) && !self.keys.is_key_missing()
    }
}
