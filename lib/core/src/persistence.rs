//! Versioned binary blobs for encoder and index state.
//!
//! Every blob is a bincode-encoded envelope `{ magic, version, payload }`
//! written through a temporary file and renamed into place, so a reader
//! never observes a half-written blob.

use crate::{Error, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Magic of an encoder calibration blob
pub const ENCODER_MAGIC: [u8; 4] = *b"PMEN";

/// Magic of an index state blob
pub const INDEX_MAGIC: [u8; 4] = *b"PMIX";

/// Current blob format version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    magic: [u8; 4],
    version: u32,
    payload: T,
}

/// Atomically write `payload` to `path`, creating parent directories
pub fn write_blob<T: Serialize>(path: &Path, magic: [u8; 4], payload: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let data = bincode::serialize(&Envelope {
        magic,
        version: FORMAT_VERSION,
        payload,
    })?;

    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(&data))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => Error::Io(e),
        })?;

    tracing::debug!(path = %path.display(), bytes = data.len(), "blob written");
    Ok(())
}

/// Read a blob written by [`write_blob`].
///
/// Returns `Ok(None)` when nothing was ever saved at `path`.
pub fn read_blob<T: DeserializeOwned>(path: &Path, magic: [u8; 4]) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let data = std::fs::read(path)?;

    let header: Header = bincode::deserialize(&data)
        .map_err(|e| Error::Persistence(format!("{}: unreadable header: {}", path.display(), e)))?;
    if header.magic != magic {
        return Err(Error::Persistence(format!(
            "{}: unexpected blob type {:?}",
            path.display(),
            String::from_utf8_lossy(&header.magic)
        )));
    }
    if header.version != FORMAT_VERSION {
        return Err(Error::Persistence(format!(
            "{}: unsupported format version {} (expected {})",
            path.display(),
            header.version,
            FORMAT_VERSION
        )));
    }

    let envelope: Envelope<T> = bincode::deserialize(&data)
        .map_err(|e| Error::Persistence(format!("{}: corrupt payload: {}", path.display(), e)))?;
    Ok(Some(envelope.payload))
}
