//! World ↔ JSON save file.
//!
//! The file is a save file: loaded on boot, rewritten whole after every
//! mutation. Never queried at runtime; World is the runtime truth.
//!
//! Shape: `{ "tasks": [Task, ...] }`.

use crate::world::{Task, World};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(feature = "profile")]
use std::time::Instant;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    tasks: &'a [Task],
}

/// Thin handle to the tasks file.
#[derive(Debug, Clone)]
pub struct SaveFile {
    path: PathBuf,
}

impl SaveFile {
    /// Remember the path, creating the parent directory if needed.
    /// The file itself is created by the first flush.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SaveFileError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(SaveFile { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the entire World from disk. Called once at boot.
    /// A missing or blank file is an empty world.
    pub fn load_world(&self) -> Result<World, SaveFileError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(World::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(World::new());
        }

        let doc: StoreDocument = serde_json::from_str(&raw).map_err(SaveFileError::Decode)?;
        Ok(World::with_tasks(doc.tasks))
    }

    /// Write the whole world. The new content goes to a temp file in the
    /// same directory which then replaces the old file, so a crash mid-write
    /// leaves the previous version intact.
    pub fn flush(&self, world: &World) -> Result<(), SaveFileError> {
        #[cfg(feature = "profile")]
        let total_start = Instant::now();

        let bytes = serde_json::to_vec_pretty(&StoreDocumentRef { tasks: &world.tasks })
            .map_err(SaveFileError::Encode)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| SaveFileError::Io(e.error))?;

        #[cfg(feature = "profile")]
        tracing::debug!(
            bytes = bytes.len(),
            tasks = world.tasks.len(),
            total_us = total_start.elapsed().as_micros() as u64,
            "flush replaced save file"
        );
        Ok(())
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SaveFileError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode: {0}")]
    Decode(serde_json::Error),
    #[error("encode: {0}")]
    Encode(serde_json::Error),
}

// ── Tests ──────────────────────────────────────────────────────
