//! Small JSON state files carried between runs.
//!
//! There is no locking: two overlapping runs can still overwrite each other's
//! state. Writes go through a temporary file so a crash never leaves a
//! truncated file behind.
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid state file {path}: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub fn load_state<T: DeserializeOwned>(path: &Path) -> Result<T, StateError> {
    let contents = fs::read_to_string(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| StateError::Format {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_state<T: Serialize>(path: &Path, state: &T) -> Result<(), StateError> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let body = serde_json::to_vec(state).map_err(|source| StateError::Format {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&body).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!(path = ?path, "State saved.");
    Ok(())
}
