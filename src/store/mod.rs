//! JSON snapshot file backing the CLI between invocations.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::ledger::{LedgerSnapshot, RewardLedger, SnapshotError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("state file {path} is not a ledger snapshot: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("state file {path} failed integrity check: {source}")]
    Integrity {
        path: PathBuf,
        source: SnapshotError,
    },
}

/// Loads the ledger at `path`; a missing file is an empty pool.
pub fn load_ledger(path: &Path) -> Result<RewardLedger, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RewardLedger::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let snapshot: LedgerSnapshot =
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    RewardLedger::from_snapshot(snapshot).map_err(|source| StoreError::Integrity {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a snapshot of `ledger` to a sibling temp file, then renames it over `path`.
pub fn save_ledger(path: &Path, ledger: &RewardLedger) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_vec_pretty(&ledger.snapshot()).map_err(|source| {
        StoreError::Decode {
            path: path.to_path_buf(),
            source,
        }
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}
