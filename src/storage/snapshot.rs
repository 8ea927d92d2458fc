//! Atomic snapshot writer and reader.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info};

use super::StorageError;
use crate::models::RankingSnapshot;

/// Writes the ranking snapshot to its canonical path.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file the snapshot is staged in before the rename.
    pub fn temp_path(&self) -> Result<PathBuf, StorageError> {
        self.sibling(".tmp")
    }

    fn sibling(&self, suffix: &str) -> Result<PathBuf, StorageError> {
        let name = self
            .path
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(self.path.display().to_string()))?;
        let mut sibling = name.to_os_string();
        sibling.push(suffix);
        Ok(self.path.with_file_name(sibling))
    }

    /// Replace the snapshot on disk.
    ///
    /// On error the previous snapshot is left in place and no temp file
    /// remains.
    pub fn write(&self, snapshot: &RankingSnapshot) -> Result<(), StorageError> {
        let payload = to_pretty_json(snapshot)?;
        let tmp = self.temp_path()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let result = stage(&tmp, &payload).and_then(|()| self.swap_in(&tmp));
        if let Err(e) = &result {
            debug!("Discarding {:?} after failed write: {}", tmp, e);
            let _ = fs::remove_file(&tmp);
        }
        result?;

        info!(
            "Wrote snapshot with {} squads to {:?}",
            snapshot.squad_count(),
            self.path
        );
        Ok(())
    }

    /// Rename the staged file over the target.
    fn swap_in(&self, tmp: &Path) -> Result<(), StorageError> {
        let err = match fs::rename(tmp, &self.path) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if !self.path.is_file() {
            return Err(StorageError::io(&self.path, err));
        }

        // Some platforms refuse to rename over an existing file.
        debug!("Rename over {:?} failed ({}), moving it aside", self.path, err);
        let backup = self.sibling(".bak")?;
        fs::rename(&self.path, &backup).map_err(|e| StorageError::io(&self.path, e))?;
        if let Err(e) = fs::rename(tmp, &self.path) {
            let _ = fs::rename(&backup, &self.path);
            return Err(StorageError::io(&self.path, e));
        }
        let _ = fs::remove_file(&backup);
        Ok(())
    }
}

fn stage(tmp: &Path, payload: &[u8]) -> Result<(), StorageError> {
    let mut file = File::create(tmp).map_err(|e| StorageError::io(tmp, e))?;
    file.write_all(payload)
        .map_err(|e| StorageError::io(tmp, e))?;
    file.sync_all().map_err(|e| StorageError::io(tmp, e))
}

/// Load a snapshot, or `None` if the file does not exist.
pub fn read_snapshot(path: &Path) -> Result<Option<RankingSnapshot>, StorageError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// JSON with four-space indentation.
fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}
