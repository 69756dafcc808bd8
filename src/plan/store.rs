//! Manifest persistence.
//!
//! The plan is stored as pretty-printed JSON next to the destination file
//! at `<destFile>.turbodownload`. Saves are atomic (temp file + rename)
//! and serialized across processes with an advisory lock on an adjacent
//! `.lock` file. A manifest that is missing, unparsable, or describing a
//! different resource is treated as absent.

use super::DownloadPlan;
use crate::probe::ResourceInfo;
use fd_lock::RwLock;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension appended to the destination file name.
const MANIFEST_SUFFIX: &str = ".turbodownload";

/// Errors raised while persisting the plan. Non-fatal for a running
/// transfer; a missed save at most costs re-downloading bytes on resume.
#[derive(Debug, thiserror::Error)]
pub enum PlanStoreError {
    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(String),

    /// JSON encoding failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Advisory lock failure
    #[error("lock error: {0}")]
    Lock(String),
}

/// Loads, saves, and deletes the on-disk manifest for one destination.
#[derive(Debug, Clone)]
pub struct PlanStore {
    manifest_path: PathBuf,
    lock_path: PathBuf,
}

impl PlanStore {
    /// Build the store for a destination file path.
    pub fn for_destination(dest: &Path) -> Self {
        let mut name = dest
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("download"));
        name.push(MANIFEST_SUFFIX);
        let manifest_path = dest.with_file_name(name);
        let lock_path = manifest_path.with_extension("lock");
        Self {
            manifest_path,
            lock_path,
        }
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Load the manifest if it exists, parses, and matches the probe.
    ///
    /// Any failure short of a clean match yields `None`; a corrupt or
    /// stale manifest never fails the download.
    pub fn load(&self, info: &ResourceInfo) -> Option<DownloadPlan> {
        if !self.manifest_path.exists() {
            debug!(path = %self.manifest_path.display(), "no manifest on disk");
            return None;
        }

        let contents = match self.locked_read() {
            Ok(contents) => contents,
            Err(err) => {
                warn!(error = %err, "failed to read manifest, starting fresh");
                return None;
            }
        };

        let plan: DownloadPlan = match serde_json::from_str(&contents) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "manifest is corrupt, starting fresh");
                return None;
            }
        };

        if !plan.schema_matches() {
            warn!("manifest schema version mismatch, starting fresh");
            return None;
        }

        if !plan.matches(info) {
            warn!(
                manifest_total = plan.total_size,
                probe_total = info.total_size,
                manifest_ranges = plan.accept_ranges,
                probe_ranges = info.accept_ranges,
                "manifest does not match probed resource, starting fresh"
            );
            return None;
        }

        debug!(
            chunks = plan.chunks.len(),
            downloaded = plan.total_downloaded(),
            "resuming from manifest"
        );
        Some(plan)
    }

    /// Atomically replace the manifest with the serialized plan.
    pub fn save(&self, plan: &DownloadPlan) -> Result<(), PlanStoreError> {
        let json = serde_json::to_string_pretty(plan)
            .map_err(|e| PlanStoreError::Serialization(e.to_string()))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| PlanStoreError::Lock(e.to_string()))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| PlanStoreError::Lock(e.to_string()))?;

        let parent = self
            .manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| PlanStoreError::Io(e.to_string()))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| PlanStoreError::Io(e.to_string()))?;
        temp.flush().map_err(|e| PlanStoreError::Io(e.to_string()))?;
        temp.persist(&self.manifest_path)
            .map_err(|e| PlanStoreError::Io(e.to_string()))?;

        Ok(())
    }

    /// Remove the manifest and its lock file. Idempotent.
    pub fn delete(&self) {
        for path in [&self.manifest_path, &self.lock_path] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed manifest file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove manifest file"),
            }
        }
    }

    fn locked_read(&self) -> Result<String, PlanStoreError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| PlanStoreError::Lock(e.to_string()))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| PlanStoreError::Lock(e.to_string()))?;

        std::fs::read_to_string(&self.manifest_path).map_err(|e| PlanStoreError::Io(e.to_string()))
    }
}
