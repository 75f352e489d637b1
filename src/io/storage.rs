//! Object-store collaborator.
//!
//! Artifact paths are assembled by the coordinator as
//! `{bucket_prefix}/{run_id}/{role}/{filename}`; the store treats them as
//! opaque. Paths are write-once — re-uploading an existing path is a
//! programmer error unless the store was built with overwrite enabled.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::PipelineError;

/// Object-store contract required by the core.
pub trait ObjectStore: Send + Sync {
    /// Upload a local file; returns the storage URI.
    fn put_file(&self, local: &Path, logical: &str) -> Result<String, PipelineError>;

    /// Upload bytes directly; returns the storage URI.
    fn put_bytes(&self, bytes: &[u8], logical: &str) -> Result<String, PipelineError>;

    /// Download to a local path for reading.
    fn get(&self, logical: &str) -> Result<PathBuf, PipelineError>;

    fn exists(&self, logical: &str) -> Result<bool, PipelineError>;

    /// Read an object's bytes.
    fn read(&self, logical: &str) -> Result<Vec<u8>, PipelineError>;
}

/// In-memory store for tests and single-process runs.
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    allow_overwrite: bool,
    spill_dir: PathBuf,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            allow_overwrite: false,
            spill_dir: std::env::temp_dir().join(format!("bahi-store-{}", uuid::Uuid::new_v4())),
        }
    }

    /// Permit re-uploads under an existing path (`overwrite=true` runs).
    pub fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    /// Paths currently stored, in order.
    pub fn paths(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, PipelineError> {
        self.objects
            .lock()
            .map_err(|_| PipelineError::StorageUnavailable("object store poisoned".into()))
    }
}

impl ObjectStore for MemoryStore {
    fn put_file(&self, local: &Path, logical: &str) -> Result<String, PipelineError> {
        let bytes = std::fs::read(local).map_err(|e| {
            PipelineError::StorageUnavailable(format!(
                "cannot read {}: {e}",
                local.display()
            ))
        })?;
        self.put_bytes(&bytes, logical)
    }

    fn put_bytes(&self, bytes: &[u8], logical: &str) -> Result<String, PipelineError> {
        let mut objects = self.lock()?;
        if !self.allow_overwrite && objects.contains_key(logical) {
            return Err(PipelineError::StorageUnavailable(format!(
                "path already written: {logical}"
            )));
        }
        objects.insert(logical.to_string(), bytes.to_vec());
        Ok(format!("mem://{logical}"))
    }

    fn get(&self, logical: &str) -> Result<PathBuf, PipelineError> {
        let bytes = self.read(logical)?;
        let target = self.spill_dir.join(logical);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::StorageUnavailable(format!("cannot spill: {e}"))
            })?;
        }
        std::fs::write(&target, bytes)
            .map_err(|e| PipelineError::StorageUnavailable(format!("cannot spill: {e}")))?;
        Ok(target)
    }

    fn exists(&self, logical: &str) -> Result<bool, PipelineError> {
        Ok(self.lock()?.contains_key(logical))
    }

    fn read(&self, logical: &str) -> Result<Vec<u8>, PipelineError> {
        self.lock()?
            .get(logical)
            .cloned()
            .ok_or_else(|| PipelineError::StorageUnavailable(format!("no object at {logical}")))
    }
}

/// Directory-backed store: logical paths become files under a root.
pub struct LocalDirStore {
    root: PathBuf,
    allow_overwrite: bool,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allow_overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    fn target(&self, logical: &str) -> PathBuf {
        self.root.join(logical)
    }
}

impl ObjectStore for LocalDirStore {
    fn put_file(&self, local: &Path, logical: &str) -> Result<String, PipelineError> {
        let bytes = std::fs::read(local).map_err(|e| {
            PipelineError::StorageUnavailable(format!(
                "cannot read {}: {e}",
                local.display()
            ))
        })?;
        self.put_bytes(&bytes, logical)
    }

    fn put_bytes(&self, bytes: &[u8], logical: &str) -> Result<String, PipelineError> {
        let target = self.target(logical);
        if !self.allow_overwrite && target.exists() {
            return Err(PipelineError::StorageUnavailable(format!(
                "path already written: {logical}"
            )));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::StorageUnavailable(format!("cannot create dir: {e}"))
            })?;
        }
        std::fs::write(&target, bytes).map_err(|e| {
            PipelineError::StorageUnavailable(format!("cannot write {logical}: {e}"))
        })?;
        Ok(format!("file://{}", target.display()))
    }

    fn get(&self, logical: &str) -> Result<PathBuf, PipelineError> {
        let target = self.target(logical);
        if target.exists() {
            Ok(target)
        } else {
            Err(PipelineError::StorageUnavailable(format!(
                "no object at {logical}"
            )))
        }
    }

    fn exists(&self, logical: &str) -> Result<bool, PipelineError> {
        Ok(self.target(logical).exists())
    }

    fn read(&self, logical: &str) -> Result<Vec<u8>, PipelineError> {
        std::fs::read(self.target(logical)).map_err(|e| {
            PipelineError::StorageUnavailable(format!("cannot read {logical}: {e}"))
        })
    }
}
