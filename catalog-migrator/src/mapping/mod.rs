//! The durable source-ID to target-ID mapping.
//!
//! The mapping file is the single source of truth for "already migrated": a record whose
//! legacy id is a key here is never created again. The file is a pretty printed JSON
//! object and is always rewritten wholesale through a temporary file and a rename, so an
//! interrupted run leaves either the previous or the new checkpoint behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::primitives::filesystem::{parent_directory, FileSystem, FileSystemError};
use crate::source::CategoryRecord;

/// Legacy id to target id, ordered by legacy id so checkpoints diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping(BTreeMap<String, String>);

impl Mapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Target id for a legacy id.
    #[must_use]
    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.0.get(source_id).map(String::as_str)
    }

    /// Whether a legacy id has been migrated.
    #[must_use]
    pub fn contains(&self, source_id: &str) -> bool {
        self.0.contains_key(source_id)
    }

    /// Records a migrated entity, returning the target id it replaces if any.
    pub fn insert(
        &mut self,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Option<String> {
        self.0.insert(source_id.into(), target_id.into())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mapping has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(legacy id, target id)` pairs in legacy id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(source_id, target_id)| (source_id.into(), target_id.into()))
                .collect(),
        )
    }
}

/// Errors raised while loading or persisting a mapping.
#[crate::migrator_error]
pub enum MappingError {
    /// The stored mapping exists but cannot be understood; the run must not continue
    #[error("mapping file {path} is corrupt: {message}")]
    CorruptState {
        /// File that failed to parse
        path: String,
        /// Parser message
        message: String,
    },
    /// The mapping could not be read or written
    #[error("mapping file {path} could not be accessed: {source}")]
    Storage {
        /// File being accessed
        path: String,
        /// Underlying filesystem failure
        source: FileSystemError,
    },
}

/// Loads and persists one mapping file.
pub struct MappingStore {
    filesystem: Arc<dyn FileSystem>,
    path: String,
    orphan_path: Option<String>,
}

impl MappingStore {
    /// Creates a store for the mapping at `path`.
    #[must_use]
    pub fn new(filesystem: Arc<dyn FileSystem>, path: impl Into<String>) -> Self {
        Self {
            filesystem,
            path: path.into(),
            orphan_path: None,
        }
    }

    /// Sets where `record_orphans` writes its diagnostic dump.
    #[must_use]
    pub fn with_orphan_report(mut self, orphan_path: impl Into<String>) -> Self {
        self.orphan_path = Some(orphan_path.into());
        self
    }

    /// Path of the mapping file.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads the stored mapping, or an empty one if nothing was stored yet.
    ///
    /// # Errors
    /// - `MappingError::CorruptState` if the file exists but is not a JSON object of strings
    /// - `MappingError::Storage` if the file cannot be read
    pub fn load(&self) -> Result<Mapping, MappingError> {
        let exists = self
            .filesystem
            .file_exists(self.path.clone())
            .map_err(|source| self.storage_error(source))?;
        if !exists {
            crate::info!("mapping.load path={} entries=0 state=new", self.path);
            return Ok(Mapping::new());
        }

        let bytes = match self.filesystem.read_file(self.path.clone()) {
            Ok(bytes) => bytes,
            Err(FileSystemError::FileDoesNotExist) => return Ok(Mapping::new()),
            Err(source) => return Err(self.storage_error(source)),
        };

        let mapping: Mapping =
            serde_json::from_slice(&bytes).map_err(|e| MappingError::CorruptState {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        crate::info!(
            "mapping.load path={} entries={} state=resumed",
            self.path,
            mapping.len()
        );
        Ok(mapping)
    }

    /// Persists the whole mapping atomically, creating the parent directory if needed.
    ///
    /// # Errors
    /// - `MappingError::Storage` if any filesystem step fails; the previous file is left intact
    pub fn save(&self, mapping: &Mapping) -> Result<(), MappingError> {
        let bytes = serde_json::to_vec_pretty(mapping).map_err(|e| MappingError::Generic {
            message: format!("encoding mapping: {e}"),
        })?;
        self.write_atomically(&self.path, bytes)
            .map_err(|source| self.storage_error(source))?;

        crate::debug!(
            "mapping.saved path={} entries={}",
            self.path,
            mapping.len()
        );
        Ok(())
    }

    /// Writes the orphan diagnostic dump.
    ///
    /// Nothing is written when `orphans` is empty; a dump left over from an earlier run is
    /// removed instead. Failures are logged and reported as `None`, never raised.
    pub fn record_orphans(&self, orphans: &[CategoryRecord]) -> Option<String> {
        let orphan_path = self.orphan_path.as_ref()?;

        if orphans.is_empty() {
            if matches!(self.filesystem.file_exists(orphan_path.clone()), Ok(true)) {
                if let Err(e) = self.filesystem.delete_file(orphan_path.clone()) {
                    crate::warn!("orphans.cleanup_failed path={orphan_path} error={e}");
                }
            }
            return None;
        }

        let bytes = match serde_json::to_vec_pretty(orphans) {
            Ok(bytes) => bytes,
            Err(e) => {
                crate::warn!("orphans.encode_failed error={e}");
                return None;
            }
        };

        match self.write_atomically(orphan_path, bytes) {
            Ok(()) => {
                crate::warn!(
                    "orphans.recorded path={} count={}",
                    orphan_path,
                    orphans.len()
                );
                Some(orphan_path.clone())
            }
            Err(e) => {
                crate::error!("orphans.write_failed path={orphan_path} error={e}");
                None
            }
        }
    }

    fn write_atomically(&self, path: &str, bytes: Vec<u8>) -> Result<(), FileSystemError> {
        if let Some(directory) = parent_directory(path) {
            self.filesystem.create_directory(directory)?;
        }
        let temp_path = format!("{path}.tmp");
        self.filesystem.write_file(temp_path.clone(), bytes)?;
        self.filesystem.rename_file(temp_path, path.to_string())
    }

    fn storage_error(&self, source: FileSystemError) -> MappingError {
        MappingError::Storage {
            path: self.path.clone(),
            source,
        }
    }
}
