use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during filesystem operations
#[derive(Debug, Error, uniffi::Error)]
pub enum FileSystemError {
    /// Tried to read or move a file that doesn't exist
    #[error("requested file does not exist")]
    FileDoesNotExist,
    /// Something went wrong with the filesystem operation
    #[error("IO failure: {0}")]
    IoFailure(String),
    /// Unexpected UniFFI callback error
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

/// Converts unexpected UniFFI callback errors to `FileSystemError`.
///
/// The error reason from the foreign implementation is preserved for debugging purposes.
impl From<uniffi::UnexpectedUniFFICallbackError> for FileSystemError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<std::io::Error> for FileSystemError {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::FileDoesNotExist
        } else {
            Self::IoFailure(error.to_string())
        }
    }
}

/// Durable storage used for the mapping checkpoint, orphan reports and JSON exports.
///
/// Hosts can implement this to keep migration state somewhere other than the local disk;
/// `LocalFileSystem` covers the common case.
#[uniffi::export(with_foreign)]
pub trait FileSystem: Send + Sync {
    /// Check if a file exists at the given path
    ///
    /// # Errors
    /// - `FileSystemError` if the operation fails
    fn file_exists(&self, file_path: String) -> Result<bool, FileSystemError>;

    /// Read file contents
    ///
    /// # Errors
    /// - `FileSystemError::FileDoesNotExist` if the file doesn't exist
    /// - `FileSystemError::IoFailure` if the file cannot be read
    fn read_file(&self, file_path: String) -> Result<Vec<u8>, FileSystemError>;

    /// Write file contents, replacing any previous content
    ///
    /// # Errors
    /// - `FileSystemError::IoFailure` if the file cannot be written
    fn write_file(
        &self,
        file_path: String,
        file_buffer: Vec<u8>,
    ) -> Result<(), FileSystemError>;

    /// Atomically move `from_path` over `to_path`, replacing the destination if present
    ///
    /// # Errors
    /// - `FileSystemError::FileDoesNotExist` if `from_path` does not exist
    /// - `FileSystemError::IoFailure` if the rename fails
    fn rename_file(
        &self,
        from_path: String,
        to_path: String,
    ) -> Result<(), FileSystemError>;

    /// Create a directory and all missing parents. Succeeds if it already exists.
    ///
    /// # Errors
    /// - `FileSystemError::IoFailure` if the directory cannot be created
    fn create_directory(&self, directory_path: String) -> Result<(), FileSystemError>;

    /// Delete a file
    ///
    /// # Errors
    /// - `FileSystemError::FileDoesNotExist` if the file does not exist
    /// - `FileSystemError::IoFailure` if the file cannot be deleted
    fn delete_file(&self, file_path: String) -> Result<(), FileSystemError>;
}

/// `FileSystem` backed by `std::fs`.
///
/// Relative paths are resolved against `base_directory` when one is set, otherwise
/// against the process working directory.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
    base_directory: Option<PathBuf>,
}

impl LocalFileSystem {
    /// Creates a filesystem rooted at `base_directory`.
    #[must_use]
    pub fn new(base_directory: Option<PathBuf>) -> Self {
        Self { base_directory }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.base_directory {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn file_exists(&self, file_path: String) -> Result<bool, FileSystemError> {
        Ok(self.resolve(&file_path).is_file())
    }

    fn read_file(&self, file_path: String) -> Result<Vec<u8>, FileSystemError> {
        Ok(std::fs::read(self.resolve(&file_path))?)
    }

    fn write_file(
        &self,
        file_path: String,
        file_buffer: Vec<u8>,
    ) -> Result<(), FileSystemError> {
        std::fs::write(self.resolve(&file_path), file_buffer)
            .map_err(|e| FileSystemError::IoFailure(format!("{file_path}: {e}")))
    }

    fn rename_file(
        &self,
        from_path: String,
        to_path: String,
    ) -> Result<(), FileSystemError> {
        Ok(std::fs::rename(
            self.resolve(&from_path),
            self.resolve(&to_path),
        )?)
    }

    fn create_directory(&self, directory_path: String) -> Result<(), FileSystemError> {
        std::fs::create_dir_all(self.resolve(&directory_path))
            .map_err(|e| FileSystemError::IoFailure(format!("{directory_path}: {e}")))
    }

    fn delete_file(&self, file_path: String) -> Result<(), FileSystemError> {
        Ok(std::fs::remove_file(self.resolve(&file_path))?)
    }
}

/// Returns the native `std::fs` backed filesystem for hosts that don't bring their own.
///
/// # Arguments
/// * `base_directory` - Directory that relative paths are resolved against
#[uniffi::export]
#[must_use]
pub fn local_filesystem(base_directory: Option<String>) -> Arc<dyn FileSystem> {
    Arc::new(LocalFileSystem::new(base_directory.map(PathBuf::from)))
}

/// Returns the parent directory of `path`, if it has a non-empty one.
#[must_use]
pub fn parent_directory(path: &str) -> Option<String> {
    Path::new(path)
        .parent()
        .map(|parent| parent.to_string_lossy().into_owned())
        .filter(|parent| !parent.is_empty())
}

#[cfg(any(test, feature = "tooling_tests"))]
pub use in_memory::InMemoryFileSystem;

#[cfg(any(test, feature = "tooling_tests"))]
mod in_memory {
    use super::{FileSystem, FileSystemError};
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    /// **This is intended exclusively for testing.**
    ///
    /// Directories are tracked separately so tests can assert that they were created.
    #[derive(Debug, Default)]
    pub struct InMemoryFileSystem {
        files: Mutex<HashMap<String, Vec<u8>>>,
        directories: Mutex<BTreeSet<String>>,
        fail_writes: Mutex<bool>,
    }

    #[allow(clippy::missing_panics_doc)]
    impl InMemoryFileSystem {
        /// Creates a new empty in-memory filesystem
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a new in-memory filesystem with some initial files
        #[must_use]
        pub fn with_files(initial_files: &[(&str, &str)]) -> Self {
            let fs = Self::new();
            for (path, content) in initial_files {
                fs.files
                    .lock()
                    .unwrap()
                    .insert((*path).to_string(), content.as_bytes().to_vec());
            }
            fs
        }

        /// Makes every subsequent `write_file` fail with an IO error
        pub fn fail_writes(&self, fail: bool) {
            *self.fail_writes.lock().unwrap() = fail;
        }

        /// Returns the content of a file as UTF-8, if present
        #[must_use]
        pub fn read_to_string(&self, path: &str) -> Option<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        }

        /// Checks if the filesystem contains a specific file
        #[must_use]
        pub fn contains_file(&self, path: &str) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        /// Checks if a directory was created
        #[must_use]
        pub fn contains_directory(&self, path: &str) -> bool {
            self.directories.lock().unwrap().contains(path)
        }

        /// Returns all file paths currently in the filesystem
        #[must_use]
        pub fn all_file_paths(&self) -> Vec<String> {
            let mut paths: Vec<String> =
                self.files.lock().unwrap().keys().cloned().collect();
            paths.sort();
            paths
        }
    }

    impl FileSystem for InMemoryFileSystem {
        fn file_exists(&self, file_path: String) -> Result<bool, FileSystemError> {
            Ok(self.files.lock().unwrap().contains_key(&file_path))
        }

        fn read_file(&self, file_path: String) -> Result<Vec<u8>, FileSystemError> {
            self.files
                .lock()
                .unwrap()
                .get(&file_path)
                .cloned()
                .ok_or(FileSystemError::FileDoesNotExist)
        }

        fn write_file(
            &self,
            file_path: String,
            file_buffer: Vec<u8>,
        ) -> Result<(), FileSystemError> {
            if *self.fail_writes.lock().unwrap() {
                return Err(FileSystemError::IoFailure(format!(
                    "{file_path}: disk full"
                )));
            }
            self.files.lock().unwrap().insert(file_path, file_buffer);
            Ok(())
        }

        fn rename_file(
            &self,
            from_path: String,
            to_path: String,
        ) -> Result<(), FileSystemError> {
            let mut files = self.files.lock().unwrap();
            let content = files
                .remove(&from_path)
                .ok_or(FileSystemError::FileDoesNotExist)?;
            files.insert(to_path, content);
            Ok(())
        }

        fn create_directory(
            &self,
            directory_path: String,
        ) -> Result<(), FileSystemError> {
            self.directories.lock().unwrap().insert(directory_path);
            Ok(())
        }

        fn delete_file(&self, file_path: String) -> Result<(), FileSystemError> {
            self.files
                .lock()
                .unwrap()
                .remove(&file_path)
                .map(|_| ())
                .ok_or(FileSystemError::FileDoesNotExist)
        }
    }
}
