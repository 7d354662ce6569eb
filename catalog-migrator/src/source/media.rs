use std::sync::Arc;

use anyhow::Context;

use super::SourceError;
use crate::primitives::filesystem::FileSystem;

/// Which legacy picture store a media reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum MediaKind {
    /// A category thumbnail (`OXTHUMB`)
    CategoryThumbnail,
    /// One of an article's picture columns (`OXPIC1` to `OXPIC12`)
    ProductPicture {
        /// 1-based picture column
        slot: u32,
    },
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CategoryThumbnail => write!(f, "category_thumbnail"),
            Self::ProductPicture { slot } => write!(f, "product_picture_{slot}"),
        }
    }
}

/// Read access to the legacy shop's picture files, implemented by the host.
#[uniffi::export(with_foreign)]
pub trait MediaSource: Send + Sync {
    /// Returns the raw bytes of the picture `reference` names.
    ///
    /// # Errors
    /// - `SourceError::SourceUnavailable` if the picture cannot be read
    fn read_media(&self, kind: MediaKind, reference: String) -> Result<Vec<u8>, SourceError>;
}

/// Reads pictures from a copy of the legacy `out/pictures/master` directory.
///
/// Thumbnails live under `category/thumb/`, article pictures under `product/<slot>/`.
pub struct FileSystemMediaSource {
    filesystem: Arc<dyn FileSystem>,
    base_directory: String,
}

impl FileSystemMediaSource {
    /// Creates a source resolving references below `base_directory`.
    #[must_use]
    pub fn new(filesystem: Arc<dyn FileSystem>, base_directory: impl Into<String>) -> Self {
        Self {
            filesystem,
            base_directory: base_directory.into().trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, kind: MediaKind, reference: &str) -> String {
        let file = reference.trim().trim_start_matches('/');
        let directory = match kind {
            MediaKind::CategoryThumbnail => "category/thumb".to_string(),
            MediaKind::ProductPicture { slot } => format!("product/{slot}"),
        };
        if self.base_directory.is_empty() {
            format!("{directory}/{file}")
        } else {
            format!("{}/{directory}/{file}", self.base_directory)
        }
    }

    fn read(&self, kind: MediaKind, reference: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(kind, reference);
        self.filesystem
            .read_file(path.clone())
            .with_context(|| format!("reading {kind} {path}"))
    }
}

impl MediaSource for FileSystemMediaSource {
    fn read_media(&self, kind: MediaKind, reference: String) -> Result<Vec<u8>, SourceError> {
        crate::anyhow_to_generic!(self.read(kind, &reference))
            .map_err(|message| SourceError::SourceUnavailable { message })
    }
}

/// Returns a media source reading the legacy picture directory through `filesystem`.
#[uniffi::export]
#[must_use]
pub fn filesystem_media_source(
    filesystem: Arc<dyn FileSystem>,
    base_directory: String,
) -> Arc<dyn MediaSource> {
    Arc::new(FileSystemMediaSource::new(filesystem, base_directory))
}
