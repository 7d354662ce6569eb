//! Legacy catalog sources.
//!
//! The legacy shop database is owned by the host: it implements [`LegacyCategorySource`]
//! (and optionally [`LegacyProductSource`] and [`MediaSource`]) and hands back raw rows.
//! Everything past this boundary works with the typed [`CategoryRecord`] and
//! [`ProductRecord`].

mod json_export;
mod media;
mod product;
mod record;

use std::collections::HashSet;
use std::sync::Arc;

pub use json_export::{JsonExportSource, StaticCategorySource};
pub use media::{FileSystemMediaSource, MediaKind, MediaSource};
pub use product::{
    LegacyProductRow, LegacyProductSource, ProductPicture, ProductRecord, SourceProductReader,
    StaticProductSource,
};
pub use record::{CategoryRecord, LegacyCategoryRow, UNNAMED_CATEGORY};

use crate::primitives::config::MigrationConfig;

/// Errors raised by legacy sources.
#[crate::migrator_error]
pub enum SourceError {
    /// The legacy store could not be reached or the read failed
    #[error("legacy source unavailable: {message}")]
    SourceUnavailable {
        /// What went wrong
        message: String,
    },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for SourceError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::SourceUnavailable {
            message: error.reason,
        }
    }
}

/// Read-only access to the legacy category table, implemented by the host.
#[uniffi::export(with_foreign)]
pub trait LegacyCategorySource: Send + Sync {
    /// Returns every category row in a stable order (the legacy sort order).
    ///
    /// # Errors
    /// - `SourceError::SourceUnavailable` if the store cannot be reached
    fn fetch_category_rows(&self) -> Result<Vec<LegacyCategoryRow>, SourceError>;
}

/// Turns the legacy category rows into a snapshot of typed records.
pub struct SourceCategoryReader {
    source: Arc<dyn LegacyCategorySource>,
    root_sentinels: Vec<String>,
    limit: Option<usize>,
}

impl SourceCategoryReader {
    /// Creates a reader that normalises rows according to `config`.
    #[must_use]
    pub fn new(source: Arc<dyn LegacyCategorySource>, config: &MigrationConfig) -> Self {
        Self {
            source,
            root_sentinels: config.root_sentinels.clone(),
            limit: config.limit.map(|limit| limit as usize),
        }
    }

    /// Reads the whole category table once.
    ///
    /// Rows without an id are dropped, and so are repeated ids (the first one wins). An
    /// empty table is not an error.
    ///
    /// # Errors
    /// - `SourceError::SourceUnavailable` if the underlying store fails
    pub fn fetch_all(&self) -> Result<Vec<CategoryRecord>, SourceError> {
        let rows = self.source.fetch_category_rows()?;
        let row_count = rows.len();

        let mut seen = HashSet::with_capacity(row_count);
        let mut records = Vec::with_capacity(row_count);
        for row in rows {
            let Some(record) = CategoryRecord::from_row(row, &self.root_sentinels) else {
                crate::warn!("category_source.row_dropped reason=missing_id");
                continue;
            };
            if !seen.insert(record.id.clone()) {
                crate::warn!(
                    "category_source.row_dropped reason=duplicate_id id={}",
                    record.id
                );
                continue;
            }
            records.push(record);
        }

        if let Some(limit) = self.limit {
            records.truncate(limit);
        }

        if records.is_empty() {
            crate::warn!("category_source.empty rows={row_count}");
        } else {
            crate::info!(
                "category_source.read rows={} records={}",
                row_count,
                records.len()
            );
        }

        Ok(records)
    }
}
