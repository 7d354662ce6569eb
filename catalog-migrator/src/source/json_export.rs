use std::sync::Arc;

use anyhow::Context;

use super::{LegacyCategoryRow, LegacyCategorySource, SourceError};
use crate::primitives::filesystem::FileSystem;

/// A category source over rows that are already in memory.
///
/// Handy for hosts that query the legacy database themselves, and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCategorySource {
    rows: Vec<LegacyCategoryRow>,
}

impl StaticCategorySource {
    /// Wraps `rows`, which are handed out in the given order.
    #[must_use]
    pub const fn new(rows: Vec<LegacyCategoryRow>) -> Self {
        Self { rows }
    }
}

impl LegacyCategorySource for StaticCategorySource {
    fn fetch_category_rows(&self) -> Result<Vec<LegacyCategoryRow>, SourceError> {
        Ok(self.rows.clone())
    }
}

/// A category source reading a JSON export of the legacy category table.
///
/// The export is a JSON array of row objects. Both the camelCase keys of the preview
/// export (`id`, `parentId`, `name`, ...) and the raw upper case column names (`OXID`,
/// `OXPARENTID`, `OXTITLE`, ...) are understood.
pub struct JsonExportSource {
    filesystem: Arc<dyn FileSystem>,
    path: String,
}

impl JsonExportSource {
    /// Creates a source reading `path` through `filesystem`.
    #[must_use]
    pub fn new(filesystem: Arc<dyn FileSystem>, path: impl Into<String>) -> Self {
        Self {
            filesystem,
            path: path.into(),
        }
    }

    fn read_rows(&self) -> anyhow::Result<Vec<LegacyCategoryRow>> {
        let bytes = self
            .filesystem
            .read_file(self.path.clone())
            .with_context(|| format!("reading category export {}", self.path))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("decoding category export {}", self.path))
    }
}

impl LegacyCategorySource for JsonExportSource {
    fn fetch_category_rows(&self) -> Result<Vec<LegacyCategoryRow>, SourceError> {
        crate::anyhow_to_generic!(self.read_rows())
            .map_err(|message| SourceError::SourceUnavailable { message })
    }
}

/// Returns a category source reading a JSON export through `filesystem`.
#[uniffi::export]
#[must_use]
pub fn json_export_category_source(
    filesystem: Arc<dyn FileSystem>,
    path: String,
) -> Arc<dyn LegacyCategorySource> {
    Arc::new(JsonExportSource::new(filesystem, path))
}

/// Returns a category source over rows the host already fetched.
#[uniffi::export]
#[must_use]
pub fn static_category_source(rows: Vec<LegacyCategoryRow>) -> Arc<dyn LegacyCategorySource> {
    Arc::new(StaticCategorySource::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::filesystem::InMemoryFileSystem;

    #[test]
    fn test_reads_export() {
        let fs = Arc::new(InMemoryFileSystem::with_files(&[(
            "export/categories.json",
            r#"[{"OXID": "a", "OXPARENTID": "oxrootid", "OXTITLE": "Soaps", "OXACTIVE": 1},
                {"id": "b", "parentId": "a", "name": "Bars"}]"#,
        )]));
        let source = JsonExportSource::new(fs, "export/categories.json");

        let rows = source.fetch_category_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title.as_deref(), Some("Soaps"));
        assert_eq!(rows[1].parent_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_missing_export_is_unavailable() {
        let source = JsonExportSource::new(Arc::new(InMemoryFileSystem::new()), "nope.json");
        let err = source.fetch_category_rows().unwrap_err();
        assert!(matches!(err, SourceError::SourceUnavailable { .. }));
        assert!(err.to_string().contains("reading category export nope.json"));
    }

    #[test]
    fn test_malformed_export_is_unavailable() {
        let fs = Arc::new(InMemoryFileSystem::with_files(&[("c.json", "{\"id\": 1")]));
        let err = JsonExportSource::new(fs, "c.json")
            .fetch_category_rows()
            .unwrap_err();
        let SourceError::SourceUnavailable { message } = err else {
            panic!("unexpected error variant");
        };
        assert!(message.starts_with("decoding category export c.json"));
        assert!(message.contains("caused by"));
    }
}
