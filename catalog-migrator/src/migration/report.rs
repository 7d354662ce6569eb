/// A record whose create call failed for good.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FailedRecord {
    /// Legacy id
    pub id: String,
    /// Last failure reported by the target
    pub cause: String,
}

/// Summary of a category run
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct MigrationReport {
    /// Records read from the legacy source
    pub total: u32,
    /// Records created in the target during this run
    pub created: u32,
    /// Records skipped because the mapping already had them
    pub skipped: u32,
    /// Records whose parent never resolved
    pub orphaned: u32,
    /// Records whose create call failed for good
    pub failed: u32,
    /// Passes run, the root pass included
    pub passes: u32,
    /// Whether this was a dry run (nothing created or persisted)
    pub dry_run: bool,
    /// Mapping entries found to point at deleted targets
    pub stale_mappings: u32,
    /// Where the mapping lives
    pub mapping_path: String,
    /// Where the orphan dump was written, if one was
    pub orphan_report_path: Option<String>,
    /// Legacy ids of orphaned records, in source order
    pub orphan_ids: Vec<String>,
    /// Thumbnails uploaded during this run
    pub media_uploaded: u32,
    /// Thumbnails that could not be read or uploaded; their categories were created without one
    pub media_failed: u32,
    /// Records that failed, in the order they were given up on
    pub failures: Vec<FailedRecord>,
}

impl MigrationReport {
    /// Whether every source record is now in the mapping.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.orphaned == 0 && self.failed == 0
    }
}

/// Summary of a product run
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct ProductReport {
    /// Products read from the legacy source
    pub total: u32,
    /// Products created in the target during this run
    pub created: u32,
    /// Products skipped because the product mapping already had them
    pub skipped: u32,
    /// Products whose create call failed
    pub failed: u32,
    /// Category references dropped because the category was never migrated
    pub unmapped_category_refs: u32,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Where the product mapping lives
    pub mapping_path: String,
    /// Pictures uploaded during this run
    pub media_uploaded: u32,
    /// Pictures that could not be read or uploaded
    pub media_failed: u32,
    /// Products that failed, in source order
    pub failures: Vec<FailedRecord>,
}

/// Converts a collection length into a report count.
pub(super) fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
