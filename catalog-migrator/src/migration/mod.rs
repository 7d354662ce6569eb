//! Migration engine
//!
//! Moves the legacy category tree into the target in dependency order: a category is only
//! created once its parent has a target id, and the source-to-target mapping is
//! checkpointed after every create so a run can be interrupted and resumed at any point.
//!
//! # Overview
//!
//! - [`MigrationEngine`]: the exported entry point; owns the target client and the stores
//! - [`classify`] and [`run_pass`]: the per-pass resolution logic over owned
//!   `(pending, mapping)` state
//! - [`MigrationReport`] and [`ProductReport`]: what a run did
//!
//! # Run shape
//!
//! 1. Load the mapping, read the legacy categories, authenticate, resolve the root anchor.
//! 2. Optionally look up mapped targets; deleted ones are created again.
//! 3. Root pass: top-level categories are created below the root anchor. A category's
//!    thumbnail is uploaded right before it; a picture that fails to upload is logged and
//!    the category is created without it.
//! 4. Dependent passes, at most `max_passes`: every pending category whose parent resolved
//!    is created. The loop ends early once a pass creates nothing and has nothing left to
//!    retry.
//! 5. Save the mapping; dump orphans (categories whose parent never resolved).
//!
//! ## Platform usage (Kotlin)
//!
//! ```kotlin
//! setLogger(AndroidLogger())
//! val engine = MigrationEngine(
//!     config,
//!     jsonExportCategorySource(localFilesystem("/data/migrator"), "export/categories.json"),
//!     null,
//!     filesystemMediaSource(localFilesystem("/data/migrator"), "out/pictures/master"),
//!     OkHttpTransport(),
//!     localFilesystem("/data/migrator"),
//! )
//! val report = engine.run()
//! ```

mod engine;
mod error;
mod media;
mod pass;
mod products;
mod report;

pub use engine::MigrationEngine;
pub use error::{MigrationError, MigrationResult};
pub use pass::{
    classify, find_orphans, run_pass, CategoryWriter, DryRunWriter, PassContext, PassOutcome,
    PassScope, PassState, Resolution, DRY_RUN_PREFIX,
};
pub use report::{FailedRecord, MigrationReport, ProductReport};
