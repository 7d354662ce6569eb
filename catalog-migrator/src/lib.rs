#![deny(clippy::all, clippy::pedantic, clippy::nursery, missing_docs, dead_code)]

//! `catalog-migrator` moves a legacy shop catalog (a category tree and its products)
//! into a target shop platform that is only reachable through an authenticated REST API.
//!
//! The host application supplies the legacy rows, the HTTP transport, durable storage
//! and a log sink through foreign traits; the library resolves the category hierarchy in
//! dependency order, keeps a durable source-to-target ID mapping so runs are resumable,
//! and handles token acquisition and expiry against the target API.

/// Error handling helpers shared by every module.
pub mod migrator_error;

/// Low level primitives: HTTP transport, filesystem, logging and configuration.
pub mod primitives;

/// Reading and normalising legacy category and product rows.
pub mod source;

/// The durable source-ID to target-ID mapping.
pub mod mapping;

/// Authenticated client for the target shop API.
pub mod target;

/// The dependency-ordered migration engine.
pub mod migration;

/// Scripted target API and fixtures used by tests.
#[cfg(any(test, feature = "tooling_tests"))]
pub mod test_utils;

pub use catalog_migrator_macros::{migrator_error, migrator_export};
pub use migration::{MigrationEngine, MigrationError, MigrationReport, ProductReport};
pub use primitives::config::{MigrationConfig, RootAnchor};

uniffi::setup_scaffolding!("catalog_migrator");
