use crate::mapping::MappingError;
use crate::primitives::config::ConfigError;
use crate::source::SourceError;
use crate::target::TargetError;

/// Errors that stop a migration run.
///
/// Per-record create failures never surface here; they are counted in the report.
#[crate::migrator_error]
pub enum MigrationError {
    /// An invalid operation was attempted, e.g. starting a run while one is in progress
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The legacy source could not be read
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The mapping could not be loaded or persisted
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// The target API rejected the run (authentication, missing root category)
    #[error(transparent)]
    Target(#[from] TargetError),
}

/// Result type for migration operations
pub type MigrationResult<T> = std::result::Result<T, MigrationError>;
