/// Global logger bridge and context-aware logging macros.
pub mod logger;

/// HTTP transport interface implemented by the host application.
pub mod http_client;

/// Durable file storage interface and the native `std::fs` implementation.
pub mod filesystem;

/// Migration configuration.
pub mod config;
