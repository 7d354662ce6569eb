//! Error handling utilities
//!
//! This module provides a unified approach to error handling that combines:
//! - Strongly typed error variants for specific, known error cases
//! - Generic error handling for anyhow-based context chains
//!
//! Use the `#[migrator_error]` macro to turn an enum into an error type that derives
//! `thiserror::Error` and `uniffi::Error` and gains a `Generic` variant.

pub use catalog_migrator_macros::migrator_error;

/// Re-export anyhow for convenience
pub use anyhow;

/// Helper trait for converting anyhow errors to generic error messages
pub trait AnyhowErrorExt {
    /// Convert an anyhow error to a string, preserving the error chain
    fn to_generic_message(self) -> String;

    /// Convert an anyhow error to a string with a custom prefix
    fn to_generic_message_with_prefix(self, prefix: &str) -> String;
}

impl AnyhowErrorExt for anyhow::Error {
    fn to_generic_message(self) -> String {
        let mut message = self.to_string();

        let chain: Vec<String> = self.chain().skip(1).map(ToString::to_string).collect();
        if !chain.is_empty() {
            message.push_str(" (caused by: ");
            message.push_str(&chain.join(" -> "));
            message.push(')');
        }

        message
    }

    fn to_generic_message_with_prefix(self, prefix: &str) -> String {
        format!("{}: {}", prefix, self.to_generic_message())
    }
}

/// Maps an `anyhow::Result` into a `Result<T, String>` carrying the full context chain.
#[macro_export]
macro_rules! anyhow_to_generic {
    ($result:expr) => {
        $result.map_err(|e| {
            use $crate::migrator_error::AnyhowErrorExt;
            e.to_generic_message()
        })
    };

    ($result:expr, $prefix:expr) => {
        $result.map_err(|e| {
            use $crate::migrator_error::AnyhowErrorExt;
            e.to_generic_message_with_prefix($prefix)
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_error_ext() {
        use anyhow::Context;

        let error = anyhow::anyhow!("expected value at line 1 column 1")
            .context("decoding var/category_map.json")
            .context("loading category mapping");

        let message = error.to_generic_message();
        assert!(message.starts_with("loading category mapping"));
        assert!(message.contains("caused by"));
        assert!(message.contains("decoding var/category_map.json"));
        assert!(message.contains("expected value"));
    }

    #[test]
    fn test_anyhow_error_ext_with_prefix() {
        let error = anyhow::anyhow!("connection reset");
        let message = error.to_generic_message_with_prefix("category source");
        assert_eq!(message, "category source: connection reset");
    }

    #[test]
    fn test_anyhow_to_generic_macro() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("boom"));
        let mapped: Result<(), String> = anyhow_to_generic!(result, "export");
        assert_eq!(mapped.unwrap_err(), "export: boom");
    }
}
