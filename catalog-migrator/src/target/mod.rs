//! Authenticated access to the target shop API.
//!
//! [`TargetClient`] owns the OAuth client-credentials token, refreshes it shortly before
//! it expires, and recovers from a single `401` by re-authenticating and retrying once.
//! On top of the generic [`TargetClient::request`] it offers the handful of category and
//! product endpoints the migration needs, plus the two-step media upload.

mod client;
mod payload;
mod token;

pub use client::TargetClient;
pub use payload::{
    category_payload, media_payload, product_media_payload, product_payload, strip_empty_fields,
    MediaFileName, ProductPricing,
};

use crate::primitives::http_client::HttpError;

/// Errors raised by the target API client.
#[crate::migrator_error]
pub enum TargetError {
    /// No valid token could be obtained, or the API kept rejecting fresh tokens
    #[error("authentication against the target API failed: {reason}")]
    AuthenticationFailed {
        /// Why the token was rejected or not issued
        reason: String,
    },
    /// The API answered with a non-success status
    #[error("target API request failed with status {status}: {body}")]
    RequestFailed {
        /// HTTP status code
        status: u64,
        /// Response body, lossily decoded
        body: String,
    },
    /// The request never produced an HTTP response
    #[error("transport failure: {0}")]
    Transport(#[from] HttpError),
    /// A success response whose body could not be understood
    #[error("unexpected response from target API: {message}")]
    InvalidResponse {
        /// What was wrong with the body
        message: String,
    },
    /// Creating an entity failed
    #[error("creating {entity} failed (retryable: {retryable}): {cause}")]
    CreateFailed {
        /// Kind of entity, `category`, `product` or `media`
        entity: String,
        /// Failure description
        cause: String,
        /// Whether trying again in a later pass may succeed
        retryable: bool,
    },
    /// The configured root anchor does not exist in the target
    #[error("root category not found: {anchor}")]
    RootCategoryNotFound {
        /// The anchor that was looked up
        anchor: String,
    },
}

impl TargetError {
    /// Whether the error means the run cannot continue against this target.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::RootCategoryNotFound { .. }
        )
    }

    /// Whether a failed create may succeed if attempted again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CreateFailed { retryable: true, .. })
    }
}
