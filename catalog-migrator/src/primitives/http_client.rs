/// HTTP transport interface that host applications must implement for the migrator to reach
/// the target shop API.
///
/// The migrator builds complete URLs and headers (including the bearer token) itself; the
/// transport is only responsible for moving bytes. Implementations should map
/// platform-specific failures to the appropriate `HttpError` variants so that token expiry
/// (`401`) and missing entities (`404`) can be told apart from transport problems.
#[uniffi::export(with_foreign)]
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response body.
    ///
    /// # Arguments
    /// * `url` - Absolute URL of the endpoint
    /// * `method` - The HTTP method to use for the request
    /// * `headers` - Request headers, already including `Authorization` where needed
    /// * `body` - Optional request body for POST and PATCH requests
    ///
    /// # Errors
    /// * `HttpError::BadStatusCode` - For non-2xx responses, with the response body
    /// * `HttpError::NoConnectivity` - When the host cannot be reached at all
    /// * `HttpError::Timeout` - When the request times out
    /// * `HttpError::ConnectionRefused` - When the server refuses the connection
    /// * `HttpError::Cancelled` - When the request is cancelled
    /// * `HttpError::Generic` - For other unexpected errors
    async fn fetch(
        &self,
        url: String,
        method: HttpMethod,
        headers: Vec<HttpHeader>,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, HttpError>;
}

/// HTTP methods used against the target API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum HttpMethod {
    /// HTTP GET method for retrieving data
    Get,
    /// HTTP POST method for sending data
    Post,
    /// HTTP PATCH method for partial updates
    Patch,
}

impl HttpMethod {
    /// Returns the method name as used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single request header.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct HttpHeader {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

impl HttpHeader {
    /// Creates a header from a name and a value.
    #[must_use]
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Represents HTTP-related errors that can occur during network requests.
#[crate::migrator_error]
pub enum HttpError {
    /// HTTP error with specific status code (4xx, 5xx responses)
    #[error("Bad status code {code}")]
    BadStatusCode {
        /// The HTTP status code that was returned
        code: u64,
        /// The response body, which may contain error details
        response_body: Vec<u8>,
    },
    /// No connectivity to the target host
    #[error("No connectivity")]
    NoConnectivity,
    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds before timeout occurred
        seconds: u64,
    },
    /// Connection was refused by the server
    #[error("Connection refused by {host}")]
    ConnectionRefused {
        /// The host that refused the connection
        host: String,
    },
    /// The request was cancelled before completion
    #[error("Request was cancelled")]
    Cancelled,
    /// Generic error for unexpected errors
    #[error("Generic error: {message}")]
    Generic {
        /// The error message
        message: String,
    },
}

impl HttpError {
    /// Returns the HTTP status code if the error carries one.
    #[must_use]
    pub const fn status_code(&self) -> Option<u64> {
        match self {
            Self::BadStatusCode { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Converts unexpected UniFFI callback errors to `HttpError`.
///
/// When a host implementation of `HttpClient` throws something that is not an
/// `HttpError`, UniFFI hands us this error instead of panicking. A bare numeric reason is
/// interpreted as a status code.
impl From<uniffi::UnexpectedUniFFICallbackError> for HttpError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        error.reason.parse::<u64>().map_or_else(
            |_| Self::Generic {
                message: error.reason.clone(),
            },
            |code| Self::BadStatusCode {
                code,
                response_body: Vec::new(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_is_only_reported_for_bad_status() {
        let error = HttpError::BadStatusCode {
            code: 404,
            response_body: b"not found".to_vec(),
        };
        assert_eq!(error.status_code(), Some(404));
        assert_eq!(error.to_string(), "Bad status code 404");

        assert_eq!(HttpError::NoConnectivity.status_code(), None);
        assert_eq!(HttpError::Timeout { seconds: 30 }.status_code(), None);
    }

    #[test]
    fn test_method_display() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Post.as_str(), "POST");
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }
}
