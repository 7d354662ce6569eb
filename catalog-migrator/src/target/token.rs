use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Lifetime assumed when the token endpoint does not say how long a token lives.
const DEFAULT_EXPIRES_IN_SECS: i64 = 600;

/// Body of a successful `POST /api/oauth/token`.
#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// A bearer token and the moment it stops being accepted.
#[derive(Clone)]
pub(super) struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Builds a token from the endpoint response. `None` if no usable token was returned.
    pub(super) fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Option<Self> {
        let value = response
            .access_token
            .filter(|token| !token.trim().is_empty())?;
        let lifetime = response
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .max(0);
        Some(Self {
            value,
            expires_at: now + Duration::seconds(lifetime),
        })
    }

    pub(super) fn value(&self) -> &str {
        &self.value
    }

    pub(super) const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token expires within `margin` of `now`.
    pub(super) fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"********")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
