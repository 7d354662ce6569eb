use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::payload::{media_payload, product_media_payload, strip_empty_fields, MediaFileName};
use super::token::{AccessToken, TokenResponse};
use super::TargetError;
use crate::primitives::config::{MigrationConfig, RootAnchor};
use crate::primitives::http_client::{HttpClient, HttpError, HttpHeader, HttpMethod};

const TOKEN_PATH: &str = "/api/oauth/token";
const CATEGORY_PATH: &str = "/api/category";
const CATEGORY_SEARCH_PATH: &str = "/api/search/category";
const SALES_CHANNEL_PATH: &str = "/api/sales-channel";
const PRODUCT_PATH: &str = "/api/product";
const MEDIA_PATH: &str = "/api/media";
const MEDIA_UPLOAD_PATH: &str = "/api/_action/media";
const JSON_CONTENT_TYPE: &str = "application/json";

/// A `401` is answered by re-authenticating and retrying this many times.
const MAX_UNAUTHORIZED_RETRIES: u32 = 1;

/// Refresh margins above a day are clamped.
const MAX_REFRESH_MARGIN_SECS: u64 = 86_400;

/// An encoded request body and the content type it is sent with.
struct RequestBody {
    bytes: Vec<u8>,
    content_type: &'static str,
}

/// Client for the target shop's admin API.
///
/// Calls are awaited one at a time; the token lives behind an async mutex so a refresh
/// never races a request that is still using the old token.
pub struct TargetClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    client_id: String,
    client_secret: String,
    root_anchor: RootAnchor,
    refresh_margin: Duration,
    token: Mutex<Option<AccessToken>>,
}

impl TargetClient {
    /// Creates a client for the API described by `config`. No request is made yet.
    #[must_use]
    pub fn new(http_client: Arc<dyn HttpClient>, config: &MigrationConfig) -> Self {
        Self {
            http_client,
            base_url: config.api_base_url.trim().trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            root_anchor: config.root_anchor.clone(),
            refresh_margin: Duration::seconds(
                i64::try_from(config.token_refresh_margin_secs.min(MAX_REFRESH_MARGIN_SECS))
                    .unwrap_or_default(),
            ),
            token: Mutex::new(None),
        }
    }

    /// Obtains a fresh token with the client-credentials grant.
    ///
    /// # Errors
    /// - `TargetError::AuthenticationFailed` if the endpoint rejects the credentials, is
    ///   unreachable or does not return a token
    pub async fn authenticate(&self) -> Result<(), TargetError> {
        let mut slot = self.token.lock().await;
        *slot = Some(self.fetch_token().await?);
        Ok(())
    }

    /// Sends an authenticated request and decodes the JSON response.
    ///
    /// The token is refreshed first when it is missing or about to expire. A `401` drops
    /// the token and the request is retried once with a new one; a second `401` is an
    /// authentication failure. An empty success body decodes to `Value::Null`.
    ///
    /// # Errors
    /// - `TargetError::AuthenticationFailed` if no accepted token can be obtained
    /// - `TargetError::RequestFailed` for any other non-success status
    /// - `TargetError::Transport` if no response was received
    /// - `TargetError::InvalidResponse` if a success body is not JSON
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TargetError> {
        let body = match body {
            Some(body) => Some(RequestBody {
                bytes: serde_json::to_vec(&body).map_err(|e| TargetError::InvalidResponse {
                    message: format!("encoding request body: {e}"),
                })?,
                content_type: JSON_CONTENT_TYPE,
            }),
            None => None,
        };
        self.send(method, path, body).await
    }

    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<Value, TargetError> {
        let url = self.url(path);

        let mut attempt = 0;
        loop {
            let token = self.valid_token().await?;
            let headers =
                Self::headers(Some(&token), body.as_ref().map(|body| body.content_type));

            match self
                .http_client
                .fetch(
                    url.clone(),
                    method,
                    headers,
                    body.as_ref().map(|body| body.bytes.clone()),
                )
                .await
            {
                Ok(bytes) => return Self::decode(&bytes),
                Err(HttpError::BadStatusCode { code: 401, .. }) => {
                    self.invalidate_token().await;
                    if attempt < MAX_UNAUTHORIZED_RETRIES {
                        attempt += 1;
                        crate::warn!(
                            "target_api.unauthorized method={method} path={path} action=reauthenticate"
                        );
                        continue;
                    }
                    return Err(TargetError::AuthenticationFailed {
                        reason: format!(
                            "{method} {path} was rejected with 401 after re-authenticating"
                        ),
                    });
                }
                Err(HttpError::BadStatusCode {
                    code,
                    response_body,
                }) => {
                    return Err(TargetError::RequestFailed {
                        status: code,
                        body: String::from_utf8_lossy(&response_body).into_owned(),
                    })
                }
                Err(e) => return Err(TargetError::Transport(e)),
            }
        }
    }

    /// Creates a category and returns its target id.
    ///
    /// # Errors
    /// - `TargetError::CreateFailed`, retryable only when the target reports that the
    ///   parent reference is not visible yet
    /// - `TargetError::AuthenticationFailed` if the token cannot be renewed
    pub async fn create_category(&self, payload: Value) -> Result<String, TargetError> {
        self.create("category", CATEGORY_PATH, payload, true).await
    }

    /// Creates a product and returns its target id.
    ///
    /// # Errors
    /// - `TargetError::CreateFailed`, never retryable
    /// - `TargetError::AuthenticationFailed` if the token cannot be renewed
    pub async fn create_product(&self, payload: Value) -> Result<String, TargetError> {
        self.create("product", PRODUCT_PATH, payload, false).await
    }

    /// Uploads a picture in two steps: an empty media entity is created (in `folder_id`
    /// when given), then `bytes` are attached to it. Returns the media id.
    ///
    /// # Errors
    /// - `TargetError::CreateFailed` with entity `media` if either step is refused
    /// - `TargetError::AuthenticationFailed` if the token cannot be renewed
    pub async fn upload_media(
        &self,
        file: &MediaFileName,
        bytes: Vec<u8>,
        folder_id: Option<&str>,
    ) -> Result<String, TargetError> {
        let media_id = self
            .create("media", MEDIA_PATH, media_payload(folder_id), false)
            .await?;

        let path = format!(
            "{MEDIA_UPLOAD_PATH}/{media_id}/upload?extension={}&fileName={}",
            file.extension, file.stem
        );
        let body = RequestBody {
            bytes,
            content_type: file.mime_type,
        };
        match self.send(HttpMethod::Post, &path, Some(body)).await {
            Ok(_) => Ok(media_id),
            Err(e @ TargetError::AuthenticationFailed { .. }) => Err(e),
            Err(e) => Err(TargetError::CreateFailed {
                entity: "media".to_string(),
                cause: format!("uploading {}.{}: {e}", file.stem, file.extension),
                retryable: false,
            }),
        }
    }

    /// Attaches uploaded media to an existing product, keeping their order.
    ///
    /// # Errors
    /// - Any `request` error
    pub async fn attach_product_media(
        &self,
        product_id: &str,
        media_ids: &[String],
    ) -> Result<(), TargetError> {
        self.request(
            HttpMethod::Patch,
            &format!("{PRODUCT_PATH}/{product_id}"),
            Some(product_media_payload(media_ids)),
        )
        .await
        .map(|_| ())
    }

    /// Whether a category with this id exists in the target.
    ///
    /// # Errors
    /// - Any `request` error other than a `404`
    pub async fn category_exists(&self, target_id: &str) -> Result<bool, TargetError> {
        match self
            .request(HttpMethod::Get, &format!("{CATEGORY_PATH}/{target_id}"), None)
            .await
        {
            Ok(_) => Ok(true),
            Err(TargetError::RequestFailed { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Looks up the target category the migrated tree is attached to.
    ///
    /// # Errors
    /// - `TargetError::RootCategoryNotFound` if the anchor does not resolve
    /// - `TargetError::AuthenticationFailed` and transport errors from the lookup
    pub async fn resolve_root_category_id(&self) -> Result<String, TargetError> {
        let resolved = match &self.root_anchor {
            RootAnchor::CategoryId { id } => {
                if self.category_exists(id).await? {
                    Some(id.clone())
                } else {
                    None
                }
            }
            RootAnchor::CategoryName { name } => {
                let criteria = json!({
                    "limit": 1,
                    "filter": [{ "type": "equals", "field": "name", "value": name }],
                });
                let response = self
                    .request(HttpMethod::Post, CATEGORY_SEARCH_PATH, Some(criteria))
                    .await?;
                string_at(&response, "/data/0/id")
            }
            RootAnchor::SalesChannel { id } => {
                match self
                    .request(HttpMethod::Get, &format!("{SALES_CHANNEL_PATH}/{id}"), None)
                    .await
                {
                    Ok(response) => string_at(&response, "/data/navigationCategoryId"),
                    Err(TargetError::RequestFailed { status: 404, .. }) => None,
                    Err(e) => return Err(e),
                }
            }
        };

        resolved.ok_or_else(|| TargetError::RootCategoryNotFound {
            anchor: self.root_anchor.to_string(),
        })
    }

    async fn create(
        &self,
        entity: &str,
        path: &str,
        payload: Value,
        parent_may_lag: bool,
    ) -> Result<String, TargetError> {
        let payload = strip_empty_fields(payload);
        match self.request(HttpMethod::Post, path, Some(payload)).await {
            Ok(response) => {
                string_at(&response, "/data/id").ok_or_else(|| TargetError::CreateFailed {
                    entity: entity.to_string(),
                    cause: "response did not contain data.id".to_string(),
                    retryable: false,
                })
            }
            Err(e @ TargetError::AuthenticationFailed { .. }) => Err(e),
            Err(TargetError::RequestFailed { status, body }) => Err(TargetError::CreateFailed {
                entity: entity.to_string(),
                retryable: parent_may_lag && is_parent_not_visible(status, &body),
                cause: format!("status {status}: {body}"),
            }),
            Err(e) => Err(TargetError::CreateFailed {
                entity: entity.to_string(),
                cause: e.to_string(),
                retryable: false,
            }),
        }
    }

    /// Returns the current token, refreshing it first when needed.
    async fn valid_token(&self) -> Result<String, TargetError> {
        let mut slot = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = slot.as_ref() {
            if !token.needs_refresh(now, self.refresh_margin) {
                return Ok(token.value().to_string());
            }
            crate::debug!(
                "target_api.token_refresh expires_at={}",
                token.expires_at().to_rfc3339()
            );
        }
        let token = self.fetch_token().await?;
        let value = token.value().to_string();
        *slot = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<AccessToken, TargetError> {
        let body = json!({
            "grant_type": "client_credentials",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        });
        let body = serde_json::to_vec(&body).map_err(|e| TargetError::AuthenticationFailed {
            reason: format!("encoding token request: {e}"),
        })?;

        let bytes = self
            .http_client
            .fetch(
                self.url(TOKEN_PATH),
                HttpMethod::Post,
                Self::headers(None, Some(JSON_CONTENT_TYPE)),
                Some(body),
            )
            .await
            .map_err(|e| TargetError::AuthenticationFailed {
                reason: match e {
                    HttpError::BadStatusCode {
                        code,
                        response_body,
                    } => format!(
                        "token endpoint answered {code}: {}",
                        String::from_utf8_lossy(&response_body)
                    ),
                    other => other.to_string(),
                },
            })?;

        let response: TokenResponse =
            serde_json::from_slice(&bytes).map_err(|e| TargetError::AuthenticationFailed {
                reason: format!("undecodable token response: {e}"),
            })?;

        let now = Utc::now();
        let token = AccessToken::from_response(response, now).ok_or_else(|| {
            TargetError::AuthenticationFailed {
                reason: "token endpoint returned no access_token".to_string(),
            }
        })?;

        crate::info!(
            "target_api.authenticated expires_at={} timestamp={}",
            token.expires_at().to_rfc3339(),
            now.to_rfc3339()
        );
        Ok(token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(token: Option<&str>, content_type: Option<&str>) -> Vec<HttpHeader> {
        let mut headers = vec![HttpHeader::new("Accept", JSON_CONTENT_TYPE)];
        if let Some(content_type) = content_type {
            headers.push(HttpHeader::new("Content-Type", content_type));
        }
        if let Some(token) = token {
            headers.push(HttpHeader::new("Authorization", format!("Bearer {token}")));
        }
        headers
    }

    fn decode(bytes: &[u8]) -> Result<Value, TargetError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes).map_err(|e| TargetError::InvalidResponse {
            message: e.to_string(),
        })
    }
}

/// A non-empty string at a JSON pointer.
fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// A client error that mentions the parent reference means the parent exists but is not
/// visible yet, or was not created yet; trying again later can succeed.
fn is_parent_not_visible(status: u64, body: &str) -> bool {
    (400..500).contains(&status) && status != 401 && body.contains("parentId")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_config, MockHttpClient, MOCK_ROOT_CATEGORY_ID};

    fn client(mock: &Arc<MockHttpClient>) -> TargetClient {
        TargetClient::new(mock.clone(), &test_config())
    }

    #[tokio::test]
    async fn test_authenticate_stores_token() {
        let mock = Arc::new(MockHttpClient::new());
        let client = client(&mock);

        client.authenticate().await.unwrap();
        assert!(client.category_exists(MOCK_ROOT_CATEGORY_ID).await.unwrap());

        assert_eq!(mock.token_requests(), 1);
        let requests = mock.requests();
        let last = requests.last().unwrap();
        assert!(last
            .headers
            .iter()
            .any(|h| h.name == "Authorization" && h.value == "Bearer token-1"));
        assert!(last
            .headers
            .iter()
            .any(|h| h.name == "Accept" && h.value == "application/json"));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let mock = Arc::new(MockHttpClient::new());
        mock.reject_credentials();
        let err = client(&mock).authenticate().await.unwrap_err();
        assert!(matches!(err, TargetError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_single_unauthorized_is_recovered() {
        let mock = Arc::new(MockHttpClient::new());
        let client = client(&mock);
        client.authenticate().await.unwrap();

        mock.unauthorized_burst(1);
        let id = client
            .create_category(json!({ "name": "Soaps", "parentId": MOCK_ROOT_CATEGORY_ID }))
            .await
            .unwrap();

        assert_eq!(mock.category_name(&id).as_deref(), Some("Soaps"));
        assert_eq!(mock.token_requests(), 2);
    }

    #[tokio::test]
    async fn test_repeated_unauthorized_fails() {
        let mock = Arc::new(MockHttpClient::new());
        let client = client(&mock);
        client.authenticate().await.unwrap();

        mock.unauthorized_burst(2);
        let err = client
            .create_category(json!({ "name": "Soaps", "parentId": MOCK_ROOT_CATEGORY_ID }))
            .await
            .unwrap_err();

        assert!(matches!(err, TargetError::AuthenticationFailed { .. }));
        assert_eq!(mock.created_category_count(), 0);
    }

    #[tokio::test]
    async fn test_token_near_expiry_is_refreshed_before_request() {
        let mock = Arc::new(MockHttpClient::new());
        mock.set_token_lifetime(30);
        let client = client(&mock);

        client.authenticate().await.unwrap();
        assert!(client.category_exists(MOCK_ROOT_CATEGORY_ID).await.unwrap());
        assert!(client.category_exists(MOCK_ROOT_CATEGORY_ID).await.unwrap());

        assert_eq!(mock.token_requests(), 3);
        assert_eq!(mock.unauthorized_responses(), 0);
    }

    #[tokio::test]
    async fn test_category_exists_maps_404_to_false() {
        let mock = Arc::new(MockHttpClient::new());
        let client = client(&mock);
        assert!(!client
            .category_exists("0123456789abcdef0123456789abcdef")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_empty_fields_are_not_sent() {
        let mock = Arc::new(MockHttpClient::new());
        let client = client(&mock);
        client
            .create_category(json!({
                "name": "Soaps",
                "parentId": MOCK_ROOT_CATEGORY_ID,
                "salesChannelId": "",
                "mediaId": null,
            }))
            .await
            .unwrap();

        let body = mock.last_body_for(CATEGORY_PATH).unwrap();
        assert!(body.get("salesChannelId").is_none());
        assert!(body.get("mediaId").is_none());
    }

    #[tokio::test]
    async fn test_upload_media_creates_entity_then_sends_bytes() {
        let mock = Arc::new(MockHttpClient::new());
        let client = client(&mock);

        let media_id = client
            .upload_media(
                &MediaFileName::parse("p1010227.PNG"),
                b"\x89PNG".to_vec(),
                Some("0199e6c0fc2e72de8263910665f21031"),
            )
            .await
            .unwrap();

        let uploaded = mock.uploaded_media(&media_id).expect("bytes uploaded");
        assert_eq!(uploaded.bytes, b"\x89PNG".to_vec());
        assert_eq!(uploaded.content_type.as_deref(), Some("image/png"));
        assert_eq!(uploaded.extension.as_deref(), Some("png"));
        assert_eq!(uploaded.file_name.as_deref(), Some("p1010227"));
        assert_eq!(
            uploaded.folder_id.as_deref(),
            Some("0199e6c0fc2e72de8263910665f21031")
        );
    }

    #[tokio::test]
    async fn test_refused_upload_is_a_media_create_failure() {
        let mock = Arc::new(MockHttpClient::new());
        mock.fail_next_media_uploads(1);
        let err = client(&mock)
            .upload_media(&MediaFileName::parse("a.jpg"), vec![1, 2, 3], None)
            .await
            .unwrap_err();

        let TargetError::CreateFailed {
            entity, retryable, ..
        } = &err
        else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(entity, "media");
        assert!(!retryable);
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_attach_product_media_patches_product() {
        let mock = Arc::new(MockHttpClient::new());
        let client = client(&mock);
        let product_id = client
            .create_product(json!({ "name": "Olive soap", "productNumber": "1402" }))
            .await
            .unwrap();

        client
            .attach_product_media(&product_id, &["m1".to_string(), "m2".to_string()])
            .await
            .unwrap();

        let product = mock.product(&product_id).unwrap();
        assert_eq!(product["name"], "Olive soap");
        assert_eq!(product["media"][1]["mediaId"], "m2");
        assert_eq!(
            mock.requests().last().unwrap().method,
            HttpMethod::Patch
        );
    }

    #[tokio::test]
    async fn test_missing_parent_is_retryable() {
        let mock = Arc::new(MockHttpClient::new());
        let err = client(&mock)
            .create_category(json!({ "name": "Bars", "parentId": "ffffffffffffffffffffffffffffffff" }))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }

    #[tokio::test]
    async fn test_server_error_is_not_retryable() {
        let mock = Arc::new(MockHttpClient::new());
        mock.fail_next_creates(1, 500);
        let err = client(&mock)
            .create_category(json!({ "name": "Soaps", "parentId": MOCK_ROOT_CATEGORY_ID }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TargetError::CreateFailed {
                retryable: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_offline_transport_fails_authentication() {
        let mock = Arc::new(MockHttpClient::new());
        mock.go_offline(true);
        let err = client(&mock)
            .category_exists(MOCK_ROOT_CATEGORY_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, TargetError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_resolve_root_by_name() {
        let mock = Arc::new(MockHttpClient::new());
        assert_eq!(
            client(&mock).resolve_root_category_id().await.unwrap(),
            MOCK_ROOT_CATEGORY_ID
        );
    }

    #[tokio::test]
    async fn test_resolve_root_by_id_and_sales_channel() {
        let mock = Arc::new(MockHttpClient::new());

        let mut config = test_config();
        config.root_anchor = RootAnchor::CategoryId {
            id: MOCK_ROOT_CATEGORY_ID.to_string(),
        };
        let by_id = TargetClient::new(mock.clone(), &config);
        assert_eq!(
            by_id.resolve_root_category_id().await.unwrap(),
            MOCK_ROOT_CATEGORY_ID
        );

        config.root_anchor = RootAnchor::SalesChannel {
            id: crate::test_utils::MOCK_SALES_CHANNEL_ID.to_string(),
        };
        let by_channel = TargetClient::new(mock.clone(), &config);
        assert_eq!(
            by_channel.resolve_root_category_id().await.unwrap(),
            MOCK_ROOT_CATEGORY_ID
        );
    }

    #[tokio::test]
    async fn test_unknown_root_anchor() {
        let mock = Arc::new(MockHttpClient::new());
        for anchor in [
            RootAnchor::CategoryName {
                name: "Startseite".to_string(),
            },
            RootAnchor::CategoryId {
                id: "0123456789abcdef0123456789abcdef".to_string(),
            },
            RootAnchor::SalesChannel {
                id: "0123456789abcdef0123456789abcdef".to_string(),
            },
        ] {
            let mut config = test_config();
            config.root_anchor = anchor;
            let err = TargetClient::new(mock.clone(), &config)
                .resolve_root_category_id()
                .await
                .unwrap_err();
            assert!(matches!(err, TargetError::RootCategoryNotFound { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_decode_empty_body() {
        assert_eq!(TargetClient::decode(b"").unwrap(), Value::Null);
        assert_eq!(TargetClient::decode(b" \n").unwrap(), Value::Null);
        assert!(matches!(
            TargetClient::decode(b"<html>"),
            Err(TargetError::InvalidResponse { .. })
        ));
    }
}
