//! Test utilities: a scripted stand-in for the target shop API and row fixtures.
//!
//! `MockHttpClient` keeps just enough state to behave like the real admin API for the
//! endpoints the migrator calls: tokens expire and are checked, categories reject
//! unknown parents, searches and sales channel lookups resolve the root category, media
//! entities accept uploaded bytes and products accept media patches. Failure
//! modes (401 bursts, lagging parent visibility, server errors, no connectivity) are
//! switched on per test.

#![allow(clippy::missing_panics_doc)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::primitives::config::MigrationConfig;
use crate::primitives::http_client::{HttpClient, HttpError, HttpHeader, HttpMethod};
use crate::source::{LegacyCategoryRow, LegacyProductRow};

/// Base URL the mock answers on.
pub const MOCK_BASE_URL: &str = "https://shop.test";
/// Client id the mock accepts.
pub const MOCK_CLIENT_ID: &str = "SWIAMIGRATORTESTKEY";
/// Client secret the mock accepts.
pub const MOCK_CLIENT_SECRET: &str = "migrator-test-secret";
/// Id of the pre-existing `Home` category.
pub const MOCK_ROOT_CATEGORY_ID: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";
/// Id of the pre-existing sales channel whose navigation root is `Home`.
pub const MOCK_SALES_CHANNEL_ID: &str = "98432def39fc4624b33213a56b8c944d";
/// Tax id used by product tests.
pub const MOCK_TAX_ID: &str = "a5da76b447db4d0aba62e6512dadf45b";

/// A request as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Full URL
    pub url: String,
    /// Method
    pub method: HttpMethod,
    /// Headers as sent
    pub headers: Vec<HttpHeader>,
    /// Decoded JSON body, if any
    pub body: Option<Value>,
    /// Body bytes as sent
    pub raw_body: Option<Vec<u8>>,
}

impl RecordedRequest {
    /// The URL path without base or query.
    #[must_use]
    pub fn path(&self) -> &str {
        let path = self.url.strip_prefix(MOCK_BASE_URL).unwrap_or(&self.url);
        path.split('?').next().unwrap_or(path)
    }

    /// Value of a query string parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let (_, query) = self.url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    /// Value of a request header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.clone())
    }
}

/// A media entity stored by the mock, with the file attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedMedia {
    /// Folder the entity was created in
    pub folder_id: Option<String>,
    /// Uploaded bytes, empty until the upload call
    pub bytes: Vec<u8>,
    /// `Content-Type` of the upload call
    pub content_type: Option<String>,
    /// `extension` query parameter of the upload call
    pub extension: Option<String>,
    /// `fileName` query parameter of the upload call
    pub file_name: Option<String>,
}

#[derive(Debug)]
struct MockState {
    categories: BTreeMap<String, Value>,
    products: BTreeMap<String, Value>,
    media: BTreeMap<String, UploadedMedia>,
    failing_media_uploads: u32,
    requests: Vec<RecordedRequest>,
    issued_tokens: u32,
    token_lifetime_secs: i64,
    credentials_rejected: bool,
    unauthorized_remaining: u32,
    unauthorized_responses: u32,
    failing_creates: VecDeque<u64>,
    parent_lag_remaining: u32,
    offline: bool,
    next_id: u64,
    category_create_attempts: u32,
}

/// **This is intended exclusively for testing.**
///
/// An in-memory fake of the target shop API.
#[derive(Debug)]
pub struct MockHttpClient {
    state: Mutex<MockState>,
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHttpClient {
    /// Creates a target that only contains the `Home` root category.
    #[must_use]
    pub fn new() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            MOCK_ROOT_CATEGORY_ID.to_string(),
            json!({ "id": MOCK_ROOT_CATEGORY_ID, "name": "Home", "parentId": null }),
        );
        Self {
            state: Mutex::new(MockState {
                categories,
                products: BTreeMap::new(),
                media: BTreeMap::new(),
                failing_media_uploads: 0,
                requests: Vec::new(),
                issued_tokens: 0,
                token_lifetime_secs: 600,
                credentials_rejected: false,
                unauthorized_remaining: 0,
                unauthorized_responses: 0,
                failing_creates: VecDeque::new(),
                parent_lag_remaining: 0,
                offline: false,
                next_id: 1,
                category_create_attempts: 0,
            }),
        }
    }

    /// Makes the token endpoint reject the client credentials.
    pub fn reject_credentials(&self) {
        self.state.lock().unwrap().credentials_rejected = true;
    }

    /// Sets `expires_in` for tokens issued from now on.
    pub fn set_token_lifetime(&self, seconds: i64) {
        self.state.lock().unwrap().token_lifetime_secs = seconds;
    }

    /// The next `count` API calls are answered with `401` regardless of the token.
    pub fn unauthorized_burst(&self, count: u32) {
        self.state.lock().unwrap().unauthorized_remaining = count;
    }

    /// The next `count` create calls fail with `status` before touching any state.
    pub fn fail_next_creates(&self, count: u32, status: u64) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.failing_creates.push_back(status);
        }
    }

    /// The next `count` category creates below a non-root parent report the parent as
    /// unknown even though it exists.
    pub fn lag_parent_visibility(&self, count: u32) {
        self.state.lock().unwrap().parent_lag_remaining = count;
    }

    /// The next `count` media upload calls fail with `500`; the media entity stays empty.
    pub fn fail_next_media_uploads(&self, count: u32) {
        self.state.lock().unwrap().failing_media_uploads = count;
    }

    /// Every call fails with `HttpError::NoConnectivity` while offline.
    pub fn go_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Inserts an existing category, as if created by an earlier run.
    pub fn seed_category(&self, id: &str, name: &str, parent_id: &str) {
        self.state.lock().unwrap().categories.insert(
            id.to_string(),
            json!({ "id": id, "name": name, "parentId": parent_id }),
        );
    }

    /// Deletes a category, as an operator might between runs.
    pub fn delete_category(&self, id: &str) {
        self.state.lock().unwrap().categories.remove(id);
    }

    /// Number of tokens issued.
    #[must_use]
    pub fn token_requests(&self) -> u32 {
        self.state.lock().unwrap().issued_tokens
    }

    /// Number of `401` answers given to API calls.
    #[must_use]
    pub fn unauthorized_responses(&self) -> u32 {
        self.state.lock().unwrap().unauthorized_responses
    }

    /// Number of `POST /api/category` calls, successful or not.
    #[must_use]
    pub fn category_create_attempts(&self) -> u32 {
        self.state.lock().unwrap().category_create_attempts
    }

    /// Number of categories created through the API.
    #[must_use]
    pub fn created_category_count(&self) -> usize {
        self.state.lock().unwrap().categories.len() - 1
    }

    /// Number of products created through the API.
    #[must_use]
    pub fn created_product_count(&self) -> usize {
        self.state.lock().unwrap().products.len()
    }

    /// Name of a stored category.
    #[must_use]
    pub fn category_name(&self, id: &str) -> Option<String> {
        self.category_field(id, "name")
    }

    /// Parent id of a stored category.
    #[must_use]
    pub fn category_parent(&self, id: &str) -> Option<String> {
        self.category_field(id, "parentId")
    }

    /// Whether a category with this id is stored.
    #[must_use]
    pub fn has_category(&self, id: &str) -> bool {
        self.state.lock().unwrap().categories.contains_key(id)
    }

    /// Media id a stored category shows.
    #[must_use]
    pub fn category_media(&self, id: &str) -> Option<String> {
        self.category_field(id, "mediaId")
    }

    /// A media entity, once bytes were uploaded to it.
    #[must_use]
    pub fn uploaded_media(&self, id: &str) -> Option<UploadedMedia> {
        self.state
            .lock()
            .unwrap()
            .media
            .get(id)
            .filter(|media| !media.bytes.is_empty())
            .cloned()
    }

    /// Number of media entities with uploaded bytes.
    #[must_use]
    pub fn uploaded_media_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .media
            .values()
            .filter(|media| !media.bytes.is_empty())
            .count()
    }

    /// Number of media entities created, with or without bytes.
    #[must_use]
    pub fn media_entity_count(&self) -> usize {
        self.state.lock().unwrap().media.len()
    }

    /// Body a stored product was created with, including later media patches.
    #[must_use]
    pub fn product(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().products.get(id).cloned()
    }

    /// All requests in the order they were received.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Body of the last request sent to `path`.
    #[must_use]
    pub fn last_body_for(&self, path: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .rev()
            .find(|request| request.path() == path)
            .and_then(|request| request.body.clone())
    }

    fn category_field(&self, id: &str, field: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .categories
            .get(id)
            .and_then(|category| category.get(field))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    fn handle(&self, request: &RecordedRequest) -> Result<Value, HttpError> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(HttpError::NoConnectivity);
        }

        let path = request.path().to_string();
        if path == "/api/oauth/token" {
            return state.issue_token(request.body.as_ref());
        }

        state.authorize(request)?;

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (HttpMethod::Get, ["api", "category", id]) => state
                .categories
                .get(*id)
                .map(|category| json!({ "data": category }))
                .ok_or_else(|| not_found("category", id)),
            (HttpMethod::Post, ["api", "search", "category"]) => {
                let name = request
                    .body
                    .as_ref()
                    .and_then(|body| body.pointer("/filter/0/value"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let hits: Vec<Value> = state
                    .categories
                    .values()
                    .filter(|category| category["name"] == name)
                    .cloned()
                    .collect();
                Ok(json!({ "total": hits.len(), "data": hits }))
            }
            (HttpMethod::Get, ["api", "sales-channel", id]) if *id == MOCK_SALES_CHANNEL_ID => {
                Ok(json!({
                    "data": { "id": id, "navigationCategoryId": MOCK_ROOT_CATEGORY_ID }
                }))
            }
            (HttpMethod::Post, ["api", "category"]) => {
                state.category_create_attempts += 1;
                state.take_scripted_failure()?;
                state.create_category(request.body.clone().unwrap_or(Value::Null))
            }
            (HttpMethod::Post, ["api", "product"]) => {
                state.take_scripted_failure()?;
                let id = state.next_entity_id();
                state
                    .products
                    .insert(id.clone(), request.body.clone().unwrap_or(Value::Null));
                Ok(json!({ "data": { "id": id } }))
            }
            (HttpMethod::Patch, ["api", "product", id]) => {
                let product = state
                    .products
                    .get_mut(*id)
                    .ok_or_else(|| not_found("product", id))?;
                if let (Some(stored), Some(Value::Object(changes))) =
                    (product.as_object_mut(), request.body.clone())
                {
                    stored.extend(changes);
                }
                Ok(Value::Null)
            }
            (HttpMethod::Post, ["api", "media"]) => {
                let id = state.next_entity_id();
                let folder_id = request
                    .body
                    .as_ref()
                    .and_then(|body| body.get("mediaFolderId"))
                    .and_then(Value::as_str)
                    .map(ToString::to_string);
                state.media.insert(
                    id.clone(),
                    UploadedMedia {
                        folder_id,
                        ..UploadedMedia::default()
                    },
                );
                Ok(json!({ "data": { "id": id } }))
            }
            (HttpMethod::Post, ["api", "_action", "media", id, "upload"]) => {
                if state.failing_media_uploads > 0 {
                    state.failing_media_uploads -= 1;
                    return Err(status(
                        500,
                        &json!({ "errors": [{ "status": "500", "detail": "Could not store file" }] }),
                    ));
                }
                let media = state
                    .media
                    .get_mut(*id)
                    .ok_or_else(|| not_found("media", id))?;
                media.bytes = request.raw_body.clone().unwrap_or_default();
                media.content_type = request.header("Content-Type");
                media.extension = request.query_param("extension");
                media.file_name = request.query_param("fileName");
                Ok(Value::Null)
            }
            _ => Err(not_found("route", &path)),
        }
    }
}

impl MockState {
    fn issue_token(&mut self, body: Option<&Value>) -> Result<Value, HttpError> {
        let credentials_match = body.is_some_and(|body| {
            body["grant_type"] == "client_credentials"
                && body["client_id"] == MOCK_CLIENT_ID
                && body["client_secret"] == MOCK_CLIENT_SECRET
        });
        if self.credentials_rejected || !credentials_match {
            return Err(status(
                401,
                &json!({ "errors": [{ "code": "9", "title": "Unauthorized" }] }),
            ));
        }
        self.issued_tokens += 1;
        Ok(json!({
            "token_type": "Bearer",
            "expires_in": self.token_lifetime_secs,
            "access_token": format!("token-{}", self.issued_tokens),
        }))
    }

    fn authorize(&mut self, request: &RecordedRequest) -> Result<(), HttpError> {
        let expected = format!("Bearer token-{}", self.issued_tokens);
        let presented = request
            .headers
            .iter()
            .find(|header| header.name == "Authorization")
            .map(|header| header.value.as_str());

        if self.unauthorized_remaining > 0 || presented != Some(expected.as_str()) {
            self.unauthorized_remaining = self.unauthorized_remaining.saturating_sub(1);
            self.unauthorized_responses += 1;
            return Err(status(
                401,
                &json!({ "errors": [{ "code": "9", "title": "Unauthorized" }] }),
            ));
        }
        Ok(())
    }

    fn take_scripted_failure(&mut self) -> Result<(), HttpError> {
        match self.failing_creates.pop_front() {
            Some(code) => Err(status(
                code,
                &json!({ "errors": [{ "status": code.to_string(), "detail": "Internal error" }] }),
            )),
            None => Ok(()),
        }
    }

    fn create_category(&mut self, body: Value) -> Result<Value, HttpError> {
        let parent_id = body["parentId"].as_str().unwrap_or_default().to_string();
        let lagging = self.parent_lag_remaining > 0 && parent_id != MOCK_ROOT_CATEGORY_ID;
        if lagging {
            self.parent_lag_remaining -= 1;
        }
        if lagging || !self.categories.contains_key(&parent_id) {
            return Err(status(
                400,
                &json!({ "errors": [{
                    "code": "FRAMEWORK__WRITE_CONSTRAINT_VIOLATION",
                    "detail": format!("The parentId {parent_id} does not exist."),
                    "source": { "pointer": "/0/parentId" },
                }] }),
            ));
        }

        let id = self.next_entity_id();
        let mut stored = body;
        stored["id"] = json!(id);
        self.categories.insert(id.clone(), stored);
        Ok(json!({ "data": { "id": id } }))
    }

    fn next_entity_id(&mut self) -> String {
        let id = format!("{:032x}", 0x0190_0000_0000_0000_u64 + self.next_id);
        self.next_id += 1;
        id
    }
}

fn status(code: u64, body: &Value) -> HttpError {
    HttpError::BadStatusCode {
        code,
        response_body: body.to_string().into_bytes(),
    }
}

fn not_found(entity: &str, id: &str) -> HttpError {
    status(
        404,
        &json!({ "errors": [{ "status": "404", "detail": format!("No {entity} found for {id}") }] }),
    )
}

#[async_trait::async_trait]
impl HttpClient for MockHttpClient {
    async fn fetch(
        &self,
        url: String,
        method: HttpMethod,
        headers: Vec<HttpHeader>,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, HttpError> {
        let request = RecordedRequest {
            url,
            method,
            headers,
            body: body
                .as_deref()
                .and_then(|bytes| serde_json::from_slice(bytes).ok()),
            raw_body: body,
        };
        let result = self.handle(&request);
        self.state.lock().unwrap().requests.push(request);
        result.map(|value| value.to_string().into_bytes())
    }
}

/// A configuration pointing at the mock, with pacing disabled.
#[must_use]
pub fn test_config() -> MigrationConfig {
    MigrationConfig {
        api_base_url: MOCK_BASE_URL.to_string(),
        client_id: MOCK_CLIENT_ID.to_string(),
        client_secret: MOCK_CLIENT_SECRET.to_string(),
        request_delay_ms: 0,
        tax_id: Some(MOCK_TAX_ID.to_string()),
        ..MigrationConfig::default()
    }
}

/// A legacy category row titled `Category <id>`.
#[must_use]
pub fn category_row(id: &str, parent_id: Option<&str>) -> LegacyCategoryRow {
    LegacyCategoryRow {
        id: Some(id.to_string()),
        parent_id: parent_id.map(ToString::to_string),
        title: Some(format!("Category {id}")),
        active: Some("1".to_string()),
        ..LegacyCategoryRow::default()
    }
}

/// A legacy product row assigned to `category_ids`.
#[must_use]
pub fn product_row(id: &str, category_ids: &[&str]) -> LegacyProductRow {
    LegacyProductRow {
        id: Some(id.to_string()),
        number: Some(format!("SW-{id}")),
        title: Some(format!("Product {id}")),
        price: Some("11.90".to_string()),
        stock: Some("5".to_string()),
        active: Some("1".to_string()),
        category_ids: category_ids.iter().map(ToString::to_string).collect(),
        ..LegacyProductRow::default()
    }
}
