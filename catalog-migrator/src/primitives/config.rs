use serde::{Deserialize, Serialize};

/// Shopware's built-in default currency (EUR).
pub const DEFAULT_CURRENCY_ID: &str = "b7d2554b0ce847cd82f3ac9bd1c0dfca";

/// Parent value the legacy shop uses for top-level categories.
pub const DEFAULT_ROOT_SENTINEL: &str = "oxrootid";

const DEFAULT_MAX_PASSES: u32 = 10;
const DEFAULT_REQUEST_DELAY_MS: u64 = 100;
const DEFAULT_TOKEN_REFRESH_MARGIN_SECS: u64 = 60;
const DEFAULT_TAX_RATE_PERCENT: f64 = 19.0;
const REDACTED: &str = "********";

/// How the target category that anchors the migrated tree is located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum RootAnchor {
    /// A known target category id (verified to exist before the run)
    CategoryId {
        /// Target category id
        id: String,
    },
    /// The first target category with this exact name
    CategoryName {
        /// Category name, e.g. `Home`
        name: String,
    },
    /// The navigation root category of a sales channel
    SalesChannel {
        /// Sales channel id
        id: String,
    },
}

impl RootAnchor {
    fn value(&self) -> &str {
        match self {
            Self::CategoryId { id } | Self::SalesChannel { id } => id,
            Self::CategoryName { name } => name,
        }
    }
}

impl Default for RootAnchor {
    fn default() -> Self {
        Self::CategoryName {
            name: "Home".to_string(),
        }
    }
}

impl std::fmt::Display for RootAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CategoryId { id } => write!(f, "category id {id}"),
            Self::CategoryName { name } => write!(f, "category named '{name}'"),
            Self::SalesChannel { id } => write!(f, "navigation root of sales channel {id}"),
        }
    }
}

/// Errors raised while parsing or validating a `MigrationConfig`.
#[crate::migrator_error]
pub enum ConfigError {
    /// The configuration document could not be parsed
    #[error("invalid configuration document: {message}")]
    Parse {
        /// Parser message
        message: String,
    },
    /// A field holds a value the migrator cannot work with
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a migration run needs to know.
///
/// Hosts usually build this from their own settings store; `from_json` accepts a JSON
/// document where every field except the API coordinates has a default.
#[derive(Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct MigrationConfig {
    /// Base URL of the target shop, e.g. `https://shop.example`
    pub api_base_url: String,
    /// OAuth client id (integration access key)
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Where migrated top-level categories are attached
    pub root_anchor: RootAnchor,
    /// Parent values that mean "no parent" besides the empty string
    pub root_sentinels: Vec<String>,
    /// Upper bound on dependent passes; guarantees termination on cyclic input
    pub max_passes: u32,
    /// Pause between create calls to stay under the target's rate limits
    pub request_delay_ms: u64,
    /// Tokens closer than this to expiry are refreshed before a request
    pub token_refresh_margin_secs: u64,
    /// Category mapping checkpoint
    pub mapping_path: String,
    /// Diagnostic dump of categories whose parent never resolved
    pub orphan_report_path: String,
    /// Product mapping checkpoint
    pub product_mapping_path: String,
    /// Walk the hierarchy and report, without creating or persisting anything
    pub dry_run: bool,
    /// Only migrate the first `limit` source rows
    pub limit: Option<u32>,
    /// Look up mapped targets and re-create those that were deleted on the target
    pub verify_existing_targets: bool,
    /// Persist the mapping after every successful create instead of only at run end
    pub checkpoint_each_create: bool,
    /// Currency used for product prices
    pub currency_id: String,
    /// Tax id assigned to migrated products; required for product migration
    pub tax_id: Option<String>,
    /// Tax rate used to derive net prices from legacy gross prices
    pub tax_rate_percent: f64,
    /// Upload category thumbnails and product pictures when a media source is attached
    pub migrate_media: bool,
    /// Target media folder uploads are placed in; the target's default folder when unset
    pub media_folder_id: Option<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            root_anchor: RootAnchor::default(),
            root_sentinels: vec![DEFAULT_ROOT_SENTINEL.to_string()],
            max_passes: DEFAULT_MAX_PASSES,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            token_refresh_margin_secs: DEFAULT_TOKEN_REFRESH_MARGIN_SECS,
            mapping_path: "var/category_map.json".to_string(),
            orphan_report_path: "var/category_orphans.json".to_string(),
            product_mapping_path: "var/product_map.json".to_string(),
            dry_run: false,
            limit: None,
            verify_existing_targets: true,
            checkpoint_each_create: true,
            currency_id: DEFAULT_CURRENCY_ID.to_string(),
            tax_id: None,
            tax_rate_percent: DEFAULT_TAX_RATE_PERCENT,
            migrate_media: true,
            media_folder_id: None,
        }
    }
}

impl std::fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("api_base_url", &self.api_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("root_anchor", &self.root_anchor)
            .field("max_passes", &self.max_passes)
            .field("request_delay_ms", &self.request_delay_ms)
            .field("mapping_path", &self.mapping_path)
            .field("dry_run", &self.dry_run)
            .field("limit", &self.limit)
            .field("migrate_media", &self.migrate_media)
            .finish_non_exhaustive()
    }
}

impl MigrationConfig {
    /// Parses a JSON configuration document. Missing fields take their defaults.
    ///
    /// # Errors
    /// - `ConfigError::Parse` if the document is not valid JSON for this shape
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(document).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Checks that the configuration can drive a category run.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("api_base_url is required".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api_base_url must start with http:// or https://, got '{url}'"
            )));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("client_id is required".into()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("client_secret is required".into()));
        }
        if self.root_anchor.value().trim().is_empty() {
            return Err(ConfigError::Invalid(
                "root_anchor must name a category or sales channel".into(),
            ));
        }
        if self.max_passes == 0 {
            return Err(ConfigError::Invalid(
                "max_passes must be at least 1".into(),
            ));
        }
        if self.mapping_path.trim().is_empty() {
            return Err(ConfigError::Invalid("mapping_path is required".into()));
        }
        if self.mapping_path == self.product_mapping_path {
            return Err(ConfigError::Invalid(
                "mapping_path and product_mapping_path must differ".into(),
            ));
        }
        Ok(())
    }

    /// Checks the extra settings product migration depends on.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first offending field
    pub fn validate_for_products(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.tax_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "tax_id is required for product migration".into(),
            ));
        }
        if self.currency_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "currency_id is required for product migration".into(),
            ));
        }
        if !(0.0..100.0).contains(&self.tax_rate_percent) {
            return Err(ConfigError::Invalid(format!(
                "tax_rate_percent must be in [0, 100), got {}",
                self.tax_rate_percent
            )));
        }
        Ok(())
    }

    /// Returns a copy that is safe to log or display: the client secret is masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            client_secret: REDACTED.to_string(),
            ..self.clone()
        }
    }

    /// Whether `parent_id` is one of the configured "no parent" markers.
    #[must_use]
    pub fn is_root_sentinel(&self, parent_id: &str) -> bool {
        self.root_sentinels
            .iter()
            .any(|sentinel| sentinel.eq_ignore_ascii_case(parent_id))
    }
}
