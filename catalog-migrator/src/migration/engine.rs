use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::error::{MigrationError, MigrationResult};
use super::media::MediaUploader;
use super::pass::{
    classify, find_orphans, run_pass, ApiCategoryWriter, CategoryWriter, DryRunWriter,
    PassContext, PassOutcome, PassScope, PassState, Resolution,
};
use super::products::ProductMigration;
use super::report::{count, FailedRecord, MigrationReport, ProductReport};
use crate::mapping::{Mapping, MappingStore};
use crate::primitives::config::MigrationConfig;
use crate::primitives::filesystem::FileSystem;
use crate::primitives::http_client::HttpClient;
use crate::source::{
    CategoryRecord, LegacyCategorySource, LegacyProductSource, MediaSource, SourceCategoryReader,
    SourceProductReader,
};
use crate::target::{ProductPricing, TargetClient, TargetError};

/// Drives a migration run: reads the legacy catalog, resolves the category hierarchy in
/// dependency order against the target API and keeps the mapping checkpoint current.
///
/// ## Resumability
///
/// The mapping file is the only state that survives a run. Every record found in it is
/// skipped without calling the target, so a run that was interrupted (or that left
/// orphans behind) can simply be started again.
///
/// ## Concurrency
///
/// One engine runs one thing at a time. Starting `run` or `migrate_products` while another
/// call is in flight fails immediately with `MigrationError::InvalidOperation`.
#[derive(uniffi::Object)]
pub struct MigrationEngine {
    config: MigrationConfig,
    category_source: Arc<dyn LegacyCategorySource>,
    product_source: Option<Arc<dyn LegacyProductSource>>,
    media_source: Option<Arc<dyn MediaSource>>,
    target: TargetClient,
    category_store: MappingStore,
    product_store: MappingStore,
    run_lock: Mutex<()>,
}

#[crate::migrator_export]
impl MigrationEngine {
    /// Creates an engine after validating `config`. Pictures are only migrated when a
    /// `media_source` is given.
    ///
    /// # Errors
    /// - `MigrationError::Config` if the configuration cannot drive a run
    #[uniffi::constructor]
    pub fn new(
        config: MigrationConfig,
        category_source: Arc<dyn LegacyCategorySource>,
        product_source: Option<Arc<dyn LegacyProductSource>>,
        media_source: Option<Arc<dyn MediaSource>>,
        http_client: Arc<dyn HttpClient>,
        filesystem: Arc<dyn FileSystem>,
    ) -> Result<Arc<Self>, MigrationError> {
        config.validate()?;
        Ok(Self::with_components(
            config,
            category_source,
            product_source,
            media_source,
            http_client,
            filesystem,
        ))
    }

    /// Migrates the category tree.
    ///
    /// Loads the mapping, reads the legacy categories, authenticates and resolves the root
    /// anchor, then creates the missing categories root pass first and dependent passes
    /// after, up to `max_passes`. The mapping is saved at the end (and after every create
    /// unless checkpointing is turned off); orphans are dumped when there are any.
    ///
    /// # Errors
    /// - `MigrationError::InvalidOperation` if a run is already in progress
    /// - `MigrationError::Source` if the legacy source cannot be read
    /// - `MigrationError::Mapping` if the mapping is corrupt or cannot be saved
    /// - `MigrationError::Target` on authentication failure or a missing root category
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let _guard = self.try_exclusive()?;
        self.run_categories().await
    }

    /// Migrates products after the categories, attaching each to the target categories its
    /// legacy category references map to.
    ///
    /// # Errors
    /// - `MigrationError::InvalidOperation` if no product source was given or a run is in
    ///   progress
    /// - `MigrationError::Config` if tax settings are missing
    /// - `MigrationError::Source`, `MigrationError::Mapping`, `MigrationError::Target` as
    ///   for `run`
    pub async fn migrate_products(&self) -> Result<ProductReport, MigrationError> {
        let _guard = self.try_exclusive()?;
        self.run_products().await
    }

    /// Authenticates and resolves the root anchor without creating anything. Returns the
    /// target id of the root category.
    ///
    /// # Errors
    /// - `MigrationError::Target` if authentication or the root lookup fails
    pub async fn check_connection(&self) -> Result<String, MigrationError> {
        self.target.authenticate().await?;
        let root_target_id = self.target.resolve_root_category_id().await?;
        crate::info!(
            "connection.checked root_target_id={} timestamp={}",
            root_target_id,
            Utc::now().to_rfc3339()
        );
        Ok(root_target_id)
    }

    /// The configuration in use, with the client secret masked.
    #[must_use]
    pub fn redacted_config(&self) -> MigrationConfig {
        self.config.redacted()
    }
}

impl MigrationEngine {
    /// Creates an engine without validating the configuration.
    #[must_use]
    pub fn with_components(
        config: MigrationConfig,
        category_source: Arc<dyn LegacyCategorySource>,
        product_source: Option<Arc<dyn LegacyProductSource>>,
        media_source: Option<Arc<dyn MediaSource>>,
        http_client: Arc<dyn HttpClient>,
        filesystem: Arc<dyn FileSystem>,
    ) -> Arc<Self> {
        let target = TargetClient::new(http_client, &config);
        let category_store = MappingStore::new(filesystem.clone(), config.mapping_path.clone())
            .with_orphan_report(config.orphan_report_path.clone());
        let product_store = MappingStore::new(filesystem, config.product_mapping_path.clone());

        Arc::new(Self {
            config,
            category_source,
            product_source,
            media_source,
            target,
            category_store,
            product_store,
            run_lock: Mutex::new(()),
        })
    }

    fn try_exclusive(&self) -> MigrationResult<tokio::sync::MutexGuard<'_, ()>> {
        self.run_lock.try_lock().map_err(|_| {
            MigrationError::InvalidOperation(
                "A migration is already in progress on this engine.".to_string(),
            )
        })
    }

    /// Dry runs make no create calls, so they are not paced.
    fn request_delay(&self) -> Duration {
        if self.config.dry_run {
            Duration::ZERO
        } else {
            Duration::from_millis(self.config.request_delay_ms)
        }
    }

    fn media_uploader(&self) -> MediaUploader<'_> {
        let source = self
            .media_source
            .as_deref()
            .filter(|_| self.config.migrate_media);
        let folder_id = self
            .config
            .media_folder_id
            .as_deref()
            .filter(|id| !id.trim().is_empty());
        MediaUploader::new(&self.target, source, folder_id)
    }

    async fn run_categories(&self) -> MigrationResult<MigrationReport> {
        let started = Utc::now();
        let dry_run = self.config.dry_run;

        crate::info!(
            "category_run.started dry_run={} max_passes={} timestamp={}",
            dry_run,
            self.config.max_passes,
            started.to_rfc3339()
        );

        let mapping = self.category_store.load()?;
        let records =
            SourceCategoryReader::new(self.category_source.clone(), &self.config).fetch_all()?;

        self.target.authenticate().await?;
        let root_target_id = self.target.resolve_root_category_id().await?;

        let stale = if self.config.verify_existing_targets {
            self.find_stale_targets(&records, &mapping).await?
        } else {
            HashSet::new()
        };

        let mut report = MigrationReport {
            total: count(records.len()),
            dry_run,
            stale_mappings: count(stale.len()),
            mapping_path: self.category_store.path().to_string(),
            ..MigrationReport::default()
        };

        let (already_mapped, pending): (Vec<CategoryRecord>, Vec<CategoryRecord>) =
            records.into_iter().partition(|record| {
                classify(record, &mapping, &stale, &root_target_id) == Resolution::AlreadyMapped
            });
        report.skipped = count(already_mapped.len());

        let media = self.media_uploader();
        let api_writer = ApiCategoryWriter {
            target: &self.target,
            media: &media,
        };
        let writer: &dyn CategoryWriter = if dry_run { &DryRunWriter } else { &api_writer };
        let ctx = PassContext {
            writer,
            root_target_id: &root_target_id,
            checkpoint: (!dry_run && self.config.checkpoint_each_create)
                .then_some(&self.category_store),
            request_delay: self.request_delay(),
        };

        let mut failures: Vec<FailedRecord> = Vec::new();
        let state = PassState {
            pending,
            mapping,
            stale,
        };

        let (mut state, outcome) = run_pass(state, PassScope::RootsOnly, &ctx).await?;
        report.passes = 1;
        Self::absorb(&mut report, &mut failures, outcome, "root", state.pending.len());

        for pass in 1..=self.config.max_passes {
            if state.pending.is_empty() {
                break;
            }
            let (next, outcome) = run_pass(state, PassScope::All, &ctx).await?;
            state = next;
            report.passes += 1;
            let fixed_point = outcome.is_fixed_point();
            Self::absorb(
                &mut report,
                &mut failures,
                outcome,
                &pass.to_string(),
                state.pending.len(),
            );
            if fixed_point {
                crate::debug!("category_run.fixed_point pass={pass}");
                break;
            }
        }

        let orphans = find_orphans(&state);
        let orphan_ids: HashSet<&str> = orphans.iter().map(|r| r.id.as_str()).collect();
        failures.extend(
            state
                .pending
                .iter()
                .filter(|record| !orphan_ids.contains(record.id.as_str()))
                .map(|record| FailedRecord {
                    id: record.id.clone(),
                    cause: format!(
                        "still rejected by the target after {} passes",
                        report.passes
                    ),
                }),
        );

        report.orphaned = count(orphans.len());
        report.orphan_ids = orphans.iter().map(|r| r.id.clone()).collect();
        report.failed = count(failures.len());
        report.failures = failures;
        (report.media_uploaded, report.media_failed) = media.counts().await;

        if dry_run {
            crate::info!(
                "category_run.dry_run_complete would_create={} mapping_untouched=true",
                report.created
            );
        } else {
            self.category_store.save(&state.mapping)?;
            report.orphan_report_path = self.category_store.record_orphans(&orphans);
        }

        crate::info!(
            "category_run.completed total={} created={} skipped={} orphaned={} failed={} passes={} media_uploaded={} media_failed={} duration_ms={} timestamp={}",
            report.total,
            report.created,
            report.skipped,
            report.orphaned,
            report.failed,
            report.passes,
            report.media_uploaded,
            report.media_failed,
            (Utc::now() - started).num_milliseconds(),
            Utc::now().to_rfc3339()
        );

        Ok(report)
    }

    async fn run_products(&self) -> MigrationResult<ProductReport> {
        self.config.validate_for_products()?;
        let Some(source) = self.product_source.clone() else {
            return Err(MigrationError::InvalidOperation(
                "No legacy product source was configured.".to_string(),
            ));
        };

        let category_mapping = self.category_store.load()?;
        let product_mapping = self.product_store.load()?;
        let products = SourceProductReader::new(source, &self.config).fetch_all()?;

        self.target.authenticate().await?;

        let media = self.media_uploader();
        let migration = ProductMigration {
            target: &self.target,
            media: &media,
            store: &self.product_store,
            category_mapping: &category_mapping,
            pricing: ProductPricing {
                tax_id: self.config.tax_id.clone().unwrap_or_default(),
                currency_id: self.config.currency_id.clone(),
                tax_rate_percent: self.config.tax_rate_percent,
            },
            dry_run: self.config.dry_run,
            checkpoint_each_create: self.config.checkpoint_each_create,
            request_delay: self.request_delay(),
        };
        migration.run(products, product_mapping).await
    }

    /// Legacy ids whose mapped target no longer exists.
    ///
    /// Lookup failures other than authentication leave the entry trusted.
    async fn find_stale_targets(
        &self,
        records: &[CategoryRecord],
        mapping: &Mapping,
    ) -> MigrationResult<HashSet<String>> {
        let mut stale = HashSet::new();
        for record in records {
            let Some(target_id) = mapping.get(&record.id) else {
                continue;
            };
            match self.target.category_exists(target_id).await {
                Ok(true) => {}
                Ok(false) => {
                    crate::warn!(
                        "mapping.stale_entry id={} target_id={} action=recreate",
                        record.id,
                        target_id
                    );
                    stale.insert(record.id.clone());
                }
                Err(e @ TargetError::AuthenticationFailed { .. }) => return Err(e.into()),
                Err(e) => {
                    crate::warn!(
                        "mapping.verify_failed id={} target_id={} error={} action=trust",
                        record.id,
                        target_id,
                        e
                    );
                }
            }
        }
        Ok(stale)
    }

    fn absorb(
        report: &mut MigrationReport,
        failures: &mut Vec<FailedRecord>,
        outcome: PassOutcome,
        pass: &str,
        pending: usize,
    ) {
        crate::info!(
            "category_pass.completed pass={} created={} retryable={} abandoned={} pending={}",
            pass,
            outcome.created.len(),
            outcome.retryable.len(),
            outcome.abandoned.len(),
            pending
        );
        report.created += count(outcome.created.len());
        failures.extend(outcome.abandoned);
    }
}
