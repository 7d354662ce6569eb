use std::time::Duration;

use chrono::Utc;

use super::error::MigrationResult;
use super::media::{log_would_upload, MediaUploader};
use super::pass::DRY_RUN_PREFIX;
use super::report::{count, FailedRecord, ProductReport};
use crate::mapping::{Mapping, MappingStore};
use crate::source::{MediaKind, ProductRecord};
use crate::target::{product_payload, ProductPricing, TargetClient};

/// The flat product phase: every product is created once, after the categories. Its
/// pictures are uploaded and attached once the product exists.
pub(super) struct ProductMigration<'a> {
    pub target: &'a TargetClient,
    pub media: &'a MediaUploader<'a>,
    pub store: &'a MappingStore,
    pub category_mapping: &'a Mapping,
    pub pricing: ProductPricing,
    pub dry_run: bool,
    pub checkpoint_each_create: bool,
    pub request_delay: Duration,
}

impl ProductMigration<'_> {
    /// Creates every product not yet in `product_mapping`, in source order.
    pub(super) async fn run(
        &self,
        products: Vec<ProductRecord>,
        mut product_mapping: Mapping,
    ) -> MigrationResult<ProductReport> {
        let started = Utc::now();
        let mut report = ProductReport {
            total: count(products.len()),
            dry_run: self.dry_run,
            mapping_path: self.store.path().to_string(),
            ..ProductReport::default()
        };

        crate::info!(
            "product_run.started products={} mapped={} dry_run={} timestamp={}",
            products.len(),
            product_mapping.len(),
            self.dry_run,
            started.to_rfc3339()
        );

        for product in products {
            if product_mapping.contains(&product.id) {
                report.skipped += 1;
                continue;
            }

            let category_target_ids = self.category_targets(&product, &mut report);

            if self.dry_run {
                crate::info!(
                    "product.would_create id={} number={} categories={}",
                    product.id,
                    product.number,
                    category_target_ids.len()
                );
                for picture in &product.pictures {
                    log_would_upload(
                        &product.id,
                        MediaKind::ProductPicture { slot: picture.slot },
                        &picture.reference,
                    );
                }
                product_mapping.insert(
                    product.id.clone(),
                    format!("{DRY_RUN_PREFIX}{}", product.id),
                );
                report.created += 1;
                continue;
            }

            let payload = product_payload(&product, &self.pricing, &category_target_ids);
            let result = self.target.create_product(payload).await;
            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            match result {
                Ok(target_id) => {
                    crate::info!(
                        "product.created id={} number={} target_id={}",
                        product.id,
                        product.number,
                        target_id
                    );
                    product_mapping.insert(product.id.clone(), target_id.clone());
                    report.created += 1;
                    if self.checkpoint_each_create {
                        self.store.save(&product_mapping)?;
                    }
                    self.attach_pictures(&product, &target_id).await?;
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    crate::error!("product.create_failed id={} error={}", product.id, e);
                    report.failures.push(FailedRecord {
                        id: product.id,
                        cause: e.to_string(),
                    });
                }
            }
        }

        report.failed = count(report.failures.len());
        (report.media_uploaded, report.media_failed) = self.media.counts().await;
        if !self.dry_run {
            self.store.save(&product_mapping)?;
        }

        crate::info!(
            "product_run.completed created={} skipped={} failed={} unmapped_category_refs={} duration_ms={} timestamp={}",
            report.created,
            report.skipped,
            report.failed,
            report.unmapped_category_refs,
            (Utc::now() - started).num_milliseconds(),
            Utc::now().to_rfc3339()
        );

        Ok(report)
    }

    /// Uploads the product's pictures in slot order and attaches those that made it.
    /// Failures leave the product without the affected pictures.
    async fn attach_pictures(
        &self,
        product: &ProductRecord,
        target_id: &str,
    ) -> MigrationResult<()> {
        let mut media_ids = Vec::with_capacity(product.pictures.len());
        for picture in &product.pictures {
            let kind = MediaKind::ProductPicture { slot: picture.slot };
            if let Some(media_id) = self
                .media
                .upload(&product.id, kind, &picture.reference)
                .await?
            {
                media_ids.push(media_id);
            }
        }
        if media_ids.is_empty() {
            return Ok(());
        }

        match self.target.attach_product_media(target_id, &media_ids).await {
            Ok(()) => {
                crate::info!(
                    "product.media_attached id={} target_id={} count={}",
                    product.id,
                    target_id,
                    media_ids.len()
                );
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                crate::error!("product.media_attach_failed id={} error={}", product.id, e);
                Ok(())
            }
        }
    }

    /// Target ids of the product's categories; unmigrated categories are left out.
    fn category_targets(&self, product: &ProductRecord, report: &mut ProductReport) -> Vec<String> {
        product
            .category_ids
            .iter()
            .filter_map(|category_id| {
                let target = self.category_mapping.get(category_id);
                if target.is_none() {
                    report.unmapped_category_refs += 1;
                    crate::warn!(
                        "product.category_unmapped id={} category_id={}",
                        product.id,
                        category_id
                    );
                }
                target.map(ToString::to_string)
            })
            .collect()
    }
}
