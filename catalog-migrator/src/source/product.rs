use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use super::record::{lenient_text, non_blank, parse_flag};
use super::SourceError;
use crate::primitives::config::MigrationConfig;

/// Name given to products whose legacy title is blank.
pub const UNNAMED_PRODUCT: &str = "Unnamed product";

/// Number of picture columns on a legacy article (`OXPIC1` to `OXPIC12`).
pub const MAX_PICTURE_SLOTS: usize = 12;

/// A raw row of the legacy article table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct LegacyProductRow {
    /// Legacy primary key (`OXID`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXID")]
    pub id: Option<String>,
    /// Article number (`OXARTNUM`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXARTNUM")]
    pub number: Option<String>,
    /// Display title (`OXTITLE`)
    #[serde(default, deserialize_with = "lenient_text", alias = "name", alias = "OXTITLE")]
    pub title: Option<String>,
    /// Short description (`OXSHORTDESC`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXSHORTDESC")]
    pub description: Option<String>,
    /// Active flag (`OXACTIVE`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXACTIVE")]
    pub active: Option<String>,
    /// Stock level (`OXSTOCK`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXSTOCK")]
    pub stock: Option<String>,
    /// Gross price (`OXPRICE`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXPRICE")]
    pub price: Option<String>,
    /// Legacy ids of the categories the article is assigned to
    #[serde(default)]
    pub category_ids: Vec<String>,
    /// Picture file names in column order (`OXPIC1` first); blank entries keep their slot
    #[serde(default)]
    pub pictures: Vec<String>,
}

/// A legacy picture reference together with the column it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPicture {
    /// 1-based picture column, also the sub-directory of the legacy picture store
    pub slot: u32,
    /// File name or URL
    pub reference: String,
}

/// A product as read from the legacy shop.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    /// Legacy id, the key of the product mapping
    pub id: String,
    /// Product number; the legacy id when the article number is blank
    pub number: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Whether the product is visible
    pub active: bool,
    /// Stock level, never negative
    pub stock: i64,
    /// Gross price in the configured currency
    pub price: f64,
    /// Legacy category ids, blanks and repeats removed
    pub category_ids: Vec<String>,
    /// Non-blank pictures, in slot order
    pub pictures: Vec<ProductPicture>,
}

impl ProductRecord {
    /// Interprets a legacy row. Returns `None` if the row has no usable id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_row(row: LegacyProductRow) -> Option<Self> {
        let id = non_blank(row.id)?;
        let number = non_blank(row.number).unwrap_or_else(|| id.clone());
        let name = non_blank(row.title).unwrap_or_else(|| UNNAMED_PRODUCT.to_string());
        let active = row
            .active
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(true);
        let stock = row
            .stock
            .as_deref()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .map_or(0, |stock| stock.max(0.0) as i64);
        let price = row
            .price
            .as_deref()
            .and_then(|raw| raw.trim().replace(',', ".").parse::<f64>().ok())
            .filter(|price| price.is_finite() && *price >= 0.0)
            .unwrap_or_else(|| {
                crate::warn!("product_source.missing_price id={id}");
                0.0
            });

        let mut seen = HashSet::new();
        let category_ids = row
            .category_ids
            .into_iter()
            .map(|category_id| category_id.trim().to_string())
            .filter(|category_id| !category_id.is_empty() && seen.insert(category_id.clone()))
            .collect();

        let pictures = row
            .pictures
            .into_iter()
            .take(MAX_PICTURE_SLOTS)
            .zip(1..)
            .filter_map(|(reference, slot)| {
                non_blank(Some(reference)).map(|reference| ProductPicture { slot, reference })
            })
            .collect();

        Some(Self {
            id,
            number,
            name,
            description: non_blank(row.description),
            active,
            stock,
            price,
            category_ids,
            pictures,
        })
    }
}

/// Read-only access to the legacy article table, implemented by the host.
#[uniffi::export(with_foreign)]
pub trait LegacyProductSource: Send + Sync {
    /// Returns every product row in a stable order.
    ///
    /// # Errors
    /// - `SourceError::SourceUnavailable` if the store cannot be reached
    fn fetch_product_rows(&self) -> Result<Vec<LegacyProductRow>, SourceError>;
}

/// A product source over rows that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticProductSource {
    rows: Vec<LegacyProductRow>,
}

impl StaticProductSource {
    /// Wraps `rows`, which are handed out in the given order.
    #[must_use]
    pub const fn new(rows: Vec<LegacyProductRow>) -> Self {
        Self { rows }
    }
}

impl LegacyProductSource for StaticProductSource {
    fn fetch_product_rows(&self) -> Result<Vec<LegacyProductRow>, SourceError> {
        Ok(self.rows.clone())
    }
}

/// Returns a product source over rows the host already fetched.
#[uniffi::export]
#[must_use]
pub fn static_product_source(rows: Vec<LegacyProductRow>) -> Arc<dyn LegacyProductSource> {
    Arc::new(StaticProductSource::new(rows))
}

/// Turns legacy product rows into typed records.
pub struct SourceProductReader {
    source: Arc<dyn LegacyProductSource>,
    limit: Option<usize>,
}

impl SourceProductReader {
    /// Creates a reader honouring the row limit of `config`.
    #[must_use]
    pub fn new(source: Arc<dyn LegacyProductSource>, config: &MigrationConfig) -> Self {
        Self {
            source,
            limit: config.limit.map(|limit| limit as usize),
        }
    }

    /// Reads the whole product table once, dropping rows without an id and repeated ids.
    ///
    /// # Errors
    /// - `SourceError::SourceUnavailable` if the underlying store fails
    pub fn fetch_all(&self) -> Result<Vec<ProductRecord>, SourceError> {
        let rows = self.source.fetch_product_rows()?;
        let row_count = rows.len();

        let mut seen = HashSet::with_capacity(row_count);
        let mut records: Vec<ProductRecord> = rows
            .into_iter()
            .filter_map(ProductRecord::from_row)
            .filter(|record| seen.insert(record.id.clone()))
            .collect();

        if let Some(limit) = self.limit {
            records.truncate(limit);
        }

        if records.len() < row_count {
            crate::warn!(
                "product_source.rows_dropped rows={} records={}",
                row_count,
                records.len()
            );
        }
        crate::info!("product_source.read records={}", records.len());

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_row(id: &str) -> LegacyProductRow {
        LegacyProductRow {
            id: Some(id.to_string()),
            number: Some(format!("SW-{id}")),
            title: Some("Olive soap".to_string()),
            price: Some("11.90".to_string()),
            ..LegacyProductRow::default()
        }
    }

    #[test]
    fn test_product_defaults() {
        let record = ProductRecord::from_row(LegacyProductRow {
            id: Some("p1".to_string()),
            ..LegacyProductRow::default()
        })
        .unwrap();

        assert_eq!(record.number, "p1");
        assert_eq!(record.name, UNNAMED_PRODUCT);
        assert!(record.active);
        assert_eq!(record.stock, 0);
        assert!(record.price.abs() < f64::EPSILON);
        assert!(record.category_ids.is_empty());
    }

    #[test]
    fn test_product_parsing() {
        let mut row = product_row("p1");
        row.price = Some("4,50".to_string());
        row.stock = Some("-3".to_string());
        row.active = Some("0".to_string());
        row.category_ids = vec!["a".to_string(), " ".to_string(), "a".to_string(), "b".to_string()];

        let record = ProductRecord::from_row(row).unwrap();
        assert!((record.price - 4.5).abs() < f64::EPSILON);
        assert_eq!(record.stock, 0);
        assert!(!record.active);
        assert_eq!(record.category_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_pictures_keep_their_slot() {
        let mut row = product_row("p1");
        row.pictures = vec![
            "front.jpg".to_string(),
            String::new(),
            " back.png ".to_string(),
        ];
        row.pictures.extend((4..=14).map(|slot| format!("extra-{slot}.jpg")));

        let record = ProductRecord::from_row(row).unwrap();
        assert_eq!(record.pictures.len(), 11);
        assert_eq!(
            record.pictures[0],
            ProductPicture {
                slot: 1,
                reference: "front.jpg".to_string()
            }
        );
        assert_eq!(record.pictures[1].slot, 3);
        assert_eq!(record.pictures[1].reference, "back.png");
        assert_eq!(record.pictures.last().unwrap().slot, 12);
    }

    #[test]
    fn test_reader_drops_duplicates_and_applies_limit() {
        let config = MigrationConfig {
            limit: Some(2),
            ..MigrationConfig::default()
        };
        let reader = SourceProductReader::new(
            Arc::new(StaticProductSource::new(vec![
                product_row("p1"),
                product_row("p1"),
                LegacyProductRow::default(),
                product_row("p2"),
                product_row("p3"),
            ])),
            &config,
        );

        let ids: Vec<String> = reader
            .fetch_all()
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn test_row_deserializes_legacy_columns() {
        let row: LegacyProductRow = serde_json::from_str(
            r#"{"OXID": "p1", "OXARTNUM": "1402", "OXTITLE": "Soap", "OXPRICE": 9.5, "OXSTOCK": 12, "categoryIds": ["a"]}"#,
        )
        .unwrap();
        let record = ProductRecord::from_row(row).unwrap();
        assert_eq!(record.number, "1402");
        assert_eq!(record.stock, 12);
        assert!((record.price - 9.5).abs() < f64::EPSILON);
        assert_eq!(record.category_ids, vec!["a".to_string()]);
    }
}
