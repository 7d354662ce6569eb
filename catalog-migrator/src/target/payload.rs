use serde_json::{json, Map, Value};

use crate::source::{CategoryRecord, ProductRecord};

/// Removes top-level fields the target rejects when empty: nulls, empty strings and
/// empty arrays or objects. Booleans and numbers are always kept.
#[must_use]
pub fn strip_empty_fields(payload: Value) -> Value {
    match payload {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .filter(|(_, value)| !is_empty_value(value))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Create payload for a category attached below `parent_target_id`, showing the
/// already uploaded `media_id` as its picture.
#[must_use]
pub fn category_payload(
    record: &CategoryRecord,
    parent_target_id: &str,
    media_id: Option<&str>,
) -> Value {
    json!({
        "parentId": parent_target_id,
        "name": record.name,
        "description": record.description,
        "active": record.active,
        "position": record.position,
        "mediaId": media_id,
        "type": "page",
        "productAssignmentType": "product",
        "displayNestedProducts": true,
        "metaTitle": record.meta_title,
        "metaDescription": record.meta_description,
        "keywords": record.keywords,
    })
}

/// File name, extension and mime type the target stores an uploaded picture under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFileName {
    /// File name without extension, restricted to `[A-Za-z0-9_-]`
    pub stem: String,
    /// Lower case extension, `jpg` when the reference has none
    pub extension: String,
    /// Mime type derived from the extension
    pub mime_type: &'static str,
}

impl MediaFileName {
    /// Derives the stored name from a legacy reference such as `thumb/p1010227.JPG` or
    /// `https://shop.example/out/pictures/p1.png?v=2`.
    #[must_use]
    pub fn parse(reference: &str) -> Self {
        let file = reference
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();
        let (stem, extension) = match file.rsplit_once('.') {
            Some((stem, extension))
                if !stem.is_empty()
                    && !extension.is_empty()
                    && extension.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                (stem, extension.to_ascii_lowercase())
            }
            _ => (file, "jpg".to_string()),
        };

        let stem: String = stem
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let mime_type = match extension.as_str() {
            "png" => "image/png",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            _ => "image/jpeg",
        };

        Self {
            stem: if stem.is_empty() { "media".to_string() } else { stem },
            extension,
            mime_type,
        }
    }
}

/// Create payload for an empty media entity, optionally placed in `folder_id`.
#[must_use]
pub fn media_payload(folder_id: Option<&str>) -> Value {
    json!({ "mediaFolderId": folder_id })
}

/// Update payload attaching uploaded media to a product, in the given order.
#[must_use]
pub fn product_media_payload(media_ids: &[String]) -> Value {
    let media: Vec<Value> = media_ids
        .iter()
        .zip(0_u32..)
        .map(|(media_id, position)| json!({ "mediaId": media_id, "position": position }))
        .collect();
    json!({ "media": media })
}

/// Tax and currency settings applied to every product.
#[derive(Debug, Clone)]
pub struct ProductPricing {
    /// Target tax id
    pub tax_id: String,
    /// Target currency id
    pub currency_id: String,
    /// Tax rate in percent, used to derive the net price
    pub tax_rate_percent: f64,
}

impl ProductPricing {
    /// Net price for a gross price.
    #[must_use]
    pub fn net(&self, gross: f64) -> f64 {
        gross / (1.0 + self.tax_rate_percent / 100.0)
    }
}

/// Create payload for a product assigned to `category_target_ids`.
#[must_use]
pub fn product_payload(
    record: &ProductRecord,
    pricing: &ProductPricing,
    category_target_ids: &[String],
) -> Value {
    let categories: Vec<Value> = category_target_ids
        .iter()
        .map(|id| json!({ "id": id }))
        .collect();

    json!({
        "name": record.name,
        "productNumber": record.number,
        "description": record.description,
        "stock": record.stock,
        "active": record.active,
        "taxId": pricing.tax_id,
        "price": [{
            "currencyId": pricing.currency_id,
            "gross": record.price,
            "net": pricing.net(record.price),
            "linked": true,
        }],
        "categories": categories,
    })
}
