use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Name given to categories whose legacy title is blank.
pub const UNNAMED_CATEGORY: &str = "Unnamed category";

/// A raw row of the legacy category table.
///
/// Every column is optional text because that is what the legacy driver hands back;
/// [`CategoryRecord::from_row`] does the interpretation. When deserialized from a JSON
/// export, numbers and booleans are accepted and turned into their text form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCategoryRow {
    /// Legacy primary key (`OXID`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXID")]
    pub id: Option<String>,
    /// Legacy parent key (`OXPARENTID`); empty or a root sentinel for top-level rows
    #[serde(default, deserialize_with = "lenient_text", alias = "OXPARENTID")]
    pub parent_id: Option<String>,
    /// Display title (`OXTITLE`)
    #[serde(default, deserialize_with = "lenient_text", alias = "name", alias = "OXTITLE")]
    pub title: Option<String>,
    /// Short description (`OXDESC`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXDESC")]
    pub description: Option<String>,
    /// Long description (`OXLONGDESC`), preferred over the short one
    #[serde(default, deserialize_with = "lenient_text", alias = "OXLONGDESC")]
    pub long_description: Option<String>,
    /// Active flag (`OXACTIVE`), usually `1` or `0`
    #[serde(default, deserialize_with = "lenient_text", alias = "OXACTIVE")]
    pub active: Option<String>,
    /// Sort position (`OXSORT`)
    #[serde(default, deserialize_with = "lenient_text", alias = "position", alias = "OXSORT")]
    pub sort: Option<String>,
    /// Search keywords (`OXKEYWORDS`)
    #[serde(default, deserialize_with = "lenient_text", alias = "metaKeywords", alias = "OXKEYWORDS")]
    pub keywords: Option<String>,
    /// SEO title
    #[serde(default, deserialize_with = "lenient_text")]
    pub meta_title: Option<String>,
    /// SEO description
    #[serde(default, deserialize_with = "lenient_text")]
    pub meta_description: Option<String>,
    /// Thumbnail file name or URL (`OXTHUMB`)
    #[serde(default, deserialize_with = "lenient_text", alias = "OXTHUMB")]
    pub thumbnail: Option<String>,
}

/// A category as read from the legacy shop, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    /// Legacy id, the key of the mapping
    pub id: String,
    /// Legacy id of the parent, `None` for top-level categories
    pub parent_id: Option<String>,
    /// Display name
    pub name: String,
    /// Description, possibly empty
    pub description: String,
    /// Whether the category is visible
    pub active: bool,
    /// Sort position among siblings
    pub position: i32,
    /// SEO title
    pub meta_title: Option<String>,
    /// SEO description
    pub meta_description: Option<String>,
    /// Search keywords
    pub keywords: Option<String>,
    /// Legacy thumbnail reference, uploaded before the category is created
    pub thumbnail: Option<String>,
}

impl CategoryRecord {
    /// Interprets a legacy row. Returns `None` if the row has no usable id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_row(row: LegacyCategoryRow, root_sentinels: &[String]) -> Option<Self> {
        let id = non_blank(row.id)?;

        let parent_id = non_blank(row.parent_id).filter(|parent| {
            !root_sentinels
                .iter()
                .any(|sentinel| sentinel.eq_ignore_ascii_case(parent))
        });

        let name = non_blank(row.title).unwrap_or_else(|| UNNAMED_CATEGORY.to_string());

        let description = non_blank(row.long_description)
            .or_else(|| non_blank(row.description))
            .unwrap_or_default();

        let active = row.active.as_deref().map_or(true, |raw| {
            parse_flag(raw).unwrap_or_else(|| {
                crate::warn!(
                    "category_source.unparseable_flag id={id} column=active value={raw:?}"
                );
                true
            })
        });

        let position = row
            .sort
            .as_deref()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .map_or(0, |sort| sort as i32);

        Some(Self {
            id,
            parent_id,
            name,
            description,
            active,
            position,
            meta_title: non_blank(row.meta_title),
            meta_description: non_blank(row.meta_description),
            keywords: non_blank(row.keywords),
            thumbnail: non_blank(row.thumbnail),
        })
    }

    /// Whether this category has no parent dependency.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Trims the value and drops it if nothing is left.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses the flag spellings legacy exports use.
pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Accepts strings, numbers and booleans and yields their text form.
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(Value::Bool(flag)) => Some(if flag { "1" } else { "0" }.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinels() -> Vec<String> {
        vec!["oxrootid".to_string()]
    }

    fn row(id: &str) -> LegacyCategoryRow {
        LegacyCategoryRow {
            id: Some(id.to_string()),
            title: Some("Soaps".to_string()),
            ..LegacyCategoryRow::default()
        }
    }

    #[test]
    fn test_root_sentinel_and_empty_parent_mean_root() {
        let mut sentinel = row("a");
        sentinel.parent_id = Some("oxrootid".to_string());
        let mut empty = row("b");
        empty.parent_id = Some("  ".to_string());
        let mut child = row("c");
        child.parent_id = Some("a".to_string());

        assert!(CategoryRecord::from_row(sentinel, &sentinels()).unwrap().is_root());
        assert!(CategoryRecord::from_row(empty, &sentinels()).unwrap().is_root());
        assert_eq!(
            CategoryRecord::from_row(child, &sentinels()).unwrap().parent_id,
            Some("a".to_string())
        );
    }

    #[test]
    fn test_defaults_for_sparse_row() {
        let record = CategoryRecord::from_row(
            LegacyCategoryRow {
                id: Some(" 943a9ba3050e78b443c16e043ae60ef3 ".to_string()),
                ..LegacyCategoryRow::default()
            },
            &sentinels(),
        )
        .unwrap();

        assert_eq!(record.id, "943a9ba3050e78b443c16e043ae60ef3");
        assert_eq!(record.name, UNNAMED_CATEGORY);
        assert_eq!(record.description, "");
        assert!(record.active);
        assert_eq!(record.position, 0);
        assert_eq!(record.meta_title, None);
    }

    #[test]
    fn test_long_description_preferred() {
        let mut both = row("a");
        both.description = Some("short".to_string());
        both.long_description = Some("<p>long</p>".to_string());
        assert_eq!(
            CategoryRecord::from_row(both, &sentinels()).unwrap().description,
            "<p>long</p>"
        );

        let mut short_only = row("b");
        short_only.description = Some("short".to_string());
        assert_eq!(
            CategoryRecord::from_row(short_only, &sentinels()).unwrap().description,
            "short"
        );
    }

    #[test]
    fn test_flags_and_positions() {
        let mut inactive = row("a");
        inactive.active = Some("0".to_string());
        inactive.sort = Some("120".to_string());
        let record = CategoryRecord::from_row(inactive, &sentinels()).unwrap();
        assert!(!record.active);
        assert_eq!(record.position, 120);

        let mut odd = row("b");
        odd.active = Some("maybe".to_string());
        odd.sort = Some("n/a".to_string());
        let record = CategoryRecord::from_row(odd, &sentinels()).unwrap();
        assert!(record.active);
        assert_eq!(record.position, 0);
    }

    #[test]
    fn test_fractional_and_huge_sort_values_clamp() {
        let position = |sort: &str| {
            let mut row = row("a");
            row.sort = Some(sort.to_string());
            CategoryRecord::from_row(row, &sentinels()).unwrap().position
        };
        assert_eq!(position("7.9"), 7);
        assert_eq!(position("-2.5"), -2);
        assert_eq!(position("1e12"), i32::MAX);
        assert_eq!(position("-1e12"), i32::MIN);
    }

    #[test]
    fn test_blank_id_is_rejected() {
        assert!(CategoryRecord::from_row(row("   "), &sentinels()).is_none());
    }

    #[test]
    fn test_row_deserializes_from_export_shapes() {
        let rows: Vec<LegacyCategoryRow> = serde_json::from_str(
            r#"[
                {"id": "a", "parentId": null, "name": "Soaps", "active": 1, "position": 3, "metaKeywords": "soap"},
                {"OXID": "b", "OXPARENTID": "a", "OXTITLE": "Bars", "OXACTIVE": "0", "OXSORT": "10"}
            ]"#,
        )
        .unwrap();

        assert_eq!(rows[0].title.as_deref(), Some("Soaps"));
        assert_eq!(rows[0].active.as_deref(), Some("1"));
        assert_eq!(rows[0].sort.as_deref(), Some("3"));
        assert_eq!(rows[0].keywords.as_deref(), Some("soap"));
        assert_eq!(rows[1].id.as_deref(), Some("b"));
        assert_eq!(rows[1].parent_id.as_deref(), Some("a"));

        let bars = CategoryRecord::from_row(rows[1].clone(), &sentinels()).unwrap();
        assert!(!bars.active);
        assert_eq!(bars.position, 10);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = CategoryRecord::from_row(row("a"), &sentinels()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["parentId"], Value::Null);
        assert_eq!(json["metaTitle"], Value::Null);
        assert_eq!(json["name"], "Soaps");
    }
}
