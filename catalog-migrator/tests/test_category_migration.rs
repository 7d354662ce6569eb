use std::sync::Arc;

use catalog_migrator::{
    source::{JsonExportSource, StaticCategorySource},
    test_utils::{category_row, MOCK_ROOT_CATEGORY_ID, MOCK_SALES_CHANNEL_ID},
    MigrationConfig, MigrationError, RootAnchor,
};
use serde_json::Value;

mod common;
use common::Workspace;

const EXPORT: &str = r#"[
    {"OXID": "shoes", "OXPARENTID": "oxrootid", "OXTITLE": "Shoes", "OXACTIVE": 1, "OXSORT": 2},
    {"OXID": "boots", "OXPARENTID": "shoes", "OXTITLE": "Boots", "OXACTIVE": "1", "OXDESC": "Sturdy"},
    {"OXID": "winter", "OXPARENTID": "boots", "OXTITLE": "  ", "OXACTIVE": "0"},
    {"OXID": "sale", "OXPARENTID": "", "OXTITLE": "Sale", "OXACTIVE": "1"},
    {"OXID": "lost", "OXPARENTID": "deleted-long-ago", "OXTITLE": "Lost", "OXACTIVE": "1"}
]"#;

#[tokio::test]
async fn test_export_file_is_migrated_and_checkpointed() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    workspace.write("export/categories.json", EXPORT);
    let source = Arc::new(JsonExportSource::new(
        workspace.filesystem(),
        "export/categories.json",
    ));

    let report = workspace.engine(workspace.config(), source, None).run().await?;

    assert_eq!(report.total, 5);
    assert_eq!(report.created, 4);
    assert_eq!(report.orphan_ids, vec!["lost".to_string()]);
    assert!(!report.is_complete());

    let mapping = workspace.read_mapping("var/category_map.json");
    assert_eq!(mapping.len(), 4);
    assert_eq!(
        workspace.mock.category_parent(&mapping["shoes"]).as_deref(),
        Some(MOCK_ROOT_CATEGORY_ID)
    );
    assert_eq!(
        workspace.mock.category_parent(&mapping["sale"]).as_deref(),
        Some(MOCK_ROOT_CATEGORY_ID)
    );
    assert_eq!(
        workspace.mock.category_parent(&mapping["winter"]),
        Some(mapping["boots"].clone())
    );
    assert_eq!(
        workspace.mock.category_name(&mapping["winter"]).as_deref(),
        Some("Unnamed category")
    );

    let orphans: Value = common::read_json(&workspace.path("var/category_orphans.json"));
    assert_eq!(orphans[0]["id"], "lost");
    assert_eq!(orphans[0]["parentId"], "deleted-long-ago");

    // The mapping file is written atomically; no temporary file stays behind.
    assert!(!workspace.path("var/category_map.json.tmp").exists());
    Ok(())
}

#[tokio::test]
async fn test_partial_run_is_resumed() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let rows = vec![
        category_row("a", None),
        category_row("b", Some("a")),
        category_row("c", Some("b")),
        category_row("d", Some("a")),
    ];

    let first = MigrationConfig {
        limit: Some(2),
        ..workspace.config()
    };
    let report = workspace
        .engine(first, Arc::new(StaticCategorySource::new(rows.clone())), None)
        .run()
        .await?;
    assert_eq!(report.created, 2);
    let after_first = workspace.read_mapping("var/category_map.json");

    let report = workspace
        .engine(
            workspace.config(),
            Arc::new(StaticCategorySource::new(rows)),
            None,
        )
        .run()
        .await?;

    assert_eq!(report.skipped, 2);
    assert_eq!(report.created, 2);
    assert_eq!(workspace.mock.created_category_count(), 4);

    let mapping = workspace.read_mapping("var/category_map.json");
    assert_eq!(mapping["a"], after_first["a"]);
    assert_eq!(workspace.mock.category_parent(&mapping["c"]), Some(mapping["b"].clone()));
    Ok(())
}

#[tokio::test]
async fn test_orphan_report_removed_once_resolved() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let orphan_only = vec![category_row("a", None), category_row("b", Some("late"))];
    workspace
        .engine(
            workspace.config(),
            Arc::new(StaticCategorySource::new(orphan_only.clone())),
            None,
        )
        .run()
        .await?;
    assert!(workspace.path("var/category_orphans.json").exists());

    let mut complete = orphan_only;
    complete.push(category_row("late", None));
    let report = workspace
        .engine(
            workspace.config(),
            Arc::new(StaticCategorySource::new(complete)),
            None,
        )
        .run()
        .await?;

    assert!(report.is_complete());
    assert_eq!(report.orphan_report_path, None);
    assert!(!workspace.path("var/category_orphans.json").exists());
    Ok(())
}

#[tokio::test]
async fn test_sales_channel_anchor() -> anyhow::Result<()> {
    let workspace = Workspace::new();
    let config = MigrationConfig {
        root_anchor: RootAnchor::SalesChannel {
            id: MOCK_SALES_CHANNEL_ID.to_string(),
        },
        ..workspace.config()
    };

    let report = workspace
        .engine(
            config,
            Arc::new(StaticCategorySource::new(vec![category_row("a", None)])),
            None,
        )
        .run()
        .await?;

    assert_eq!(report.created, 1);
    let mapping = workspace.read_mapping("var/category_map.json");
    assert_eq!(
        workspace.mock.category_parent(&mapping["a"]).as_deref(),
        Some(MOCK_ROOT_CATEGORY_ID)
    );
    Ok(())
}

#[tokio::test]
async fn test_unreadable_export_fails_before_contacting_target() {
    let workspace = Workspace::new();
    workspace.write("export/categories.json", "[{\"OXID\": ");
    let source = Arc::new(JsonExportSource::new(
        workspace.filesystem(),
        "export/categories.json",
    ));

    let err = workspace
        .engine(workspace.config(), source, None)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::Source(_)));
    assert!(err.to_string().contains("export/categories.json"));
    assert!(workspace.mock.requests().is_empty());
}
