//! Integration tests for bulk import and export
//!
//! Exercises the three conflict strategies, partial-success reporting and
//! the JSON/CSV/tabular output shapes, using in-memory SQLite.

use rule_center::{
    ConditionNode, ConflictStrategy, Export, ExportFormat, ImportExportEngine, LogicType,
    NewAction, NewVersion, Result, RuleImport, RuleStatus, RuleStore, ValueType, VersionManager,
};
use serde_json::json;

const ACTOR: &str = "importer";

async fn setup() -> (RuleStore, ImportExportEngine) {
    let store = RuleStore::connect_in_memory()
        .await
        .expect("Failed to create in-memory store");
    let engine = ImportExportEngine::new(store.clone());
    (store, engine)
}

fn leaf(field: &str, value: serde_json::Value, vt: ValueType) -> ConditionNode {
    ConditionNode {
        condition_type: Some("expression".to_string()),
        field: Some(field.to_string()),
        operator: Some("eq".to_string()),
        value: Some(value),
        value_type: Some(vt),
        logic_type: None,
        children: vec![],
    }
}

fn import_row(name: &str) -> RuleImport {
    RuleImport {
        name: name.to_string(),
        description: Some("imported".to_string()),
        rule_type: "pricing".to_string(),
        business_type: None,
        priority: Some(5),
        versions: vec![NewVersion {
            config_json: json!({ "source": "import" }),
            description: Some("imported version".to_string()),
            conditions: vec![leaf("order.total", json!(100), ValueType::Number)],
            actions: vec![NewAction {
                action_type: "discount".to_string(),
                config_json: json!({ "percent": 10 }),
            }],
        }],
    }
}

#[tokio::test]
async fn test_import_creates_rules_and_versions() -> Result<()> {
    let (store, engine) = setup().await;

    let report = engine
        .import_rules(
            &[import_row("Alpha"), import_row("Beta")],
            ACTOR,
            ConflictStrategy::Skip,
        )
        .await?;

    assert_eq!(report.success, 2);
    assert_eq!(report.failed, 0);
    assert!(report.errors.is_empty());
    assert_eq!(report.imported.len(), 2);

    let alpha = store.find_rule_by_name("Alpha").await?.expect("Alpha missing");
    assert_eq!(alpha.status, RuleStatus::Draft);
    assert_eq!(alpha.priority, 5);

    // Versions ride along but are never auto-published
    let versions = store.list_versions(&alpha.id).await?;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, 1);
    assert_eq!(versions[0].status, RuleStatus::Draft);
    assert!(alpha.current_version_id.is_none());

    Ok(())
}

#[tokio::test]
async fn test_import_skip_leaves_store_untouched() -> Result<()> {
    let (store, engine) = setup().await;

    engine
        .import_rules(
            &[import_row("Alpha"), import_row("Beta")],
            ACTOR,
            ConflictStrategy::Skip,
        )
        .await?;

    // Re-import the same names: nothing counted, nothing created
    let report = engine
        .import_rules(
            &[import_row("Alpha"), import_row("Beta")],
            ACTOR,
            ConflictStrategy::Skip,
        )
        .await?;

    assert_eq!(report.success, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors.iter().all(|e| e.contains("already exists")));
    assert!(report.imported.is_empty());

    let alpha = store.find_rule_by_name("Alpha").await?.expect("Alpha missing");
    assert_eq!(
        store.list_versions(&alpha.id).await?.len(),
        1,
        "skip must not add versions to the existing rule"
    );

    Ok(())
}

#[tokio::test]
async fn test_import_overwrite_updates_in_place() -> Result<()> {
    let (store, engine) = setup().await;

    engine
        .import_rules(&[import_row("Alpha")], ACTOR, ConflictStrategy::Skip)
        .await?;
    let original = store.find_rule_by_name("Alpha").await?.expect("Alpha missing");

    let mut replacement = import_row("Alpha");
    replacement.description = Some("replaced".to_string());
    replacement.priority = Some(42);

    let report = engine
        .import_rules(&[replacement], ACTOR, ConflictStrategy::Overwrite)
        .await?;
    assert_eq!(report.success, 1);

    let updated = store.find_rule_by_name("Alpha").await?.expect("Alpha missing");
    assert_eq!(updated.id, original.id, "identity must be preserved");
    assert_eq!(updated.description.as_deref(), Some("replaced"));
    assert_eq!(updated.priority, 42);

    // The supplied version lands on the existing rule
    assert_eq!(store.list_versions(&updated.id).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_import_rename_allocates_fresh_names() -> Result<()> {
    let (store, engine) = setup().await;

    // Same row twice in one batch: second occurrence is renamed
    let report = engine
        .import_rules(
            &[import_row("Alpha"), import_row("Alpha")],
            ACTOR,
            ConflictStrategy::Rename,
        )
        .await?;
    assert_eq!(report.success, 2);

    assert!(store.find_rule_by_name("Alpha").await?.is_some());
    assert!(store.find_rule_by_name("Alpha (1)").await?.is_some());

    // A later batch keeps counting upward
    let report = engine
        .import_rules(&[import_row("Alpha")], ACTOR, ConflictStrategy::Rename)
        .await?;
    assert_eq!(report.success, 1);
    assert!(store.find_rule_by_name("Alpha (2)").await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_import_collects_row_failures() -> Result<()> {
    let (store, engine) = setup().await;

    let mut missing_type = import_row("Broken");
    missing_type.rule_type = String::new();
    let mut missing_name = import_row("");

    missing_name.versions.clear();

    let report = engine
        .import_rules(
            &[missing_type, import_row("Survivor"), missing_name],
            ACTOR,
            ConflictStrategy::Skip,
        )
        .await?;

    assert_eq!(report.success, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].starts_with("row 1:"));
    assert!(report.errors[1].starts_with("row 3:"));
    assert!(store.find_rule_by_name("Survivor").await?.is_some());

    Ok(())
}

#[tokio::test]
async fn test_export_format_validation() {
    assert!(ExportFormat::parse("json").is_ok());
    assert!(ExportFormat::parse("csv").is_ok());
    assert!(ExportFormat::parse("tabular").is_ok());

    let err = ExportFormat::parse("xlsx").unwrap_err();
    assert!(err.is_validation(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_export_json_document() -> Result<()> {
    let (store, engine) = setup().await;
    let manager = VersionManager::new(store.clone());

    engine
        .import_rules(
            &[import_row("Alpha"), import_row("Beta")],
            ACTOR,
            ConflictStrategy::Skip,
        )
        .await?;

    // Second version on Alpha so ordering is observable
    let alpha = store.find_rule_by_name("Alpha").await?.expect("Alpha missing");
    manager
        .create_version(
            &alpha.id,
            &NewVersion {
                config_json: json!({}),
                description: Some("second".to_string()),
                conditions: vec![],
                actions: vec![],
            },
            ACTOR,
        )
        .await?;

    let export = engine.export(&[], ExportFormat::Json).await?;
    let document = match export {
        Export::Json(document) => document,
        other => panic!("expected JSON export, got {other:?}"),
    };

    assert_eq!(document.total, 2);
    assert_eq!(document.rules.len(), 2);

    let alpha_doc = document
        .rules
        .iter()
        .find(|r| r.name == "Alpha")
        .expect("Alpha missing from export");
    assert_eq!(
        alpha_doc.versions.iter().map(|v| v.version).collect::<Vec<_>>(),
        vec![2, 1],
        "versions export newest first"
    );
    assert_eq!(alpha_doc.versions[1].conditions.len(), 1);
    assert_eq!(alpha_doc.versions[1].actions.len(), 1);

    // Unknown ids are skipped, not fatal
    let export = engine
        .export(
            &[alpha.id.clone(), "no-such-rule".to_string()],
            ExportFormat::Json,
        )
        .await?;
    match export {
        Export::Json(document) => assert_eq!(document.total, 1),
        other => panic!("expected JSON export, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn test_export_json_round_trips_through_import() -> Result<()> {
    let (store, engine) = setup().await;

    let mut row = import_row("Round Trip");
    row.versions[0].conditions = vec![ConditionNode {
        condition_type: Some("group".to_string()),
        logic_type: Some(LogicType::Or),
        children: vec![
            leaf("order.total", json!(100), ValueType::Number),
            leaf("order.city", json!("berlin"), ValueType::String),
        ],
        ..Default::default()
    }];
    engine
        .import_rules(&[row.clone()], ACTOR, ConflictStrategy::Skip)
        .await?;

    let document = match engine.export(&[], ExportFormat::Json).await? {
        Export::Json(document) => document,
        other => panic!("expected JSON export, got {other:?}"),
    };

    // The exported rules deserialize straight back into import payloads
    let payload: Vec<RuleImport> =
        serde_json::from_value(serde_json::to_value(&document.rules).unwrap()).unwrap();

    let (fresh_store, fresh_engine) = setup().await;
    let report = fresh_engine
        .import_rules(&payload, ACTOR, ConflictStrategy::Skip)
        .await?;
    assert_eq!(report.success, 1);

    let reborn = fresh_store
        .find_rule_by_name("Round Trip")
        .await?
        .expect("rule missing after round trip");
    let detail = fresh_store.get_rule_detail(&reborn.id).await?;
    assert_eq!(detail.versions.len(), 1);
    assert_eq!(detail.versions[0].conditions, row.versions[0].conditions);

    Ok(())
}

#[tokio::test]
async fn test_export_csv_summary() -> Result<()> {
    let (store, engine) = setup().await;
    let manager = VersionManager::new(store.clone());

    engine
        .import_rules(&[import_row("Csv Rule")], ACTOR, ConflictStrategy::Skip)
        .await?;
    let rule = store.find_rule_by_name("Csv Rule").await?.expect("missing");
    let version = &store.list_versions(&rule.id).await?[0];
    manager.publish_version(&rule.id, &version.id, ACTOR).await?;

    let csv = match engine.export(&[], ExportFormat::Csv).await? {
        Export::Csv(csv) => csv,
        other => panic!("expected CSV export, got {other:?}"),
    };

    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("ID,Name,Description,Rule Type,Business Type,Priority,Status")
    );
    let row = lines.next().expect("missing data row");
    assert!(row.contains("Csv Rule"));
    assert!(row.ends_with("Published"));
    assert_eq!(lines.next(), None, "one row per rule, no version detail");

    Ok(())
}

#[tokio::test]
async fn test_export_tabular_flattens_conditions() -> Result<()> {
    let (store, engine) = setup().await;

    // 1 group + 2 leaves: 3 condition nodes total
    let mut row = import_row("Tabular Rule");
    row.versions[0].conditions = vec![ConditionNode {
        condition_type: Some("group".to_string()),
        logic_type: Some(LogicType::And),
        children: vec![
            leaf("order.total", json!(100), ValueType::Number),
            leaf("user.vip", json!(true), ValueType::Boolean),
        ],
        ..Default::default()
    }];
    engine
        .import_rules(&[row], ACTOR, ConflictStrategy::Skip)
        .await?;
    let rule = store.find_rule_by_name("Tabular Rule").await?.expect("missing");

    let tabular = match engine.export(&[], ExportFormat::Tabular).await? {
        Export::Tabular(tabular) => tabular,
        other => panic!("expected tabular export, got {other:?}"),
    };

    assert_eq!(
        tabular.tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        vec!["rules", "versions", "conditions"]
    );

    let conditions = tabular
        .tables
        .iter()
        .find(|t| t.name == "conditions")
        .expect("conditions table missing");
    assert_eq!(conditions.rows.len(), 3);
    assert!(conditions.rows.iter().all(|r| r[0] == rule.id && r[1] == "1"));

    Ok(())
}

#[tokio::test]
async fn test_export_tabular_omits_empty_tables() -> Result<()> {
    let (store, engine) = setup().await;

    // A rule with no versions produces only the rule summary table
    store
        .create_rule(
            &rule_center::NewRule {
                name: "Bare".to_string(),
                description: None,
                rule_type: "pricing".to_string(),
                business_type: None,
                priority: 0,
            },
            ACTOR,
        )
        .await?;

    let tabular = match engine.export(&[], ExportFormat::Tabular).await? {
        Export::Tabular(tabular) => tabular,
        other => panic!("expected tabular export, got {other:?}"),
    };

    assert_eq!(
        tabular.tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        vec!["rules"]
    );

    Ok(())
}
