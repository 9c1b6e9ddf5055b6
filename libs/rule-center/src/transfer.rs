//! Import / Export Engine - bulk rule serialization and ingestion
//!
//! Export renders selected rules (or all of them) as a JSON document, a
//! one-row-per-rule CSV summary, or structured tables for a workbook
//! renderer. Import ingests a batch of rule payloads sequentially with a
//! per-row conflict strategy; row failures are collected into the returned
//! report instead of aborting the batch.

use crate::error::{Result, RuleCenterError};
use crate::types::{
    ConflictStrategy, Export, ExportDocument, ExportFormat, ExportedRule, ExportedVersion,
    ImportReport, ImportedRule, NewAction, NewRule, RuleDetail, RuleImport, RuleUpdate,
    TabularExport, Table,
};
use crate::repository::RuleStore;
use crate::versions::VersionManager;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{info, warn};

/// Bulk import/export over a rule store
#[derive(Clone)]
pub struct ImportExportEngine {
    store: RuleStore,
    versions: VersionManager,
}

/// Per-row import outcome, before report accounting
enum RowOutcome {
    Imported(ImportedRule),
    Skipped(String),
}

impl ImportExportEngine {
    pub fn new(store: RuleStore) -> Self {
        let versions = VersionManager::new(store.clone());
        Self { store, versions }
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Export the given rules in the requested format.
    ///
    /// An empty `rule_ids` list means all rules; ids that do not resolve
    /// are skipped.
    pub async fn export(&self, rule_ids: &[String], format: ExportFormat) -> Result<Export> {
        let details = self.collect(rule_ids).await?;

        match format {
            ExportFormat::Json => Ok(Export::Json(build_document(&details))),
            ExportFormat::Csv => Ok(Export::Csv(build_csv(&details)?)),
            ExportFormat::Tabular => Ok(Export::Tabular(self.build_tabular(&details).await?)),
        }
    }

    async fn collect(&self, rule_ids: &[String]) -> Result<Vec<RuleDetail>> {
        let mut details = Vec::new();

        if rule_ids.is_empty() {
            for rule in self.store.list_all_rules().await? {
                details.push(self.store.get_rule_detail(&rule.id).await?);
            }
        } else {
            for id in rule_ids {
                match self.store.get_rule_detail(id).await {
                    Ok(detail) => details.push(detail),
                    Err(RuleCenterError::NotFound(_)) => continue,
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(details)
    }

    async fn build_tabular(&self, details: &[RuleDetail]) -> Result<TabularExport> {
        let mut rule_rows = Vec::new();
        let mut version_rows = Vec::new();
        let mut condition_rows = Vec::new();

        for detail in details {
            let rule = &detail.rule;
            rule_rows.push(vec![
                rule.id.clone(),
                rule.name.clone(),
                rule.description.clone().unwrap_or_default(),
                rule.rule_type.clone(),
                rule.business_type.clone().unwrap_or_default(),
                rule.priority.to_string(),
                rule.status.as_str().to_string(),
            ]);

            for version_detail in &detail.versions {
                let version = &version_detail.version;
                version_rows.push(vec![
                    rule.id.clone(),
                    rule.name.clone(),
                    version.version.to_string(),
                    version.status.as_str().to_string(),
                    version.description.clone().unwrap_or_default(),
                    version.published_at.clone().unwrap_or_default(),
                    version.published_by.clone().unwrap_or_default(),
                ]);

                // Conditions go out in the flat parent-indexed form
                for row in self.store.conditions_for_version(&version.id).await? {
                    condition_rows.push(vec![
                        rule.id.clone(),
                        version.version.to_string(),
                        row.id.clone(),
                        row.parent_id.clone().unwrap_or_default(),
                        row.condition_type.clone().unwrap_or_default(),
                        row.field.clone().unwrap_or_default(),
                        row.operator.clone().unwrap_or_default(),
                        row.value
                            .as_ref()
                            .map(|v| v.to_json().to_string())
                            .unwrap_or_default(),
                        row.value
                            .as_ref()
                            .map(|v| v.value_type().as_str().to_string())
                            .unwrap_or_default(),
                        row.logic_type.map(|l| l.as_str().to_string()).unwrap_or_default(),
                        row.sort_order.to_string(),
                    ]);
                }
            }
        }

        // Tables with zero rows are omitted
        let mut tables = Vec::new();
        if !rule_rows.is_empty() {
            tables.push(Table {
                name: "rules".to_string(),
                headers: csv_headers(),
                rows: rule_rows,
            });
        }
        if !version_rows.is_empty() {
            tables.push(Table {
                name: "versions".to_string(),
                headers: vec![
                    "Rule ID".to_string(),
                    "Rule Name".to_string(),
                    "Version".to_string(),
                    "Status".to_string(),
                    "Description".to_string(),
                    "Published At".to_string(),
                    "Published By".to_string(),
                ],
                rows: version_rows,
            });
        }
        if !condition_rows.is_empty() {
            tables.push(Table {
                name: "conditions".to_string(),
                headers: vec![
                    "Rule ID".to_string(),
                    "Version".to_string(),
                    "Condition ID".to_string(),
                    "Parent ID".to_string(),
                    "Condition Type".to_string(),
                    "Field".to_string(),
                    "Operator".to_string(),
                    "Value".to_string(),
                    "Value Type".to_string(),
                    "Logic Type".to_string(),
                    "Sort Order".to_string(),
                ],
                rows: condition_rows,
            });
        }

        Ok(TabularExport { tables })
    }

    // ========================================================================
    // Import
    // ========================================================================

    /// Ingest a batch of rule payloads, one at a time.
    ///
    /// The batch is strictly sequential so the `rename` strategy sees names
    /// assigned earlier in the same batch. A row failure is recorded in the
    /// report and the batch continues; partial success is the normal
    /// outcome.
    pub async fn import_rules(
        &self,
        rules: &[RuleImport],
        actor: &str,
        strategy: ConflictStrategy,
    ) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut batch_names: HashSet<String> = HashSet::new();

        for (index, row) in rules.iter().enumerate() {
            match self.import_row(row, actor, strategy, &batch_names).await {
                Ok(RowOutcome::Imported(imported)) => {
                    batch_names.insert(imported.name.clone());
                    report.success += 1;
                    report.imported.push(imported);
                }
                Ok(RowOutcome::Skipped(message)) => {
                    report.errors.push(message);
                }
                Err(err) => {
                    warn!("Import row {} failed: {}", index + 1, err);
                    report.failed += 1;
                    report.errors.push(format!("row {}: {}", index + 1, err));
                }
            }
        }

        info!(
            "Import finished: {} succeeded, {} failed, {} messages",
            report.success,
            report.failed,
            report.errors.len()
        );
        Ok(report)
    }

    async fn import_row(
        &self,
        row: &RuleImport,
        actor: &str,
        strategy: ConflictStrategy,
        batch_names: &HashSet<String>,
    ) -> Result<RowOutcome> {
        if row.name.trim().is_empty() || row.rule_type.trim().is_empty() {
            return Err(RuleCenterError::Validation(
                "missing required field (name, ruleType)".to_string(),
            ));
        }

        let existing = self.store.find_rule_by_name(&row.name).await?;
        let target = match existing {
            None => {
                self.store
                    .create_rule(&new_rule_payload(row, &row.name), actor)
                    .await?
            }
            Some(existing) => match strategy {
                ConflictStrategy::Skip => {
                    return Ok(RowOutcome::Skipped(format!(
                        "rule \"{}\" already exists, skipped",
                        row.name
                    )));
                }
                ConflictStrategy::Overwrite => {
                    let patch = RuleUpdate {
                        description: row.description.clone(),
                        rule_type: Some(row.rule_type.clone()),
                        business_type: row.business_type.clone(),
                        priority: row.priority,
                        ..Default::default()
                    };
                    self.store.update_rule(&existing.id, &patch, actor).await?
                }
                ConflictStrategy::Rename => {
                    let free_name = self.next_free_name(&row.name, batch_names).await?;
                    self.store
                        .create_rule(&new_rule_payload(row, &free_name), actor)
                        .await?
                }
            },
        };

        // Versions ride along without auto-publish
        for version in &row.versions {
            self.versions.create_version(&target.id, version, actor).await?;
        }

        Ok(RowOutcome::Imported(ImportedRule {
            id: target.id,
            name: target.name,
        }))
    }

    /// Smallest n such that "<name> (<n>)" is free against both the store
    /// and names already assigned earlier in this batch
    async fn next_free_name(&self, name: &str, batch_names: &HashSet<String>) -> Result<String> {
        let mut n = 1;
        loop {
            let candidate = format!("{} ({})", name, n);
            if !batch_names.contains(&candidate) && !self.store.rule_name_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

fn new_rule_payload(row: &RuleImport, name: &str) -> NewRule {
    NewRule {
        name: name.to_string(),
        description: row.description.clone(),
        rule_type: row.rule_type.clone(),
        business_type: row.business_type.clone(),
        priority: row.priority.unwrap_or(0),
    }
}

fn csv_headers() -> Vec<String> {
    [
        "ID",
        "Name",
        "Description",
        "Rule Type",
        "Business Type",
        "Priority",
        "Status",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn build_document(details: &[RuleDetail]) -> ExportDocument {
    let rules = details
        .iter()
        .map(|detail| ExportedRule {
            id: detail.rule.id.clone(),
            name: detail.rule.name.clone(),
            description: detail.rule.description.clone(),
            rule_type: detail.rule.rule_type.clone(),
            business_type: detail.rule.business_type.clone(),
            priority: detail.rule.priority,
            status: detail.rule.status,
            versions: detail
                .versions
                .iter()
                .map(|v| ExportedVersion {
                    version: v.version.version,
                    description: v.version.description.clone(),
                    status: v.version.status,
                    conditions: v.conditions.clone(),
                    actions: v
                        .actions
                        .iter()
                        .map(|a| NewAction {
                            action_type: a.action_type.clone(),
                            config_json: a.config_json.clone(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect::<Vec<_>>();

    ExportDocument {
        export_time: Utc::now().to_rfc3339(),
        total: rules.len(),
        rules,
    }
}

fn build_csv(details: &[RuleDetail]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(csv_headers())
        .map_err(|e| RuleCenterError::Serialization(e.to_string()))?;

    for detail in details {
        let rule = &detail.rule;
        let priority = rule.priority.to_string();
        writer
            .write_record([
                rule.id.as_str(),
                rule.name.as_str(),
                rule.description.as_deref().unwrap_or(""),
                rule.rule_type.as_str(),
                rule.business_type.as_deref().unwrap_or(""),
                priority.as_str(),
                rule.status.as_str(),
            ])
            .map_err(|e| RuleCenterError::Serialization(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| RuleCenterError::Serialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| RuleCenterError::Serialization(e.to_string()))
}
