//! Version Manager - creation, publishing and cloning of rule versions
//!
//! Owns the two structural invariants of the version model:
//! - version numbers are assigned max+1 per rule and never reused
//! - at most one version per rule is Published at any instant
//!
//! Publishing runs in a single transaction so concurrent publishes against
//! the same rule serialize instead of interleaving.

use crate::error::{Result, RuleCenterError};
use crate::repository::{now_rfc3339, RuleStore};
use crate::tree;
use crate::types::{
    NewAction, NewRule, NewVersion, RuleDetail, RuleStatus, RuleVersion, RuleVersionDetail,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Manages the version lifecycle of rules in a store
#[derive(Clone)]
pub struct VersionManager {
    store: RuleStore,
}

impl VersionManager {
    pub fn new(store: RuleStore) -> Self {
        Self { store }
    }

    /// Create a new Draft version of a rule.
    ///
    /// The version number is the rule's current maximum plus one (1 for the
    /// first version). Conditions are flattened parent-first and persisted
    /// with the version; actions keep their given order.
    pub async fn create_version(
        &self,
        rule_id: &str,
        input: &NewVersion,
        actor: &str,
    ) -> Result<RuleVersionDetail> {
        self.store.get_rule(rule_id).await?;

        let version_id = Uuid::new_v4().to_string();
        let condition_rows = tree::flatten(&version_id, &input.conditions)?;

        let next = self.store.max_version(rule_id).await? + 1;
        let version = RuleVersion {
            id: version_id,
            rule_id: rule_id.to_string(),
            version: next,
            config_json: input.config_json.clone(),
            description: input.description.clone(),
            status: RuleStatus::Draft,
            published_at: None,
            published_by: None,
            created_by: Some(actor.to_string()),
            created_at: now_rfc3339(),
        };

        self.store.insert_version(&version).await?;
        self.store.insert_conditions(&condition_rows).await?;
        let actions = self.store.insert_actions(&version.id, &input.actions).await?;

        info!("Created version {} of rule {}", next, rule_id);
        Ok(RuleVersionDetail {
            version,
            conditions: tree::nest(condition_rows)?,
            actions,
        })
    }

    /// Publish a version: demote any Published sibling to Offline, mark the
    /// target Published and repoint the rule, all in one transaction.
    pub async fn publish_version(&self, rule_id: &str, version_id: &str, actor: &str) -> Result<()> {
        let now = now_rfc3339();
        let mut tx = self.store.pool().begin().await?;

        let rule_exists = sqlx::query("SELECT 1 AS hit FROM rules WHERE id = ?")
            .bind(rule_id)
            .fetch_optional(&mut *tx)
            .await?;
        if rule_exists.is_none() {
            return Err(RuleCenterError::NotFound(format!("rule {}", rule_id)));
        }

        let version_owned = sqlx::query("SELECT 1 AS hit FROM rule_versions WHERE id = ? AND rule_id = ?")
            .bind(version_id)
            .bind(rule_id)
            .fetch_optional(&mut *tx)
            .await?;
        if version_owned.is_none() {
            return Err(RuleCenterError::NotFound(format!(
                "version {} of rule {}",
                version_id, rule_id
            )));
        }

        sqlx::query("UPDATE rule_versions SET status = ? WHERE rule_id = ? AND status = ?")
            .bind(RuleStatus::Offline.as_i64())
            .bind(rule_id)
            .bind(RuleStatus::Published.as_i64())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE rule_versions
            SET status = ?, published_at = ?, published_by = ?
            WHERE id = ?
            "#,
        )
        .bind(RuleStatus::Published.as_i64())
        .bind(&now)
        .bind(actor)
        .bind(version_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE rules
            SET current_version_id = ?, status = ?, updated_by = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(version_id)
        .bind(RuleStatus::Published.as_i64())
        .bind(actor)
        .bind(&now)
        .bind(rule_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Published version {} of rule {}", version_id, rule_id);
        Ok(())
    }

    /// Republish an older version.
    ///
    /// Indistinguishable from publishing any other version; the old
    /// configuration is re-flagged as current, nothing is reverted.
    pub async fn rollback_version(
        &self,
        rule_id: &str,
        version_id: &str,
        actor: &str,
    ) -> Result<()> {
        self.publish_version(rule_id, version_id, actor).await
    }

    /// Clone a rule into a new Draft named "<original> - Copy".
    ///
    /// Scalar fields are copied; when the source has versions, the most
    /// recent one's conditions and actions become version 1 of the clone.
    /// Publish state is not copied.
    pub async fn clone_rule(&self, rule_id: &str, actor: &str) -> Result<RuleDetail> {
        let source = self.store.get_rule_detail(rule_id).await?;

        let copy = self
            .store
            .create_rule(
                &NewRule {
                    name: format!("{} - Copy", source.rule.name),
                    description: source.rule.description.clone(),
                    rule_type: source.rule.rule_type.clone(),
                    business_type: source.rule.business_type.clone(),
                    priority: source.rule.priority,
                },
                actor,
            )
            .await?;

        // list_version_details is newest-first, so the head is the latest
        if let Some(latest) = source.versions.first() {
            let actions = latest
                .actions
                .iter()
                .map(|a| NewAction {
                    action_type: a.action_type.clone(),
                    config_json: a.config_json.clone(),
                })
                .collect();

            self.create_version(
                &copy.id,
                &NewVersion {
                    config_json: latest.version.config_json.clone(),
                    description: Some(format!(
                        "Copied from \"{}\" v{}",
                        source.rule.name, latest.version.version
                    )),
                    conditions: latest.conditions.clone(),
                    actions,
                },
                actor,
            )
            .await?;
        }

        debug!("Cloned rule {} into {}", rule_id, copy.id);
        self.store.get_rule_detail(&copy.id).await
    }

    /// Store this manager operates on
    pub fn store(&self) -> &RuleStore {
        &self.store
    }
}
