//! Rule Store - SQLite persistence for rules, versions, conditions, actions
//!
//! All reads hydrate rows into typed entities; all composite lookups go
//! through here. Components receive the store explicitly, there is no
//! global database handle.

use crate::error::{Result, RuleCenterError};
use crate::schema;
use crate::tree;
use crate::types::{
    ActionRow, ConditionRow, ConditionValue, NewAction, NewRule, Rule, RuleDetail, RuleFilter,
    RuleStatus, RuleUpdate, RuleVersion, RuleVersionDetail, ValueType,
};
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous},
    Row, SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Current time in the RFC 3339 TEXT form the tables store
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Persistence-facing store for rule data
#[derive(Clone)]
pub struct RuleStore {
    pool: SqlitePool,
}

impl RuleStore {
    /// Open (or create) a database file and initialize the schema.
    ///
    /// Uses WAL journal mode and a busy timeout, with foreign keys enforced
    /// so deletes cascade.
    pub async fn connect(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RuleCenterError::Database(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        schema::init_schema(&pool).await?;

        info!("Rule store connected: {}", db_path.as_ref().display());
        Ok(Self { pool })
    }

    /// In-memory store, used by tests and demos.
    ///
    /// A single connection keeps every caller on the same in-memory
    /// database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| RuleCenterError::Database(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        schema::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool; the schema is assumed to be initialized
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool (for transactions and peer components)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Rules
    // ========================================================================

    /// Create a rule as Draft with no versions
    pub async fn create_rule(&self, input: &NewRule, actor: &str) -> Result<Rule> {
        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO rules (id, name, description, rule_type, business_type, priority,
                               status, created_by, updated_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.rule_type)
        .bind(&input.business_type)
        .bind(input.priority)
        .bind(RuleStatus::Draft.as_i64())
        .bind(actor)
        .bind(actor)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!("Created rule {} ({})", input.name, id);
        self.get_rule(&id).await
    }

    /// Get a rule by id
    pub async fn get_rule(&self, id: &str) -> Result<Rule> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, rule_type, business_type, priority, status,
                   current_version_id, created_by, updated_by, created_at, updated_at
            FROM rules
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => hydrate_rule(row),
            None => Err(RuleCenterError::NotFound(format!("rule {}", id))),
        }
    }

    /// Get a rule with all its versions, conditions and actions
    pub async fn get_rule_detail(&self, id: &str) -> Result<RuleDetail> {
        let rule = self.get_rule(id).await?;
        let versions = self.list_version_details(id).await?;
        Ok(RuleDetail { rule, versions })
    }

    /// List rules matching the filter, newest first, paginated.
    ///
    /// Returns the page of rules plus the total match count.
    pub async fn list_rules(&self, filter: &RuleFilter) -> Result<(Vec<Rule>, i64)> {
        let mut where_clause = String::from(" WHERE 1=1");
        if filter.status.is_some() {
            where_clause.push_str(" AND status = ?");
        }
        if filter.keyword.is_some() {
            where_clause.push_str(" AND (name LIKE ? OR description LIKE ?)");
        }

        let pattern = filter.keyword.as_ref().map(|k| format!("%{}%", k));
        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 100);

        let count_sql = format!("SELECT COUNT(*) AS total FROM rules{}", where_clause);
        let mut count_query = sqlx::query(&count_sql);
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.as_i64());
        }
        if let Some(pattern) = &pattern {
            count_query = count_query.bind(pattern).bind(pattern);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("total")?;

        let list_sql = format!(
            r#"
            SELECT id, name, description, rule_type, business_type, priority, status,
                   current_version_id, created_by, updated_by, created_at, updated_at
            FROM rules{}
            ORDER BY created_at DESC, id ASC
            LIMIT ? OFFSET ?
            "#,
            where_clause
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(status) = filter.status {
            list_query = list_query.bind(status.as_i64());
        }
        if let Some(pattern) = &pattern {
            list_query = list_query.bind(pattern).bind(pattern);
        }
        let rows = list_query
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(&self.pool)
            .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            rules.push(hydrate_rule(row)?);
        }
        Ok((rules, total))
    }

    /// List every rule, newest first (bulk export)
    pub async fn list_all_rules(&self) -> Result<Vec<Rule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, rule_type, business_type, priority, status,
                   current_version_id, created_by, updated_by, created_at, updated_at
            FROM rules
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            rules.push(hydrate_rule(row)?);
        }
        Ok(rules)
    }

    /// Update a rule's scalar fields in place; absent patch fields keep
    /// their current value
    pub async fn update_rule(&self, id: &str, patch: &RuleUpdate, actor: &str) -> Result<Rule> {
        let current = self.get_rule(id).await?;

        let name = patch.name.clone().unwrap_or(current.name);
        let description = patch.description.clone().or(current.description);
        let rule_type = patch.rule_type.clone().unwrap_or(current.rule_type);
        let business_type = patch.business_type.clone().or(current.business_type);
        let priority = patch.priority.unwrap_or(current.priority);
        let status = patch.status.unwrap_or(current.status);

        sqlx::query(
            r#"
            UPDATE rules
            SET name = ?, description = ?, rule_type = ?, business_type = ?,
                priority = ?, status = ?, updated_by = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(&rule_type)
        .bind(&business_type)
        .bind(priority)
        .bind(status.as_i64())
        .bind(actor)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_rule(id).await
    }

    /// Set a rule's status
    pub async fn update_rule_status(
        &self,
        id: &str,
        status: RuleStatus,
        actor: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE rules
            SET status = ?, updated_by = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_i64())
        .bind(actor)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RuleCenterError::NotFound(format!("rule {}", id)));
        }
        Ok(())
    }

    /// Delete a rule; versions, conditions and actions cascade
    pub async fn delete_rule(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RuleCenterError::NotFound(format!("rule {}", id)));
        }

        info!("Deleted rule {}", id);
        Ok(())
    }

    /// Exact-name lookup used by the import engine
    pub async fn find_rule_by_name(&self, name: &str) -> Result<Option<Rule>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, rule_type, business_type, priority, status,
                   current_version_id, created_by, updated_by, created_at, updated_at
            FROM rules
            WHERE name = ?
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(hydrate_rule).transpose()
    }

    /// Whether any rule carries this exact name
    pub async fn rule_name_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS hit FROM rules WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    // ========================================================================
    // Versions
    // ========================================================================

    /// Highest version number ever used for a rule (0 when none)
    pub async fn max_version(&self, rule_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(version), 0) AS max_version FROM rule_versions WHERE rule_id = ?",
        )
        .bind(rule_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("max_version")?)
    }

    /// Insert a version row
    pub async fn insert_version(&self, version: &RuleVersion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rule_versions (id, rule_id, version, config_json, description,
                                       status, published_at, published_by, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&version.id)
        .bind(&version.rule_id)
        .bind(version.version)
        .bind(serde_json::to_string(&version.config_json)?)
        .bind(&version.description)
        .bind(version.status.as_i64())
        .bind(&version.published_at)
        .bind(&version.published_by)
        .bind(&version.created_by)
        .bind(&version.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a version by id
    pub async fn get_version(&self, version_id: &str) -> Result<RuleVersion> {
        let row = sqlx::query(
            r#"
            SELECT id, rule_id, version, config_json, description, status,
                   published_at, published_by, created_by, created_at
            FROM rule_versions
            WHERE id = ?
            "#,
        )
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => hydrate_version(row),
            None => Err(RuleCenterError::NotFound(format!("version {}", version_id))),
        }
    }

    /// Get a version with its condition tree and actions
    pub async fn get_version_detail(&self, version_id: &str) -> Result<RuleVersionDetail> {
        let version = self.get_version(version_id).await?;
        let conditions = tree::nest(self.conditions_for_version(version_id).await?)?;
        let actions = self.actions_for_version(version_id).await?;
        Ok(RuleVersionDetail {
            version,
            conditions,
            actions,
        })
    }

    /// List a rule's versions, newest first
    pub async fn list_versions(&self, rule_id: &str) -> Result<Vec<RuleVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT id, rule_id, version, config_json, description, status,
                   published_at, published_by, created_by, created_at
            FROM rule_versions
            WHERE rule_id = ?
            ORDER BY version DESC
            "#,
        )
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in rows {
            versions.push(hydrate_version(row)?);
        }
        Ok(versions)
    }

    /// List a rule's versions with conditions and actions, newest first
    pub async fn list_version_details(&self, rule_id: &str) -> Result<Vec<RuleVersionDetail>> {
        let versions = self.list_versions(rule_id).await?;
        let mut details = Vec::with_capacity(versions.len());
        for version in versions {
            let conditions = tree::nest(self.conditions_for_version(&version.id).await?)?;
            let actions = self.actions_for_version(&version.id).await?;
            details.push(RuleVersionDetail {
                version,
                conditions,
                actions,
            });
        }
        Ok(details)
    }

    // ========================================================================
    // Conditions and actions
    // ========================================================================

    /// Insert condition rows in the given order.
    ///
    /// Rows come from `tree::flatten`, which emits every parent before its
    /// children.
    pub async fn insert_conditions(&self, rows: &[ConditionRow]) -> Result<()> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO rule_conditions (id, rule_version_id, parent_id, condition_type,
                                             field, operator, value, value_type, logic_type, sort_order)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.rule_version_id)
            .bind(&row.parent_id)
            .bind(&row.condition_type)
            .bind(&row.field)
            .bind(&row.operator)
            .bind(
                row.value
                    .as_ref()
                    .map(|v| serde_json::to_string(&v.to_json()))
                    .transpose()?,
            )
            .bind(row.value.as_ref().map(|v| v.value_type().as_str()))
            .bind(row.logic_type.map(|l| l.as_str()))
            .bind(row.sort_order)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Flat condition rows of a version, in insertion-compatible order
    pub async fn conditions_for_version(&self, version_id: &str) -> Result<Vec<ConditionRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, rule_version_id, parent_id, condition_type, field, operator,
                   value, value_type, logic_type, sort_order
            FROM rule_conditions
            WHERE rule_version_id = ?
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;

        let mut conditions = Vec::with_capacity(rows.len());
        for row in rows {
            conditions.push(hydrate_condition(row)?);
        }
        Ok(conditions)
    }

    /// Insert actions in the given order; `sort_order` is the list index
    pub async fn insert_actions(
        &self,
        version_id: &str,
        actions: &[NewAction],
    ) -> Result<Vec<ActionRow>> {
        let mut rows = Vec::with_capacity(actions.len());
        for (index, action) in actions.iter().enumerate() {
            let row = ActionRow {
                id: Uuid::new_v4().to_string(),
                rule_version_id: version_id.to_string(),
                action_type: action.action_type.clone(),
                config_json: action.config_json.clone(),
                sort_order: index as i64,
            };

            sqlx::query(
                r#"
                INSERT INTO rule_actions (id, rule_version_id, action_type, config_json, sort_order)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.rule_version_id)
            .bind(&row.action_type)
            .bind(serde_json::to_string(&row.config_json)?)
            .bind(row.sort_order)
            .execute(&self.pool)
            .await?;

            rows.push(row);
        }
        Ok(rows)
    }

    /// Ordered actions of a version
    pub async fn actions_for_version(&self, version_id: &str) -> Result<Vec<ActionRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, rule_version_id, action_type, config_json, sort_order
            FROM rule_actions
            WHERE rule_version_id = ?
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;

        let mut actions = Vec::with_capacity(rows.len());
        for row in rows {
            actions.push(hydrate_action(row)?);
        }
        Ok(actions)
    }
}

// ============================================================================
// Row hydration
// ============================================================================

fn hydrate_status(raw: i64) -> Result<RuleStatus> {
    RuleStatus::try_from(raw).map_err(RuleCenterError::Database)
}

fn hydrate_rule(row: SqliteRow) -> Result<Rule> {
    let status: i64 = row.try_get("status")?;

    Ok(Rule {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        rule_type: row.try_get("rule_type")?,
        business_type: row.try_get("business_type")?,
        priority: row.try_get("priority")?,
        status: hydrate_status(status)?,
        current_version_id: row.try_get("current_version_id")?,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn hydrate_version(row: SqliteRow) -> Result<RuleVersion> {
    let status: i64 = row.try_get("status")?;
    let config_json: String = row.try_get("config_json")?;

    Ok(RuleVersion {
        id: row.try_get("id")?,
        rule_id: row.try_get("rule_id")?,
        version: row.try_get("version")?,
        config_json: serde_json::from_str(&config_json)?,
        description: row.try_get("description")?,
        status: hydrate_status(status)?,
        published_at: row.try_get("published_at")?,
        published_by: row.try_get("published_by")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn hydrate_condition(row: SqliteRow) -> Result<ConditionRow> {
    let raw_value: Option<String> = row.try_get("value")?;
    let raw_value_type: Option<String> = row.try_get("value_type")?;
    let raw_logic: Option<String> = row.try_get("logic_type")?;

    let value = match (raw_value, raw_value_type) {
        (None, _) => None,
        (Some(value), Some(value_type)) => {
            let value: serde_json::Value = serde_json::from_str(&value)?;
            let value_type = ValueType::parse(&value_type)?;
            Some(ConditionValue::from_parts(&value, value_type)?)
        }
        (Some(_), None) => {
            let id: String = row.try_get("id")?;
            return Err(RuleCenterError::Database(format!(
                "condition {} has a value without a value_type",
                id
            )));
        }
    };

    Ok(ConditionRow {
        id: row.try_get("id")?,
        rule_version_id: row.try_get("rule_version_id")?,
        parent_id: row.try_get("parent_id")?,
        condition_type: row.try_get("condition_type")?,
        field: row.try_get("field")?,
        operator: row.try_get("operator")?,
        value,
        logic_type: raw_logic.as_deref().map(crate::types::LogicType::parse).transpose()?,
        sort_order: row.try_get("sort_order")?,
    })
}

fn hydrate_action(row: SqliteRow) -> Result<ActionRow> {
    let config_json: String = row.try_get("config_json")?;

    Ok(ActionRow {
        id: row.try_get("id")?,
        rule_version_id: row.try_get("rule_version_id")?,
        action_type: row.try_get("action_type")?,
        config_json: serde_json::from_str(&config_json)?,
        sort_order: row.try_get("sort_order")?,
    })
}
