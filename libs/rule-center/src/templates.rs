//! Template Library - reusable condition-tree snippets
//!
//! Templates are named condition forests independent of any rule. Names are
//! globally unique by exact, case-sensitive match; the check is
//! application-level (there is no durable unique constraint behind it, same
//! as rule names).

use crate::error::{Result, RuleCenterError};
use crate::repository::now_rfc3339;
use crate::tree;
use crate::types::{ConditionNode, ConditionTemplate, NewTemplate, TemplateFilter, TemplateUpdate};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Default category assigned when a template is created without one
const DEFAULT_CATEGORY: &str = "custom";

/// Named condition-snippet library over a store pool
#[derive(Clone)]
pub struct TemplateLibrary {
    pool: SqlitePool,
}

impl TemplateLibrary {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a template; fails with Conflict when the name is taken
    pub async fn create(&self, input: &NewTemplate, actor: &str) -> Result<ConditionTemplate> {
        if self.name_exists(&input.name, None).await? {
            return Err(RuleCenterError::Conflict(format!(
                "template name \"{}\" already exists",
                input.name
            )));
        }

        tree::validate(&input.conditions)?;

        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        let category = input
            .category
            .clone()
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        sqlx::query(
            r#"
            INSERT INTO condition_templates (id, name, description, category, conditions,
                                             created_by, updated_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&category)
        .bind(serde_json::to_string(&input.conditions)?)
        .bind(actor)
        .bind(actor)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!("Created template {} ({})", input.name, id);
        self.get(&id).await
    }

    /// Patch a template; a name change re-checks uniqueness against all
    /// other templates
    pub async fn update(
        &self,
        id: &str,
        patch: &TemplateUpdate,
        actor: &str,
    ) -> Result<ConditionTemplate> {
        let current = self.get(id).await?;

        if let Some(name) = &patch.name {
            if name != &current.name && self.name_exists(name, Some(id)).await? {
                return Err(RuleCenterError::Conflict(format!(
                    "template name \"{}\" already exists",
                    name
                )));
            }
        }

        if let Some(conditions) = &patch.conditions {
            tree::validate(conditions)?;
        }

        let name = patch.name.clone().unwrap_or(current.name);
        let description = patch.description.clone().or(current.description);
        let category = patch.category.clone().unwrap_or(current.category);
        let conditions = patch.conditions.clone().unwrap_or(current.conditions);

        sqlx::query(
            r#"
            UPDATE condition_templates
            SET name = ?, description = ?, category = ?, conditions = ?,
                updated_by = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(&category)
        .bind(serde_json::to_string(&conditions)?)
        .bind(actor)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    /// Delete a template
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM condition_templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RuleCenterError::NotFound(format!("template {}", id)));
        }

        debug!("Deleted template {}", id);
        Ok(())
    }

    /// Get a template by id
    pub async fn get(&self, id: &str) -> Result<ConditionTemplate> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, category, conditions,
                   created_by, updated_by, created_at, updated_at
            FROM condition_templates
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => hydrate_template(row),
            None => Err(RuleCenterError::NotFound(format!("template {}", id))),
        }
    }

    /// List templates, optionally narrowed by category and/or a keyword
    /// substring over name or description, newest first
    pub async fn list(&self, filter: &TemplateFilter) -> Result<Vec<ConditionTemplate>> {
        let mut sql = String::from(
            r#"
            SELECT id, name, description, category, conditions,
                   created_by, updated_by, created_at, updated_at
            FROM condition_templates
            WHERE 1=1
            "#,
        );
        if filter.category.is_some() {
            sql.push_str(" AND category = ?");
        }
        if filter.keyword.is_some() {
            sql.push_str(" AND (name LIKE ? OR description LIKE ?)");
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let pattern = filter.keyword.as_ref().map(|k| format!("%{}%", k));
        let mut query = sqlx::query(&sql);
        if let Some(category) = &filter.category {
            query = query.bind(category);
        }
        if let Some(pattern) = &pattern {
            query = query.bind(pattern).bind(pattern);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut templates = Vec::with_capacity(rows.len());
        for row in rows {
            templates.push(hydrate_template(row)?);
        }
        Ok(templates)
    }

    /// Exact-name check, optionally excluding one template id
    async fn name_exists(&self, name: &str, exclude_id: Option<&str>) -> Result<bool> {
        let row = match exclude_id {
            Some(exclude) => {
                sqlx::query("SELECT 1 AS hit FROM condition_templates WHERE name = ? AND id != ? LIMIT 1")
                    .bind(name)
                    .bind(exclude)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT 1 AS hit FROM condition_templates WHERE name = ? LIMIT 1")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(row.is_some())
    }
}

fn hydrate_template(row: SqliteRow) -> Result<ConditionTemplate> {
    let conditions: String = row.try_get("conditions")?;
    let conditions: Vec<ConditionNode> = serde_json::from_str(&conditions)?;

    Ok(ConditionTemplate {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        conditions,
        created_by: row.try_get("created_by")?,
        updated_by: row.try_get("updated_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
