//! Database schema initialization
//!
//! All tables live in a single SQLite file. Foreign keys cascade so that
//! deleting a rule removes its versions, conditions and actions in one
//! statement; templates are independent and never cascade from rules.
//!
//! Note: neither `rules.name` nor `condition_templates.name` carries a
//! UNIQUE constraint. Uniqueness is enforced at the application layer only,
//! matching the source system.

use crate::error::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Rules table
pub const RULES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rules (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    rule_type TEXT NOT NULL,
    business_type TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    status INTEGER NOT NULL DEFAULT 0,
    current_version_id TEXT,
    created_by TEXT,
    updated_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// Rule versions table; version numbers never repeat within a rule
pub const RULE_VERSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rule_versions (
    id TEXT PRIMARY KEY,
    rule_id TEXT NOT NULL REFERENCES rules(id) ON DELETE CASCADE,
    version INTEGER NOT NULL,
    config_json TEXT NOT NULL,
    description TEXT,
    status INTEGER NOT NULL DEFAULT 0,
    published_at TEXT,
    published_by TEXT,
    created_by TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(rule_id, version)
)
"#;

/// Condition rows, a parent-indexed forest per version
pub const RULE_CONDITIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rule_conditions (
    id TEXT PRIMARY KEY,
    rule_version_id TEXT NOT NULL REFERENCES rule_versions(id) ON DELETE CASCADE,
    parent_id TEXT,
    condition_type TEXT,
    field TEXT,
    operator TEXT,
    value TEXT,
    value_type TEXT,
    logic_type TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0
)
"#;

/// Flat, ordered action list per version
pub const RULE_ACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rule_actions (
    id TEXT PRIMARY KEY,
    rule_version_id TEXT NOT NULL REFERENCES rule_versions(id) ON DELETE CASCADE,
    action_type TEXT NOT NULL,
    config_json TEXT NOT NULL,
    sort_order INTEGER NOT NULL DEFAULT 0
)
"#;

/// Reusable condition-tree snippets, independent of rules
pub const CONDITION_TEMPLATES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS condition_templates (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    category TEXT NOT NULL DEFAULT 'custom',
    conditions TEXT NOT NULL,
    created_by TEXT,
    updated_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// Lookup indexes for the composite queries the store issues
pub const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_rule_versions_rule_id ON rule_versions(rule_id)",
    "CREATE INDEX IF NOT EXISTS idx_rule_versions_status ON rule_versions(rule_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_rule_conditions_version ON rule_conditions(rule_version_id)",
    "CREATE INDEX IF NOT EXISTS idx_rule_actions_version ON rule_actions(rule_version_id)",
    "CREATE INDEX IF NOT EXISTS idx_rules_name ON rules(name)",
];

/// Create all tables and indexes
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(RULES_TABLE).execute(pool).await?;
    sqlx::query(RULE_VERSIONS_TABLE).execute(pool).await?;
    sqlx::query(RULE_CONDITIONS_TABLE).execute(pool).await?;
    sqlx::query(RULE_ACTIONS_TABLE).execute(pool).await?;
    sqlx::query(CONDITION_TEMPLATES_TABLE).execute(pool).await?;

    for index in INDEXES {
        sqlx::query(index).execute(pool).await?;
    }

    info!("Rule center schema initialized");
    Ok(())
}
