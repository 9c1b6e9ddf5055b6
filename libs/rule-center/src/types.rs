//! Rule management type definitions
//!
//! Core types for versioned rules and their condition trees:
//! - Rule / RuleVersion: named rules evolving through numbered versions
//! - ConditionNode / ConditionRow: nested vs. flat (parent-indexed) form
//! - ConditionValue: tagged payload for leaf comparisons
//! - Input payloads and import/export documents

use crate::error::{Result, RuleCenterError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Status and enums
// ============================================================================

/// Lifecycle status shared by rules and versions
///
/// Persisted and serialized as an integer: Draft=0, Published=1, Offline=2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum RuleStatus {
    Draft,
    Published,
    Offline,
}

impl RuleStatus {
    /// Numeric form used in storage and on the wire
    pub fn as_i64(self) -> i64 {
        match self {
            RuleStatus::Draft => 0,
            RuleStatus::Published => 1,
            RuleStatus::Offline => 2,
        }
    }

    /// Human-readable word used in CSV and tabular exports
    pub fn as_str(self) -> &'static str {
        match self {
            RuleStatus::Draft => "Draft",
            RuleStatus::Published => "Published",
            RuleStatus::Offline => "Offline",
        }
    }
}

impl From<RuleStatus> for i64 {
    fn from(status: RuleStatus) -> Self {
        status.as_i64()
    }
}

impl TryFrom<i64> for RuleStatus {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(RuleStatus::Draft),
            1 => Ok(RuleStatus::Published),
            2 => Ok(RuleStatus::Offline),
            other => Err(format!("invalid rule status: {}", other)),
        }
    }
}

/// How a group node combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicType {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl LogicType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicType::And => "AND",
            LogicType::Or => "OR",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "AND" => Ok(LogicType::And),
            "OR" => Ok(LogicType::Or),
            other => Err(RuleCenterError::Validation(format!(
                "invalid logic type: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Condition values
// ============================================================================

/// Declared logical type of a leaf condition's comparison value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    List,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::List => "list",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(ValueType::String),
            "number" => Ok(ValueType::Number),
            "boolean" => Ok(ValueType::Boolean),
            "list" => Ok(ValueType::List),
            other => Err(RuleCenterError::Validation(format!(
                "invalid value type: {}",
                other
            ))),
        }
    }
}

/// Tagged comparison value carried by leaf conditions
///
/// The discriminant is persisted alongside the payload as `value_type`, and a
/// payload whose runtime shape disagrees with its declared type is rejected
/// at the tree-construction boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    List(Vec<Value>),
}

impl ConditionValue {
    /// Discriminant matching this payload
    pub fn value_type(&self) -> ValueType {
        match self {
            ConditionValue::Text(_) => ValueType::String,
            ConditionValue::Number(_) => ValueType::Number,
            ConditionValue::Bool(_) => ValueType::Boolean,
            ConditionValue::List(_) => ValueType::List,
        }
    }

    /// Build from a raw JSON payload and its declared type, rejecting
    /// payloads whose shape disagrees with the declaration
    pub fn from_parts(value: &Value, value_type: ValueType) -> Result<Self> {
        match (value_type, value) {
            (ValueType::String, Value::String(s)) => Ok(ConditionValue::Text(s.clone())),
            (ValueType::Number, Value::Number(n)) => Ok(ConditionValue::Number(n.clone())),
            (ValueType::Boolean, Value::Bool(b)) => Ok(ConditionValue::Bool(*b)),
            (ValueType::List, Value::Array(items)) => Ok(ConditionValue::List(items.clone())),
            (declared, actual) => Err(RuleCenterError::Validation(format!(
                "value {} does not match declared valueType \"{}\"",
                actual,
                declared.as_str()
            ))),
        }
    }

    /// Raw JSON payload, as it appears on the wire and in storage
    pub fn to_json(&self) -> Value {
        match self {
            ConditionValue::Text(s) => Value::String(s.clone()),
            ConditionValue::Number(n) => Value::Number(n.clone()),
            ConditionValue::Bool(b) => Value::Bool(*b),
            ConditionValue::List(items) => Value::Array(items.clone()),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A named, versioned policy container; has at most one live version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub business_type: Option<String>,
    pub priority: i64,
    pub status: RuleStatus,
    /// Version currently live, when one has been published
    pub current_version_id: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// An immutable-once-published snapshot of a rule's configuration,
/// numbered monotonically per rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleVersion {
    pub id: String,
    pub rule_id: String,
    pub version: i64,
    pub config_json: Value,
    pub description: Option<String>,
    pub status: RuleStatus,
    pub published_at: Option<String>,
    pub published_by: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// Condition tree node in nested form (children as an ordered list)
///
/// A node with children is a group combined by `logic_type`; a node without
/// children is a leaf test over `field`/`operator`/`value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_type: Option<LogicType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConditionNode>,
}

/// Condition node in flat storage form (parent-indexed row)
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRow {
    pub id: String,
    pub rule_version_id: String,
    pub parent_id: Option<String>,
    pub condition_type: Option<String>,
    pub field: Option<String>,
    pub operator: Option<String>,
    pub value: Option<ConditionValue>,
    pub logic_type: Option<LogicType>,
    /// Stable ordering among siblings
    pub sort_order: i64,
}

/// A flat, ordered effect attached to a version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRow {
    pub id: String,
    pub rule_version_id: String,
    pub action_type: String,
    pub config_json: Value,
    pub sort_order: i64,
}

/// A reusable, named condition-tree snippet independent of any rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTemplate {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub conditions: Vec<ConditionNode>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Version with its condition tree (nested form) and ordered actions
#[derive(Debug, Clone)]
pub struct RuleVersionDetail {
    pub version: RuleVersion,
    pub conditions: Vec<ConditionNode>,
    pub actions: Vec<ActionRow>,
}

/// Rule with all of its versions, newest first
#[derive(Debug, Clone)]
pub struct RuleDetail {
    pub rule: Rule,
    pub versions: Vec<RuleVersionDetail>,
}

// ============================================================================
// Input payloads
// ============================================================================

/// Fields for creating a rule (created as Draft with no versions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rule_type: String,
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub priority: i64,
}

/// Scalar-field patch for an existing rule; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rule_type: Option<String>,
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub status: Option<RuleStatus>,
}

/// Action payload supplied when creating a version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAction {
    pub action_type: String,
    #[serde(default, alias = "config")]
    pub config_json: Value,
}

/// Payload for creating a rule version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVersion {
    #[serde(default)]
    pub config_json: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default)]
    pub actions: Vec<NewAction>,
}

/// Listing filter for rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFilter {
    #[serde(default)]
    pub status: Option<RuleStatus>,
    /// Substring match over name or description
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for RuleFilter {
    fn default() -> Self {
        Self {
            status: None,
            keyword: None,
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// Fields for creating a condition template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to "custom" when not given
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
}

/// Patch for an existing template; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub conditions: Option<Vec<ConditionNode>>,
}

/// Listing filter for templates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFilter {
    #[serde(default)]
    pub category: Option<String>,
    /// Substring match over name or description
    #[serde(default)]
    pub keyword: Option<String>,
}

// ============================================================================
// Import / export
// ============================================================================

/// Policy governing how bulk import handles a rule name that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    #[default]
    Skip,
    Overwrite,
    Rename,
}

/// One rule row of an import payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleImport {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rule_type: String,
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub versions: Vec<NewVersion>,
}

/// Rule created or updated by an import batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedRule {
    pub id: String,
    pub name: String,
}

/// Outcome of a bulk import; the primary error-reporting channel of the
/// whole operation (row failures are collected here, never thrown)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub imported: Vec<ImportedRule>,
}

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Tabular,
}

impl ExportFormat {
    /// Parse a caller-supplied format string; anything unknown is an
    /// input-validation error
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "tabular" => Ok(ExportFormat::Tabular),
            other => Err(RuleCenterError::Validation(format!(
                "unsupported export format: {} (supported: json, csv, tabular)",
                other
            ))),
        }
    }
}

/// Version entry of a JSON export document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedVersion {
    pub version: i64,
    pub description: Option<String>,
    pub status: RuleStatus,
    pub conditions: Vec<ConditionNode>,
    pub actions: Vec<NewAction>,
}

/// Rule entry of a JSON export document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedRule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub business_type: Option<String>,
    pub priority: i64,
    pub status: RuleStatus,
    pub versions: Vec<ExportedVersion>,
}

/// Top-level JSON export document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub export_time: String,
    pub total: usize,
    pub rules: Vec<ExportedRule>,
}

/// One logical table of a tabular export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Structured table data handed to the workbook-rendering collaborator;
/// tables with zero rows are omitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularExport {
    pub tables: Vec<Table>,
}

/// Export output in the requested format
#[derive(Debug, Clone)]
pub enum Export {
    Json(ExportDocument),
    Csv(String),
    Tabular(TabularExport),
}
