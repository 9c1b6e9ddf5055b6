//! Rule Center - Versioned Rule Management Library
//!
//! A rule management library providing:
//! - Named rules evolving through immutable, numbered versions
//! - Nested AND/OR condition trees stored as parent-indexed rows
//! - Single-live-version publishing with transactional guarantees
//! - Reusable condition templates with name uniqueness
//! - Bulk JSON/CSV/tabular export and conflict-aware import
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │  VersionManager  │────▶│  ConditionTree   │
//! │ (create/publish) │     │ (flatten / nest) │
//! └──────────────────┘     └──────────────────┘
//!          │                        │
//!          ▼                        ▼
//! ┌──────────────────┐     ┌──────────────────┐
//! │ ImportExport     │────▶│   RuleStore      │◀── TemplateLibrary
//! │ Engine           │     │   (SQLite)       │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! Reads flow store → caller; writes flow caller → manager/engine → tree →
//! store. Condition evaluation is out of scope; versions carry an opaque
//! `configJson` payload for whatever engine consumes them.

mod error;
mod repository;
mod schema;
mod templates;
mod transfer;
pub mod tree;
mod types;
mod versions;

// Re-export public API
pub use error::{Result, RuleCenterError};
pub use repository::RuleStore;
pub use schema::init_schema;
pub use templates::TemplateLibrary;
pub use transfer::ImportExportEngine;
pub use versions::VersionManager;

// Re-export data types for convenience
pub use types::{
    ActionRow, ConditionNode, ConditionRow, ConditionTemplate, ConditionValue, ConflictStrategy,
    Export, ExportDocument, ExportFormat, ExportedRule, ExportedVersion, ImportReport,
    ImportedRule, LogicType, NewAction, NewRule, NewTemplate, NewVersion, Rule, RuleDetail,
    RuleFilter, RuleImport, RuleStatus, RuleUpdate, RuleVersion, RuleVersionDetail, Table,
    TabularExport, TemplateFilter, TemplateUpdate, ValueType,
};
