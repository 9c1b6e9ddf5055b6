//! Condition tree conversion
//!
//! Converts between the nested condition form (children as an ordered list
//! inside each node) and the flat storage form (rows carrying `parent_id`
//! plus `sort_order`). The flat form is what persists; the nested form is
//! what callers and import/export payloads speak.
//!
//! Trees are stored as an arena of id-referenced rows, never as native
//! cyclic pointers. `nest` therefore has to defend against rows arriving
//! from external import payloads: a `parent_id` pointing at a row that is
//! not in the same version, or parent links that loop, are rejected with
//! `MalformedTree`.

use crate::error::{Result, RuleCenterError};
use crate::types::{ConditionNode, ConditionRow, ConditionValue};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Flatten a nested condition forest into storage rows for one version.
///
/// Depth-first, parent-first walk: every parent row is emitted before its
/// children, `sort_order` is the index within the parent's children list,
/// and each row gets a fresh id that its children reference. Inserting the
/// returned rows in order keeps the parent-pointer invariant.
///
/// Leaf values are checked against their declared `valueType` here, at the
/// tree-construction boundary.
pub fn flatten(version_id: &str, nodes: &[ConditionNode]) -> Result<Vec<ConditionRow>> {
    let mut rows = Vec::new();
    flatten_level(version_id, nodes, None, &mut rows)?;
    Ok(rows)
}

fn flatten_level(
    version_id: &str,
    nodes: &[ConditionNode],
    parent_id: Option<&str>,
    out: &mut Vec<ConditionRow>,
) -> Result<()> {
    for (index, node) in nodes.iter().enumerate() {
        let value = typed_value(node)?;
        let id = Uuid::new_v4().to_string();

        out.push(ConditionRow {
            id: id.clone(),
            rule_version_id: version_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            condition_type: node.condition_type.clone(),
            field: node.field.clone(),
            operator: node.operator.clone(),
            value,
            logic_type: node.logic_type,
            sort_order: index as i64,
        });

        if !node.children.is_empty() {
            flatten_level(version_id, &node.children, Some(&id), out)?;
        }
    }
    Ok(())
}

/// Validate a nested forest without keeping the rows.
///
/// Used by the template library so a malformed snippet is rejected before
/// it is persisted.
pub fn validate(nodes: &[ConditionNode]) -> Result<()> {
    flatten("validation", nodes).map(|_| ())
}

/// Reconstruct the nested forest from flat rows.
///
/// Roots are rows with `parent_id = None`; children attach to their parent
/// ordered by `sort_order` (row id as tiebreak). Fails with `MalformedTree`
/// on a dangling parent pointer or a parent-link cycle.
pub fn nest(rows: Vec<ConditionRow>) -> Result<Vec<ConditionNode>> {
    let ids: HashSet<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let parents: HashMap<&str, Option<&str>> = rows
        .iter()
        .map(|r| (r.id.as_str(), r.parent_id.as_deref()))
        .collect();

    for row in &rows {
        if let Some(parent_id) = row.parent_id.as_deref() {
            if !ids.contains(parent_id) {
                return Err(RuleCenterError::MalformedTree(format!(
                    "condition {} references missing parent {}",
                    row.id, parent_id
                )));
            }
        }

        // Walk the parent chain; revisiting any node means a cycle
        let mut seen = HashSet::new();
        let mut cursor = row.id.as_str();
        loop {
            if !seen.insert(cursor) {
                return Err(RuleCenterError::MalformedTree(format!(
                    "condition {} is part of a parent-link cycle",
                    row.id
                )));
            }
            match parents.get(cursor).copied().flatten() {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
    }

    let mut children: HashMap<Option<String>, Vec<ConditionRow>> = HashMap::new();
    for row in rows {
        children.entry(row.parent_id.clone()).or_default().push(row);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.id.cmp(&b.id)));
    }

    Ok(build_level(&None, &mut children))
}

fn build_level(
    parent_id: &Option<String>,
    children: &mut HashMap<Option<String>, Vec<ConditionRow>>,
) -> Vec<ConditionNode> {
    let rows = children.remove(parent_id).unwrap_or_default();
    rows.into_iter()
        .map(|row| {
            let nested = build_level(&Some(row.id.clone()), children);
            ConditionNode {
                condition_type: row.condition_type,
                field: row.field,
                operator: row.operator,
                value: row.value.as_ref().map(ConditionValue::to_json),
                value_type: row.value.as_ref().map(ConditionValue::value_type),
                logic_type: row.logic_type,
                children: nested,
            }
        })
        .collect()
}

/// Extract and check the typed value of a node, if it carries one
fn typed_value(node: &ConditionNode) -> Result<Option<ConditionValue>> {
    match (&node.value, node.value_type) {
        (None, _) => Ok(None),
        (Some(value), Some(value_type)) => ConditionValue::from_parts(value, value_type).map(Some),
        (Some(value), None) => Err(RuleCenterError::Validation(format!(
            "condition value {} has no declared valueType",
            value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogicType, ValueType};
    use serde_json::json;

    fn leaf(field: &str, operator: &str, value: serde_json::Value, vt: ValueType) -> ConditionNode {
        ConditionNode {
            condition_type: Some("expression".to_string()),
            field: Some(field.to_string()),
            operator: Some(operator.to_string()),
            value: Some(value),
            value_type: Some(vt),
            logic_type: None,
            children: vec![],
        }
    }

    fn group(logic: LogicType, children: Vec<ConditionNode>) -> ConditionNode {
        ConditionNode {
            condition_type: Some("group".to_string()),
            logic_type: Some(logic),
            children,
            ..Default::default()
        }
    }

    #[test]
    fn round_trip_empty_tree() {
        let rows = flatten("v1", &[]).unwrap();
        assert!(rows.is_empty());
        assert!(nest(rows).unwrap().is_empty());
    }

    #[test]
    fn round_trip_flat_leaves() {
        let tree = vec![
            leaf("order.distance", "lte", json!(5000), ValueType::Number),
            leaf("order.city", "eq", json!("berlin"), ValueType::String),
            leaf("user.vip", "eq", json!(true), ValueType::Boolean),
        ];

        let rows = flatten("v1", &tree).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.parent_id.is_none()));
        assert_eq!(
            rows.iter().map(|r| r.sort_order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        assert_eq!(nest(rows).unwrap(), tree);
    }

    #[test]
    fn round_trip_nested_groups() {
        let tree = vec![group(
            LogicType::And,
            vec![
                leaf("order.distance", "lte", json!(5000), ValueType::Number),
                group(
                    LogicType::Or,
                    vec![
                        leaf("order.weight", "gt", json!(2.5), ValueType::Number),
                        group(
                            LogicType::And,
                            vec![
                                leaf("user.tags", "in", json!(["a", "b"]), ValueType::List),
                                leaf("user.active", "eq", json!(false), ValueType::Boolean),
                            ],
                        ),
                    ],
                ),
            ],
        )];

        let rows = flatten("v1", &tree).unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(nest(rows).unwrap(), tree);
    }

    #[test]
    fn flatten_emits_parents_first() {
        let tree = vec![group(
            LogicType::Or,
            vec![leaf("a", "eq", json!(1), ValueType::Number)],
        )];
        let rows = flatten("v1", &tree).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].parent_id.as_deref(), Some(rows[0].id.as_str()));
    }

    #[test]
    fn flatten_rejects_value_type_mismatch() {
        let bad = vec![leaf("order.distance", "lte", json!("far"), ValueType::Number)];
        let err = flatten("v1", &bad).unwrap_err();
        assert!(err.is_validation(), "unexpected error: {err}");
    }

    #[test]
    fn flatten_rejects_untyped_value() {
        let mut node = leaf("a", "eq", json!(1), ValueType::Number);
        node.value_type = None;
        let err = flatten("v1", &[node]).unwrap_err();
        assert!(err.is_validation(), "unexpected error: {err}");
    }

    #[test]
    fn nest_rejects_dangling_parent() {
        let mut rows = flatten(
            "v1",
            &[leaf("a", "eq", json!(1), ValueType::Number)],
        )
        .unwrap();
        rows[0].parent_id = Some("missing".to_string());

        match nest(rows) {
            Err(RuleCenterError::MalformedTree(msg)) => {
                assert!(msg.contains("missing parent"), "unexpected message: {msg}")
            }
            other => panic!("expected MalformedTree, got {other:?}"),
        }
    }

    #[test]
    fn nest_rejects_cycle() {
        let tree = vec![group(
            LogicType::And,
            vec![leaf("a", "eq", json!(1), ValueType::Number)],
        )];
        let mut rows = flatten("v1", &tree).unwrap();
        // Point the group at its own child
        rows[0].parent_id = Some(rows[1].id.clone());

        match nest(rows) {
            Err(RuleCenterError::MalformedTree(msg)) => {
                assert!(msg.contains("cycle"), "unexpected message: {msg}")
            }
            other => panic!("expected MalformedTree, got {other:?}"),
        }
    }
}
