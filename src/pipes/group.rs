//! Grouping of rows by a computed key

use crate::core::error::{EngineError, PipeError};
use crate::core::fields::split_table_and_fields;
use crate::core::row::{Row, is_truthy};
use crate::core::schema::{GroupConfig, GroupKey};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

/// Rows sharing a group key, in first-seen order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowGroup {
    pub key: Value,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Value>,
}

/// Bucket rows by the configured key
///
/// Falsy keys share a single `null` group. Without a key, or without rows,
/// one group keyed `""` holds everything.
pub fn group_rows(rows: &[Row], config: Option<&GroupConfig>) -> Result<Vec<RowGroup>> {
    let Some(config) = config.filter(|_| !rows.is_empty()) else {
        return Ok(vec![RowGroup {
            key: Value::String(String::new()),
            rows: rows.to_vec(),
            order_by: None,
        }]);
    };

    let mut groups: Vec<RowGroup> = Vec::new();
    for row in rows {
        let key = group_value(row, &config.property)?;
        let key = if is_truthy(&key) { key } else { Value::Null };
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.rows.push(row.clone()),
            None => {
                let order_by = match &config.order_by {
                    Some(order) => Some(group_value(row, order)?),
                    None => None,
                };
                groups.push(RowGroup {
                    key,
                    rows: vec![row.clone()],
                    order_by,
                });
            }
        }
    }
    tracing::debug!(groups = groups.len(), rows = rows.len(), "rows grouped");
    Ok(groups)
}

pub fn group_value(row: &Row, key: &GroupKey) -> Result<Value> {
    match key {
        GroupKey::Property(prop) => property_value(row, prop),
        GroupKey::Compute(f) => Ok(f.call(row)),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read a property path from a row
///
/// A comma separated list joins the values with spaces; a dot descends
/// into an embedded object.
pub fn property_value(row: &Row, prop: &str) -> Result<Value> {
    if prop.contains(',') {
        let mut parts = Vec::new();
        for part in prop.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            parts.push(display(&property_value(row, part)?));
        }
        return Ok(Value::String(parts.join(" ").trim().to_string()));
    }
    if prop.contains('.') {
        let nested = split_table_and_fields(prop, false);
        if !nested.optional && !row.contains_key(&nested.table) {
            return Err(EngineError::from(PipeError::MissingProperty {
                property: nested.table,
            })
            .into());
        }
        return match row.get(&nested.table) {
            Some(Value::Object(inner)) => property_value(inner, &nested.columns.join(".")),
            _ => Ok(Value::String(String::new())),
        };
    }
    Ok(row.get(prop).cloned().unwrap_or(Value::Null))
}

/// Collapsed state per group key, kept apart from the groups themselves
#[derive(Debug, Clone, Default)]
pub struct CollapsedGroups {
    entries: Vec<(Value, bool)>,
}

impl CollapsedGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collapsed(&self, key: &Value) -> bool {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .is_some_and(|(_, collapsed)| *collapsed)
    }

    pub fn toggle(&mut self, key: &Value) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, collapsed)) => *collapsed = !*collapsed,
            None => self.entries.push((key.clone(), true)),
        }
    }

    pub fn collapse_all(&mut self, groups: &[RowGroup]) {
        self.entries = groups.iter().map(|g| (g.key.clone(), true)).collect();
    }

    pub fn expand_all(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hook::RowFn;
    use serde_json::json;

    fn rows(v: Value) -> Vec<Row> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    fn by(prop: &str) -> GroupConfig {
        GroupConfig {
            property: GroupKey::Property(prop.to_string()),
            order_by: None,
        }
    }

    #[test]
    fn test_first_seen_order() {
        let data = rows(json!([{"d": "2024-01-01"}, {"d": "2024-01-01"}, {"d": "2024-01-02"}]));
        let groups = group_rows(&data, Some(&by("d"))).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, json!("2024-01-01"));
        assert_eq!(groups[0].rows.len(), 2);
        assert_eq!(groups[1].key, json!("2024-01-02"));
        assert_eq!(groups[1].rows.len(), 1);
    }

    #[test]
    fn test_falsy_keys_share_null_bucket() {
        let data = rows(json!([{"d": null}, {"d": ""}, {"x": 1}, {"d": "a"}]));
        let groups = group_rows(&data, Some(&by("d"))).unwrap();
        assert_eq!(groups[0].key, Value::Null);
        assert_eq!(groups[0].rows.len(), 3);
        assert_eq!(groups[1].key, json!("a"));
    }

    #[test]
    fn test_without_property_single_group() {
        let data = rows(json!([{"d": 1}, {"d": 2}]));
        let groups = group_rows(&data, None).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, json!(""));
        assert_eq!(groups[0].rows.len(), 2);
    }

    #[test]
    fn test_joined_and_nested_properties() {
        let data = rows(json!([{"nombre": "Ana", "apellidos": "Vila", "city": {"name": "Vic"}}]));
        let joined = property_value(&data[0], "nombre, apellidos").unwrap();
        assert_eq!(joined, json!("Ana Vila"));
        assert_eq!(property_value(&data[0], "city.name").unwrap(), json!("Vic"));
        assert!(property_value(&data[0], "zone.name").is_err());
        assert_eq!(property_value(&data[0], "zone?.name").unwrap(), json!(""));
    }

    #[test]
    fn test_computed_key_and_group_order() {
        let data = rows(json!([{"n": 1, "m": "b"}, {"n": 2, "m": "a"}, {"n": 3, "m": "c"}]));
        let config = GroupConfig {
            property: GroupKey::Compute(RowFn::new(|row: &Row| {
                let even = row["n"].as_i64().unwrap_or(0) % 2 == 0;
                json!(if even { "even" } else { "odd" })
            })),
            order_by: Some(GroupKey::Property("m".to_string())),
        };
        let groups = group_rows(&data, Some(&config)).unwrap();
        assert_eq!(groups[0].key, json!("odd"));
        assert_eq!(groups[0].order_by, Some(json!("b")));
        assert_eq!(groups[1].rows.len(), 1);
    }

    #[test]
    fn test_collapsed_groups() {
        let mut collapsed = CollapsedGroups::new();
        let key = json!("2024-01-01");
        assert!(!collapsed.is_collapsed(&key));
        collapsed.toggle(&key);
        assert!(collapsed.is_collapsed(&key));
        collapsed.toggle(&key);
        assert!(!collapsed.is_collapsed(&key));

        let data = rows(json!([{"d": "x"}, {"d": "y"}]));
        let groups = group_rows(&data, Some(&by("d"))).unwrap();
        collapsed.collapse_all(&groups);
        assert!(collapsed.is_collapsed(&json!("y")));
        collapsed.expand_all();
        assert!(!collapsed.is_collapsed(&json!("x")));
    }
}
