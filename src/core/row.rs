//! Rows and row identifiers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An open key-value record as returned by the backend
pub type Row = Map<String, Value>;

/// Sentinel primary key value of a row not yet created
pub const NEW_ROW: &str = "new";

/// Identifier of a single row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub Value);

impl RowId {
    pub fn new_row() -> Self {
        RowId(Value::String(NEW_ROW.to_string()))
    }

    pub fn is_new(&self) -> bool {
        is_new_id(self.value())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn to_param(&self) -> String {
        id_to_string(self.value())
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId(Value::from(id))
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        RowId(Value::String(id.to_string()))
    }
}

impl From<Value> for RowId {
    fn from(id: Value) -> Self {
        RowId(id)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param())
    }
}

/// Render an id the way it appears in a URL
pub fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn is_new_id(id: &Value) -> bool {
    matches!(id, Value::String(s) if s == NEW_ROW)
}

/// Compare two ids loosely: `7`, `7.0` and `"7"` are the same id
pub fn ids_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    id_to_string(a) == id_to_string(b)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read the primary key of a row, ignoring nulls
pub fn primary_key_of<'a>(row: &'a Row, primary_key: &str) -> Option<&'a Value> {
    row.get(primary_key).filter(|v| !v.is_null())
}

/// Position of the row whose primary key equals `id`
pub fn position_by_pk(rows: &[Row], primary_key: &str, id: &Value) -> Option<usize> {
    rows.iter()
        .position(|r| primary_key_of(r, primary_key).is_some_and(|pk| ids_equal(pk, id)))
}

/// Falsy in the loose sense used by display and group values
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_equal_across_types() {
        assert!(ids_equal(&json!(7), &json!("7")));
        assert!(ids_equal(&json!(7), &json!(7.0)));
        assert!(ids_equal(&json!("abc"), &json!("abc")));
        assert!(!ids_equal(&json!(7), &json!(8)));
        assert!(!ids_equal(&Value::Null, &Value::Null));
    }

    #[test]
    fn test_row_id() {
        assert!(RowId::from("new").is_new());
        assert!(!RowId::from(3).is_new());
        assert_eq!(RowId::from(3).to_param(), "3");
        assert_eq!(RowId::new_row().to_string(), "new");
    }

    #[test]
    fn test_position_by_pk() {
        let rows: Vec<Row> = vec![
            json!({"idreg": 1}).as_object().cloned().unwrap(),
            json!({"idreg": 2}).as_object().cloned().unwrap(),
        ];
        assert_eq!(position_by_pk(&rows, "idreg", &json!("2")), Some(1));
        assert_eq!(position_by_pk(&rows, "idreg", &json!(5)), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!({})));
    }
}
