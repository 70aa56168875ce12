//! Search clause trees sent as the body of `POST search/...` requests
//!
//! A clause is `[field, operator, value]`. Clauses are grouped with
//! `{"AND": [...]}` or `{"OR": [...]}` and may nest arbitrarily.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Operator used to concatenate clauses or words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConcatOp {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl ConcatOp {
    pub fn from_search_or(search_or: bool) -> Self {
        if search_or {
            ConcatOp::Or
        } else {
            ConcatOp::And
        }
    }
}

impl fmt::Display for ConcatOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcatOp::And => write!(f, "AND"),
            ConcatOp::Or => write!(f, "OR"),
        }
    }
}

/// A single `[field, operator, value]` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchClause(pub String, pub String, pub Value);

impl SearchClause {
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(field.into(), op.into(), value.into())
    }

    pub fn field(&self) -> &str {
        &self.0
    }

    pub fn operator(&self) -> &str {
        &self.1
    }

    pub fn value(&self) -> &Value {
        &self.2
    }
}

/// A clause tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchClauses {
    Clause(SearchClause),
    Group(ClauseGroup),
    /// A bare list of clauses, read as an AND group by the backend
    List(Vec<SearchClauses>),
}

/// Clauses joined by a concatenation operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClauseGroup {
    #[serde(rename = "AND")]
    And(Vec<SearchClauses>),
    #[serde(rename = "OR")]
    Or(Vec<SearchClauses>),
}

impl ClauseGroup {
    pub fn new(op: ConcatOp, clauses: Vec<SearchClauses>) -> Self {
        match op {
            ConcatOp::And => ClauseGroup::And(clauses),
            ConcatOp::Or => ClauseGroup::Or(clauses),
        }
    }

    pub fn op(&self) -> ConcatOp {
        match self {
            ClauseGroup::And(_) => ConcatOp::And,
            ClauseGroup::Or(_) => ConcatOp::Or,
        }
    }

    pub fn clauses(&self) -> &[SearchClauses] {
        match self {
            ClauseGroup::And(c) | ClauseGroup::Or(c) => c,
        }
    }
}

impl SearchClauses {
    pub fn clause(
        field: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        SearchClauses::Clause(SearchClause::new(field, op, value))
    }

    pub fn group(op: ConcatOp, clauses: Vec<SearchClauses>) -> Self {
        SearchClauses::Group(ClauseGroup::new(op, clauses))
    }

    pub fn and(clauses: Vec<SearchClauses>) -> Self {
        Self::group(ConcatOp::And, clauses)
    }

    pub fn or(clauses: Vec<SearchClauses>) -> Self {
        Self::group(ConcatOp::Or, clauses)
    }

    /// An empty list carries no condition
    pub fn is_empty(&self) -> bool {
        matches!(self, SearchClauses::List(list) if list.is_empty())
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Combine two optional clause trees with an operator
///
/// A missing or empty side yields the other side unchanged; otherwise the
/// result is `{op: [a, b]}`.
pub fn combine_clauses(
    a: Option<SearchClauses>,
    b: Option<SearchClauses>,
    op: ConcatOp,
) -> Option<SearchClauses> {
    let a = a.filter(|c| !c.is_empty());
    let b = b.filter(|c| !c.is_empty());
    match (a, b) {
        (Some(a), Some(b)) => Some(SearchClauses::group(op, vec![a, b])),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clause_serializes_as_triple() {
        let clause = SearchClauses::clause("users.name", "LIKE", "%ana%");
        assert_eq!(clause.to_value(), json!(["users.name", "LIKE", "%ana%"]));
    }

    #[test]
    fn test_group_serializes_with_operator_key() {
        let tree = SearchClauses::or(vec![
            SearchClauses::clause("a", "=", 1),
            SearchClauses::and(vec![SearchClauses::clause("b", ">", 2)]),
        ]);
        assert_eq!(
            tree.to_value(),
            json!({"OR": [["a", "=", 1], {"AND": [["b", ">", 2]]}]})
        );
    }

    #[test]
    fn test_deserialize_round_shapes() {
        let tree: SearchClauses =
            serde_json::from_value(json!({"AND": [["a", "=", 1], [["b", "=", 2], ["c", "=", 3]]]}))
                .unwrap();
        match tree {
            SearchClauses::Group(ClauseGroup::And(items)) => {
                assert!(matches!(items[0], SearchClauses::Clause(_)));
                assert!(matches!(items[1], SearchClauses::List(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_combine_with_missing_side() {
        let a = SearchClauses::clause("a", "=", 1);
        assert_eq!(
            combine_clauses(Some(a.clone()), None, ConcatOp::And),
            Some(a.clone())
        );
        let empty = Some(SearchClauses::List(vec![]));
        assert_eq!(
            combine_clauses(empty, Some(a.clone()), ConcatOp::Or),
            Some(a)
        );
        assert_eq!(combine_clauses(None, None, ConcatOp::And), None);
    }

    #[test]
    fn test_combine_both_sides() {
        let a = SearchClauses::clause("a", "=", 1);
        let b = SearchClauses::clause("b", "=", 2);
        let combined = combine_clauses(Some(a), Some(b), ConcatOp::Or).unwrap();
        let expected = json!({"OR": [["a", "=", 1], ["b", "=", 2]]});
        assert_eq!(combined.to_value(), expected);
    }
}
