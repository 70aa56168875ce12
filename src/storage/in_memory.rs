//! In-memory implementation of Transport for testing and development
//!
//! Speaks the same REST convention as a real backend:
//!
//! - `GET {entity}?id=..&limit=..&offset=..&sort=..` lists rows
//! - `POST search/[(OR)]{entity}?..` lists rows matching the clause tree in the body
//! - `POST {entity}` creates, `PUT {entity}?id=..` updates, `DELETE {entity}?id=..` removes
//!
//! Singular and plural names address the same table once it is registered
//! through [`InMemoryTransport::with_entity_table`]. Every request is
//! recorded so tests can assert on what the engine sent.

use crate::core::clauses::{ConcatOp, SearchClause, SearchClauses};
use crate::core::error::{EngineError, TransportError};
use crate::core::fields::FieldsSpec;
use crate::core::name::EntityName;
use crate::core::row::{Row, id_to_string, ids_equal, primary_key_of};
use crate::core::service::{Method, Transport};
use crate::pipes::order::{Direction, compare_values, parse_order, sort_rows};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A request received by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

#[derive(Debug)]
struct Backend {
    tables: HashMap<String, Vec<Row>>,
    aliases: HashMap<String, String>,
    primary_key: String,
    log: Vec<RecordedRequest>,
    fail_next: Option<u16>,
    offline: bool,
}

/// Parsed request URL
#[derive(Debug, Default)]
struct Target {
    entity: String,
    search: bool,
    search_or: bool,
    params: HashMap<String, String>,
}

impl Target {
    fn parse(url: &str) -> Self {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let (search, path) = match path.strip_prefix("search/") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let (search_or, path) = match path.strip_prefix("(OR)") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self {
            entity: path.to_string(),
            search,
            search_or,
            params,
        }
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn usize_param(&self, name: &str) -> Option<usize> {
        self.param(name).and_then(|v| v.parse().ok())
    }
}

/// In-memory transport
///
/// Useful for testing and development. Uses RwLock for thread-safe access;
/// clones share the same tables and request log.
#[derive(Clone)]
pub struct InMemoryTransport {
    backend: Arc<RwLock<Backend>>,
}

impl InMemoryTransport {
    /// Create an empty transport whose rows use the `idreg` primary key
    pub fn new() -> Self {
        Self::with_primary_key("idreg")
    }

    pub fn with_primary_key(primary_key: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(RwLock::new(Backend {
                tables: HashMap::new(),
                aliases: HashMap::new(),
                primary_key: primary_key.into(),
                log: Vec::new(),
                fail_next: None,
                offline: false,
            })),
        }
    }

    fn write_backend(&self) -> Result<std::sync::RwLockWriteGuard<'_, Backend>> {
        self.backend
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))
    }

    fn read_backend(&self) -> Result<std::sync::RwLockReadGuard<'_, Backend>> {
        self.backend
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))
    }

    /// Seed a table addressed by a single name
    pub fn with_table(self, name: &str, rows: Vec<Row>) -> Self {
        if let Ok(mut backend) = self.write_backend() {
            backend.tables.insert(name.to_string(), rows);
        }
        self
    }

    /// Seed a table addressed by both the singular and the plural name
    pub fn with_entity_table(self, name: &EntityName, rows: Vec<Row>) -> Self {
        if let Ok(mut backend) = self.write_backend() {
            backend.tables.insert(name.plural.clone(), rows);
            if name.singular != name.plural {
                let singular = name.singular.clone();
                backend.aliases.insert(singular, name.plural.clone());
            }
        }
        self
    }

    /// Current rows of a table
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let backend = self.read_backend()?;
        let table = backend
            .aliases
            .get(table)
            .map(String::as_str)
            .unwrap_or(table);
        Ok(backend.tables.get(table).cloned().unwrap_or_default())
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Result<Vec<RecordedRequest>> {
        Ok(self.read_backend()?.log.clone())
    }

    pub fn request_count(&self) -> usize {
        self.read_backend().map(|b| b.log.len()).unwrap_or(0)
    }

    pub fn clear_log(&self) -> Result<()> {
        self.write_backend()?.log.clear();
        Ok(())
    }

    /// Answer the next request with the given status
    pub fn fail_next(&self, status: u16) -> Result<()> {
        self.write_backend()?.fail_next = Some(status);
        Ok(())
    }

    /// Fail every request as unreachable until switched back
    pub fn set_offline(&self, offline: bool) -> Result<()> {
        self.write_backend()?.offline = offline;
        Ok(())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn status(method: Method, url: &str, status: u16) -> anyhow::Error {
    EngineError::from(TransportError::Status {
        method: method.to_string(),
        url: url.to_string(),
        status,
    })
    .into()
}

fn decode(url: &str, message: String) -> anyhow::Error {
    EngineError::from(TransportError::Decode {
        url: url.to_string(),
        message,
    })
    .into()
}

impl Backend {
    fn table_name(&self, entity: &str) -> Option<String> {
        if self.tables.contains_key(entity) {
            return Some(entity.to_string());
        }
        self.aliases.get(entity).cloned()
    }

    fn list(&self, table: &str, target: &Target, body: Option<&Value>, url: &str) -> Result<Value> {
        let empty = Vec::new();
        let rows = self.tables.get(table).unwrap_or(&empty);
        let clauses = match body.filter(|_| target.search) {
            Some(body) => Some(
                serde_json::from_value::<SearchClauses>(body.clone())
                    .map_err(|e| decode(url, format!("invalid search clauses: {}", e)))?,
            ),
            None => None,
        };
        let list_op = if target.search_or {
            ConcatOp::Or
        } else {
            ConcatOp::And
        };

        let mut matched = Vec::new();
        for row in rows {
            if let Some(id) = target.param("id") {
                let pk = primary_key_of(row, &self.primary_key);
                if !pk.is_some_and(|pk| ids_equal(pk, &Value::String(id.to_string()))) {
                    continue;
                }
            }
            if let Some(clauses) = &clauses {
                if !matches_clauses(row, table, clauses, list_op) {
                    continue;
                }
            }
            matched.push(row.clone());
        }

        if let Some(sort) = target.param("sort") {
            let keys = parse_order(&FieldsSpec::from(sort))?;
            sort_rows(&mut matched, &keys);
        }
        let offset = target.usize_param("offset").unwrap_or(0);
        let limit = target.usize_param("limit").unwrap_or(usize::MAX);
        let page: Vec<Value> = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(Value::Object)
            .collect();
        Ok(Value::Array(page))
    }

    fn create(&mut self, table: &str, body: Option<Value>, url: &str) -> Result<Value> {
        let Some(Value::Object(mut row)) = body else {
            return Err(decode(url, "create expects a row object".to_string()));
        };
        let pk = self.primary_key.clone();
        let rows = self.tables.entry(table.to_string()).or_default();
        if primary_key_of(&row, &pk).is_none() {
            let next = rows
                .iter()
                .filter_map(|r| r.get(&pk).and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            row.insert(pk, Value::from(next));
        }
        rows.push(row.clone());
        Ok(Value::Object(row))
    }

    fn update(&mut self, table: &str, id: &str, body: Option<Value>, url: &str) -> Result<Value> {
        let Some(Value::Object(data)) = body else {
            return Err(decode(url, "update expects a row object".to_string()));
        };
        let pk = self.primary_key.clone();
        let rows = self.tables.entry(table.to_string()).or_default();
        let id = Value::String(id.to_string());
        let row = rows
            .iter_mut()
            .find(|r| primary_key_of(r, &pk).is_some_and(|v| ids_equal(v, &id)))
            .ok_or_else(|| status(Method::Put, url, 404))?;
        for (k, v) in data {
            if k != pk {
                row.insert(k, v);
            }
        }
        Ok(Value::Object(row.clone()))
    }

    fn delete(&mut self, table: &str, id: &str, url: &str) -> Result<Value> {
        let pk = self.primary_key.clone();
        let rows = self.tables.entry(table.to_string()).or_default();
        let id = Value::String(id.to_string());
        let before = rows.len();
        rows.retain(|r| !primary_key_of(r, &pk).is_some_and(|v| ids_equal(v, &id)));
        if rows.len() == before {
            return Err(status(Method::Delete, url, 404));
        }
        Ok(Value::Bool(true))
    }
}

/// Evaluate a clause tree against a row
///
/// A bare list joins its items with `list_op`; groups use their own operator.
fn matches_clauses(row: &Row, table: &str, clauses: &SearchClauses, list_op: ConcatOp) -> bool {
    let join = |items: &[SearchClauses], op: ConcatOp| match op {
        ConcatOp::And => items.iter().all(|c| matches_clauses(row, table, c, ConcatOp::And)),
        ConcatOp::Or => items.iter().any(|c| matches_clauses(row, table, c, ConcatOp::And)),
    };
    match clauses {
        SearchClauses::Clause(clause) => matches_clause(row, table, clause),
        SearchClauses::Group(group) => join(group.clauses(), group.op()),
        SearchClauses::List(items) => join(items, list_op),
    }
}

fn field_value<'a>(row: &'a Row, table: &str, field: &str) -> Option<&'a Value> {
    match field.split_once('.') {
        Some((prefix, column)) if prefix == table => row.get(column),
        Some((prefix, column)) => match row.get(prefix) {
            Some(Value::Object(inner)) => inner.get(column),
            _ => None,
        },
        None => row.get(field),
    }
}

fn like(value: &Value, pattern: &Value) -> bool {
    let (Some(pattern), Some(text)) = (pattern.as_str(), scalar_text(value)) else {
        return false;
    };
    let expression = regex::escape(pattern).replace('%', ".*").replace('_', ".");
    RegexBuilder::new(&format!("^{}$", expression))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(&text))
        .unwrap_or(false)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(id_to_string(value)),
        _ => None,
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || ids_equal(a, b)
}

fn matches_clause(row: &Row, table: &str, clause: &SearchClause) -> bool {
    let expected = clause.value();
    let value = field_value(row, table, clause.field()).unwrap_or(&Value::Null);
    let ordering = || compare_values(value, expected, Direction::Ascending);
    match clause.operator().to_ascii_uppercase().as_str() {
        "=" => loosely_equal(value, expected),
        "!=" | "<>" => !loosely_equal(value, expected),
        ">" => !value.is_null() && ordering() == Ordering::Greater,
        ">=" => !value.is_null() && ordering() != Ordering::Less,
        "<" => !value.is_null() && ordering() == Ordering::Less,
        "<=" => !value.is_null() && ordering() != Ordering::Greater,
        "LIKE" => like(value, expected),
        "NOT LIKE" => !like(value, expected),
        other => {
            tracing::warn!(
                operator = %other,
                field = %clause.field(),
                "unsupported clause operator"
            );
            false
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
        let mut backend = self.write_backend()?;
        backend.log.push(RecordedRequest {
            method,
            url: url.to_string(),
            body: body.clone(),
        });
        if backend.offline {
            return Err(EngineError::from(TransportError::Request {
                method: method.to_string(),
                url: url.to_string(),
                message: "backend unreachable".to_string(),
            })
            .into());
        }
        if let Some(code) = backend.fail_next.take() {
            return Err(status(method, url, code));
        }

        let target = Target::parse(url);
        let table = backend
            .table_name(&target.entity)
            .ok_or_else(|| status(method, url, 404))?;
        tracing::debug!(method = %method, url = %url, table = %table, "in-memory request");

        let id = target.param("id").map(str::to_string);
        match (method, target.search, id) {
            (Method::Get, _, _) | (Method::Post, true, _) => {
                backend.list(&table, &target, body.as_ref(), url)
            }
            (Method::Post, false, _) => backend.create(&table, body, url),
            (Method::Put, _, Some(id)) => backend.update(&table, &id, body, url),
            (Method::Delete, _, Some(id)) => backend.delete(&table, &id, url),
            (Method::Put | Method::Delete, _, None) => Err(status(method, url, 400)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(v: Value) -> Vec<Row> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    async fn get(t: &InMemoryTransport, url: &str) -> Value {
        t.request(Method::Get, url, None).await.unwrap()
    }

    async fn post(t: &InMemoryTransport, url: &str, body: Value) -> Value {
        t.request(Method::Post, url, Some(body)).await.unwrap()
    }

    fn transport() -> InMemoryTransport {
        InMemoryTransport::new().with_entity_table(
            &EntityName::new("user", "users"),
            rows(json!([
                {"idreg": 1, "nombre": "Ana", "edad": 30, "city": {"nombre": "Vic"}},
                {"idreg": 2, "nombre": "Joan", "edad": 20, "city": {"nombre": "Reus"}},
                {"idreg": 3, "nombre": "Marta", "edad": 40, "city": null}
            ])),
        )
    }

    #[tokio::test]
    async fn test_list_with_pagination() {
        let t = transport();
        let page = get(&t, "users?limit=2&offset=2").await;
        let marta = json!({"idreg": 3, "nombre": "Marta", "edad": 40, "city": null});
        assert_eq!(page, json!([marta]));
        assert_eq!(t.request_count(), 1);
    }

    #[tokio::test]
    async fn test_get_by_id_through_singular_name() {
        let t = transport();
        let found = get(&t, "user?id=2&fields=nombre").await;
        assert_eq!(found[0]["nombre"], json!("Joan"));
    }

    #[tokio::test]
    async fn test_search_clauses() {
        let t = transport();
        let body = json!({"OR": [["users.nombre", "LIKE", "%an%"], ["edad", ">=", 40]]});
        let found = post(&t, "search/users", body).await;
        assert_eq!(found.as_array().unwrap().len(), 3);

        let body = json!([["nombre", "LIKE", "%an%"], ["city.nombre", "=", "Reus"]]);
        let found = post(&t, "search/users", body.clone()).await;
        let joan = json!({"idreg": 2, "nombre": "Joan", "edad": 20, "city": {"nombre": "Reus"}});
        assert_eq!(found, json!([joan]));

        let found = post(&t, "search/(OR)users", body).await;
        assert_eq!(found.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sort_param() {
        let t = transport();
        let found = get(&t, "users?sort=-edad").await;
        let ids: Vec<_> = rows(found).iter().map(|r| r["idreg"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let t = transport();
        let created = post(&t, "user", json!({"nombre": "Pau"})).await;
        assert_eq!(created["idreg"], json!(4));

        let url = "user?id=4";
        let body = Some(json!({"nombre": "Pau Vila"}));
        let updated = t.request(Method::Put, url, body).await.unwrap();
        assert_eq!(updated["nombre"], json!("Pau Vila"));

        t.request(Method::Delete, url, None).await.unwrap();
        assert_eq!(t.rows("users").unwrap().len(), 3);

        let err = t.request(Method::Delete, url, None).await.unwrap_err();
        let code = EngineError::find(&err).unwrap().error_code();
        assert_eq!(code, "TRANSPORT_BAD_STATUS");
    }

    #[tokio::test]
    async fn test_failure_injection_and_log() {
        let t = transport();
        t.fail_next(500).unwrap();
        assert!(t.request(Method::Get, "users", None).await.is_err());
        assert!(t.request(Method::Get, "users", None).await.is_ok());

        t.set_offline(true).unwrap();
        let err = t.request(Method::Get, "users", None).await.unwrap_err();
        let code = EngineError::find(&err).unwrap().error_code();
        assert_eq!(code, "TRANSPORT_REQUEST_FAILED");

        let log = t.requests().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].method, Method::Get);
        t.clear_log().unwrap();
        assert_eq!(t.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let t = transport();
        let err = t.request(Method::Get, "facturas", None).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
