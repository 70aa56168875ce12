//! Multi-key ordering of rows and primitive values
//!
//! Order specs use the projection syntax: `-precio` or `precio desc` sorts
//! descending, `tarifa(descripcion)` and `tarifa.descripcion` sort by an
//! embedded column, and `tabla->alias` reads the aliased key.

use crate::core::error::{EngineError, PipeError};
use crate::core::fields::{FieldsSpec, split_fields, split_table_and_fields};
use crate::core::row::{Row, is_truthy};
use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "+" | "1" => Ok(Direction::Ascending),
            "desc" | "-" | "-1" => Ok(Direction::Descending),
            other => Err(invalid(format!("unknown direction '{}'", other))),
        }
    }
}

/// One sort key: a path into the row and its direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub path: Vec<String>,
    pub direction: Direction,
}

fn invalid(message: String) -> anyhow::Error {
    EngineError::from(PipeError::InvalidOrder { message }).into()
}

fn direction_regex() -> &'static Regex {
    static DIRECTION: OnceLock<Regex> = OnceLock::new();
    DIRECTION.get_or_init(|| {
        Regex::new(r"(?i)^(\S+)(\s*desc)?").expect("direction pattern is valid")
    })
}

/// Drop sort markers and resolve `name->alias` to the alias
fn sanitize(prop: &str) -> String {
    let prop = prop.strip_prefix('-').unwrap_or(prop);
    let prop = prop.strip_suffix('-').unwrap_or(prop);
    let prop = prop.strip_suffix('?').unwrap_or(prop);
    match prop.split_once("->") {
        Some((_, alias)) => alias.to_string(),
        None => prop.to_string(),
    }
}

fn normalize_property(prop: &str) -> Result<OrderKey> {
    if prop.contains('(') || prop.contains('.') {
        let nested = split_table_and_fields(prop, false);
        let inner = if prop.contains('(') {
            if nested.columns.len() != 1 {
                return Err(invalid(format!(
                    "'{}' must name exactly one column inside parentheses",
                    prop
                )));
            }
            nested.columns[0].clone()
        } else {
            nested.columns.join(".")
        };
        let mut key = normalize_property(&format!("{}{}", nested.direction_prefix(), inner))?;
        key.path.insert(0, sanitize(&nested.table));
        return Ok(key);
    }

    let captures = direction_regex()
        .captures(prop.trim())
        .ok_or_else(|| invalid(format!("empty order property '{}'", prop)))?;
    let name = captures.get(1).map_or("", |m| m.as_str());
    let descending = captures.get(2).is_some() || name.starts_with('-') || name.ends_with('-');
    Ok(OrderKey {
        path: vec![sanitize(name)],
        direction: if descending {
            Direction::Descending
        } else {
            Direction::Ascending
        },
    })
}

fn collect_keys(spec: &FieldsSpec, keys: &mut Vec<OrderKey>) -> Result<()> {
    match spec {
        FieldsSpec::Text(text) => {
            for prop in split_fields(text) {
                keys.push(normalize_property(&prop)?);
            }
        }
        FieldsSpec::List(items) => {
            for item in items {
                collect_keys(item, keys)?;
            }
        }
        FieldsSpec::Tables(tables) => {
            for (table, inner) in tables {
                let mut nested = Vec::new();
                collect_keys(inner, &mut nested)?;
                for mut key in nested {
                    key.path.insert(0, sanitize(table));
                    keys.push(key);
                }
            }
        }
    }
    Ok(())
}

/// Normalise an order spec into sort keys
///
/// ```
/// use entity_query::core::fields::FieldsSpec;
/// use entity_query::pipes::order::{Direction, parse_order};
///
/// let keys = parse_order(&FieldsSpec::from("tarifa(descripcion),-precio")).unwrap();
/// assert_eq!(keys[0].path, vec!["tarifa", "descripcion"]);
/// assert_eq!(keys[1].direction, Direction::Descending);
/// ```
pub fn parse_order(spec: &FieldsSpec) -> Result<Vec<OrderKey>> {
    let mut keys = Vec::new();
    collect_keys(spec, &mut keys)?;
    if keys.is_empty() {
        return Err(invalid("at least one property is required to sort rows".to_string()));
    }
    Ok(keys)
}

/// Compare two values the way lists are sorted
///
/// Strings compare case-insensitively and numbers numerically; any other
/// pair puts falsy values first.
pub fn compare_values(a: &Value, b: &Value, direction: Direction) -> Ordering {
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => match (is_truthy(a), is_truthy(b)) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            _ => Ordering::Equal,
        },
    };
    direction.apply(ordering)
}

fn terminal_value<'a>(row: &'a Row, path: &[String]) -> Option<&'a Value> {
    let (last, parents) = path.split_last()?;
    let mut current = row;
    for step in parents {
        match current.get(step) {
            Some(Value::Object(inner)) => current = inner,
            _ => return None,
        }
    }
    current.get(last)
}

fn compare_rows(a: &Row, b: &Row, keys: &[OrderKey]) -> Ordering {
    for key in keys {
        let left = terminal_value(a, &key.path);
        let right = terminal_value(b, &key.path);
        let ordering = match (left, right) {
            (Some(x), Some(y)) => compare_values(x, y, key.direction),
            _ => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Bottom-up merge sort over indices
///
/// Missing keys and mixed value types make the comparison partial, so the
/// sort only relies on `Less` answers and never assumes a total order.
fn merge_sort_by<T, F>(items: &mut [T], mut compare: F)
where
    T: Default,
    F: FnMut(&T, &T) -> Ordering,
{
    let len = items.len();
    if len < 2 {
        return;
    }
    let mut order: Vec<usize> = (0..len).collect();
    let mut merged = vec![0; len];
    let mut width = 1;
    while width < len {
        for start in (0..len).step_by(2 * width) {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut left, mut right) = (start, mid);
            for slot in &mut merged[start..end] {
                let take_right = if left >= mid {
                    true
                } else if right < end {
                    compare(&items[order[right]], &items[order[left]]) == Ordering::Less
                } else {
                    false
                };
                if take_right {
                    *slot = order[right];
                    right += 1;
                } else {
                    *slot = order[left];
                    left += 1;
                }
            }
        }
        std::mem::swap(&mut order, &mut merged);
        width *= 2;
    }

    let mut taken: Vec<T> = items.iter_mut().map(std::mem::take).collect();
    for (slot, index) in items.iter_mut().zip(order) {
        *slot = std::mem::take(&mut taken[index]);
    }
}

/// Stable sort of rows by the given keys
pub fn sort_rows(rows: &mut [Row], keys: &[OrderKey]) {
    merge_sort_by(rows, |a, b| compare_rows(a, b, keys));
}

/// Sort rows by an order spec, then run the callback once
pub fn order_rows(
    rows: &mut [Row],
    spec: &FieldsSpec,
    on_sorted: Option<&dyn Fn(&[Row])>,
) -> Result<()> {
    let keys = parse_order(spec)?;
    sort_rows(rows, &keys);
    if let Some(callback) = on_sorted {
        callback(rows);
    }
    Ok(())
}

/// Sort primitive values in a single direction
pub fn order_values(values: &mut [Value], direction: Direction) {
    merge_sort_by(values, |a, b| compare_values(a, b, direction));
}
