//! Field projection syntax
//!
//! Fields are declared as text (`"precio,tarifa(descripcion->tarifa)"`),
//! nested tables (`{tarifa: "descripcion"}`) or lists mixing both. They are
//! parsed into [`ApiEntity`] values, one per table, which are then joined and
//! written back as the `fields`, `rel` and `sort` query parameters.

use crate::core::error::{ConfigError, EngineError};
use anyhow::Result;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A field projection as written in a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldsSpec {
    Text(String),
    List(Vec<FieldsSpec>),
    Tables(IndexMap<String, FieldsSpec>),
}

impl From<&str> for FieldsSpec {
    fn from(fields: &str) -> Self {
        FieldsSpec::Text(fields.to_string())
    }
}

impl From<Vec<&str>> for FieldsSpec {
    fn from(fields: Vec<&str>) -> Self {
        FieldsSpec::List(fields.into_iter().map(FieldsSpec::from).collect())
    }
}

/// A table or column name with an optional alias (`name->alias`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AliasName {
    pub name: String,
    pub alias: Option<String>,
}

impl AliasName {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.filter(|a| !a.is_empty()),
        }
    }

    pub fn parse(text: &str) -> Self {
        match text.split_once("->") {
            Some((name, alias)) => Self::new(name, Some(alias.to_string())),
            None => Self::new(text, None),
        }
    }

    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn to_url(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}->{}", self.name, alias),
            None => self.name.clone(),
        }
    }
}

/// Result of splitting a `table(columns)` or `table.path` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFields {
    pub table: String,
    pub columns: Vec<String>,
    /// `-` prefix or suffix on the table marks a descending sort
    pub descending: bool,
    /// `?` suffix on the table marks the property as optional
    pub optional: bool,
}

impl TableFields {
    pub fn direction_prefix(&self) -> &'static str {
        if self.descending { "-" } else { "" }
    }
}

/// A table and the columns requested from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEntity {
    pub table: AliasName,
    pub columns: Vec<AliasName>,
    /// Explicit relation column, written `alias(fk)`
    pub relation: Option<String>,
}

fn split_fields_regex() -> &'static Regex {
    static SPLIT_REGEX: OnceLock<Regex> = OnceLock::new();
    SPLIT_REGEX.get_or_init(|| {
        Regex::new(r"([^(,]*(?:\([^\)]*\))?)|(?:,)").expect("field split pattern is valid")
    })
}

/// Split a field list on top-level commas
///
/// ```
/// use entity_query::core::fields::split_fields;
///
/// assert_eq!(
///     split_fields("tarifas(descripcion,precio),mes, dia"),
///     vec!["tarifas(descripcion,precio)", "mes", "dia"]
/// );
/// ```
pub fn split_fields(fields: &str) -> Vec<String> {
    split_fields_regex()
        .find_iter(fields)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty() && *s != ",")
        .map(str::to_string)
        .collect()
}

/// Reduce a nested path to its last table and column (`a?.b?.c` → `b?.c`)
pub fn reduce_nested_field(prop: &str) -> String {
    let parts: Vec<&str> = prop.split('.').collect();
    if parts.len() < 2 {
        return prop.to_string();
    }
    parts[parts.len() - 2..].join(".")
}

fn strip_table_markers(table: &str) -> (String, bool, bool) {
    let (table, optional) = match table.strip_suffix('?') {
        Some(t) => (t, true),
        None => (table, false),
    };
    let descending = table.starts_with('-') || table.ends_with('-');
    let table = table
        .strip_prefix('-')
        .or_else(|| table.strip_suffix('-'))
        .unwrap_or(table);
    (table.to_string(), descending, optional)
}

/// Split a field expression into its table and columns
pub fn split_table_and_fields(prop: &str, reduce_nested: bool) -> TableFields {
    if let Some((table, rest)) = prop.split_once('(') {
        let (table, descending, optional) = strip_table_markers(table);
        let columns = rest
            .replacen(')', "", 1)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        TableFields {
            table,
            columns,
            descending,
            optional,
        }
    } else if prop.contains('.') {
        let path = if reduce_nested {
            reduce_nested_field(prop)
        } else {
            prop.to_string()
        };
        let (table, columns) = path.split_once('.').unwrap_or((path.as_str(), ""));
        let (table, descending, optional) = strip_table_markers(table);
        TableFields {
            table,
            columns: vec![columns.to_string()],
            descending,
            optional,
        }
    } else {
        let (column, optional) = match prop.strip_suffix('?') {
            Some(c) => (c, true),
            None => (prop, false),
        };
        TableFields {
            table: String::new(),
            columns: vec![column.to_string()],
            descending: false,
            optional,
        }
    }
}

impl ApiEntity {
    /// Build an entity from a table expression and a comma separated column list
    pub fn new(table: &str, columns: &str) -> Self {
        let mut table = AliasName::parse(table);
        let mut relation = None;

        if let Some((alias, rel)) = table.alias.as_deref().and_then(split_relation) {
            table.alias = Some(alias);
            relation = Some(rel);
        } else if let Some((name, rel)) = split_relation(&table.name) {
            table.name = name;
            relation = Some(rel);
        }

        let columns = columns
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(AliasName::parse)
            .collect();

        Self {
            table,
            columns,
            relation,
        }
    }

    pub fn table_to_url(&self) -> String {
        match &self.relation {
            Some(rel) => format!("{}({})", self.table.to_url(), rel),
            None => self.table.to_url(),
        }
    }

    pub fn columns_to_url(&self) -> String {
        self.columns
            .iter()
            .map(AliasName::to_url)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a projection into one entity per referenced table
    pub fn parse_fields(entity: &str, fields: Option<&FieldsSpec>) -> Result<Vec<ApiEntity>> {
        let Some(fields) = fields else {
            return Ok(vec![ApiEntity::new(entity, "")]);
        };

        let mut entities = Vec::new();
        match fields {
            FieldsSpec::Text(text) => {
                for segment in split_fields(text) {
                    if segment.contains('(') {
                        let split = split_table_and_fields(&segment, false);
                        let prefix = split.direction_prefix();
                        let columns = format!("{}{}", prefix, split.columns.join(","));
                        entities.push(ApiEntity::new(&split.table, &columns));
                    } else if segment.contains('.') {
                        let split = split_table_and_fields(&segment, false);
                        let prefix = split.direction_prefix();
                        let columns = format!("{}{}", prefix, split.columns.join("."));
                        entities.push(ApiEntity::new(&split.table, &columns));
                    } else {
                        entities.push(ApiEntity::new(entity, &segment));
                    }
                }
            }
            FieldsSpec::List(list) => {
                for item in list {
                    entities.extend(Self::parse_fields(entity, Some(item))?);
                }
            }
            FieldsSpec::Tables(tables) => {
                for (table, columns) in tables {
                    match columns {
                        FieldsSpec::Tables(_) => {
                            for mut nested in Self::parse_fields(table, Some(columns))? {
                                nested.table.alias = Some(table.clone());
                                entities.push(nested);
                            }
                        }
                        _ => entities.extend(Self::parse_fields(table, Some(columns))?),
                    }
                }
            }
        }

        if entities.iter().any(|e| e.table.name.is_empty()) {
            return Err(EngineError::from(ConfigError::InvalidFields {
                entity: entity.to_string(),
                message: "a table expression has no name".to_string(),
            })
            .into());
        }
        Ok(entities)
    }

    /// Merge entities addressing the same table, keeping first-seen column order
    pub fn join_fields(entities: &[ApiEntity]) -> Vec<ApiEntity> {
        let mut joined: Vec<ApiEntity> = Vec::new();
        for entity in entities {
            let url = entity.table_to_url();
            match joined.iter_mut().find(|e| e.table_to_url() == url) {
                Some(found) => {
                    for column in &entity.columns {
                        if !found.columns.iter().any(|c| c.to_url() == column.to_url()) {
                            found.columns.push(column.clone());
                        }
                    }
                }
                None => joined.push(entity.clone()),
            }
        }
        joined
    }

    /// Concatenate entity lists dropping later duplicates by name, alias and relation
    pub fn distinct_entities(lists: &[&[ApiEntity]]) -> Vec<ApiEntity> {
        let mut result: Vec<ApiEntity> = Vec::new();
        for entity in lists.iter().flat_map(|list| list.iter()) {
            if !result.iter().any(|seen| seen.same_table(entity)) {
                result.push(entity.clone());
            }
        }
        result
    }

    fn same_table(&self, other: &ApiEntity) -> bool {
        let (a, b) = (&self.table, &other.table);
        (a.name == b.name && a.alias == b.alias && self.relation == other.relation)
            || matches!((&a.alias, &b.alias), (Some(alias), None) if *alias == b.name)
            || matches!((&a.alias, &b.alias), (None, Some(alias)) if *alias == a.name)
    }

    /// Write entities back as projection segments relative to the main entity
    pub fn stringify_fields(main: &str, entities: &[ApiEntity], only_main: bool) -> Vec<String> {
        entities
            .iter()
            .filter(|e| !only_main || e.table.name == main)
            .filter_map(|e| {
                let columns = e.columns_to_url();
                if columns.trim().is_empty() {
                    None
                } else if e.table.name == main {
                    Some(columns)
                } else {
                    Some(format!("{}({})", e.table.alias_or_name(), columns))
                }
            })
            .collect()
    }
}

fn split_relation(text: &str) -> Option<(String, String)> {
    let idx = text.find(['(', '['])?;
    let relation = text[idx + 1..].replace([')', ']'], "");
    Some((text[..idx].to_string(), relation))
}

impl fmt::Display for ApiEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table_to_url(), self.columns_to_url())
    }
}
