//! Propagation of parent row changes into the rows of dependent queries
//!
//! A child query declares its foreign keys in `list.foreign`, mapping each
//! key column to the parent table and the value displayed from it. When a
//! parent row changes, the display values copied into the cached child rows
//! are refreshed; when it is deleted, the child rows pointing at it go too.

use super::{CrudService, FindOptions, QueryLookup};
use crate::core::error::{ConfigError, EngineError};
use crate::core::fields::{AliasName, ApiEntity};
use crate::core::model::EntityModel;
use crate::core::name::{CompareNames, EntityName};
use crate::core::query::EntityQuery;
use crate::core::row::{Row, ids_equal, primary_key_of};
use crate::core::schema::ForeignDisplay;
use anyhow::Result;
use serde_json::{Map, Value};
use std::sync::PoisonError;

/// Where a child row keeps the data copied from its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embedding {
    /// Object under the parent singular name
    Singular,
    /// Object under the parent plural name
    Plural,
    /// Object under the alias given in the foreign descriptor
    Alias(String),
    /// Columns directly on the child row
    Flat,
}

impl Embedding {
    /// Detect the embedding from a sample child row
    pub fn detect(sample: &Row, parent: &EntityName, alias: Option<&str>) -> Self {
        let is_object = |key: &str| sample.get(key).is_some_and(Value::is_object);
        if is_object(&parent.singular) {
            Embedding::Singular
        } else if is_object(&parent.plural) {
            Embedding::Plural
        } else {
            match alias {
                Some(alias) if is_object(alias) => Embedding::Alias(alias.to_string()),
                _ => Embedding::Flat,
            }
        }
    }

    /// Key of the embedded object, `None` when flat
    pub fn key<'a>(&'a self, parent: &'a EntityName) -> Option<&'a str> {
        match self {
            Embedding::Singular => Some(&parent.singular),
            Embedding::Plural => Some(&parent.plural),
            Embedding::Alias(alias) => Some(alias),
            Embedding::Flat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Propagation {
    Changes,
    Deletes,
}

/// One foreign key of a child query pointing at the parent entity
struct Relation<'a> {
    parent: &'a EntityModel,
    parent_row: &'a Row,
    parent_id: &'a Value,
    child: &'a EntityQuery,
    foreign_key: &'a str,
    table: AliasName,
    display: &'a ForeignDisplay,
}

impl Relation<'_> {
    /// Whether a child row points at the parent row
    fn points_at_parent(&self, row: &Row, embedding: &Embedding) -> Result<bool> {
        if let Some(fk) = row.get(self.foreign_key) {
            return Ok(ids_equal(fk, self.parent_id));
        }
        let primary_key = &self.parent.primary_key;
        let embedded = embedding
            .key(&self.parent.name)
            .map(|key| (key, row.get(key)));
        match embedded {
            Some((key, Some(Value::Object(object)))) => match object.get(primary_key) {
                Some(id) => Ok(ids_equal(id, self.parent_id)),
                None => Err(EngineError::from(ConfigError::MissingEmbeddedKey {
                    child: self.child.key().to_string(),
                    embedded: key.to_string(),
                    primary_key: primary_key.clone(),
                })
                .into()),
            },
            Some((_, None | Some(Value::Null))) => Ok(false),
            _ => Err(EngineError::from(ConfigError::MissingForeignKey {
                parent: self.parent.name.plural.clone(),
                child: self.child.key().to_string(),
                foreign_key: self.foreign_key.to_string(),
            })
            .into()),
        }
    }

    /// Property written into the child row and its new value
    fn display_value(&self) -> Option<(String, Value)> {
        match self.display {
            ForeignDisplay::Field(field) => self
                .parent_row
                .get(field)
                .map(|value| (field.clone(), value.clone())),
            ForeignDisplay::Compute(func) => {
                let value = func.call(self.parent_row);
                Some((self.parent.name.singular.clone(), value))
            }
        }
    }

    fn write_display(&self, row: &mut Row, embedding: &Embedding, prop: &str, value: &Value) {
        match embedding.key(&self.parent.name) {
            Some(key) => {
                let object = row
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !object.is_object() {
                    *object = Value::Object(Map::new());
                }
                if let Value::Object(object) = object {
                    object.insert(prop.to_string(), value.clone());
                }
            }
            None => {
                row.insert(self.parent.name.singular.clone(), value.clone());
            }
        }
    }
}

impl CrudService {
    /// Refresh the parent display values held by dependent queries
    ///
    /// Returns how many child rows were updated. Every child row is checked
    /// before any is touched, so a misconfigured foreign key leaves the
    /// child query unchanged. A dependent entity without a registered query
    /// is a configuration error.
    pub fn propagate_changes(&self, parent: &EntityModel, row: &Row) -> Result<usize> {
        self.propagate(parent, row, Propagation::Changes)
    }

    /// Remove the rows of dependent queries pointing at a deleted row
    pub fn propagate_deletes(&self, parent: &EntityModel, row: &Row) -> Result<usize> {
        self.propagate(parent, row, Propagation::Deletes)
    }

    /// Embedding detected for a child query foreign key, if any yet
    pub fn embedding(
        &self,
        parent: &EntityName,
        child_key: &str,
        foreign_key: &str,
    ) -> Option<Embedding> {
        let key = (
            parent.plural.clone(),
            child_key.to_string(),
            foreign_key.to_string(),
        );
        self.embeddings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn propagate(&self, parent: &EntityModel, row: &Row, kind: Propagation) -> Result<usize> {
        let targets = match kind {
            Propagation::Changes => &parent.detail.propagate_changes,
            Propagation::Deletes => &parent.detail.propagate_deletes,
        };
        if targets.is_empty() {
            return Ok(0);
        }
        let parent_id = primary_key_of(row, &parent.primary_key).ok_or_else(|| {
            anyhow::Error::from(EngineError::from(ConfigError::MissingPrimaryKey {
                entity: parent.name.plural.clone(),
                primary_key: parent.primary_key.clone(),
            }))
        })?;

        let mut touched = 0;
        for target in targets {
            let lookup = QueryLookup::Entity(EntityName::literal(target));
            let children = self.find_queries(lookup, FindOptions::default())?;
            for child in &children {
                let Some(foreign) = &child.model().list.foreign else {
                    continue;
                };
                for (foreign_key, tables) in foreign {
                    let Some((table_key, display)) = tables.first() else {
                        continue;
                    };
                    let table = ApiEntity::new(table_key, "").table;
                    let optimistic = CompareNames::Optimistic;
                    let related = parent.name.matches(&table.name, optimistic)
                        || parent.backend.matches(&table.name, optimistic);
                    if !related {
                        continue;
                    }
                    let relation = Relation {
                        parent,
                        parent_row: row,
                        parent_id,
                        child,
                        foreign_key,
                        table,
                        display,
                    };
                    touched += self.apply_relation(&relation, kind)?;
                }
            }
        }
        if touched > 0 {
            tracing::debug!(
                parent = %parent.name,
                rows = touched,
                kind = ?kind,
                "propagated to child rows"
            );
        }
        Ok(touched)
    }

    fn apply_relation(&self, relation: &Relation<'_>, kind: Propagation) -> Result<usize> {
        let cache_key = (
            relation.parent.name.plural.clone(),
            relation.child.key().to_string(),
            relation.foreign_key.to_string(),
        );
        let alias = relation.table.alias.as_deref();
        relation.child.with_state_mut(|state| {
            let Some(sample) = state.rows.first() else {
                return Ok(0);
            };
            let embedding = {
                let mut embeddings = self
                    .embeddings
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                embeddings
                    .entry(cache_key)
                    .or_insert_with(|| Embedding::detect(sample, &relation.parent.name, alias))
                    .clone()
            };

            let matches = state
                .rows
                .iter()
                .map(|row| relation.points_at_parent(row, &embedding))
                .collect::<Result<Vec<bool>>>()?;
            let count = matches.iter().filter(|m| **m).count();

            match kind {
                Propagation::Changes => {
                    let Some((prop, value)) = relation.display_value() else {
                        return Ok(0);
                    };
                    for (row, _) in state.rows.iter_mut().zip(&matches).filter(|(_, m)| **m) {
                        relation.write_display(row, &embedding, &prop, &value);
                    }
                }
                Propagation::Deletes => {
                    let mut keep = matches.iter().map(|m| !m);
                    state.rows.retain(|_| keep.next().unwrap_or(true));
                }
            }
            Ok(count)
        })
    }
}
