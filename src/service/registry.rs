//! Registry of the queries and caches of a session

use crate::core::cache::EntityCache;
use crate::core::clauses::SearchClauses;
use crate::core::hook::Hook;
use crate::core::model::EntityModel;
use crate::core::name::{CompareNames, EntityName};
use crate::core::query::EntityQuery;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// How a query is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryLookup {
    /// Registration key
    Key(String),
    /// Every query of an entity
    Entity(EntityName),
}

impl From<&str> for QueryLookup {
    fn from(key: &str) -> Self {
        QueryLookup::Key(key.to_string())
    }
}

impl From<String> for QueryLookup {
    fn from(key: String) -> Self {
        QueryLookup::Key(key)
    }
}

impl From<EntityName> for QueryLookup {
    fn from(name: EntityName) -> Self {
        QueryLookup::Entity(name)
    }
}

impl From<&EntityName> for QueryLookup {
    fn from(name: &EntityName) -> Self {
        QueryLookup::Entity(name.clone())
    }
}

impl fmt::Display for QueryLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryLookup::Key(key) => write!(f, "{}", key),
            QueryLookup::Entity(name) => write!(f, "{}", name.plural),
        }
    }
}

/// Queries by key, in registration order, and caches by backend entity
#[derive(Default)]
pub struct QueryRegistry {
    queries: RwLock<IndexMap<String, Arc<EntityQuery>>>,
    caches: RwLock<HashMap<String, Arc<EntityCache>>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the registered query or create it
    pub fn register(&self, model: Arc<EntityModel>, key: Option<&str>) -> Arc<EntityQuery> {
        let mut queries = self.queries.write().unwrap_or_else(PoisonError::into_inner);
        let existing = match key {
            Some(key) => queries.get(key).cloned(),
            None => queries
                .values()
                .find(|q| q.model().name.equals(&model.name, CompareNames::Pessimistic))
                .cloned(),
        };
        if let Some(query) = existing {
            return query;
        }

        let key = key
            .map(str::to_string)
            .unwrap_or_else(|| model.name.plural.clone());
        let cache = (model.list.cache || model.detail.cache).then(|| self.cache_for(&model));
        let query = Arc::new(EntityQuery::new(key.clone(), model.clone(), cache.clone()));
        if let Some(cache) = cache {
            let search = match &model.list.search {
                Some(Hook::Value(clauses)) => Some(clauses.clone()),
                Some(_) => Some(SearchClauses::List(Vec::new())),
                None => None,
            };
            cache.attach(&query, search);
        }
        queries.insert(key.clone(), query.clone());
        tracing::debug!(
            key = %key,
            entity = %model.name,
            cached = query.cache().is_some(),
            "query registered"
        );
        query
    }

    fn cache_for(&self, model: &EntityModel) -> Arc<EntityCache> {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        caches
            .entry(model.backend.plural.clone())
            .or_insert_with(|| Arc::new(EntityCache::new(model)))
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<EntityQuery>> {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Queries matching a lookup, in registration order
    pub fn find(&self, lookup: &QueryLookup, compare: CompareNames) -> Vec<Arc<EntityQuery>> {
        let queries = self.queries.read().unwrap_or_else(PoisonError::into_inner);
        match lookup {
            QueryLookup::Key(key) => queries.get(key).cloned().into_iter().collect(),
            QueryLookup::Entity(name) => queries
                .values()
                .filter(|q| {
                    let model = q.model();
                    model.name.equals(name, compare) || model.backend.equals(name, compare)
                })
                .cloned()
                .collect(),
        }
    }

    pub fn queries(&self) -> Vec<Arc<EntityQuery>> {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn caches(&self) -> Vec<Arc<EntityCache>> {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{EntitySchema, ListSchema};

    fn model(schema: EntitySchema) -> Arc<EntityModel> {
        Arc::new(EntityModel::resolve(&schema, None).unwrap())
    }

    #[test]
    fn test_default_key_is_plural() {
        let registry = QueryRegistry::new();
        let query = registry.register(model(EntitySchema::new("festivos")), None);
        assert_eq!(query.key(), "festivos");
        assert!(registry.get("festivos").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_partial_cache_queries() {
        let registry = QueryRegistry::new();
        let schema = EntitySchema::new("facturas").with_list(ListSchema {
            cache: Some(true),
            search: Some(Hook::value(SearchClauses::clause("pagada", "=", 0))),
            ..Default::default()
        });
        let m = model(schema);
        let query = registry.register(m.clone(), Some("pendientes"));
        let cache = query.cache().unwrap();
        assert!(cache.find_query(true, &m.backend).is_some());
        assert!(cache.find_query(false, &m.backend).is_none());
        assert_eq!(registry.caches().len(), 1);
    }

    #[test]
    fn test_find_by_entity_name() {
        let registry = QueryRegistry::new();
        registry.register(model(EntitySchema::new("precios_tarifa")), None);
        let found = registry.find(
            &QueryLookup::Entity(EntityName::literal("precios_tarifa")),
            CompareNames::Optimistic,
        );
        assert_eq!(found.len(), 1);
        let none = registry.find(
            &QueryLookup::Entity(EntityName::literal("precio_tarifa")),
            CompareNames::Pessimistic,
        );
        assert!(none.is_empty());
    }
}
