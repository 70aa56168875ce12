//! CRUD service: query registry, row fetching, mutations and propagation
//!
//! One [`CrudService`] is built per session. It owns every registered
//! [`EntityQuery`] and the caches shared between them, and reaches the
//! backend only through the injected [`Transport`].
//!
//! ```rust,ignore
//! let service = CrudServiceBuilder::new(InMemoryTransport::new())
//!     .with_event_bus(bus.clone())
//!     .build();
//!
//! let model = service.resolve_model(&EntitySchema::new("tarifas"))?;
//! let query = service.register_query(model, None);
//! let rows = service.get_rows(&query, &FetchOptions::default(), &ctx).await?;
//! ```

pub mod audit;
pub mod builder;
pub mod fetch;
pub mod mutate;
pub mod notify;
pub mod propagate;
pub mod registry;

pub use builder::CrudServiceBuilder;
pub use propagate::Embedding;
pub use registry::{QueryLookup, QueryRegistry};

use crate::config::ServiceConfig;
use crate::core::error::{ConfigError, EngineError};
use crate::core::events::EventBus;
use crate::core::fields::FieldsSpec;
use crate::core::model::EntityModel;
use crate::core::name::{CompareNames, EntityName};
use crate::core::query::EntityQuery;
use crate::core::row::Row;
use crate::core::schema::EntitySchema;
use crate::core::service::{Confirmer, SettingsStore, Transport, Translator};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Options of [`CrudService::find_queries`]
#[derive(Debug, Clone, Copy)]
pub struct FindOptions {
    /// Name comparison policy, the service default when unset
    pub compare: Option<CompareNames>,
    /// Fail when nothing matches
    pub throw_error: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            compare: None,
            throw_error: true,
        }
    }
}

/// Options of the fetching operations
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Overrides `list.paginate`
    pub paginate: Option<bool>,
    /// Replaces the declared projection
    pub custom_fields: Option<FieldsSpec>,
}

/// Options of [`CrudService::refresh`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Drop the rows, keeping the page, before requesting
    pub clear_before: bool,
    /// Triggered by a scroll or paging event rather than a full reload
    pub event: bool,
}

/// Hook applied to a row before it is sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaveHook {
    #[default]
    Detail,
    List,
    Skip,
}

/// Options of [`CrudService::save_row`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    pub hook: SaveHook,
}

/// Options of [`CrudService::pick_row`]
#[derive(Debug, Clone)]
pub struct PickRowOptions {
    pub entity: EntityName,
    /// Give up after this long
    pub timeout: Option<Duration>,
}

impl PickRowOptions {
    pub fn new(entity: EntityName) -> Self {
        Self {
            entity,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Entity CRUD engine for one session
pub struct CrudService {
    transport: Arc<dyn Transport>,
    translator: Option<Arc<dyn Translator>>,
    confirmer: Option<Arc<dyn Confirmer>>,
    settings: Option<Arc<dyn SettingsStore>>,
    event_bus: EventBus,
    config: ServiceConfig,
    registry: QueryRegistry,
    embeddings: RwLock<HashMap<(String, String, String), Embedding>>,
    preloaded: RwLock<Option<Row>>,
}

impl CrudService {
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn translator(&self) -> Option<&Arc<dyn Translator>> {
        self.translator.as_ref()
    }

    pub fn confirmer(&self) -> Option<&Arc<dyn Confirmer>> {
        self.confirmer.as_ref()
    }

    pub fn settings(&self) -> Option<&Arc<dyn SettingsStore>> {
        self.settings.as_ref()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &QueryRegistry {
        &self.registry
    }

    /// Resolve a schema with the service translator
    pub fn resolve_model(&self, schema: &EntitySchema) -> Result<Arc<EntityModel>> {
        let translator = self.translator.as_deref();
        Ok(Arc::new(EntityModel::resolve(schema, translator)?))
    }

    /// Register a query for a model
    ///
    /// Idempotent: with a key, the query already registered under it is
    /// returned; without one, the first query of the same entity is. New
    /// queries default to the plural entity name as key and share the
    /// entity cache when the list or detail view asks for caching.
    pub fn register_query(&self, model: Arc<EntityModel>, key: Option<&str>) -> Arc<EntityQuery> {
        self.registry.register(model, key)
    }

    /// Resolve a schema and register its query
    pub fn register_schema(
        &self,
        schema: &EntitySchema,
        key: Option<&str>,
    ) -> Result<Arc<EntityQuery>> {
        let model = self.resolve_model(schema)?;
        Ok(self.register_query(model, key))
    }

    /// Queries registered under a key, or for an entity
    pub fn find_queries(
        &self,
        lookup: impl Into<QueryLookup>,
        options: FindOptions,
    ) -> Result<Vec<Arc<EntityQuery>>> {
        let lookup = lookup.into();
        let compare = options.compare.unwrap_or(self.config.compare);
        let found = self.registry.find(&lookup, compare);
        if found.is_empty() && options.throw_error {
            return Err(EngineError::from(ConfigError::QueryNotFound {
                entity: lookup.to_string(),
            })
            .into());
        }
        Ok(found)
    }

    /// First query registered under a key, or for an entity
    pub fn find_query(&self, lookup: impl Into<QueryLookup>) -> Result<Arc<EntityQuery>> {
        let lookup = lookup.into();
        let compare = self.config.compare;
        self.registry
            .find(&lookup, compare)
            .into_iter()
            .next()
            .ok_or_else(|| {
                EngineError::from(ConfigError::QueryNotFound {
                    entity: lookup.to_string(),
                })
                .into()
            })
    }

    /// Clear every registered query and cache
    pub fn clear_cache(&self) {
        for cache in self.registry.caches() {
            cache.clear();
        }
        for query in self.registry.queries() {
            query.clear();
        }
        self.embeddings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::info!(queries = self.registry.len(), "all queries cleared");
    }

    /// Row stored by the last [`preload_row`](Self::preload_row), taken once
    pub fn take_preloaded_row(&self) -> Option<Row> {
        self.preloaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn store_preloaded_row(&self, row: Option<Row>) {
        let mut preloaded = self
            .preloaded
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *preloaded = row;
    }
}

impl std::fmt::Debug for CrudService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudService")
            .field("queries", &self.registry.len())
            .field("translator", &self.translator.is_some())
            .field("confirmer", &self.confirmer.is_some())
            .field("settings", &self.settings.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DetailSchema, ListSchema};
    use crate::storage::InMemoryTransport;

    fn service() -> CrudService {
        CrudServiceBuilder::new(InMemoryTransport::new()).build()
    }

    fn tarifas() -> EntitySchema {
        EntitySchema::new("tarifas")
    }

    #[test]
    fn test_register_query_is_idempotent() {
        let service = service();
        let a = service.register_schema(&tarifas(), None).unwrap();
        let b = service.register_schema(&tarifas(), None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.key(), "tarifas");

        let key = Some("activas");
        let keyed = service.register_schema(&tarifas(), key).unwrap();
        assert!(!Arc::ptr_eq(&a, &keyed));
        let again = service.register_schema(&tarifas(), key).unwrap();
        assert!(Arc::ptr_eq(&keyed, &again));
    }

    #[test]
    fn test_find_queries() {
        let service = service();
        service.register_schema(&tarifas(), None).unwrap();
        let key = Some("activas");
        service.register_schema(&tarifas(), key).unwrap();
        let options = FindOptions::default();

        let by_entity = service
            .find_queries(EntityName::resolve("tarifas"), options)
            .unwrap();
        assert_eq!(by_entity.len(), 2);
        let by_key = service.find_queries("activas", options).unwrap();
        assert_eq!(by_key.len(), 1);

        let err = service.find_queries("festivos", options).unwrap_err();
        let code = EngineError::find(&err).unwrap().error_code();
        assert_eq!(code, "QUERY_NOT_FOUND");
        assert!(err.to_string().contains("festivos"));

        let quiet = FindOptions {
            throw_error: false,
            ..Default::default()
        };
        assert!(service.find_queries("festivos", quiet).unwrap().is_empty());
    }

    #[test]
    fn test_cache_attached_when_requested() {
        let service = service();
        let users = EntitySchema::new("users");
        let plain = service.register_schema(&users, None).unwrap();
        assert!(plain.cache().is_none());

        let list_cache = tarifas().with_list(ListSchema {
            cache: Some(true),
            ..Default::default()
        });
        let detail_cache = tarifas().with_detail(DetailSchema {
            cache: Some(true),
            ..Default::default()
        });
        let cached = service.register_schema(&list_cache, None).unwrap();
        let detail_cached = service
            .register_schema(&detail_cache, Some("detalle"))
            .unwrap();
        let (a, b) = (cached.cache().unwrap(), detail_cached.cache().unwrap());
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_preloaded_row_is_taken_once() {
        let service = service();
        let mut row = Row::new();
        row.insert("idreg".to_string(), 1.into());
        service.store_preloaded_row(Some(row));
        assert!(service.take_preloaded_row().is_some());
        assert!(service.take_preloaded_row().is_none());
    }
}
