//! Configuration loading: service settings and entity schema catalogs

use crate::core::error::{ConfigError, EngineError};
use crate::core::model::EntityModel;
use crate::core::name::CompareNames;
use crate::core::query::EntityQuery;
use crate::core::schema::EntitySchema;
use crate::core::service::Translator;
use crate::service::CrudService;
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use validator::Validate;

/// Settings of a [`CrudService`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Capacity of the session event bus
    pub event_capacity: usize,
    /// Policy used when looking queries up by entity name
    pub compare: CompareNames,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            compare: CompareNames::Optimistic,
        }
    }
}

/// Entity schemas declared in YAML
///
/// ```yaml
/// service:
///   compare: Pessimistic
/// entities:
///   - name: tarifas
///     list:
///       items_per_page: 20
///   - name: { singular: pais, plural: paises }
/// ```
///
/// Hooks and computed values cannot be written in YAML; attach them to the
/// loaded schemas before resolving.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchemaCatalog {
    pub service: ServiceConfig,
    pub entities: Vec<EntitySchema>,
}

impl SchemaCatalog {
    /// Load a catalog from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load a catalog from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(yaml)?;
        Ok(catalog)
    }

    /// Merge catalogs; a later schema replaces an earlier one with the same name
    ///
    /// The service settings of the last catalog win.
    pub fn merge(catalogs: Vec<SchemaCatalog>) -> Self {
        let mut merged = SchemaCatalog::default();
        for catalog in catalogs {
            merged.service = catalog.service;
            for schema in catalog.entities {
                let name = schema.name.resolve();
                match merged
                    .entities
                    .iter_mut()
                    .find(|existing| existing.name.resolve() == name)
                {
                    Some(existing) => *existing = schema,
                    None => merged.entities.push(schema),
                }
            }
        }
        merged
    }

    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.iter().find(|schema| {
            let resolved = schema.name.resolve();
            resolved.plural == name || resolved.singular == name
        })
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut EntitySchema> {
        self.entities.iter_mut().find(|schema| {
            let resolved = schema.name.resolve();
            resolved.plural == name || resolved.singular == name
        })
    }

    /// Check every schema, reporting the first invalid one
    pub fn validate(&self) -> Result<()> {
        for schema in &self.entities {
            if let Err(errors) = schema.validate() {
                return Err(EngineError::from(ConfigError::InvalidSchema {
                    entity: schema.name.resolve().plural,
                    message: errors.to_string(),
                })
                .into());
            }
        }
        Ok(())
    }

    /// Resolve every schema into a model
    pub fn resolve(&self, translator: Option<&dyn Translator>) -> Result<Vec<EntityModel>> {
        self.validate()?;
        self.entities
            .iter()
            .map(|schema| EntityModel::resolve(schema, translator))
            .collect()
    }

    /// Register a query for every schema, resolved with the service translator
    pub fn register_all(&self, service: &CrudService) -> Result<Vec<Arc<EntityQuery>>> {
        self.validate()?;
        let queries = self
            .entities
            .iter()
            .map(|schema| service.register_schema(schema, None))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(entities = queries.len(), "schema catalog registered");
        Ok(queries)
    }
}

/// Install a `fmt` subscriber filtered by `RUST_LOG`, `info` by default
///
/// Does nothing when a global subscriber is already installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
