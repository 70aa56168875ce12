//! Entity cache: absolute queries, partial subqueries and audit refreshes
//!
//! Queries registered for the same entity share one [`EntityCache`]. It
//! tells apart:
//!
//! - absolute queries, without a where clause, that would enumerate the whole
//!   collection if every page were consumed
//! - partial subqueries, restricted by search clauses
//!
//! Once an absolute query is completed, the rows changed since the last
//! audit can be requested through the `updated` / `deleted` audit columns
//! instead of paginating again.

use crate::core::clauses::SearchClauses;
use crate::core::error::{EngineError, TransportError};
use crate::core::model::{EntityModel, UrlOptions};
use crate::core::name::{CompareNames, EntityName};
use crate::core::query::EntityQuery;
use crate::core::row::Row;
use crate::core::service::{Method, Transport};
use anyhow::Result;
use chrono::Local;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Format of audit timestamps
pub const AUDIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A query tracked by the cache
#[derive(Debug, Clone)]
pub struct CacheQuery {
    pub query: Weak<EntityQuery>,
    pub is_partial: bool,
    pub search: Option<SearchClauses>,
    pub sort: Option<String>,
    /// Time of the last audit, or of the request that completed the query
    pub last_audit_time: Option<String>,
}

impl CacheQuery {
    pub fn upgrade(&self) -> Option<Arc<EntityQuery>> {
        self.query.upgrade()
    }

    fn key(&self) -> Option<String> {
        self.upgrade().map(|q| q.key().to_string())
    }
}

#[derive(Debug, Default)]
struct Pools {
    queries: Vec<CacheQuery>,
    subqueries: Vec<CacheQuery>,
}

/// Cache shared by the queries of one entity
#[derive(Debug)]
pub struct EntityCache {
    entity: EntityName,
    updated: Option<String>,
    deleted: Option<String>,
    exclude_deleted: bool,
    max_size: Option<usize>,
    pools: RwLock<Pools>,
}

impl EntityCache {
    pub fn new(model: &EntityModel) -> Self {
        Self {
            entity: model.backend.clone(),
            updated: model.updated.clone(),
            deleted: model.deleted.clone(),
            exclude_deleted: true,
            max_size: None,
            pools: RwLock::new(Pools::default()),
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_exclude_deleted(mut self, exclude_deleted: bool) -> Self {
        self.exclude_deleted = exclude_deleted;
        self
    }

    pub fn entity(&self) -> &EntityName {
        &self.entity
    }

    pub fn exclude_deleted(&self) -> bool {
        self.exclude_deleted
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Caches are the same variant when their entity names match
    pub fn equals(&self, other: &EntityCache) -> bool {
        self.entity.equals(&other.entity, CompareNames::Optimistic)
    }

    /// Track a query, as partial when it carries search clauses
    pub fn attach(&self, query: &Arc<EntityQuery>, search: Option<SearchClauses>) {
        let is_partial = search.is_some();
        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        let pool = if is_partial {
            &mut pools.subqueries
        } else {
            &mut pools.queries
        };
        pool.retain(|q| q.query.strong_count() > 0);
        if pool.iter().any(|q| q.key().as_deref() == Some(query.key())) {
            return;
        }
        pool.push(CacheQuery {
            query: Arc::downgrade(query),
            is_partial,
            search,
            sort: None,
            last_audit_time: None,
        });
        tracing::debug!(
            entity = %self.entity,
            key = %query.key(),
            is_partial,
            "query attached to cache"
        );
    }

    /// Find a tracked query of the same variant
    ///
    /// Partial queries are looked up among subqueries, absolute ones among
    /// the absolute pool.
    pub fn find_query(&self, is_partial: bool, entity: &EntityName) -> Option<CacheQuery> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        let pool = if is_partial {
            &pools.subqueries
        } else {
            &pools.queries
        };
        pool.iter()
            .find(|q| {
                q.upgrade().is_some_and(|query| {
                    let backend = &query.model().backend;
                    backend.equals(entity, CompareNames::Optimistic)
                })
            })
            .cloned()
    }

    fn live_queries(&self) -> Vec<Arc<EntityQuery>> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        pools
            .queries
            .iter()
            .chain(pools.subqueries.iter())
            .filter_map(CacheQuery::upgrade)
            .collect()
    }

    /// Every row of the entity has been fetched by some absolute query
    pub fn completed(&self) -> bool {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        pools
            .queries
            .iter()
            .filter_map(CacheQuery::upgrade)
            .any(|q| q.completed())
    }

    /// Number of cached rows across all tracked queries
    pub fn size(&self) -> usize {
        self.live_queries().iter().map(|q| q.len()).sum()
    }

    pub fn is_full(&self) -> bool {
        self.max_size.is_some_and(|max| self.size() >= max)
    }

    pub fn last_audit_time(&self, key: &str) -> Option<String> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        pools
            .queries
            .iter()
            .chain(pools.subqueries.iter())
            .find(|q| q.key().as_deref() == Some(key))
            .and_then(|q| q.last_audit_time.clone())
    }

    pub fn set_last_audit_time(&self, key: &str, time: impl Into<String>) {
        let time = time.into();
        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        let Pools { queries, subqueries } = &mut *pools;
        if let Some(q) = queries
            .iter_mut()
            .chain(subqueries.iter_mut())
            .find(|q| q.key().as_deref() == Some(key))
        {
            q.last_audit_time = Some(time);
        }
    }

    /// Clauses selecting the rows changed since the last audit
    ///
    /// Without a time, the current local time is used.
    pub fn resolve_audit_search(
        &self,
        last_audit_time: Option<&str>,
        entity: &str,
    ) -> Option<SearchClauses> {
        let time = last_audit_time
            .map(str::to_string)
            .unwrap_or_else(|| Local::now().format(AUDIT_TIME_FORMAT).to_string());
        let updated = self.updated.as_ref().map(|c| format!("{}.{}", entity, c));
        let deleted = self.deleted.as_ref().map(|c| format!("{}.{}", entity, c));
        match (updated, deleted) {
            (Some(u), None) => Some(SearchClauses::clause(u, ">", time)),
            (None, Some(d)) => Some(SearchClauses::clause(d, ">", time)),
            (Some(u), Some(d)) => Some(SearchClauses::or(vec![
                SearchClauses::clause(u, ">", time.clone()),
                SearchClauses::clause(d, ">", time),
            ])),
            (None, None) => None,
        }
    }

    /// Request the rows of a query changed since its last audit
    ///
    /// Returns `None` when the entity declares no audit columns.
    pub async fn request_audit(
        &self,
        transport: &dyn Transport,
        query: &EntityQuery,
    ) -> Result<Option<Vec<Row>>> {
        let entity = self.entity.plural.clone();
        let last = self.last_audit_time(query.key());
        let Some(search) = self.resolve_audit_search(last.as_deref(), &entity) else {
            return Ok(None);
        };
        let options = UrlOptions {
            paginate: Some(false),
            ..Default::default()
        };
        let url = query.model().resolve_url(&options, true)?;
        let started = Local::now().format(AUDIT_TIME_FORMAT).to_string();

        tracing::info!(entity = %entity, url = %url, since = ?last, "requesting audit");
        let body = Some(search.to_value());
        let response = transport.request(Method::Post, &url, body).await?;
        let rows = rows_from_value(response, &url)?;
        self.set_last_audit_time(query.key(), started);
        Ok(Some(rows))
    }

    /// Clear every tracked query
    pub fn clear(&self) {
        for query in self.live_queries() {
            query.clear();
        }
        tracing::info!(entity = %self.entity, "cache cleared");
    }

    /// Whether a row is marked as deleted by the audit column
    pub fn is_deleted(&self, row: &Row) -> bool {
        self.deleted
            .as_ref()
            .and_then(|column| row.get(column))
            .is_some_and(|v| !v.is_null() && v != &Value::Bool(false))
    }
}

/// Read a page of rows from a backend response
pub(crate) fn rows_from_value(value: Value, url: &str) -> Result<Vec<Row>> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect()),
        Value::Null => Ok(Vec::new()),
        Value::Object(row) => Ok(vec![row]),
        other => Err(EngineError::from(TransportError::Decode {
            url: url.to_string(),
            message: format!("expected rows, got {}", other),
        })
        .into()),
    }
}
