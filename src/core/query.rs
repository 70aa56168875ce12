//! Per-entity query state and pagination
//!
//! An [`EntityQuery`] is the client side copy of one paginated collection:
//! the rows fetched so far, the next page to request and whether the backend
//! has nothing more to give for the current search clauses.
//!
//! State sits behind a `std::sync::RwLock` that is only taken for short,
//! synchronous sections and never held across an `.await`.

use crate::core::cache::EntityCache;
use crate::core::clauses::SearchClauses;
use crate::core::context::HookContext;
use crate::core::model::{EntityModel, UrlOptions};
use crate::core::row::{Row, position_by_pk, primary_key_of};
use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Mutable state of a query
#[derive(Debug, Clone)]
pub struct QueryState {
    pub rows: Vec<Row>,
    /// Next page to request, zero based
    pub page: usize,
    /// No further pages exist for the current clause set
    pub completed: bool,
    /// Search clauses replacing the model's own search source
    pub search: Option<SearchClauses>,
    /// Whether the infinite scroll trigger may request more pages
    pub infinite_enabled: bool,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            page: 0,
            completed: false,
            search: None,
            infinite_enabled: true,
        }
    }
}

/// Paginated row cache of one entity configuration
pub struct EntityQuery {
    key: String,
    model: Arc<EntityModel>,
    state: RwLock<QueryState>,
    cache: Option<Arc<EntityCache>>,
}

impl EntityQuery {
    pub fn new(
        key: impl Into<String>,
        model: Arc<EntityModel>,
        cache: Option<Arc<EntityCache>>,
    ) -> Self {
        Self {
            key: key.into(),
            model,
            state: RwLock::new(QueryState::default()),
            cache,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    pub fn cache(&self) -> Option<&Arc<EntityCache>> {
        self.cache.as_ref()
    }

    fn read(&self) -> RwLockReadGuard<'_, QueryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a closure over the current state
    pub fn with_state<R>(&self, f: impl FnOnce(&QueryState) -> R) -> R {
        f(&self.read())
    }

    /// Run a closure over the mutable state
    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut QueryState) -> R) -> R {
        f(&mut self.write())
    }

    pub fn rows(&self) -> Vec<Row> {
        self.read().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().rows.is_empty()
    }

    pub fn page(&self) -> usize {
        self.read().page
    }

    pub fn set_page(&self, page: usize) {
        self.write().page = page;
    }

    pub fn completed(&self) -> bool {
        self.read().completed
    }

    pub fn set_completed(&self, completed: bool) {
        self.write().completed = completed;
    }

    pub fn infinite_enabled(&self) -> bool {
        self.read().infinite_enabled
    }

    pub fn set_infinite_enabled(&self, enabled: bool) {
        self.write().infinite_enabled = enabled;
    }

    /// Reset rows and pagination, re-enabling the infinite scroll trigger
    pub fn clear(&self) {
        let mut state = self.write();
        state.rows.clear();
        state.page = 0;
        state.completed = false;
        state.infinite_enabled = true;
    }

    /// Clear and drop any search override
    pub fn restart(&self) {
        self.clear();
        self.write().search = None;
    }

    /// Drop the rows but keep the current page
    pub fn clear_rows(&self) {
        self.write().rows.clear();
    }

    pub fn search_override(&self) -> Option<SearchClauses> {
        self.read().search.clone()
    }

    pub fn set_search(&self, search: Option<SearchClauses>) {
        self.write().search = search.filter(|s| !s.is_empty());
    }

    /// Whether list requests go through `POST search/...`
    pub fn has_search(&self) -> bool {
        self.read().search.is_some() || self.model.has_search()
    }

    /// Resolve the clauses sent with list requests
    ///
    /// A search override set on the query wins over the model's source.
    pub async fn resolve_search(&self, ctx: &HookContext) -> Result<Option<SearchClauses>> {
        if let Some(search) = self.search_override() {
            return Ok(Some(search));
        }
        match &self.model.list.search {
            Some(hook) => Ok(Some(hook.resolve(Value::Null, ctx).await?).filter(|s| !s.is_empty())),
            None => Ok(None),
        }
    }

    /// URL of the next request, with `limit` and `offset` for paginated lists
    pub fn resolve_url(&self, options: &UrlOptions) -> Result<String> {
        let mut url = self.model.resolve_url(options, self.has_search())?;
        let paginate = options.paginate.unwrap_or(self.model.list.paginate);

        if options.id.is_none() && paginate {
            let limit = self.model.list.items_per_page.max(1);
            let (page, completed) = self.with_state(|s| (s.page, s.completed));
            let current = if completed { 0 } else { page };
            let separator = if url.ends_with('?') {
                ""
            } else if url.contains('?') {
                "&"
            } else {
                "?"
            };
            url = format!("{}{}limit={}&offset={}", url, separator, limit, current * limit);
        }
        tracing::debug!(key = %self.key, url = %url, "resolved query url");
        Ok(url)
    }

    /// Append a page of rows, replacing rows whose primary key is already present
    pub fn append_rows(&self, rows: Vec<Row>) {
        let pk = self.model.primary_key.clone();
        let mut state = self.write();
        for row in rows {
            let existing = primary_key_of(&row, &pk)
                .and_then(|id| position_by_pk(&state.rows, &pk, id));
            match existing {
                Some(idx) => state.rows[idx] = row,
                None => state.rows.push(row),
            }
        }
    }

    pub fn find_row(&self, id: &Value) -> Option<Row> {
        let state = self.read();
        position_by_pk(&state.rows, &self.model.primary_key, id).map(|idx| state.rows[idx].clone())
    }

    pub fn contains_row(&self, id: &Value) -> bool {
        position_by_pk(&self.read().rows, &self.model.primary_key, id).is_some()
    }

    /// Merge fields into the cached row in place, keeping its position
    pub fn merge_row(&self, id: &Value, data: &Row) -> bool {
        let mut state = self.write();
        match position_by_pk(&state.rows, &self.model.primary_key, id) {
            Some(idx) => {
                let row = &mut state.rows[idx];
                for (k, v) in data {
                    row.insert(k.clone(), v.clone());
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_row(&self, id: &Value) -> Option<Row> {
        let mut state = self.write();
        position_by_pk(&state.rows, &self.model.primary_key, id).map(|idx| state.rows.remove(idx))
    }
}

impl fmt::Debug for EntityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("EntityQuery")
            .field("key", &self.key)
            .field("entity", &self.model.name.plural)
            .field("rows", &state.rows.len())
            .field("page", &state.page)
            .field("completed", &state.completed)
            .finish()
    }
}
