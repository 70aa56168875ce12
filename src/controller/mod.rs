//! Collection controller: the state behind one list view
//!
//! A [`CollectionController`] drives a single [`EntityQuery`] through the
//! [`CrudService`]: it fetches and pages rows, decides whether typed text is
//! filtered locally or sent to the backend, and keeps the presentation state
//! (ordering, collapsed groups, pick-row and multi-select modes) apart from
//! the rows themselves.
//!
//! ```rust,ignore
//! let controller = Arc::new(CollectionController::open(service.clone(), &schema, None, ctx)?);
//! controller.initialize().await?;
//! let _listener = controller.spawn_listener();
//!
//! controller.apply_filter("ams").await?;
//! for group in controller.view()? {
//!     // ..
//! }
//! ```

mod ordering;
mod search;
mod selection;

pub use ordering::OrderState;
pub use search::FilterDecision;
pub use selection::{PickRowInit, RowSelection};

use crate::core::clauses::{SearchClauses, combine_clauses};
use crate::core::context::HookContext;
use crate::core::events::SessionEvent;
use crate::core::model::EntityModel;
use crate::core::name::CompareNames;
use crate::core::query::EntityQuery;
use crate::core::row::Row;
use crate::core::schema::EntitySchema;
use crate::pipes::CollapsedGroups;
use crate::service::{CrudService, RefreshOptions};
use anyhow::Result;
use futures::StreamExt;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct ControllerState {
    loading: bool,
    /// Text typed in the search box
    text: String,
    /// Last text that reached the backend arbitration with a new word
    current_match: Option<String>,
    local_still_required: bool,
    initial_filter: Option<SearchClauses>,
    /// Values of the filter form
    filter_values: Row,
    pick_mode: bool,
    selected: Option<Value>,
    can_create: bool,
    is_modal: bool,
    is_popover: bool,
    multi_select: Option<String>,
    order: Option<(String, OrderState)>,
    collapsed: CollapsedGroups,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            loading: false,
            text: String::new(),
            current_match: None,
            local_still_required: false,
            initial_filter: None,
            filter_values: Row::new(),
            pick_mode: false,
            selected: None,
            can_create: true,
            is_modal: false,
            is_popover: false,
            multi_select: None,
            order: None,
            collapsed: CollapsedGroups::new(),
        }
    }
}

/// Presentation state and actions of one list view
pub struct CollectionController {
    service: Arc<CrudService>,
    query: Arc<EntityQuery>,
    ctx: HookContext,
    state: RwLock<ControllerState>,
    checked: watch::Sender<usize>,
}

impl CollectionController {
    pub fn new(service: Arc<CrudService>, query: Arc<EntityQuery>, ctx: HookContext) -> Self {
        let (checked, _) = watch::channel(0);
        Self {
            service,
            query,
            ctx,
            state: RwLock::new(ControllerState::default()),
            checked,
        }
    }

    /// Register the query of a schema and build a controller over it
    pub fn open(
        service: Arc<CrudService>,
        schema: &EntitySchema,
        key: Option<&str>,
        ctx: HookContext,
    ) -> Result<Self> {
        let query = service.register_schema(schema, key)?;
        Ok(Self::new(service, query, ctx))
    }

    pub fn service(&self) -> &Arc<CrudService> {
        &self.service
    }

    pub fn query(&self) -> &Arc<EntityQuery> {
        &self.query
    }

    pub fn model(&self) -> &Arc<EntityModel> {
        self.query.model()
    }

    pub fn context(&self) -> &HookContext {
        &self.ctx
    }

    fn with_state<R>(&self, f: impl FnOnce(&ControllerState) -> R) -> R {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn with_state_mut<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether a fetch is in flight
    pub fn is_loading(&self) -> bool {
        self.with_state(|s| s.loading)
    }

    pub fn rows(&self) -> Vec<Row> {
        self.query.rows()
    }

    /// Clauses applied on top of the model search for the life of the view
    pub fn set_initial_filter(&self, filter: Option<SearchClauses>) {
        self.with_state_mut(|s| s.initial_filter = filter);
    }

    pub fn initial_filter(&self) -> Option<SearchClauses> {
        self.with_state(|s| s.initial_filter.clone())
    }

    /// Apply the initial filter and fetch the first page unless the query is complete
    pub async fn initialize(&self) -> Result<Vec<Row>> {
        if self.initial_filter().is_some() {
            let search = self.combine_base_clauses(None).await?;
            self.query.set_search(search);
        }
        if self.query.completed() {
            return Ok(self.query.rows());
        }
        self.refresh(RefreshOptions::default()).await
    }

    /// Leave the view: cancel a pending pick, close the multi-select mode and
    /// drop the rows and search override
    pub fn close(&self) {
        let (pick_mode, multi_select) = self.with_state_mut(|s| {
            let pick_mode = std::mem::replace(&mut s.pick_mode, false);
            (pick_mode, s.multi_select.take())
        });
        if pick_mode {
            self.service.cancel_pick_row(&self.model().name);
        }
        if let Some(name) = multi_select {
            self.service
                .publish_multi_select_mode(&self.model().name, &name, false);
        }
        self.query.clear();
        self.query.set_search(None);
        tracing::debug!(key = %self.query.key(), "collection closed");
    }

    /// Request the rows again, keeping checked rows when they must survive
    /// a backend filter
    pub async fn refresh(&self, options: RefreshOptions) -> Result<Vec<Row>> {
        let cached = self.caching_selected_rows().then(|| self.checked_rows());
        self.with_state_mut(|s| s.loading = true);
        let result = self.service.refresh(&self.query, options, &self.ctx).await;
        self.with_state_mut(|s| s.loading = false);
        let rows = result?;
        match cached {
            Some(cached) if !cached.is_empty() => {
                self.merge_checked_rows(cached);
                Ok(self.query.rows())
            }
            _ => Ok(rows),
        }
    }

    /// Replace the rows with the next page
    pub async fn next_page(&self) -> Result<Vec<Row>> {
        self.refresh(RefreshOptions {
            clear_before: true,
            event: true,
        })
        .await
    }

    /// Replace the rows with the previous page
    pub async fn previous_page(&self) -> Result<Vec<Row>> {
        self.query.with_state_mut(|s| {
            s.page = s.page.saturating_sub(2);
            s.completed = false;
        });
        self.next_page().await
    }

    /// Combine caller clauses with the model search and the initial filter
    pub async fn combine_base_clauses(
        &self,
        clauses: Option<SearchClauses>,
    ) -> Result<Option<SearchClauses>> {
        let model = self.model().clone();
        let op = model.search_op();
        let original = match &model.list.search {
            Some(hook) => Some(hook.resolve(Value::Null, &self.ctx).await?),
            None => None,
        };
        let base = combine_clauses(original, self.initial_filter(), op);
        Ok(combine_clauses(clauses, base, op))
    }

    /// Search with the given clauses, combined with the typed text and the base clauses
    pub async fn find(&self, clauses: Option<SearchClauses>) -> Result<Vec<Row>> {
        let clauses = self.combine_search_clauses(clauses)?;
        let search = self.combine_base_clauses(clauses).await?;
        tracing::debug!(key = %self.query.key(), search = ?search, "find");
        self.reload_with(search).await
    }

    /// Start over with a new search, keeping checked rows when required
    async fn reload_with(&self, search: Option<SearchClauses>) -> Result<Vec<Row>> {
        let cached = self.caching_selected_rows().then(|| self.checked_rows());
        self.query.restart();
        self.query.set_search(search);
        let rows = self.refresh(RefreshOptions::default()).await?;
        match cached {
            Some(cached) if !cached.is_empty() => {
                self.merge_checked_rows(cached);
                Ok(self.query.rows())
            }
            _ => Ok(rows),
        }
    }

    pub fn filter_values(&self) -> Row {
        self.with_state(|s| s.filter_values.clone())
    }

    /// `field = value` clauses from the filter form, combined with the base clauses
    ///
    /// Null values are skipped.
    pub async fn parse_filter(&self) -> Result<Option<SearchClauses>> {
        let clauses: Vec<SearchClauses> = self
            .filter_values()
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(field, value)| SearchClauses::clause(field, "=", value))
            .collect();
        let op = self.model().search_op();
        let parsed = (!clauses.is_empty()).then(|| SearchClauses::group(op, clauses));
        self.combine_base_clauses(parsed).await
    }

    /// Search with the values of the filter form, dropping the typed text
    pub async fn apply_filter_values(&self, values: Row) -> Result<Vec<Row>> {
        self.with_state_mut(|s| {
            s.filter_values = values;
            s.text.clear();
            s.current_match = None;
            s.local_still_required = false;
        });
        let search = self.parse_filter().await?;
        self.reload_with(search).await
    }

    /// React to a session event
    pub async fn process_event(&self, event: &SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Row(row_event) => {
                self.service
                    .apply_row_event(&self.query, row_event, &self.ctx)
                    .await?;
            }
            SessionEvent::MultiSelectMode { entity, name, value } => {
                if self.model().name.matches(entity, CompareNames::Optimistic) {
                    self.apply_multi_select_mode(name, *value);
                }
            }
            SessionEvent::PickRow(_) | SessionEvent::PickRowCancelled { .. } => {}
        }
        Ok(())
    }

    /// Process session events until the bus closes
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let stream = self.service.event_bus().stream();
        tokio::spawn(async move {
            tokio::pin!(stream);
            while let Some(envelope) = stream.next().await {
                if let Err(err) = controller.process_event(&envelope.event).await {
                    tracing::warn!(
                        key = %controller.query.key(),
                        kind = envelope.event.event_kind(),
                        error = %err,
                        "session event not applied"
                    );
                }
            }
        })
    }
}

impl std::fmt::Debug for CollectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_state(|s| {
            f.debug_struct("CollectionController")
                .field("key", &self.query.key())
                .field("loading", &s.loading)
                .field("text", &s.text)
                .field("pick_mode", &s.pick_mode)
                .field("multi_select", &s.multi_select)
                .field("order", &s.order)
                .finish()
        })
    }
}
