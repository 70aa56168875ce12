//! Session notifications: row events, pick-row and multi-select channels

use super::{CrudService, PickRowOptions};
use crate::core::context::HookContext;
use crate::core::events::{PickRowNotification, RowEvent, SessionEvent};
use crate::core::model::EntityModel;
use crate::core::name::{CompareNames, EntityName};
use crate::core::query::EntityQuery;
use crate::core::row::Row;
use anyhow::Result;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

fn entity_matches(model: &EntityModel, entity: &str) -> bool {
    let optimistic = CompareNames::Optimistic;
    model.name.matches(entity, optimistic) || model.backend.matches(entity, optimistic)
}

impl CrudService {
    /// Publish a row mutation to the session
    pub fn notify_row(&self, event: RowEvent) -> usize {
        tracing::debug!(entity = %event.entity(), action = event.action(), "row notification");
        self.event_bus.publish(SessionEvent::Row(event))
    }

    /// Mirror a row event into one query
    ///
    /// Queries that opted out with `list.notify_cache_row = false`, or belong
    /// to another entity, ignore the event. Returns whether the cached rows
    /// changed.
    pub async fn apply_row_event(
        &self,
        query: &EntityQuery,
        event: &RowEvent,
        ctx: &HookContext,
    ) -> Result<bool> {
        let model = query.model().clone();
        if !model.list.notify_cache_row || !entity_matches(&model, event.entity()) {
            return Ok(false);
        }
        match event {
            RowEvent::Created { row, .. } => self.insert_cache_row(query, row, ctx).await,
            RowEvent::Modified { row, .. } => self.update_cache_row(query, row, ctx).await,
            RowEvent::Deleted { row, .. } => {
                let removed = self.delete_cache_row(query, row);
                self.propagate_deletes(&model, row)?;
                Ok(removed)
            }
        }
    }

    /// Mirror a row event into every registered query of its entity
    pub async fn dispatch_row_event(&self, event: &RowEvent, ctx: &HookContext) -> Result<usize> {
        let mut changed = 0;
        for query in self.registry.queries() {
            if self.apply_row_event(&query, event, ctx).await? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Apply row events published on the session bus until it closes
    pub fn spawn_row_listener(self: &Arc<Self>, ctx: HookContext) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let stream = self.event_bus.stream();
        tokio::spawn(async move {
            tokio::pin!(stream);
            while let Some(envelope) = stream.next().await {
                let SessionEvent::Row(event) = envelope.event else {
                    continue;
                };
                if let Err(err) = service.dispatch_row_event(&event, &ctx).await {
                    tracing::warn!(
                        entity = %event.entity(),
                        action = event.action(),
                        error = %err,
                        "row event not applied"
                    );
                }
            }
        })
    }

    /// Wait for the next row picked for an entity
    ///
    /// The subscription starts when this is called, so a row published after
    /// the call and before the first poll is not missed. Resolves to `None`
    /// when the pick is cancelled, the bus closes or the timeout elapses.
    pub fn pick_row(
        &self,
        options: PickRowOptions,
    ) -> impl Future<Output = Result<Option<Row>>> + Send + 'static {
        let mut rx = self.event_bus.subscribe();
        async move {
            let entity = options.entity;
            let wait = async {
                loop {
                    match rx.recv().await {
                        Ok(envelope) => match envelope.event {
                            SessionEvent::PickRow(picked)
                                if picked.entity.equals(&entity, CompareNames::Optimistic) =>
                            {
                                return Some(picked.row);
                            }
                            SessionEvent::PickRowCancelled { entity: cancelled }
                                if entity.matches(&cancelled, CompareNames::Optimistic) =>
                            {
                                return None;
                            }
                            _ => {}
                        },
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(entity = %entity, skipped, "pick-row waiter lagged");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            };
            match options.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, wait).await {
                    Ok(picked) => Ok(picked),
                    Err(_) => {
                        tracing::debug!(entity = %entity, "pick-row timed out");
                        Ok(None)
                    }
                },
                None => Ok(wait.await),
            }
        }
    }

    /// Hand a row to whoever waits on [`pick_row`](Self::pick_row)
    pub fn publish_pick_row(
        &self,
        entity: EntityName,
        row: Row,
        model: Option<Arc<EntityModel>>,
    ) -> usize {
        let notification = PickRowNotification { entity, row, model };
        self.event_bus.publish(SessionEvent::PickRow(notification))
    }

    pub fn cancel_pick_row(&self, entity: &EntityName) -> usize {
        self.event_bus.publish(SessionEvent::PickRowCancelled {
            entity: entity.plural.clone(),
        })
    }

    /// Announce that a list entered or left a multi-select mode
    pub fn publish_multi_select_mode(&self, entity: &EntityName, name: &str, value: bool) -> usize {
        self.event_bus.publish(SessionEvent::MultiSelectMode {
            entity: entity.plural.clone(),
            name: name.to_string(),
            value,
        })
    }
}
