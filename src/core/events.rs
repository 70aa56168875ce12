//! Session event bus
//!
//! The EventBus decouples the code that mutates rows from the queries and
//! controllers that must follow those mutations. It is scoped to one
//! session: every service and controller built for the session shares a
//! clone of the same bus, and nothing is global.
//!
//! # Architecture
//!
//! ```text
//! CrudService::notify_row ──┐                       ──▶ spawn_row_listener (notify_cache_row)
//!                           ├──▶ EventBus::publish ──▶ broadcast channel
//! CollectionController ─────┘                       ──▶ pick_row() waiters
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let bus = EventBus::new(1024);
//! let mut rx = bus.subscribe();
//!
//! bus.publish(SessionEvent::Row(RowEvent::Modified {
//!     entity: "tarifas".to_string(),
//!     row: row.clone(),
//! }));
//!
//! if let Ok(envelope) = rx.recv().await {
//!     println!("Received: {:?}", envelope.event);
//! }
//! ```

use crate::core::model::EntityModel;
use crate::core::name::EntityName;
use crate::core::row::Row;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

/// Row mutations other queries may want to mirror
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RowEvent {
    Created { entity: String, row: Row },
    Modified { entity: String, row: Row },
    Deleted { entity: String, row: Row },
}

impl RowEvent {
    pub fn entity(&self) -> &str {
        match self {
            RowEvent::Created { entity, .. }
            | RowEvent::Modified { entity, .. }
            | RowEvent::Deleted { entity, .. } => entity,
        }
    }

    pub fn row(&self) -> &Row {
        match self {
            RowEvent::Created { row, .. }
            | RowEvent::Modified { row, .. }
            | RowEvent::Deleted { row, .. } => row,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            RowEvent::Created { .. } => "created",
            RowEvent::Modified { .. } => "modified",
            RowEvent::Deleted { .. } => "deleted",
        }
    }
}

/// Row chosen by a list in pick-row mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickRowNotification {
    pub entity: EntityName,
    pub row: Row,
    #[serde(skip)]
    pub model: Option<Arc<EntityModel>>,
}

/// Top-level session event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Row(RowEvent),
    PickRow(PickRowNotification),
    /// A pick was abandoned without choosing a row
    PickRowCancelled { entity: String },
    /// A list entered or left a multi-select mode
    MultiSelectMode {
        entity: String,
        name: String,
        value: bool,
    },
}

impl SessionEvent {
    pub fn event_kind(&self) -> &str {
        match self {
            SessionEvent::Row(_) => "row",
            SessionEvent::PickRow(_) => "pick_row",
            SessionEvent::PickRowCancelled { .. } => "pick_row_cancelled",
            SessionEvent::MultiSelectMode { .. } => "multi_select_mode",
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            SessionEvent::Row(e) => e.entity(),
            SessionEvent::PickRow(p) => &p.entity.plural,
            SessionEvent::PickRowCancelled { entity }
            | SessionEvent::MultiSelectMode { entity, .. } => entity,
        }
    }
}

/// Envelope wrapping a session event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: SessionEvent,
}

impl EventEnvelope {
    pub fn new(event: SessionEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus for one session
///
/// Cheap to clone; clones publish to and subscribe from the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// Slow receivers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Never fails. Returns the number of receivers that will get the event.
    pub fn publish(&self, event: SessionEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Events published from now on as a stream, skipping lagged gaps
    pub fn stream(&self) -> impl Stream<Item = EventEnvelope> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| match item {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                tracing::warn!(error = %err, "event stream lagged");
                None
            }
        })
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: serde_json::Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_row_event_serialization() {
        let event = SessionEvent::Row(RowEvent::Created {
            entity: "tarifas".to_string(),
            row: row(json!({"idreg": 1})),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "row");
        assert_eq!(json["action"], "created");
        assert_eq!(json["entity"], "tarifas");
    }

    #[test]
    fn test_pick_row_skips_model() {
        let event = SessionEvent::PickRow(PickRowNotification {
            entity: EntityName::resolve("users"),
            row: row(json!({"idreg": 4})),
            model: None,
        });
        let text = serde_json::to_string(&EventEnvelope::new(event)).unwrap();
        let back: EventEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event.event_kind(), "pick_row");
        assert_eq!(back.event.entity(), "users");
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let receivers = bus.publish(SessionEvent::MultiSelectMode {
            entity: "facturas".to_string(),
            name: "facturar".to_string(),
            value: true,
        });
        assert_eq!(receivers, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.event_kind(), "multi_select_mode");
    }

    #[tokio::test]
    async fn test_event_stream() {
        let bus = EventBus::new(16);
        let stream = bus.stream();
        tokio::pin!(stream);

        bus.publish(SessionEvent::PickRowCancelled {
            entity: "users".to_string(),
        });
        let envelope = stream.next().await.unwrap();
        assert_eq!(envelope.event.entity(), "users");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(
            bus.publish(SessionEvent::PickRowCancelled {
                entity: "users".to_string()
            }),
            0
        );
    }

    #[test]
    fn test_event_bus_clone_shares_channel() {
        let bus = EventBus::new(16);
        let _rx = bus.subscribe();
        let bus2 = bus.clone();
        assert_eq!(bus2.receiver_count(), 1);
    }
}
