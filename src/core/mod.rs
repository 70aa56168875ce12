//! Core module containing the entity model, query state and shared types

pub mod cache;
pub mod clauses;
pub mod context;
pub mod error;
pub mod events;
pub mod fields;
pub mod hook;
pub mod model;
pub mod name;
pub mod query;
pub mod row;
pub mod schema;
pub mod service;

pub use cache::{CacheQuery, EntityCache};
pub use clauses::{ClauseGroup, ConcatOp, SearchClause, SearchClauses, combine_clauses};
pub use context::HookContext;
pub use error::{ConfigError, EngineError, HookError, PipeError, TransportError};
pub use events::{EventBus, EventEnvelope, PickRowNotification, RowEvent, SessionEvent};
pub use fields::{AliasName, ApiEntity, FieldsSpec};
pub use hook::{Hook, RowFn, RowHook};
pub use model::{EntityModel, FilterConfig, UrlOptions};
pub use name::{CompareNames, EntityName, NameSpec};
pub use query::EntityQuery;
pub use row::{Row, RowId};
pub use schema::EntitySchema;
pub use service::{Confirmer, Method, SettingsStore, Transport, Translator};
