//! # Entity Query
//!
//! A schema-driven client-side engine for entity collections: it resolves
//! declarative entity schemas, fetches and paginates rows from a REST-style
//! backend, caches them per session, and keeps every open view consistent
//! when a row is created, modified or deleted.
//!
//! ## Features
//!
//! - **Schema resolution**: terse YAML or struct schemas become fully resolved models
//! - **Query registry**: one paginated row cache per list configuration, looked up by key or entity
//! - **Shared caches**: whole collections fetched once and audited incrementally
//! - **CRUD with hooks**: sync, async or stream hooks around opening, mapping and saving rows
//! - **Change propagation**: parent edits and deletions reach the rows of child lists
//! - **Collection controller**: backend or local text search, pick-row and multi-select modes
//! - **Presentation pipes**: accent-insensitive filtering, grouping and ordering
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use entity_query::prelude::*;
//!
//! let catalog = SchemaCatalog::from_yaml_file("entities.yaml")?;
//! let service = Arc::new(
//!     CrudServiceBuilder::new(InMemoryTransport::new())
//!         .with_config(catalog.service.clone())
//!         .build(),
//! );
//! catalog.register_all(&service)?;
//!
//! let query = service.find_query("tarifas")?;
//! let ctx = HookContext::new();
//! let rows = service.get_rows(&query, &FetchOptions::default(), &ctx).await?;
//!
//! let saved = service.save_row(&query, row, SaveOptions::default(), &ctx).await?;
//! service.notify_row(RowEvent::Modified { entity: "tarifas".into(), row: saved });
//! ```

pub mod config;
pub mod controller;
pub mod core;
pub mod pipes;
pub mod service;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        AliasName, ApiEntity, CompareNames, ConcatOp, ConfigError, EngineError, EntityCache,
        EntityModel, EntityName, EntityQuery, EntitySchema, EventBus, EventEnvelope, FieldsSpec,
        FilterConfig, Hook, HookContext, HookError, NameSpec, PickRowNotification, PipeError, Row,
        RowEvent, RowFn, RowHook, RowId, SearchClause, SearchClauses, SessionEvent, TransportError,
        UrlOptions, combine_clauses,
    };

    // === Schemas ===
    pub use crate::core::schema::{
        ConfirmDeleteSpec, DetailSchema, FilterOptions, FilterSpec, ForeignDisplay, GroupBySpec,
        GroupConfig, GroupKey, ListSchema, MultiSelectMode, OneOrMany, OrderBySpec,
    };

    // === Collaborators ===
    pub use crate::core::{Confirmer, Method, SettingsStore, Transport, Translator};

    // === Service ===
    pub use crate::service::{
        CrudService, CrudServiceBuilder, Embedding, FetchOptions, FindOptions, PickRowOptions,
        QueryLookup, QueryRegistry, RefreshOptions, SaveHook, SaveOptions,
    };

    // === Controller ===
    pub use crate::controller::{
        CollectionController, FilterDecision, OrderState, PickRowInit, RowSelection,
    };

    // === Pipes ===
    pub use crate::pipes::{
        CHECKED, CollapsedGroups, Direction, MatchOptions, RowGroup, filter_rows, group_rows,
        order_rows,
    };

    // === Storage ===
    pub use crate::storage::{InMemoryTransport, RecordedRequest};

    // === Config ===
    pub use crate::config::{SchemaCatalog, ServiceConfig, init_tracing};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
