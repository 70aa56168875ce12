//! CrudServiceBuilder for wiring a service to its collaborators

use super::{CrudService, QueryRegistry};
use crate::config::ServiceConfig;
use crate::core::events::EventBus;
use crate::core::service::{Confirmer, SettingsStore, Transport, Translator};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Builder for [`CrudService`]
///
/// # Example
///
/// ```ignore
/// let service = CrudServiceBuilder::new(InMemoryTransport::new())
///     .with_confirmer(AlwaysYes)
///     .with_event_bus(bus.clone())
///     .build();
/// ```
pub struct CrudServiceBuilder {
    transport: Arc<dyn Transport>,
    translator: Option<Arc<dyn Translator>>,
    confirmer: Option<Arc<dyn Confirmer>>,
    settings: Option<Arc<dyn SettingsStore>>,
    event_bus: Option<EventBus>,
    config: ServiceConfig,
}

impl CrudServiceBuilder {
    /// Create a builder around the transport (required)
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    /// Create a builder around a transport shared with other owners
    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            translator: None,
            confirmer: None,
            settings: None,
            event_bus: None,
            config: ServiceConfig::default(),
        }
    }

    pub fn with_translator(mut self, translator: impl Translator + 'static) -> Self {
        self.translator = Some(Arc::new(translator));
        self
    }

    /// Set the dialog asked before deleting rows
    ///
    /// Without one, deletions proceed unconfirmed.
    pub fn with_confirmer(mut self, confirmer: impl Confirmer + 'static) -> Self {
        self.confirmer = Some(Arc::new(confirmer));
        self
    }

    /// Set the store persisting audit times
    pub fn with_settings(mut self, settings: impl SettingsStore + 'static) -> Self {
        self.settings = Some(Arc::new(settings));
        self
    }

    /// Share an event bus with controllers and other services of the session
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> CrudService {
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| EventBus::new(self.config.event_capacity));
        CrudService {
            transport: self.transport,
            translator: self.translator,
            confirmer: self.confirmer,
            settings: self.settings,
            event_bus,
            config: self.config,
            registry: QueryRegistry::new(),
            embeddings: RwLock::new(HashMap::new()),
            preloaded: RwLock::new(None),
        }
    }
}
