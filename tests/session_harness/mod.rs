//! Shared fixtures for session-level integration tests
//!
//! Provides a seeded [`InMemoryTransport`] with a parent/child pair of
//! entities (`tarifas` and `precios_tarifa`) plus a `ciudades` table, the
//! YAML catalog that declares them, and small collaborator doubles.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! mod session_harness;
//! use session_harness::*;
//! ```

#![allow(dead_code)]

use entity_query::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;

pub const CATALOG: &str = r#"
service:
  event_capacity: 128
entities:
  - name: tarifas
    list:
      items_per_page: 2
    detail:
      propagate_changes: precios_tarifa
      propagate_deletes: precios_tarifa
      confirm_delete: false
  - name: precios_tarifa
    list:
      foreign:
        idtarifa: { tarifas: nombre }
  - name: ciudades
    list:
      items_per_page: 3
      filter:
        pipe: nombre
        pipe_to_backend: true
      multi_select_modes:
        - { name: exportar, multi: true }
"#;

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("rows are objects")
}

pub fn names(rows: &[Row], field: &str) -> Vec<Value> {
    rows.iter().map(|r| r[field].clone()).collect()
}

pub fn tarifas() -> Vec<Row> {
    vec![
        row(json!({"idreg": 1, "nombre": "General"})),
        row(json!({"idreg": 2, "nombre": "Reducida"})),
        row(json!({"idreg": 3, "nombre": "Nocturna"})),
    ]
}

fn precio(idreg: i64, precio: Value, idtarifa: i64, nombre: &str) -> Row {
    let tarifa = json!({"idreg": idtarifa, "nombre": nombre});
    row(json!({"idreg": idreg, "precio": precio, "idtarifa": idtarifa, "tarifa": tarifa}))
}

pub fn precios() -> Vec<Row> {
    vec![
        precio(10, json!(12.5), 1, "General"),
        precio(11, json!(8), 2, "Reducida"),
        precio(12, json!(15), 1, "General"),
    ]
}

pub fn ciudades() -> Vec<Row> {
    ["Amsterdam", "Paris", "Parma", "London", "Lisboa"]
        .iter()
        .enumerate()
        .map(|(i, name)| row(json!({"idreg": i + 1, "nombre": name})))
        .collect()
}

pub fn transport() -> InMemoryTransport {
    InMemoryTransport::new()
        .with_entity_table(&EntityName::resolve("tarifas"), tarifas())
        .with_entity_table(&EntityName::resolve("precios_tarifa"), precios())
        .with_entity_table(&EntityName::resolve("ciudades"), ciudades())
}

/// A service over [`transport`] with every schema of [`CATALOG`] registered
pub fn session(transport: &InMemoryTransport) -> Arc<CrudService> {
    let catalog = SchemaCatalog::from_yaml_str(CATALOG).expect("catalog fixture parses");
    let service = Arc::new(
        CrudServiceBuilder::new(transport.clone())
            .with_config(catalog.service.clone())
            .build(),
    );
    catalog.register_all(&service).expect("schemas register");
    service
}

/// Confirmer answering the same way every time
pub struct Answer(pub bool);

#[async_trait]
impl Confirmer for Answer {
    async fn confirm(&self, _header: &str, _message: &str) -> bool {
        self.0
    }
}

/// Settings kept in memory
#[derive(Clone, Default)]
pub struct MemorySettings(pub Arc<Mutex<HashMap<String, Value>>>);

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.0.lock().expect("settings lock").get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut settings = self.0.lock().expect("settings lock");
        settings.insert(key.to_string(), value);
        Ok(())
    }
}
