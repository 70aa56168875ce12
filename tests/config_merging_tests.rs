//! Integration tests for schema catalog loading and merging

use entity_query::prelude::*;

#[test]
fn test_merge_empty_catalogs() {
    let merged = SchemaCatalog::merge(vec![]);

    assert_eq!(merged.entities.len(), 0);
    assert_eq!(merged.service.event_capacity, 1024);
}

#[test]
fn test_merge_catalogs_no_overlap() {
    let first = SchemaCatalog::from_yaml_str(
        r#"
entities:
  - name: tarifas
  - name: festivos
"#,
    )
    .unwrap();
    let second = SchemaCatalog::from_yaml_str(
        r#"
entities:
  - name: { singular: pais, plural: paises }
  - name: clientes
"#,
    )
    .unwrap();

    let merged = SchemaCatalog::merge(vec![first, second]);
    assert_eq!(merged.entities.len(), 4);

    let entities = merged.entities.iter();
    let names: Vec<String> = entities.map(|e| e.name.resolve().plural).collect();
    assert_eq!(names, vec!["tarifas", "festivos", "paises", "clientes"]);
}

#[test]
fn test_merge_catalogs_with_entity_overlap() {
    let first = SchemaCatalog::from_yaml_str(
        r#"
entities:
  - name: tarifas
    list:
      items_per_page: 10
"#,
    )
    .unwrap();
    let second = SchemaCatalog::from_yaml_str(
        r#"
service:
  compare: Pessimistic
entities:
  - name: tarifas
    list:
      items_per_page: 50
      search_or: true
"#,
    )
    .unwrap();

    let merged = SchemaCatalog::merge(vec![first, second]);
    assert_eq!(merged.entities.len(), 1);
    assert_eq!(merged.service.compare, CompareNames::Pessimistic);

    let models = merged.resolve(None).unwrap();
    assert_eq!(models[0].list.items_per_page, 50);
    assert_eq!(models[0].search_op(), ConcatOp::Or);
}

#[test]
fn test_resolved_names_and_translations() {
    let catalog = SchemaCatalog::from_yaml_str(
        r#"
entities:
  - name: precios-tarifa
    friendly: { singular: precio, plural: precios }
"#,
    )
    .unwrap();
    let translator = |key: &str, _params: Option<&Value>| format!("[{}]", key);
    let models = catalog.resolve(Some(&translator)).unwrap();

    assert_eq!(models[0].backend.plural, "precios_tarifa");
    assert_eq!(models[0].detail.route, "/precios-tarifa/:id");
    assert!(models[0].list.header_text.starts_with('['));
}

#[test]
fn test_register_catalog_twice_is_idempotent() {
    let catalog = SchemaCatalog::from_yaml_str(
        r#"
entities:
  - name: tarifas
    list: { cache: true }
  - name: festivos
"#,
    )
    .unwrap();
    let service = CrudServiceBuilder::new(InMemoryTransport::new()).build();

    let first = catalog.register_all(&service).unwrap();
    let second = catalog.register_all(&service).unwrap();
    assert_eq!(service.registry().len(), 2);
    assert!(Arc::ptr_eq(&first[0], &second[0]));
    assert!(first[0].cache().is_some());
    assert!(first[1].cache().is_none());
}

#[test]
fn test_invalid_catalog_is_rejected() {
    let catalog = SchemaCatalog::from_yaml_str(
        r#"
entities:
  - name: tarifas
    list:
      items_per_page: 0
"#,
    )
    .unwrap();
    let service = CrudServiceBuilder::new(InMemoryTransport::new()).build();

    let err = catalog.register_all(&service).unwrap_err();
    let code = EngineError::find(&err).unwrap().error_code();
    assert_eq!(code, "INVALID_SCHEMA");
    assert!(service.registry().is_empty());
}
