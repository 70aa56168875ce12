//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Every error kind carries a stable code
//! - Engine errors survive the trip through `anyhow`
//! - Transport failures surface with their status

mod session_harness;

use entity_query::prelude::*;
use session_harness::*;

// =============================================================================
// Error Codes
// =============================================================================

mod error_code_tests {
    use super::*;

    #[test]
    fn test_config_error_codes() {
        let cases = [
            (
                ConfigError::QueryNotFound {
                    entity: "tarifas".to_string(),
                },
                "QUERY_NOT_FOUND",
            ),
            (
                ConfigError::MissingPrimaryKey {
                    entity: "tarifas".to_string(),
                    primary_key: "idreg".to_string(),
                },
                "MISSING_PRIMARY_KEY",
            ),
            (
                ConfigError::MissingFilterPipe {
                    entity: "ciudades".to_string(),
                },
                "MISSING_FILTER_PIPE",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(EngineError::from(err).error_code(), code);
        }
    }

    #[test]
    fn test_transport_error_display() {
        let err = EngineError::from(TransportError::Status {
            method: "PUT".to_string(),
            url: "tarifa?id=1".to_string(),
            status: 409,
        });
        assert_eq!(err.error_code(), "TRANSPORT_BAD_STATUS");
        assert_eq!(err.to_string(), "PUT tarifa?id=1 returned status 409");
    }
}

// =============================================================================
// Error Recovery
// =============================================================================

mod recovery_tests {
    use super::*;

    #[test]
    fn test_find_through_context() {
        let err: anyhow::Error = EngineError::from(PipeError::InvalidOrder {
            message: "empty column".to_string(),
        })
        .into();
        let err = err.context("rendering list");
        let engine = EngineError::find(&err).unwrap();
        assert_eq!(engine.error_code(), "PIPE_INVALID_ORDER");
    }

    #[test]
    fn test_foreign_errors_are_not_engine_errors() {
        let err = anyhow::anyhow!("plain failure");
        assert!(EngineError::find(&err).is_none());
    }
}

// =============================================================================
// Failures Through The Service
// =============================================================================

mod service_failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_transport() {
        let transport = transport();
        let service = session(&transport);
        let query = service.find_query("ciudades").unwrap();
        transport.set_offline(true).unwrap();

        let (ctx, fetch) = (HookContext::new(), FetchOptions::default());
        let err = service.get_rows(&query, &fetch, &ctx).await.unwrap_err();
        let code = EngineError::find(&err).unwrap().error_code();
        assert_eq!(code, "TRANSPORT_REQUEST_FAILED");
    }

    #[tokio::test]
    async fn test_failed_save_keeps_cached_row() {
        let transport = transport();
        let service = session(&transport);
        let query = service.find_query("tarifas").unwrap();
        let (ctx, fetch) = (HookContext::new(), FetchOptions::default());
        service.get_rows(&query, &fetch, &ctx).await.unwrap();
        transport.fail_next(500).unwrap();

        let body = row(json!({"idreg": 1, "nombre": "Rota"}));
        let save = SaveOptions::default();
        let result = service.save_row(&query, body, save, &ctx).await;
        assert!(result.is_err());
        assert_eq!(query.rows()[0]["nombre"], json!("General"));
    }

    #[tokio::test]
    async fn test_remove_requires_primary_key() {
        let transport = transport();
        let service = session(&transport);
        let query = service.find_query("tarifas").unwrap();

        let (target, ctx) = (row(json!({"nombre": "sin id"})), HookContext::new());
        let err = service.remove_row(&query, &target, &ctx).await.unwrap_err();
        let code = EngineError::find(&err).unwrap().error_code();
        assert_eq!(code, "MISSING_PRIMARY_KEY");
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_hook_failure_names_the_stage() {
        let service = CrudServiceBuilder::new(transport()).build();
        let mut schema = EntitySchema::new("tarifas");
        schema.list.map = Some(Hook::sync(|_value: Value, _ctx: &HookContext| -> Result<Value> {
            Err(anyhow::anyhow!("mapping refused"))
        }));
        let query = service.register_schema(&schema, None).unwrap();

        let (ctx, fetch) = (HookContext::new(), FetchOptions::default());
        let err = service.get_rows(&query, &fetch, &ctx).await.unwrap_err();
        assert!(format!("{:#}", err).contains("mapping refused"));
        assert!(query.is_empty());
    }
}
