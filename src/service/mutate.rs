//! Row mutations and the cache operations that follow them

use super::{CrudService, FetchOptions, SaveHook, SaveOptions};
use crate::core::cache::rows_from_value;
use crate::core::context::HookContext;
use crate::core::error::{ConfigError, EngineError};
use crate::core::hook::apply_row_hook;
use crate::core::model::{EntityModel, UrlOptions};
use crate::core::query::EntityQuery;
use crate::core::row::{Row, RowId, id_to_string, is_new_id, primary_key_of};
use crate::core::service::Method;
use anyhow::Result;
use serde_json::Value;

fn missing_primary_key(model: &EntityModel) -> anyhow::Error {
    EngineError::from(ConfigError::MissingPrimaryKey {
        entity: model.name.plural.clone(),
        primary_key: model.primary_key.clone(),
    })
    .into()
}

fn require_primary_key<'a>(model: &EntityModel, row: &'a Row) -> Result<&'a Value> {
    primary_key_of(row, &model.primary_key).ok_or_else(|| missing_primary_key(model))
}

impl CrudService {
    /// Create or update a row
    ///
    /// Rows without a primary key, or with `new`, are created; the sentinel
    /// is never sent. The cached copy follows when `detail.update_cache_row`
    /// is set; failures of that follow-up are logged, not returned.
    pub async fn save_row(
        &self,
        query: &EntityQuery,
        data: Row,
        options: SaveOptions,
        ctx: &HookContext,
    ) -> Result<Row> {
        let model = query.model().clone();
        let (stage, hook) = match options.hook {
            SaveHook::Detail => ("detail.saving", model.detail.saving.as_ref()),
            SaveHook::List => ("list.saving", model.list.saving.as_ref()),
            SaveHook::Skip => ("saving", None),
        };
        let mut data = apply_row_hook(stage, hook, data, ctx).await?;

        let creating = match primary_key_of(&data, &model.primary_key) {
            None => true,
            Some(id) => is_new_id(id),
        };
        let (method, url) = if creating {
            data.remove(&model.primary_key);
            (Method::Post, model.resolve_save_url(None)?)
        } else {
            let id = RowId(require_primary_key(&model, &data)?.clone());
            (Method::Put, model.resolve_save_url(Some(&id))?)
        };

        tracing::debug!(entity = %model.name, method = %method, url = %url, "saving row");
        let response = self
            .transport
            .request(method, &url, Some(Value::Object(data.clone())))
            .await?;
        let saved = match response {
            Value::Object(row) => {
                let mut merged = data;
                merged.extend(row);
                merged
            }
            Value::Array(items) => match items.into_iter().next() {
                Some(Value::Object(row)) => row,
                _ => data,
            },
            id @ (Value::Number(_) | Value::String(_)) => {
                data.insert(model.primary_key.clone(), id);
                data
            }
            Value::Null | Value::Bool(_) => data,
        };

        if model.detail.update_cache_row {
            let outcome = if creating {
                self.insert_cache_row(query, &saved, ctx).await
            } else {
                self.update_cache_row(query, &saved, ctx).await
            };
            if let Err(err) = outcome {
                tracing::warn!(entity = %model.name, error = %err, "cache not updated after save");
            }
        }
        Ok(saved)
    }

    /// Request a row through the list projection so it matches the list rows
    async fn fetch_list_row(
        &self,
        query: &EntityQuery,
        row: &Row,
        ctx: &HookContext,
    ) -> Result<Option<Row>> {
        let model = query.model();
        let id = require_primary_key(model, row)?;
        let options = UrlOptions {
            entity_name: Some(model.backend.singular.clone()),
            id: Some(RowId(id.clone())),
            ..Default::default()
        };
        let url = model.resolve_url(&options, false)?;
        let response = self.transport.request(Method::Get, &url, None).await?;
        let mut rows = rows_from_value(response, &url)?;
        if rows.len() > 1 {
            tracing::warn!(
                entity = %model.name,
                url = %url,
                count = rows.len(),
                "list row request returned several rows"
            );
        }
        if rows.is_empty() {
            return Ok(None);
        }
        let fresh = rows.swap_remove(0);
        let hook = model.list.map.as_ref();
        Ok(Some(apply_row_hook("list.map", hook, fresh, ctx).await?))
    }

    /// Add a created row to the cached rows
    ///
    /// While pages remain unfetched the row would show up again in a later
    /// page, so the first page is requested again instead and `false` is
    /// returned.
    pub async fn insert_cache_row(
        &self,
        query: &EntityQuery,
        created: &Row,
        ctx: &HookContext,
    ) -> Result<bool> {
        if query.page() > 0 && !query.completed() {
            tracing::debug!(
                key = %query.key(),
                page = query.page(),
                "query partially fetched, requesting first page again"
            );
            query.clear();
            self.get_rows(query, &FetchOptions::default(), ctx).await?;
            return Ok(false);
        }
        match self.fetch_list_row(query, created, ctx).await? {
            Some(row) => {
                query.append_rows(vec![row]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Merge an updated row into its cached copy and propagate the change
    ///
    /// `false` when the row is not cached.
    pub async fn update_cache_row(
        &self,
        query: &EntityQuery,
        updated: &Row,
        ctx: &HookContext,
    ) -> Result<bool> {
        let model = query.model().clone();
        let id = require_primary_key(&model, updated)?.clone();
        if !query.contains_row(&id) {
            return Ok(false);
        }
        let fresh = self
            .fetch_list_row(query, updated, ctx)
            .await?
            .unwrap_or_else(|| updated.clone());
        query.merge_row(&id, &fresh);
        let merged = query.find_row(&id).unwrap_or(fresh);
        self.propagate_changes(&model, &merged)?;
        Ok(true)
    }

    /// Delete a row, asking for confirmation first when configured
    ///
    /// Returns `false` when the user declines. Without a confirmer the row is
    /// deleted straight away.
    pub async fn delete_row(
        &self,
        query: &EntityQuery,
        data: &Row,
        ctx: &HookContext,
    ) -> Result<bool> {
        let confirm = &query.model().detail.confirm_delete;
        if confirm.confirm {
            match &self.confirmer {
                Some(confirmer) => {
                    if !confirmer.confirm(&confirm.header, &confirm.message).await {
                        tracing::debug!(entity = %query.model().name, "deletion declined");
                        return Ok(false);
                    }
                }
                None => {
                    tracing::debug!(
                        entity = %query.model().name,
                        "no confirmer configured, deleting unconfirmed"
                    );
                }
            }
        }
        self.remove_row(query, data, ctx).await?;
        Ok(true)
    }

    /// Delete a row on the backend, then from the cache and its dependents
    pub async fn remove_row(
        &self,
        query: &EntityQuery,
        data: &Row,
        _ctx: &HookContext,
    ) -> Result<()> {
        let model = query.model().clone();
        let id = require_primary_key(&model, data)?;
        let url = format!("{}?id={}", model.backend.singular, id_to_string(id));
        self.transport.request(Method::Delete, &url, None).await?;
        self.delete_cache_row(query, data);
        self.propagate_deletes(&model, data)?;
        Ok(())
    }

    /// Remove a row from the cached rows by primary key
    pub fn delete_cache_row(&self, query: &EntityQuery, data: &Row) -> bool {
        match primary_key_of(data, &query.model().primary_key) {
            Some(id) => query.remove_row(id).is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::context::HookContext;
    use crate::core::error::EngineError;
    use crate::core::hook::RowHook;
    use crate::core::name::EntityName;
    use crate::core::row::Row;
    use crate::core::schema::{ConfirmDeleteSpec, DetailSchema, EntitySchema, ListSchema};
    use crate::core::service::{Confirmer, Method};
    use crate::service::{CrudServiceBuilder, FetchOptions, SaveHook, SaveOptions};
    use crate::storage::InMemoryTransport;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    fn transport(n: i64) -> InMemoryTransport {
        let rows = (1..=n)
            .map(|i| row(json!({"idreg": i, "nombre": format!("tarifa {}", i)})))
            .collect();
        InMemoryTransport::new().with_entity_table(&EntityName::new("tarifa", "tarifas"), rows)
    }

    fn schema(per_page: usize) -> EntitySchema {
        EntitySchema::new("tarifas").with_list(ListSchema {
            items_per_page: Some(per_page),
            ..Default::default()
        })
    }

    fn last_url(transport: &InMemoryTransport) -> String {
        let requests = transport.requests().unwrap();
        requests.last().unwrap().url.clone()
    }

    struct Answer(bool);

    #[async_trait]
    impl Confirmer for Answer {
        async fn confirm(&self, _header: &str, _message: &str) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn test_create_strips_new_sentinel_and_appends() {
        let transport = transport(2);
        let service = CrudServiceBuilder::new(transport.clone()).build();
        let query = service.register_schema(&schema(10), None).unwrap();
        let (ctx, fetch) = (HookContext::new(), FetchOptions::default());
        service.get_rows(&query, &fetch, &ctx).await.unwrap();

        let data = row(json!({"idreg": "new", "nombre": "nueva"}));
        let saved = service
            .save_row(&query, data, SaveOptions::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(saved["idreg"], json!(3));

        let create = &transport.requests().unwrap()[1];
        assert_eq!(create.method, Method::Post);
        assert_eq!(create.url, "tarifa");
        assert_eq!(create.body, Some(json!({"nombre": "nueva"})));
        assert_eq!(query.len(), 3);
    }

    #[tokio::test]
    async fn test_insert_during_pagination_requests_first_page_again() {
        let transport = transport(5);
        let service = CrudServiceBuilder::new(transport.clone()).build();
        let query = service.register_schema(&schema(2), None).unwrap();
        let (ctx, fetch) = (HookContext::new(), FetchOptions::default());
        service.get_rows(&query, &fetch, &ctx).await.unwrap();
        service.get_rows(&query, &fetch, &ctx).await.unwrap();
        assert_eq!(query.page(), 2);

        let inserted = service
            .insert_cache_row(&query, &row(json!({"idreg": 6, "nombre": "x"})), &ctx)
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!((query.len(), query.page()), (2, 1));
        assert_eq!(last_url(&transport), "tarifas?limit=2&offset=0");
    }

    #[tokio::test]
    async fn test_update_merges_in_place() {
        let transport = transport(3);
        let service = CrudServiceBuilder::new(transport.clone()).build();
        let query = service.register_schema(&schema(10), None).unwrap();
        let (ctx, fetch) = (HookContext::new(), FetchOptions::default());
        service.get_rows(&query, &fetch, &ctx).await.unwrap();

        let data = row(json!({"idreg": 2, "nombre": "cambiada"}));
        service
            .save_row(&query, data, SaveOptions::default(), &ctx)
            .await
            .unwrap();
        let rows = query.rows();
        assert_eq!(rows[1]["nombre"], json!("cambiada"));
        assert_eq!(rows.len(), 3);
        let update = &transport.requests().unwrap()[1];
        assert_eq!(update.method, Method::Put);
        assert_eq!(update.url, "tarifa?id=2");
    }

    #[tokio::test]
    async fn test_update_of_uncached_row_is_a_no_op() {
        let service = CrudServiceBuilder::new(transport(3)).build();
        let query = service.register_schema(&schema(10), None).unwrap();
        let updated = service
            .update_cache_row(&query, &row(json!({"idreg": 2})), &HookContext::new())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_saving_hooks() {
        let transport = transport(1);
        let service = CrudServiceBuilder::new(transport.clone()).build();
        let schema = schema(10)
            .with_detail(DetailSchema {
                saving: Some(RowHook::sync(|mut row, _| {
                    row["from"] = json!("detail");
                    Ok(row)
                })),
                update_cache_row: Some(false),
                ..Default::default()
            })
            .with_list(ListSchema {
                saving: Some(RowHook::sync(|mut row, _| {
                    row["from"] = json!("list");
                    Ok(row)
                })),
                ..Default::default()
            });
        let query = service.register_schema(&schema, None).unwrap();
        let ctx = HookContext::new();
        let detail = SaveOptions::default();
        let list = SaveOptions {
            hook: SaveHook::List,
        };
        let skip = SaveOptions {
            hook: SaveHook::Skip,
        };

        let saved = service
            .save_row(&query, row(json!({"idreg": 1})), detail, &ctx)
            .await
            .unwrap();
        assert_eq!(saved["from"], json!("detail"));
        let saved = service
            .save_row(&query, row(json!({"idreg": 1})), list, &ctx)
            .await
            .unwrap();
        assert_eq!(saved["from"], json!("list"));
        let data = row(json!({"idreg": 1, "from": "caller"}));
        let saved = service.save_row(&query, data, skip, &ctx).await.unwrap();
        assert_eq!(saved["from"], json!("caller"));
    }

    #[tokio::test]
    async fn test_delete_confirmation() {
        let transport = transport(2);
        let declined = CrudServiceBuilder::new(transport.clone())
            .with_confirmer(Answer(false))
            .build();
        let query = declined.register_schema(&schema(10), None).unwrap();
        let (ctx, fetch) = (HookContext::new(), FetchOptions::default());
        declined.get_rows(&query, &fetch, &ctx).await.unwrap();
        let first = query.rows()[0].clone();
        assert!(!declined.delete_row(&query, &first, &ctx).await.unwrap());
        assert_eq!(query.len(), 2);

        let accepted = CrudServiceBuilder::new(transport.clone())
            .with_confirmer(Answer(true))
            .build();
        let query = accepted.register_schema(&schema(10), None).unwrap();
        accepted.get_rows(&query, &fetch, &ctx).await.unwrap();
        let first = query.rows()[0].clone();
        assert!(accepted.delete_row(&query, &first, &ctx).await.unwrap());
        assert_eq!(query.len(), 1);
        assert_eq!(transport.rows("tarifas").unwrap().len(), 1);
        assert_eq!(last_url(&transport), "tarifa?id=1");
    }

    #[tokio::test]
    async fn test_delete_without_confirmation() {
        let transport = transport(1);
        let service = CrudServiceBuilder::new(transport.clone())
            .with_confirmer(Answer(false))
            .build();
        let schema = schema(10).with_detail(DetailSchema {
            confirm_delete: Some(ConfirmDeleteSpec::Flag(false)),
            ..Default::default()
        });
        let query = service.register_schema(&schema, None).unwrap();
        let deleted = service
            .delete_row(&query, &row(json!({"idreg": 1})), &HookContext::new())
            .await
            .unwrap();
        assert!(deleted);
    }

    #[tokio::test]
    async fn test_remove_requires_primary_key() {
        let service = CrudServiceBuilder::new(transport(1)).build();
        let query = service.register_schema(&schema(10), None).unwrap();
        let err = service
            .remove_row(&query, &row(json!({"nombre": "x"})), &HookContext::new())
            .await
            .unwrap_err();
        let code = EngineError::find(&err).unwrap().error_code();
        assert_eq!(code, "MISSING_PRIMARY_KEY");
    }
}
