//! Row fetching: pages, single rows and refreshes

use super::{CrudService, FetchOptions, RefreshOptions};
use crate::core::cache::rows_from_value;
use crate::core::context::HookContext;
use crate::core::hook::apply_row_hook;
use crate::core::model::UrlOptions;
use crate::core::query::EntityQuery;
use crate::core::row::{NEW_ROW, Row, RowId};
use crate::core::service::Method;
use anyhow::Result;
use serde_json::Value;

impl CrudService {
    /// Fetch the next page of a query and append it
    ///
    /// A completed query answers with its rows and no request. Without
    /// pagination the whole collection replaces the rows and completes the
    /// query. Returns the rows of the query after the fetch.
    pub async fn get_rows(
        &self,
        query: &EntityQuery,
        options: &FetchOptions,
        ctx: &HookContext,
    ) -> Result<Vec<Row>> {
        let model = query.model().clone();
        if query.completed() {
            tracing::debug!(
                key = %query.key(),
                rows = query.len(),
                "completed query served from memory"
            );
            return Ok(query.rows());
        }

        let paginate = options.paginate.unwrap_or(model.list.paginate);
        let url = query.resolve_url(&UrlOptions {
            paginate: Some(paginate),
            custom_fields: options.custom_fields.clone(),
            ..Default::default()
        })?;
        let (method, body) = if query.has_search() {
            let search = query.resolve_search(ctx).await?;
            let body = search
                .map(|s| s.to_value())
                .unwrap_or_else(|| Value::Array(Vec::new()));
            (Method::Post, Some(body))
        } else {
            (Method::Get, None)
        };

        let response = self.transport.request(method, &url, body).await?;
        let fetched = rows_from_value(response, &url)?;
        let count = fetched.len();

        let mut rows = Vec::with_capacity(count);
        for row in fetched {
            let row = apply_row_hook("list.opening", model.list.opening.as_ref(), row, ctx).await?;
            rows.push(apply_row_hook("list.map", model.list.map.as_ref(), row, ctx).await?);
        }

        if paginate {
            let completed = count < model.list.items_per_page;
            let page = query.with_state_mut(|state| {
                state.page += 1;
                state.completed = completed;
                state.page
            });
            query.append_rows(rows);
            tracing::debug!(key = %query.key(), fetched = count, page, completed, "page appended");
        } else {
            query.clear();
            query.append_rows(rows);
            query.set_completed(true);
            tracing::debug!(key = %query.key(), fetched = count, "collection fetched");
        }
        Ok(query.rows())
    }

    /// Fetch a single row for the detail view
    ///
    /// `new` gives a blank row through the `adding` hook without any request.
    /// Cached details look the row up in the whole collection; otherwise it is
    /// requested through the detail projection. `None` when the backend has no
    /// such row.
    pub async fn get_row(
        &self,
        query: &EntityQuery,
        id: &RowId,
        options: &FetchOptions,
        ctx: &HookContext,
    ) -> Result<Option<Row>> {
        let model = query.model().clone();
        if id.is_new() {
            let mut row = Row::new();
            let id = Value::String(NEW_ROW.to_string());
            row.insert(model.primary_key.clone(), id);
            let hook = model.detail.adding.as_ref();
            let row = apply_row_hook("detail.adding", hook, row, ctx).await?;
            return Ok(Some(row));
        }

        let row = if model.detail.cache {
            let whole = FetchOptions {
                paginate: Some(false),
                ..options.clone()
            };
            self.get_rows(query, &whole, ctx).await?;
            query.find_row(id.value())
        } else {
            let url = model.resolve_detail_url(id, options.custom_fields.as_ref())?;
            let response = self.transport.request(Method::Get, &url, None).await?;
            let mut rows = rows_from_value(response, &url)?;
            if rows.len() > 1 {
                tracing::warn!(
                    entity = %model.name,
                    id = %id,
                    count = rows.len(),
                    "single row request returned several rows"
                );
            }
            (!rows.is_empty()).then(|| rows.swap_remove(0))
        };

        let Some(row) = row else {
            tracing::debug!(entity = %model.name, id = %id, "row not found");
            return Ok(None);
        };
        let hook = model.detail.opening.as_ref();
        let row = apply_row_hook("detail.opening", hook, row, ctx).await?;
        let hook = model.detail.mapping.as_ref();
        let row = apply_row_hook("detail.mapping", hook, row, ctx).await?;
        Ok(Some(row))
    }

    /// Fetch a row ahead of navigation and keep it for the detail view
    pub async fn preload_row(
        &self,
        query: &EntityQuery,
        id: &RowId,
        options: &FetchOptions,
        ctx: &HookContext,
    ) -> Result<Option<Row>> {
        let row = self.get_row(query, id, options, ctx).await?;
        self.store_preloaded_row(row.clone());
        Ok(row)
    }

    /// Request the rows of a query again
    ///
    /// A full reload starts from the first page unless the list is cached;
    /// scroll and paging events keep the current page, and stop the infinite
    /// trigger once the query is completed.
    pub async fn refresh(
        &self,
        query: &EntityQuery,
        options: RefreshOptions,
        ctx: &HookContext,
    ) -> Result<Vec<Row>> {
        if options.clear_before {
            query.clear_rows();
        }
        if !options.event && !query.model().list.cache {
            query.clear();
        }
        let rows = self.get_rows(query, &FetchOptions::default(), ctx).await?;
        if options.event && query.completed() {
            query.set_infinite_enabled(false);
        }
        Ok(rows)
    }
}
