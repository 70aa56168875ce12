//! Incremental refresh of completed cached queries

use super::CrudService;
use crate::core::context::HookContext;
use crate::core::hook::apply_row_hook;
use crate::core::query::EntityQuery;
use crate::core::row::primary_key_of;
use anyhow::Result;
use serde_json::Value;

/// Settings key holding the last audit time of a cached entity
pub fn audit_time_key(entity: &str) -> String {
    format!("cache.{}.last_audit_time", entity)
}

impl CrudService {
    /// Merge the rows changed since the last audit into a completed query
    ///
    /// Only cached, fully fetched queries are audited; anything else returns
    /// 0 without a request. Changed rows are merged by primary key or
    /// appended, rows flagged by the `deleted` audit column are removed when
    /// the cache excludes them. Returns the number of audited rows.
    pub async fn refresh_completed(&self, query: &EntityQuery, ctx: &HookContext) -> Result<usize> {
        let Some(cache) = query.cache() else {
            return Ok(0);
        };
        if !query.completed() {
            return Ok(0);
        }
        let model = query.model().clone();
        let settings_key = audit_time_key(&cache.entity().plural);

        if cache.last_audit_time(query.key()).is_none()
            && let Some(settings) = &self.settings
            && let Some(Value::String(time)) = settings.get(&settings_key).await?
        {
            cache.set_last_audit_time(query.key(), time);
        }

        let Some(rows) = cache.request_audit(self.transport.as_ref(), query).await? else {
            return Ok(0);
        };
        let audited = rows.len();
        for row in rows {
            let Some(id) = primary_key_of(&row, &model.primary_key).cloned() else {
                tracing::warn!(entity = %model.name, "audited row without primary key");
                continue;
            };
            if cache.exclude_deleted() && cache.is_deleted(&row) {
                query.remove_row(&id);
                continue;
            }
            let (opening, map) = (model.list.opening.as_ref(), model.list.map.as_ref());
            let row = apply_row_hook("list.opening", opening, row, ctx).await?;
            let row = apply_row_hook("list.map", map, row, ctx).await?;
            if !query.merge_row(&id, &row) {
                query.append_rows(vec![row]);
            }
        }

        let last_audit = cache.last_audit_time(query.key());
        if let (Some(settings), Some(time)) = (&self.settings, last_audit) {
            settings.set(&settings_key, Value::String(time)).await?;
        }
        tracing::info!(
            key = %query.key(),
            entity = %model.name,
            rows = audited,
            "completed query audited"
        );
        Ok(audited)
    }
}
