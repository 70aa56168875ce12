//! Row selection: pick-row mode, detail navigation and multi-select checks

use super::CollectionController;
use crate::core::clauses::SearchClauses;
use crate::core::row::{NEW_ROW, Row, RowId, ids_equal, is_truthy, position_by_pk, primary_key_of};
use crate::core::schema::MultiSelectMode;
use crate::pipes::{CHECKED, MatchOptions, apply_filter};
use crate::service::FetchOptions;
use anyhow::Result;
use serde_json::Value;
use tokio::sync::watch;

/// How a list was opened to pick a row for another view
#[derive(Debug, Clone)]
pub struct PickRowInit {
    /// Primary key of the row currently chosen in the caller
    pub selected: Option<Value>,
    pub can_create: bool,
    pub is_modal: bool,
    pub is_popover: bool,
    pub filter: Option<SearchClauses>,
}

impl Default for PickRowInit {
    fn default() -> Self {
        Self {
            selected: None,
            can_create: true,
            is_modal: false,
            is_popover: false,
            filter: None,
        }
    }
}

/// Outcome of selecting a row
#[derive(Debug, Clone, PartialEq)]
pub enum RowSelection {
    /// The row was handed to the pick-row waiter
    Picked(Row),
    /// The checked flag of the row was toggled
    Toggled { checked: bool, count: usize },
    /// Open the detail view
    Navigate { route: String, preloaded: Option<Row> },
}

fn uncheck_all(rows: &mut [Row]) {
    for row in rows {
        row.remove(CHECKED);
    }
}

fn set_checked(row: &mut Row, value: bool) {
    if value {
        row.insert(CHECKED.to_string(), Value::Bool(true));
    } else {
        row.remove(CHECKED);
    }
}

impl CollectionController {
    /// Enter pick-row mode
    pub fn initialize_pick_row(&self, init: PickRowInit) {
        self.with_state_mut(|s| {
            s.pick_mode = true;
            s.selected = init.selected;
            s.can_create = init.can_create;
            s.is_modal = init.is_modal;
            s.is_popover = init.is_popover;
            s.initial_filter = init.filter;
        });
    }

    pub fn is_pick_row_mode(&self) -> bool {
        self.with_state(|s| s.pick_mode)
    }

    pub fn selected(&self) -> Option<Value> {
        self.with_state(|s| s.selected.clone())
    }

    pub fn can_create(&self) -> bool {
        self.with_state(|s| s.can_create)
    }

    pub fn is_modal(&self) -> bool {
        self.with_state(|s| s.is_modal)
    }

    pub fn is_popover(&self) -> bool {
        self.with_state(|s| s.is_popover)
    }

    /// Whether the row is the one chosen in the caller of a pick
    pub fn is_selected(&self, row: &Row) -> bool {
        let pk = primary_key_of(row, &self.model().primary_key);
        self.with_state(|s| match (&s.selected, pk) {
            (Some(selected), Some(pk)) if s.pick_mode => {
                let blank = selected.is_null() || selected == &Value::String(String::new());
                !blank && ids_equal(pk, selected)
            }
            _ => false,
        })
    }

    /// Act on a row chosen by the user; `None` stands for the new row
    ///
    /// A pick-row list hands the row over and leaves pick mode. A list in a
    /// multi-select mode toggles the checked flag. Any other list resolves
    /// the detail route, preloading the row when the model asks for it.
    pub async fn select_row(&self, row: Option<Row>) -> Result<RowSelection> {
        let model = self.model().clone();
        let row = row.unwrap_or_else(|| {
            let mut row = Row::new();
            let id = Value::String(NEW_ROW.to_string());
            row.insert(model.primary_key.clone(), id);
            row
        });

        if self.is_pick_row_mode() {
            let pk = primary_key_of(&row, &model.primary_key).cloned();
            self.with_state_mut(|s| {
                s.selected = pk;
                s.pick_mode = false;
            });
            self.service
                .publish_pick_row(model.name.clone(), row.clone(), Some(model.clone()));
            return Ok(RowSelection::Picked(row));
        }

        if let Some(mode) = self.multi_select_mode() {
            let checked = self.toggle_checked(&row, &mode);
            let count = self.count_checked();
            self.checked.send_replace(count);
            return Ok(RowSelection::Toggled { checked, count });
        }

        let route = model.resolve_route(&row, &self.ctx)?;
        let preloaded = if model.preload {
            let pk = primary_key_of(&row, &model.primary_key).cloned();
            let id = RowId(pk.unwrap_or(Value::Null));
            self.service
                .preload_row(&self.query, &id, &FetchOptions::default(), &self.ctx)
                .await?
        } else {
            None
        };
        Ok(RowSelection::Navigate { route, preloaded })
    }

    fn toggle_checked(&self, row: &Row, mode: &MultiSelectMode) -> bool {
        if !self.is_checkable(row) {
            return false;
        }
        let pk_name = self.model().primary_key.clone();
        let Some(id) = primary_key_of(row, &pk_name).cloned() else {
            return false;
        };
        self.query.with_state_mut(|s| {
            let Some(index) = position_by_pk(&s.rows, &pk_name, &id) else {
                return false;
            };
            let checked = !s.rows[index].get(CHECKED).is_some_and(is_truthy);
            if !mode.multi {
                uncheck_all(&mut s.rows);
            }
            set_checked(&mut s.rows[index], checked);
            checked
        })
    }

    /// Active multi-select mode
    pub fn multi_select_mode(&self) -> Option<MultiSelectMode> {
        let name = self.with_state(|s| s.multi_select.clone())?;
        self.model().list.multi_select_mode(&name).cloned()
    }

    /// Enter or leave a multi-select mode and tell the session
    pub fn set_multi_select_mode(&self, name: &str, value: bool) {
        self.apply_multi_select_mode(name, value);
        self.service
            .publish_multi_select_mode(&self.model().name, name, value);
    }

    /// Enter or leave a multi-select mode; every check is dropped either way
    pub(crate) fn apply_multi_select_mode(&self, name: &str, value: bool) {
        if self.model().list.multi_select_mode(name).is_none() {
            tracing::warn!(entity = %self.model().name, mode = %name, "unknown multi-select mode");
            return;
        }
        let changed = self.with_state_mut(|s| match (value, s.multi_select.as_deref()) {
            (true, Some(current)) if current == name => false,
            (true, _) => {
                s.multi_select = Some(name.to_string());
                true
            }
            (false, Some(current)) if current == name => {
                s.multi_select = None;
                true
            }
            (false, _) => false,
        });
        if changed {
            self.query.with_state_mut(|s| uncheck_all(&mut s.rows));
            self.checked.send_replace(0);
            tracing::debug!(key = %self.query.key(), mode = %name, value, "multi-select mode");
        }
    }

    /// Check or uncheck every checkable loaded row
    pub fn toggle_check_all(&self, value: bool) -> usize {
        let checkable = self.multi_select_mode().and_then(|mode| mode.checkable);
        self.query.with_state_mut(|s| {
            for row in s.rows.iter_mut() {
                if checkable.as_ref().is_none_or(|f| f.call(row)) {
                    set_checked(row, value);
                }
            }
        });
        let count = self.count_checked();
        self.checked.send_replace(count);
        count
    }

    /// Check or uncheck the rows matching the typed text
    pub fn toggle_check_filtered(&self, value: bool) -> Result<usize> {
        let model = self.model().clone();
        let Some(filter) = model.list.filter.as_ref() else {
            return Ok(self.toggle_check_all(value));
        };
        let text = self.text();
        let options = MatchOptions {
            ignore_checked: false,
            concat: filter.concat_pipe_words,
        };
        let checkable = self.multi_select_mode().and_then(|mode| mode.checkable);
        self.query.with_state_mut(|s| -> Result<()> {
            for row in s.rows.iter_mut() {
                let allowed = checkable.as_ref().is_none_or(|f| f.call(row));
                if allowed && apply_filter(row, &text, filter, &options)? {
                    set_checked(row, value);
                }
            }
            Ok(())
        })?;
        let count = self.count_checked();
        self.checked.send_replace(count);
        Ok(count)
    }

    pub fn count_checked(&self) -> usize {
        self.query.with_state(|s| {
            s.rows
                .iter()
                .filter(|r| r.get(CHECKED).is_some_and(is_truthy))
                .count()
        })
    }

    /// Whether the active mode lets the row be checked
    pub fn is_checkable(&self, row: &Row) -> bool {
        self.multi_select_mode()
            .and_then(|mode| mode.checkable)
            .is_none_or(|f| f.call(row))
    }

    pub fn checked_rows(&self) -> Vec<Row> {
        self.query.with_state(|s| {
            s.rows
                .iter()
                .filter(|r| r.get(CHECKED).is_some_and(is_truthy))
                .cloned()
                .collect()
        })
    }

    /// Watch the number of checked rows
    pub fn subscribe_checked(&self) -> watch::Receiver<usize> {
        self.checked.subscribe()
    }

    /// Whether checked rows must survive a backend search
    pub fn caching_selected_rows(&self) -> bool {
        let filter = self.model().list.filter.as_ref();
        let multi_select = self.with_state(|s| s.multi_select.is_some());
        multi_select && filter.is_some_and(|filter| filter.pipe_to_backend)
    }

    /// Put checked rows back after a refresh, appending those the new result lacks
    pub(crate) fn merge_checked_rows(&self, cached: Vec<Row>) {
        let pk_name = self.model().primary_key.clone();
        self.query.with_state_mut(|s| {
            for row in cached {
                let Some(id) = primary_key_of(&row, &pk_name).cloned() else {
                    continue;
                };
                match position_by_pk(&s.rows, &pk_name, &id) {
                    Some(index) => set_checked(&mut s.rows[index], true),
                    None => s.rows.push(row),
                }
            }
        });
        let count = self.count_checked();
        self.checked.send_replace(count);
    }
}
