//! Column ordering, group collapsing and the rendered view of the rows

use super::CollectionController;
use crate::core::fields::FieldsSpec;
use crate::core::row::Row;
use crate::pipes::{CollapsedGroups, MatchOptions, RowGroup, filter_rows, group_rows, order_rows};
use anyhow::Result;
use serde_json::Value;

/// Sort state of a column header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderState {
    /// Rows keep the configured order
    #[default]
    Original,
    Ascending,
    Descending,
}

impl OrderState {
    /// Next state when the header is clicked
    pub fn next(self) -> Self {
        match self {
            OrderState::Original => OrderState::Ascending,
            OrderState::Ascending => OrderState::Descending,
            OrderState::Descending => OrderState::Original,
        }
    }
}

impl CollectionController {
    /// Cycle the order of a column; ordering by one column resets the others
    pub fn toggle_order(&self, column: &str) -> OrderState {
        self.with_state_mut(|s| {
            let current = match &s.order {
                Some((active, state)) if active == column => *state,
                _ => OrderState::Original,
            };
            let next = current.next();
            s.order = (next != OrderState::Original).then(|| (column.to_string(), next));
            next
        })
    }

    pub fn order_state(&self, column: &str) -> OrderState {
        self.with_state(|s| match &s.order {
            Some((active, state)) if active == column => *state,
            _ => OrderState::Original,
        })
    }

    /// Order applied to the view: the active column, else the configured pipe
    pub fn order_spec(&self) -> Option<FieldsSpec> {
        let active = self.with_state(|s| s.order.clone());
        let configured = self.model().list.order_by.as_ref();
        match active {
            Some((column, OrderState::Descending)) => {
                Some(FieldsSpec::Text(format!("-{}", column)))
            }
            Some((column, OrderState::Ascending)) => Some(FieldsSpec::Text(column)),
            _ => configured.map(|order| order.pipe.clone()),
        }
    }

    pub fn toggle_collapsed(&self, key: &Value) {
        self.with_state_mut(|s| s.collapsed.toggle(key));
    }

    pub fn is_collapsed(&self, key: &Value) -> bool {
        self.with_state(|s| s.collapsed.is_collapsed(key))
    }

    pub fn collapse_all_groups(&self) -> Result<()> {
        let groups = self.view()?;
        self.with_state_mut(|s| s.collapsed.collapse_all(&groups));
        Ok(())
    }

    pub fn expand_all_groups(&self) {
        self.with_state_mut(|s| s.collapsed = CollapsedGroups::new());
    }

    /// Loaded rows through the pre-filter and, when local, the typed text
    ///
    /// Checked rows always pass.
    pub fn filtered(&self) -> Result<Vec<Row>> {
        let rows = self.query.rows();
        let model = self.model().clone();
        let Some(filter) = model.list.filter.as_ref() else {
            return Ok(rows);
        };
        let text = if self.is_local_filtered() {
            self.text()
        } else {
            String::new()
        };
        if text.trim().is_empty() && filter.pre_filter.is_none() {
            return Ok(rows);
        }
        let options = MatchOptions {
            ignore_checked: true,
            concat: filter.concat_pipe_words,
        };
        filter_rows(&rows, &text, filter, &options)
    }

    /// Rows as rendered: filtered, ordered and grouped
    pub fn view(&self) -> Result<Vec<RowGroup>> {
        let mut rows = self.filtered()?;
        if let Some(spec) = self.order_spec() {
            order_rows(&mut rows, &spec, None)?;
        }
        group_rows(&rows, self.model().list.group_by.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{controller, transport};
    use super::*;
    use crate::controller::CollectionController;
    use crate::core::context::HookContext;
    use crate::core::hook::RowFn;
    use crate::core::schema::{
        EntitySchema, FilterOptions, FilterSpec, GroupBySpec, GroupKey, ListSchema, OneOrMany,
        OrderBySpec,
    };
    use crate::service::CrudServiceBuilder;
    use serde_json::json;
    use std::sync::Arc;

    fn names(rows: &[Row]) -> Value {
        rows.iter().map(|r| r["nombre"].clone()).collect()
    }

    fn open(schema: &EntitySchema) -> CollectionController {
        let service = Arc::new(CrudServiceBuilder::new(transport()).build());
        CollectionController::open(service, schema, None, HookContext::new()).unwrap()
    }

    #[test]
    fn test_order_state_cycle() {
        let transport = transport();
        let controller = controller(&transport, 10, false);
        assert_eq!(controller.toggle_order("nombre"), OrderState::Ascending);
        assert_eq!(controller.toggle_order("nombre"), OrderState::Descending);
        let descending = FieldsSpec::Text("-nombre".to_string());
        assert_eq!(controller.order_spec(), Some(descending));

        assert_eq!(controller.toggle_order("idreg"), OrderState::Ascending);
        assert_eq!(controller.order_state("nombre"), OrderState::Original);
        assert_eq!(controller.toggle_order("idreg"), OrderState::Descending);
        assert_eq!(controller.toggle_order("idreg"), OrderState::Original);
        assert!(controller.order_spec().is_none());
    }

    #[tokio::test]
    async fn test_view_orders_and_groups() {
        let schema = EntitySchema::new("ciudades").with_list(ListSchema {
            order_by: Some(OrderBySpec::Pipe(FieldsSpec::Text("nombre".to_string()))),
            group_by: Some(GroupBySpec::Key(GroupKey::Property("activo".to_string()))),
            ..Default::default()
        });
        let controller = open(&schema);
        controller.initialize().await.unwrap();

        let groups = controller.view().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, json!(true));
        let active = json!(["Amsterdam", "Berlin", "London", "Paris"]);
        assert_eq!(names(&groups[0].rows), active);
        assert_eq!(groups[1].key, Value::Null);
        assert_eq!(names(&groups[1].rows), json!(["Lisboa", "Parma", "Ámbar"]));

        controller.toggle_order("nombre");
        controller.toggle_order("nombre");
        let groups = controller.view().unwrap();
        assert_eq!(groups[0].key, Value::Null);
        assert_eq!(names(&groups[0].rows), json!(["Ámbar", "Parma", "Lisboa"]));

        controller.collapse_all_groups().unwrap();
        assert!(controller.is_collapsed(&json!(true)));
        assert!(controller.is_collapsed(&Value::Null));
        controller.toggle_collapsed(&json!(true));
        assert!(!controller.is_collapsed(&json!(true)));
        controller.expand_all_groups();
        assert!(!controller.is_collapsed(&Value::Null));
    }

    #[tokio::test]
    async fn test_pre_filter_applies_without_text() {
        let schema = EntitySchema::new("ciudades").with_list(ListSchema {
            filter: Some(FilterSpec::Complex(FilterOptions {
                pipe: Some(OneOrMany::from("nombre")),
                pre_filter: Some(RowFn::new(|row: &Row| {
                    row["idreg"].as_i64().is_some_and(|id| id > 4)
                })),
                ..Default::default()
            })),
            ..Default::default()
        });
        let controller = open(&schema);
        controller.initialize().await.unwrap();
        let filtered = controller.filtered().unwrap();
        assert_eq!(names(&filtered), json!(["London", "Lisboa", "Berlin"]));

        controller.apply_filter("lis").await.unwrap();
        let filtered = controller.filtered().unwrap();
        assert_eq!(names(&filtered), json!(["Lisboa"]));
    }
}
