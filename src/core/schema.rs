//! Raw entity schemas
//!
//! A schema is a partial description of a backend entity. Every field is
//! optional; [`EntityModel::resolve`](crate::core::model::EntityModel::resolve)
//! fills in the defaults. The serializable parts load from YAML:
//!
//! ```yaml
//! name: precios_tarifa
//! primary_key: idreg
//! list:
//!   fields: precio,tarifa(descripcion->tarifa),origen(nombre)
//!   filter: [precio, tarifa, origen]
//!   order_by: tarifa(descripcion),-precio
//!   items_per_page: 50
//! detail:
//!   propagate_changes: [festivos]
//! ```
//!
//! Hooks and predicates are attached in code.

use crate::core::clauses::{ConcatOp, SearchClauses};
use crate::core::fields::{FieldsSpec, split_fields};
use crate::core::hook::{Hook, RowFn, RowHook};
use crate::core::name::NameSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use validator::{Validate, ValidationError};

/// A single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }

    /// Expand into field expressions, splitting a single string on top-level commas
    pub fn to_fields(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => split_fields(s),
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

impl From<&str> for OneOrMany {
    fn from(s: &str) -> Self {
        OneOrMany::One(s.to_string())
    }
}

impl From<Vec<&str>> for OneOrMany {
    fn from(v: Vec<&str>) -> Self {
        OneOrMany::Many(v.into_iter().map(str::to_string).collect())
    }
}

// =============================================================================
// Entity
// =============================================================================

/// Partial description of a backend entity
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct EntitySchema {
    #[validate(custom(function = "validate_name"))]
    pub name: NameSpec,
    pub backend: Option<NameSpec>,
    pub friendly: Option<NameSpec>,
    pub primary_key: Option<String>,
    /// Audit column holding the last update time
    pub updated: Option<String>,
    /// Audit column holding the deletion time
    pub deleted: Option<String>,
    pub show_loader: Option<bool>,
    pub preload: Option<bool>,
    #[validate(nested)]
    pub list: ListSchema,
    pub detail: DetailSchema,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: NameSpec::Plain(name.into()),
            ..Default::default()
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn with_list(mut self, list: ListSchema) -> Self {
        self.list = list;
        self
    }

    pub fn with_detail(mut self, detail: DetailSchema) -> Self {
        self.detail = detail;
        self
    }
}

impl From<&str> for EntitySchema {
    fn from(name: &str) -> Self {
        EntitySchema::new(name)
    }
}

fn validate_name(name: &NameSpec) -> Result<(), ValidationError> {
    let resolved = name.resolve();
    if resolved.singular.trim().is_empty() || resolved.plural.trim().is_empty() {
        return Err(ValidationError::new("empty_entity_name"));
    }
    Ok(())
}

// =============================================================================
// Detail
// =============================================================================

/// How the detail view obtains the id of its row
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DetailId {
    /// Read from a route parameter
    Param { param: String },
    /// A fixed id, `"new"` included
    Literal(Value),
    /// Computed from the hook context
    #[serde(skip)]
    Hook(Hook<Value>),
}

/// Confirmation asked before deleting a row
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfirmDeleteSpec {
    /// Enable or disable, keeping the default texts
    Flag(bool),
    Message {
        #[serde(default = "default_true")]
        confirm: bool,
        header: Option<String>,
        message: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

/// Single-row view of an entity
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetailSchema {
    pub translate_prefix: Option<String>,
    pub header_text: Option<String>,
    pub show_loader: Option<bool>,
    /// Route template, `:id` is replaced by the row primary key
    pub route: Option<String>,
    pub id: Option<DetailId>,
    pub navigate_back_on_save: Option<bool>,
    pub navigate_back_on_delete: Option<bool>,
    pub confirm_delete: Option<ConfirmDeleteSpec>,
    /// Read rows from the full list instead of requesting them one by one
    pub cache: Option<bool>,
    pub fields: Option<FieldsSpec>,
    pub foreign: Option<ForeignSpec>,
    pub update_cache_row: Option<bool>,
    pub propagate_changes: Option<OneOrMany>,
    pub propagate_deletes: Option<OneOrMany>,
    pub flat_row: Option<bool>,
    #[serde(skip)]
    pub adding: Option<RowHook>,
    #[serde(skip)]
    pub opening: Option<RowHook>,
    #[serde(skip)]
    pub mapping: Option<RowHook>,
    #[serde(skip)]
    pub saving: Option<RowHook>,
}

// =============================================================================
// Foreign keys
// =============================================================================

/// Display value copied from a parent row into its children
#[derive(Debug, Clone)]
pub enum ForeignDisplay {
    /// A column of the parent row
    Field(String),
    /// Computed from the parent row; the keys of its result on an empty row
    /// are the columns requested from the backend
    Compute(RowFn<Value>),
}

impl<'de> Deserialize<'de> for ForeignDisplay {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(ForeignDisplay::Field)
    }
}

/// `{foreign_key: {table: display}}`
pub type ForeignSpec = IndexMap<String, IndexMap<String, ForeignDisplay>>;

// =============================================================================
// List
// =============================================================================

/// Options of the in-memory text filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub pipe: Option<OneOrMany>,
    pub pipe_to_backend: Option<bool>,
    pub ignore_case: Option<bool>,
    pub ignore_accents: Option<bool>,
    pub split_pipe_words: Option<bool>,
    pub concat_pipe_words: Option<ConcatOp>,
    pub distinguish_words: Option<bool>,
    pub max_distinctions: Option<usize>,
    #[serde(skip)]
    pub pre_filter: Option<RowFn<bool>>,
}

/// Filter declaration: shorthand field list or the complex form
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    Pipe(OneOrMany),
    Complex(FilterOptions),
}

/// Key of a row inside a group
#[derive(Debug, Clone)]
pub enum GroupKey {
    Property(String),
    Compute(RowFn<Value>),
}

impl<'de> Deserialize<'de> for GroupKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(GroupKey::Property)
    }
}

/// Grouping declaration in its complex form
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub property: GroupKey,
    #[serde(default)]
    pub order_by: Option<GroupKey>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GroupBySpec {
    Key(GroupKey),
    Complex(GroupConfig),
}

/// Ordering declaration in its complex form
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderConfig {
    pub pipe: FieldsSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OrderBySpec {
    Complex(OrderConfig),
    Pipe(FieldsSpec),
}

/// A multi-select mode offered by a list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MultiSelectMode {
    pub name: String,
    pub multi: bool,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub checked: Option<String>,
    pub unchecked: Option<String>,
    #[serde(skip)]
    pub checkable: Option<RowFn<bool>>,
}

impl MultiSelectMode {
    pub fn new(name: impl Into<String>, multi: bool) -> Self {
        Self {
            name: name.into(),
            multi,
            ..Default::default()
        }
    }

    pub fn with_checkable<F>(mut self, f: F) -> Self
    where
        F: Fn(&crate::core::Row) -> bool + Send + Sync + 'static,
    {
        self.checkable = Some(RowFn::new(f));
        self
    }
}

/// Collection view of an entity
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ListSchema {
    pub translate_prefix: Option<String>,
    pub header_text: Option<String>,
    pub add_new_text: Option<String>,
    pub loading_text: Option<String>,
    pub show_loader: Option<bool>,
    pub cache: Option<bool>,
    pub paginate: Option<bool>,
    #[validate(range(min = 1))]
    pub items_per_page: Option<usize>,
    pub fields: Option<FieldsSpec>,
    pub foreign: Option<ForeignSpec>,
    pub filter: Option<FilterSpec>,
    pub order_by: Option<OrderBySpec>,
    pub group_by: Option<GroupBySpec>,
    pub params: IndexMap<String, Value>,
    /// Search clauses sent with every list request
    pub search: Option<Hook<SearchClauses>>,
    pub search_or: Option<bool>,
    pub notify_cache_row: Option<bool>,
    pub multi_select_modes: Vec<MultiSelectMode>,
    #[serde(skip)]
    pub opening: Option<RowHook>,
    #[serde(skip)]
    pub map: Option<RowHook>,
    #[serde(skip)]
    pub saving: Option<RowHook>,
}
