//! Resolved entity models
//!
//! [`EntityModel::resolve`] turns a partial [`EntitySchema`] into a model
//! where every option has a value. Models are immutable and shared as
//! `Arc<EntityModel>`; resolving the same schema twice gives equal models.
//!
//! The model also knows how to address its entity on the backend:
//!
//! ```text
//! [search/[(OR)]]{entity}?id=..&rel=..&fields=..&sort=..&{params}
//! ```

use crate::core::clauses::{ConcatOp, SearchClauses};
use crate::core::context::HookContext;
use crate::core::error::{ConfigError, EngineError};
use crate::core::fields::{ApiEntity, FieldsSpec};
use crate::core::hook::{Hook, RowFn, RowHook};
use crate::core::name::EntityName;
use crate::core::row::{Row, RowId, id_to_string, primary_key_of};
use crate::core::schema::{
    ConfirmDeleteSpec, DetailId, EntitySchema, FilterOptions, FilterSpec, ForeignDisplay,
    ForeignSpec, GroupBySpec, GroupConfig, MultiSelectMode, OrderBySpec, OrderConfig,
};
use crate::core::service::Translator;
use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value;

/// Header and message of the delete confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDelete {
    pub confirm: bool,
    pub header: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DetailModel {
    pub translate_prefix: String,
    pub header_text: String,
    pub show_loader: bool,
    pub route: String,
    pub id: DetailId,
    pub navigate_back_on_save: bool,
    pub navigate_back_on_delete: bool,
    pub confirm_delete: ConfirmDelete,
    pub cache: bool,
    pub fields: Option<FieldsSpec>,
    pub foreign: Option<ForeignSpec>,
    pub update_cache_row: bool,
    pub propagate_changes: Vec<String>,
    pub propagate_deletes: Vec<String>,
    pub flat_row: bool,
    pub adding: Option<RowHook>,
    pub opening: Option<RowHook>,
    pub mapping: Option<RowHook>,
    pub saving: Option<RowHook>,
}

/// Text filter with every option resolved
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub pipe: Vec<String>,
    pub pipe_to_backend: bool,
    pub ignore_case: bool,
    pub ignore_accents: bool,
    pub split_pipe_words: bool,
    pub concat_pipe_words: ConcatOp,
    pub distinguish_words: bool,
    pub max_distinctions: usize,
    pub pre_filter: Option<RowFn<bool>>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            pipe: Vec::new(),
            pipe_to_backend: false,
            ignore_case: true,
            ignore_accents: true,
            split_pipe_words: true,
            concat_pipe_words: ConcatOp::And,
            distinguish_words: true,
            max_distinctions: 3,
            pre_filter: None,
        }
    }
}

impl FilterConfig {
    fn from_options(options: &FilterOptions) -> Self {
        let base = Self::default();
        let pipe = options.pipe.as_ref().map(|p| p.to_fields());
        Self {
            pipe: pipe.unwrap_or_default(),
            pipe_to_backend: options.pipe_to_backend.unwrap_or(base.pipe_to_backend),
            ignore_case: options.ignore_case.unwrap_or(base.ignore_case),
            ignore_accents: options.ignore_accents.unwrap_or(base.ignore_accents),
            split_pipe_words: options.split_pipe_words.unwrap_or(base.split_pipe_words),
            concat_pipe_words: options.concat_pipe_words.unwrap_or(base.concat_pipe_words),
            distinguish_words: options.distinguish_words.unwrap_or(base.distinguish_words),
            max_distinctions: options.max_distinctions.unwrap_or(base.max_distinctions),
            pre_filter: options.pre_filter.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListModel {
    pub translate_prefix: String,
    pub header_text: String,
    pub add_new_text: String,
    pub loading_text: String,
    pub show_loader: bool,
    pub cache: bool,
    pub paginate: bool,
    pub items_per_page: usize,
    pub fields: Option<FieldsSpec>,
    pub foreign: Option<ForeignSpec>,
    pub filter: Option<FilterConfig>,
    pub order_by: Option<OrderConfig>,
    pub group_by: Option<GroupConfig>,
    pub params: IndexMap<String, Value>,
    pub search: Option<Hook<SearchClauses>>,
    pub search_or: bool,
    pub notify_cache_row: bool,
    pub multi_select_modes: Vec<MultiSelectMode>,
    pub opening: Option<RowHook>,
    pub map: Option<RowHook>,
    pub saving: Option<RowHook>,
}

impl ListModel {
    pub fn multi_select_mode(&self, name: &str) -> Option<&MultiSelectMode> {
        self.multi_select_modes.iter().find(|m| m.name == name)
    }
}

/// A schema with every option resolved
#[derive(Debug, Clone)]
pub struct EntityModel {
    pub name: EntityName,
    pub backend: EntityName,
    pub friendly: EntityName,
    pub primary_key: String,
    pub updated: Option<String>,
    pub deleted: Option<String>,
    pub show_loader: bool,
    pub preload: bool,
    pub detail: DetailModel,
    pub list: ListModel,
}

/// Overrides for [`EntityModel::resolve_url`]
#[derive(Debug, Clone, Default)]
pub struct UrlOptions {
    /// Backend entity, defaults to the plural backend name
    pub entity_name: Option<String>,
    pub id: Option<RowId>,
    /// Overrides `list.paginate` for the query level URL
    pub paginate: Option<bool>,
    /// Replaces the list projection
    pub custom_fields: Option<FieldsSpec>,
}

/// Everything needed to address a backend entity
#[derive(Debug, Clone, Default)]
pub struct UrlRequest<'a> {
    pub entity_name: &'a str,
    pub id: Option<&'a RowId>,
    pub fields: Option<&'a FieldsSpec>,
    pub foreign: Option<&'a ForeignSpec>,
    pub order_by: Option<&'a FieldsSpec>,
    pub search: bool,
    pub search_or: bool,
    pub params: Option<&'a IndexMap<String, Value>>,
}

fn prefixed(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}.", prefix)
    }
}

fn translated(text: String, translator: Option<&dyn Translator>) -> String {
    match translator {
        Some(t) => t.translate(&text, None),
        None => text,
    }
}

impl EntityModel {
    /// Fill every unset option of a schema
    pub fn resolve(schema: &EntitySchema, translator: Option<&dyn Translator>) -> Result<Self> {
        let name = schema.name.resolve();
        if name.plural.trim().is_empty() {
            return Err(EngineError::from(ConfigError::InvalidSchema {
                entity: String::new(),
                message: "entity name is empty".to_string(),
            })
            .into());
        }

        let backend = match &schema.backend {
            Some(spec) => spec.resolve(),
            None => name.map(|s| s.replace('-', "_")),
        };
        let friendly = match &schema.friendly {
            Some(spec) => spec.resolve(),
            None => name.map(|s| s.replace('-', " ")),
        };
        let primary_key = schema
            .primary_key
            .clone()
            .filter(|pk| !pk.is_empty())
            .unwrap_or_else(|| "idreg".to_string());
        let show_loader = schema.show_loader.unwrap_or(false);

        let detail = Self::resolve_detail(schema, &name, &friendly, show_loader, translator);
        let list = Self::resolve_list(schema, &friendly, show_loader, translator);

        Ok(Self {
            name,
            backend,
            friendly,
            primary_key,
            updated: schema.updated.clone(),
            deleted: schema.deleted.clone(),
            show_loader,
            preload: schema.preload.unwrap_or(true),
            detail,
            list,
        })
    }

    fn resolve_detail(
        schema: &EntitySchema,
        name: &EntityName,
        friendly: &EntityName,
        show_loader: bool,
        translator: Option<&dyn Translator>,
    ) -> DetailModel {
        let raw = &schema.detail;
        let translate_prefix = raw
            .translate_prefix
            .clone()
            .unwrap_or_else(|| friendly.singular.clone());
        let prefix = prefixed(&translate_prefix);

        let route = raw
            .route
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("{}/:id", name.singular));
        let route = if route.starts_with('/') {
            route
        } else {
            format!("/{}", route)
        };

        let default_message = format!("{}DeleteMessage", prefix);
        let confirm_delete = match &raw.confirm_delete {
            None => ConfirmDelete {
                confirm: true,
                header: "buttons.delete".to_string(),
                message: default_message,
            },
            Some(ConfirmDeleteSpec::Flag(confirm)) => ConfirmDelete {
                confirm: *confirm,
                header: "buttons.delete".to_string(),
                message: default_message,
            },
            Some(ConfirmDeleteSpec::Message {
                confirm,
                header,
                message,
            }) => ConfirmDelete {
                confirm: *confirm,
                header: header.as_deref().unwrap_or("buttons.delete").to_string(),
                message: message.clone().unwrap_or(default_message),
            },
        };
        let confirm_delete = ConfirmDelete {
            header: translated(confirm_delete.header, translator),
            message: translated(confirm_delete.message, translator),
            ..confirm_delete
        };

        let propagate_changes = raw
            .propagate_changes
            .as_ref()
            .map(|p| p.to_vec())
            .unwrap_or_default();
        let propagate_deletes = raw
            .propagate_deletes
            .as_ref()
            .map(|p| p.to_vec())
            .unwrap_or_else(|| propagate_changes.clone());

        let header_text = raw
            .header_text
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| format!("{}detail_{}", prefix, friendly.singular));

        DetailModel {
            translate_prefix,
            header_text: translated(header_text, translator),
            show_loader: raw.show_loader.unwrap_or(show_loader),
            route,
            id: raw.id.clone().unwrap_or(DetailId::Param {
                param: "id".to_string(),
            }),
            navigate_back_on_save: raw.navigate_back_on_save.unwrap_or(true),
            navigate_back_on_delete: raw.navigate_back_on_delete.unwrap_or(true),
            confirm_delete,
            cache: raw.cache.unwrap_or(false),
            fields: raw.fields.clone(),
            foreign: raw.foreign.clone(),
            update_cache_row: raw.update_cache_row.unwrap_or(true),
            propagate_changes,
            propagate_deletes,
            flat_row: raw.flat_row.unwrap_or(false),
            adding: raw.adding.clone(),
            opening: raw.opening.clone(),
            mapping: raw.mapping.clone(),
            saving: raw.saving.clone(),
        }
    }

    fn resolve_list(
        schema: &EntitySchema,
        friendly: &EntityName,
        show_loader: bool,
        translator: Option<&dyn Translator>,
    ) -> ListModel {
        let raw = &schema.list;
        let translate_prefix = raw
            .translate_prefix
            .clone()
            .unwrap_or_else(|| friendly.plural.clone());
        let prefix = prefixed(&translate_prefix);

        let filter = raw.filter.as_ref().map(|spec| match spec {
            FilterSpec::Pipe(pipe) => FilterConfig {
                pipe: pipe.to_fields(),
                ..FilterConfig::default()
            },
            FilterSpec::Complex(options) => FilterConfig::from_options(options),
        });
        let group_by = raw.group_by.as_ref().map(|spec| match spec {
            GroupBySpec::Key(key) => GroupConfig {
                property: key.clone(),
                order_by: None,
            },
            GroupBySpec::Complex(config) => config.clone(),
        });
        let order_by = raw.order_by.as_ref().map(|spec| match spec {
            OrderBySpec::Pipe(pipe) => OrderConfig { pipe: pipe.clone() },
            OrderBySpec::Complex(config) => config.clone(),
        });

        let text = |value: &Option<String>, default: String| {
            let text = value.clone().filter(|t| !t.is_empty()).unwrap_or(default);
            translated(text, translator)
        };

        let (singular, plural) = (&friendly.singular, &friendly.plural);
        let header_text = text(&raw.header_text, format!("{}list_{}", prefix, plural));
        let add_new_text = text(&raw.add_new_text, format!("{}Add new {}", prefix, singular));
        let loading_text = text(&raw.loading_text, format!("{}Loading {}", prefix, plural));

        ListModel {
            header_text,
            add_new_text,
            loading_text,
            translate_prefix,
            show_loader: raw.show_loader.unwrap_or(show_loader),
            cache: raw.cache.unwrap_or(false),
            paginate: raw.paginate.unwrap_or(true),
            items_per_page: raw.items_per_page.filter(|n| *n > 0).unwrap_or(100),
            fields: raw.fields.clone(),
            foreign: raw.foreign.clone(),
            filter,
            order_by,
            group_by,
            params: raw.params.clone(),
            search: raw.search.clone(),
            search_or: raw.search_or.unwrap_or(false),
            notify_cache_row: raw.notify_cache_row.unwrap_or(true),
            multi_select_modes: raw.multi_select_modes.clone(),
            opening: raw.opening.clone(),
            map: raw.map.clone(),
            saving: raw.saving.clone(),
        }
    }

    /// Whether list requests carry a search clause source
    pub fn has_search(&self) -> bool {
        self.list.search.is_some()
    }

    /// Concatenation operator used between user and model clauses
    pub fn search_op(&self) -> ConcatOp {
        ConcatOp::from_search_or(self.list.search_or)
    }

    /// URL of this entity for list requests, or single rows when an id is given
    pub fn resolve_url(&self, options: &UrlOptions, search: bool) -> Result<String> {
        let entity_name = options
            .entity_name
            .clone()
            .unwrap_or_else(|| self.backend.plural.clone());
        let fields = options.custom_fields.as_ref().or(self.list.fields.as_ref());
        resolve_api_url(&UrlRequest {
            entity_name: &entity_name,
            id: options.id.as_ref(),
            fields,
            foreign: self.list.foreign.as_ref(),
            order_by: self.list.order_by.as_ref().map(|o| &o.pipe),
            search,
            search_or: self.list.search_or,
            params: Some(&self.list.params),
        })
    }

    /// URL of a single row through the detail projection
    pub fn resolve_detail_url(
        &self,
        id: &RowId,
        custom_fields: Option<&FieldsSpec>,
    ) -> Result<String> {
        resolve_api_url(&UrlRequest {
            entity_name: &self.backend.singular,
            id: Some(id),
            fields: custom_fields.or(self.detail.fields.as_ref()),
            foreign: self.detail.foreign.as_ref(),
            ..Default::default()
        })
    }

    /// URL used to create (no id) or update a row
    pub fn resolve_save_url(&self, id: Option<&RowId>) -> Result<String> {
        resolve_api_url(&UrlRequest {
            entity_name: &self.backend.singular,
            id,
            fields: self.detail.fields.as_ref(),
            foreign: self.detail.foreign.as_ref(),
            ..Default::default()
        })
    }

    /// Navigation path of the detail view of a row
    ///
    /// `:id` takes the row primary key, any other `:param` is read from the
    /// route parameters of the context.
    pub fn resolve_route(&self, row: &Row, ctx: &HookContext) -> Result<String> {
        let Some(pk) = primary_key_of(row, &self.primary_key) else {
            return Err(EngineError::from(ConfigError::MissingPrimaryKey {
                entity: self.name.plural.clone(),
                primary_key: self.primary_key.clone(),
            })
            .into());
        };
        let segments = self
            .detail
            .route
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some("id") => Ok(id_to_string(pk)),
                Some(param) => ctx.route_param(param).map(str::to_string),
                None => Ok(segment.to_string()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(segments.join("/"))
    }

    /// Id of the row shown by the detail view
    pub async fn resolve_detail_id(&self, ctx: &HookContext) -> Result<RowId> {
        match &self.detail.id {
            DetailId::Param { param } => {
                let raw = ctx.route_param(param)?;
                Ok(match raw.parse::<i64>() {
                    Ok(n) => RowId::from(n),
                    Err(_) => RowId::from(raw),
                })
            }
            DetailId::Literal(value) => Ok(RowId(value.clone())),
            DetailId::Hook(hook) => hook.resolve(Value::Null, ctx).await.map(RowId),
        }
    }
}

fn foreign_entities(foreign: Option<&ForeignSpec>) -> Vec<ApiEntity> {
    let Some(foreign) = foreign else {
        return Vec::new();
    };
    foreign
        .values()
        .flat_map(|tables| tables.iter())
        .map(|(table, display)| match display {
            ForeignDisplay::Field(fields) => ApiEntity::new(table, fields),
            ForeignDisplay::Compute(f) => {
                let fields = match f.call(&Row::new()) {
                    Value::Object(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
                    _ => String::new(),
                };
                ApiEntity::new(table, &fields)
            }
        })
        .collect()
}

fn render_params(params: &IndexMap<String, Value>) -> Option<String> {
    if params.is_empty() {
        return None;
    }
    Some(
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, id_to_string(v)))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

/// Build the backend URL of an entity
///
/// ```
/// use entity_query::core::fields::FieldsSpec;
/// use entity_query::core::model::{UrlRequest, resolve_api_url};
///
/// let fields = FieldsSpec::from("precio,tarifa(descripcion)");
/// let order = FieldsSpec::from("tarifa(descripcion),-precio");
/// let url = resolve_api_url(&UrlRequest {
///     entity_name: "precios_tarifa",
///     fields: Some(&fields),
///     order_by: Some(&order),
///     ..Default::default()
/// })
/// .unwrap();
/// assert_eq!(
///     url,
///     "precios_tarifa?rel=tarifa&fields=precio,tarifa(descripcion)&sort=tarifa(descripcion),-precio"
/// );
/// ```
pub fn resolve_api_url(request: &UrlRequest<'_>) -> Result<String> {
    let main = request.entity_name;
    let id = request.id.map(RowId::to_param).filter(|id| !id.is_empty());

    let from_fields = ApiEntity::join_fields(&ApiEntity::parse_fields(main, request.fields)?);
    let foreigns = foreign_entities(request.foreign);
    let with_foreigns = ApiEntity::distinct_entities(&[&from_fields, &foreigns]);
    let fields = ApiEntity::stringify_fields(main, &with_foreigns, false);

    let from_sort = match request.order_by {
        Some(order) => ApiEntity::parse_fields(main, Some(order))?,
        None => Vec::new(),
    };
    let sort = ApiEntity::stringify_fields(main, &from_sort, false);

    let entities = ApiEntity::distinct_entities(&[&with_foreigns, &from_sort]);
    let related = entities
        .iter()
        .filter(|e| e.table.alias_or_name() != main)
        .map(ApiEntity::table_to_url)
        .collect::<Vec<_>>()
        .join(",");

    let search = match (&id, request.search) {
        (None, true) if request.search_or => "search/(OR)",
        (None, true) => "search/",
        _ => "",
    };

    let mut query = Vec::new();
    if let Some(id) = &id {
        query.push(format!("id={}", id));
    }
    if !related.is_empty() {
        query.push(format!("rel={}", related));
    }
    if !fields.is_empty() {
        query.push(format!("fields={}", fields.join(",")));
    }
    if !sort.is_empty() && id.is_none() {
        query.push(format!("sort={}", sort.join(",")));
    }
    if let Some(params) = request.params.and_then(render_params) {
        query.push(params);
    }

    let url = if query.is_empty() {
        format!("{}{}", search, main)
    } else {
        format!("{}{}?{}", search, main, query.join("&"))
    };
    tracing::debug!(entity = %main, url = %url, "resolved entity url");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DetailSchema, ListSchema, OneOrMany};
    use serde_json::json;

    fn model(schema: EntitySchema) -> EntityModel {
        EntityModel::resolve(&schema, None).unwrap()
    }

    #[test]
    fn test_defaults() {
        let m = model(EntitySchema::new("precios-tarifa"));
        assert_eq!(m.name, EntityName::new("precios-tarifa", "precios-tarifa"));
        assert_eq!(m.backend.plural, "precios_tarifa");
        assert_eq!(m.friendly.plural, "precios tarifa");
        assert_eq!(m.primary_key, "idreg");
        assert!(!m.show_loader);
        assert!(m.preload);

        assert_eq!(m.detail.route, "/precios-tarifa/:id");
        assert_eq!(m.detail.header_text, "precios tarifa.detail_precios tarifa");
        let confirm = &m.detail.confirm_delete;
        assert!(confirm.confirm);
        assert_eq!(confirm.header, "buttons.delete");
        assert_eq!(confirm.message, "precios tarifa.DeleteMessage");
        assert!(m.detail.update_cache_row);
        assert!(!m.detail.cache);
        assert!(matches!(m.detail.id, DetailId::Param { ref param } if param == "id"));

        assert!(m.list.paginate);
        assert_eq!(m.list.items_per_page, 100);
        assert!(m.list.notify_cache_row);
        assert!(!m.list.search_or);
        assert_eq!(m.list.header_text, "precios tarifa.list_precios tarifa");
        assert!(m.list.filter.is_none());
    }

    #[test]
    fn test_plural_singular_texts() {
        let m = model(EntitySchema::new("users"));
        assert_eq!(m.list.add_new_text, "users.Add new user");
        assert_eq!(m.list.loading_text, "users.Loading users");
        assert_eq!(m.detail.header_text, "user.detail_user");
        assert_eq!(m.detail.route, "/user/:id");
    }

    #[test]
    fn test_translator_applied() {
        let translator = |key: &str, _: Option<&Value>| format!("[{}]", key);
        let m = EntityModel::resolve(&EntitySchema::new("users"), Some(&translator)).unwrap();
        assert_eq!(m.detail.confirm_delete.header, "[buttons.delete]");
        assert_eq!(m.list.header_text, "[users.list_users]");
    }

    #[test]
    fn test_filter_shorthand() {
        let mut schema = EntitySchema::new("users");
        let pipe = OneOrMany::from("nombre,apellidos");
        schema.list.filter = Some(FilterSpec::Pipe(pipe));
        let m = model(schema);
        let filter = m.list.filter.unwrap();
        assert_eq!(filter.pipe, vec!["nombre", "apellidos"]);
        assert!(filter.ignore_case && filter.ignore_accents);
        assert!(filter.split_pipe_words);
        assert_eq!(filter.concat_pipe_words, ConcatOp::And);
        assert_eq!(filter.max_distinctions, 3);
        assert!(!filter.pipe_to_backend);
    }

    #[test]
    fn test_propagate_deletes_defaults_to_changes() {
        let schema = EntitySchema::new("tarifas").with_detail(DetailSchema {
            propagate_changes: Some(OneOrMany::from(vec!["precios_tarifa", "festivos"])),
            ..Default::default()
        });
        let m = model(schema);
        let expected = vec!["precios_tarifa", "festivos"];
        assert_eq!(m.detail.propagate_deletes, expected);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let schema = EntitySchema::new("users");
        let a = model(schema.clone());
        let b = model(schema);
        assert_eq!(a.name, b.name);
        assert_eq!(a.detail.route, b.detail.route);
        assert_eq!(a.list.header_text, b.list.header_text);
    }

    #[test]
    fn test_list_url_with_foreign_and_alias() {
        let mut foreign = ForeignSpec::new();
        foreign.insert(
            "idorigen".to_string(),
            IndexMap::from([(
                "poblacion->origen(idorigen)".to_string(),
                ForeignDisplay::Field("nombre".to_string()),
            )]),
        );
        let schema = EntitySchema::new("precios_tarifa").with_list(ListSchema {
            fields: Some(FieldsSpec::from("precio")),
            foreign: Some(foreign),
            order_by: Some(OrderBySpec::Pipe(FieldsSpec::from("-precio"))),
            ..Default::default()
        });
        let m = model(schema);
        let url = m.resolve_url(&UrlOptions::default(), false).unwrap();
        assert_eq!(
            url,
            "precios_tarifa?rel=poblacion->origen(idorigen)&fields=precio,origen(nombre)&sort=-precio"
        );
    }

    #[test]
    fn test_search_prefix_and_id() {
        let schema = EntitySchema::new("users").with_list(ListSchema {
            search_or: Some(true),
            ..Default::default()
        });
        let m = model(schema);
        let url = m.resolve_url(&UrlOptions::default(), true).unwrap();
        assert_eq!(url, "search/(OR)users");

        let options = UrlOptions {
            entity_name: Some("user".to_string()),
            id: Some(RowId::from(4)),
            ..Default::default()
        };
        assert_eq!(m.resolve_url(&options, true).unwrap(), "user?id=4");
    }

    #[test]
    fn test_params_appended() {
        let schema = EntitySchema::new("users").with_list(ListSchema {
            params: IndexMap::from([("activo".to_string(), json!(1))]),
            ..Default::default()
        });
        let m = model(schema);
        let url = m.resolve_url(&UrlOptions::default(), false).unwrap();
        assert_eq!(url, "users?activo=1");
    }

    #[test]
    fn test_foreign_compute_requests_result_keys() {
        let mut foreign = ForeignSpec::new();
        foreign.insert(
            "iduser".to_string(),
            IndexMap::from([(
                "user".to_string(),
                ForeignDisplay::Compute(RowFn::new(|row| {
                    json!({"nombre": row.get("nombre"), "apellidos": row.get("apellidos")})
                })),
            )]),
        );
        let url = resolve_api_url(&UrlRequest {
            entity_name: "clientes",
            foreign: Some(&foreign),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(url, "clientes?rel=user&fields=user(apellidos,nombre)");
    }

    #[test]
    fn test_resolve_route() {
        let schema = EntitySchema::new("ofertas").with_detail(DetailSchema {
            route: Some("servicio/:idservicio/ofertas/:id".to_string()),
            ..Default::default()
        });
        let m = model(schema);
        let row = json!({"idreg": 12}).as_object().cloned().unwrap();
        let ctx = HookContext::new().with_route_param("idservicio", "3");
        let route = m.resolve_route(&row, &ctx).unwrap();
        assert_eq!(route, "/servicio/3/ofertas/12");

        let err = m.resolve_route(&Row::new(), &ctx).unwrap_err();
        let code = EngineError::find(&err).unwrap().error_code();
        assert_eq!(code, "MISSING_PRIMARY_KEY");

        let err = m.resolve_route(&row, &HookContext::new()).unwrap_err();
        let code = EngineError::find(&err).unwrap().error_code();
        assert_eq!(code, "MISSING_ROUTE_PARAM");
    }

    #[tokio::test]
    async fn test_resolve_detail_id() {
        let m = model(EntitySchema::new("users"));
        let ctx = HookContext::new().with_route_param("id", "15");
        assert_eq!(m.resolve_detail_id(&ctx).await.unwrap(), RowId::from(15));

        let ctx = HookContext::new().with_route_param("id", "new");
        assert!(m.resolve_detail_id(&ctx).await.unwrap().is_new());

        let schema = EntitySchema::new("mi-perfil").with_detail(DetailSchema {
            id: Some(DetailId::Hook(Hook::sync(|_row, ctx: &HookContext| {
                let user = ctx.current_user.clone().unwrap_or(Value::Null);
                Ok(user["idreg"].clone())
            }))),
            ..Default::default()
        });
        let ctx = HookContext::new().with_current_user(json!({"idreg": 9}));
        let m = model(schema);
        assert_eq!(m.resolve_detail_id(&ctx).await.unwrap(), RowId::from(9));
    }
}
