//! Per-call context handed to row hooks

use crate::core::error::{ConfigError, EngineError};
use crate::core::service::Translator;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a hook may see of its surroundings
///
/// Hooks get a translator, the parameters of the current route and the
/// authenticated user, nothing else.
#[derive(Clone, Default)]
pub struct HookContext {
    pub translator: Option<Arc<dyn Translator>>,
    pub route: HashMap<String, String>,
    pub current_user: Option<Value>,
}

impl HookContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_route_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.route.insert(name.into(), value.into());
        self
    }

    pub fn with_current_user(mut self, user: Value) -> Self {
        self.current_user = Some(user);
        self
    }

    /// Translate a key, returning it unchanged without a translator
    pub fn translate(&self, key: &str, params: Option<&Value>) -> String {
        match &self.translator {
            Some(t) => t.translate(key, params),
            None => key.to_string(),
        }
    }

    pub fn route_param(&self, name: &str) -> Result<&str> {
        self.route.get(name).map(String::as_str).ok_or_else(|| {
            EngineError::from(ConfigError::MissingRouteParam {
                param: name.to_string(),
            })
            .into()
        })
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("translator", &self.translator.is_some())
            .field("route", &self.route)
            .field("current_user", &self.current_user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_without_translator() {
        let ctx = HookContext::new();
        assert_eq!(ctx.translate("buttons.delete", None), "buttons.delete");
    }

    #[test]
    fn test_route_param() {
        let ctx = HookContext::new().with_route_param("id", "7");
        assert_eq!(ctx.route_param("id").unwrap(), "7");

        let err = ctx.route_param("tarifa").unwrap_err();
        assert_eq!(
            EngineError::find(&err).map(|e| e.error_code()),
            Some("MISSING_ROUTE_PARAM")
        );
    }
}
