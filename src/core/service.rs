//! Collaborator traits consumed by the engine
//!
//! The engine never talks to a network, a dialog or a storage backend
//! directly. Hosts provide implementations of these traits and hand them to
//! the [`CrudServiceBuilder`](crate::service::CrudServiceBuilder).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// HTTP-like verb understood by a [`Transport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend transport
///
/// URLs are relative to the backend root (`users?fields=name`,
/// `search/users?...`). Implementations report failures as
/// [`TransportError`](crate::core::error::TransportError) and never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value>;
}

/// Text lookup used for headers, messages and translate prefixes
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, params: Option<&Value>) -> String;
}

impl<F> Translator for F
where
    F: Fn(&str, Option<&Value>) -> String + Send + Sync,
{
    fn translate(&self, key: &str, params: Option<&Value>) -> String {
        self(key, params)
    }
}

/// Yes/no confirmation shown before destructive operations
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, header: &str, message: &str) -> bool;
}

/// Key-value store for user settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;
}
