//! Row hooks
//!
//! A hook is a plain value, a synchronous function or an asynchronous one.
//! Whatever the shape, callers resolve it the same way:
//!
//! ```rust,ignore
//! let mapped = hook.resolve(row, &ctx).await?;
//! ```
//!
//! Stream-returning functions are adapted with [`Hook::from_stream`], which
//! resolves to the first emitted item.

use crate::core::context::HookContext;
use crate::core::Row;
use crate::core::error::{EngineError, HookError};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type SyncHookFn<T> = Arc<dyn Fn(Value, &HookContext) -> Result<T> + Send + Sync>;
pub type AsyncHookFn<T> =
    Arc<dyn Fn(Value, HookContext) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A value or a computation producing one from an input row
pub enum Hook<T> {
    Value(T),
    Sync(SyncHookFn<T>),
    Async(AsyncHookFn<T>),
}

/// Hook transforming one row (or a page of rows) into another
pub type RowHook = Hook<Value>;

impl<T> Hook<T>
where
    T: Clone + Send + 'static,
{
    pub fn value(value: T) -> Self {
        Hook::Value(value)
    }

    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value, &HookContext) -> Result<T> + Send + Sync + 'static,
    {
        Hook::Sync(Arc::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Hook::Async(Arc::new(move |input, ctx| Box::pin(f(input, ctx))))
    }

    /// Adapt a stream-returning function, keeping only its first item
    pub fn from_stream<F, S>(f: F) -> Self
    where
        F: Fn(Value, HookContext) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        Hook::Async(Arc::new(move |input, ctx| {
            let stream = f(input, ctx);
            Box::pin(async move {
                let mut stream = Box::pin(stream);
                match stream.next().await {
                    Some(item) => item,
                    None => Err(EngineError::from(HookError::UnexpectedShape {
                        stage: "stream".to_string(),
                        expected: "at least one emitted item".to_string(),
                    })
                    .into()),
                }
            })
        }))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Hook::Value(_))
    }

    pub async fn resolve(&self, input: Value, ctx: &HookContext) -> Result<T> {
        match self {
            Hook::Value(value) => Ok(value.clone()),
            Hook::Sync(f) => f(input, ctx),
            Hook::Async(f) => f(input, ctx.clone()).await,
        }
    }
}

impl<T: Clone> Clone for Hook<T> {
    fn clone(&self) -> Self {
        match self {
            Hook::Value(v) => Hook::Value(v.clone()),
            Hook::Sync(f) => Hook::Sync(Arc::clone(f)),
            Hook::Async(f) => Hook::Async(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Hook::Sync(_) => f.write_str("Sync(..)"),
            Hook::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// Synchronous function over a row: predicates, group keys, display values
pub struct RowFn<T>(Arc<dyn Fn(&Row) -> T + Send + Sync>);

impl<T> RowFn<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Row) -> T + Send + Sync + 'static,
    {
        RowFn(Arc::new(f))
    }

    pub fn call(&self, row: &Row) -> T {
        (self.0)(row)
    }
}

impl<T> Clone for RowFn<T> {
    fn clone(&self) -> Self {
        RowFn(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for RowFn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowFn(..)")
    }
}

/// Only the value shape can be written in a schema file
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Hook<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Hook::Value)
    }
}

/// Resolve an optional row hook, passing the input through when absent
///
/// Failures not already raised by the engine are reported as
/// [`HookError::Failed`] tagged with the pipeline stage.
pub async fn resolve_row_hook(
    stage: &str,
    hook: Option<&RowHook>,
    input: Value,
    ctx: &HookContext,
) -> Result<Value> {
    let Some(hook) = hook else {
        return Ok(input);
    };
    hook.resolve(input, ctx).await.map_err(|e| {
        if EngineError::find(&e).is_some() {
            e
        } else {
            EngineError::from(HookError::Failed {
                stage: stage.to_string(),
                message: e.to_string(),
            })
            .into()
        }
    })
}

/// Run a row through an optional hook, requiring an object back
pub async fn apply_row_hook(
    stage: &str,
    hook: Option<&RowHook>,
    row: Row,
    ctx: &HookContext,
) -> Result<Row> {
    match resolve_row_hook(stage, hook, Value::Object(row), ctx).await? {
        Value::Object(row) => Ok(row),
        _ => Err(EngineError::from(HookError::UnexpectedShape {
            stage: stage.to_string(),
            expected: "a row object".to_string(),
        })
        .into()),
    }
}
