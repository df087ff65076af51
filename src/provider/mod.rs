//! Providers: named command sets callable from recipes and the CLI.
//!
//! Every provider owns a [`CommandTable`] built when the provider is
//! constructed. Calls dispatch by command name; unknown names fail with
//! `CommandNotFound`.

pub mod module;
pub mod recipe;
pub mod shell;

use crate::core::types::Values;
use crate::error::{AutomateError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// An async command implementation.
pub type Handler = Arc<dyn Fn(Values) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Command name → handler registration map.
#[derive(Clone, Default)]
pub struct CommandTable {
    handlers: IndexMap<String, Handler>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, replacing any previous handler of that name.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Values) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |values: Values| -> BoxFuture<'static, Result<Value>> { Box::pin(f(values)) });
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke `cmd` on behalf of `provider`.
    pub async fn dispatch(&self, provider: &str, cmd: &str, values: Values) -> Result<Value> {
        let handler = self
            .handlers
            .get(cmd)
            .ok_or_else(|| AutomateError::CommandNotFound {
                provider: provider.to_string(),
                command: cmd.to_string(),
            })?;
        debug!(provider, command = cmd, "dispatching");
        handler(values).await
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

/// The capability every dependency exposes to recipes.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Display name, e.g. `ProviderName1`.
    fn name(&self) -> &str;

    fn commands(&self) -> &CommandTable;

    async fn call(&self, cmd: &str, values: Values) -> Result<Value> {
        self.commands().dispatch(self.name(), cmd, values).await
    }
}

/// A provider that is nothing but a command table.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    name: String,
    table: CommandTable,
}

impl CommandProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: CommandTable::new(),
        }
    }

    pub fn commands_mut(&mut self) -> &mut CommandTable {
        &mut self.table
    }
}

#[async_trait]
impl Provider for CommandProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn commands(&self) -> &CommandTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn greeter() -> CommandProvider {
        let mut p = CommandProvider::new("ProviderGreeter");
        p.commands_mut()
            .register("hello", |values: Values| async move {
                let who = values.get("who").and_then(Value::as_str).unwrap_or("world").to_string();
                Ok(json!(format!("hello {}", who)))
            })
            .register("fail", |_values: Values| async move {
                Err(AutomateError::template("always fails"))
            });
        p
    }

    #[tokio::test]
    async fn test_provider_dispatch_by_name() {
        let p = greeter();
        let mut values = Values::new();
        values.insert("who".into(), json!("bob"));
        assert_eq!(p.call("hello", values).await.unwrap(), json!("hello bob"));
        assert_eq!(p.commands().names().collect::<Vec<_>>(), vec!["hello", "fail"]);
    }

    #[tokio::test]
    async fn test_provider_unknown_command() {
        let err = greeter().call("nope", Values::new()).await.unwrap_err();
        match err {
            AutomateError::CommandNotFound { provider, command } => {
                assert_eq!(provider, "ProviderGreeter");
                assert_eq!(command, "nope");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provider_handler_error_propagates() {
        let err = greeter().call("fail", Values::new()).await.unwrap_err();
        assert!(err.to_string().contains("always fails"));
    }

    #[test]
    fn test_command_table_replace() {
        let mut table = CommandTable::new();
        table.register("a", |_v: Values| async { Ok(json!(1)) });
        table.register("a", |_v: Values| async { Ok(json!(2)) });
        assert_eq!(table.len(), 1);
        assert!(table.contains("a"));
        assert!(!table.is_empty());
    }
}
