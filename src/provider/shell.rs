//! Descriptor-backed provider: each command with a `run` script becomes a
//! handler that renders the script against the call's values and runs it
//! with bash.

use super::{CommandTable, Provider};
use crate::core::resolver;
use crate::core::types::{ProviderSpec, Values};
use crate::error::{AutomateError, Result};
use crate::transport::local::exec_local;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Environment variable carrying the call's values as JSON.
pub const VALUES_ENV: &str = "AUTOMATE_VALUES";

#[derive(Debug, Clone)]
pub struct ShellProvider {
    name: String,
    table: CommandTable,
}

impl ShellProvider {
    /// Register every command of `spec` that has a `run` script. `defaults`
    /// are merged beneath the values of each call.
    pub fn from_spec(name: impl Into<String>, spec: &ProviderSpec, defaults: Values) -> Self {
        let name = name.into();
        let defaults = Arc::new(defaults);
        let mut table = CommandTable::new();
        for (cmd, command) in &spec.commands {
            let Some(script) = command.run.clone() else {
                warn!(provider = %name, command = %cmd, "command has no run script, not callable");
                continue;
            };
            let script = Arc::new(script);
            let cmd_name = cmd.clone();
            let defaults = Arc::clone(&defaults);
            table.register(cmd.clone(), move |values: Values| {
                let script = Arc::clone(&script);
                let cmd_name = cmd_name.clone();
                let merged = resolver::merge_values([defaults.as_ref(), &values]);
                async move { run_script(&cmd_name, &script, merged).await }
            });
        }
        Self { name, table }
    }
}

#[async_trait]
impl Provider for ShellProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn commands(&self) -> &CommandTable {
        &self.table
    }
}

async fn run_script(command: &str, script: &str, values: Values) -> Result<Value> {
    let encoded = serde_json::to_string(&values)
        .map_err(|e| AutomateError::template(format!("cannot encode values: {}", e)))?;
    let rendered = resolver::resolve_template(script, &json!({ "values": values }))?;
    debug!(command, "running script");

    let out = exec_local(&rendered, [(VALUES_ENV, encoded)]).await?;
    if !out.success() {
        return Err(AutomateError::CommandFailed {
            command: command.to_string(),
            exit_code: out.exit_code,
            stderr: out.stderr.trim().to_string(),
        });
    }
    Ok(parse_output(&out.stdout))
}

/// Trimmed stdout as JSON when it parses, else as a string; empty is null.
pub fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
