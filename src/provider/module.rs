//! Runnable module loading: turn a generated `mod.yaml` into a live provider.
//!
//! Provider modules point at their cached descriptor, whose `run` scripts
//! become commands. Recipe modules point at their adapter, whose
//! dependencies are loaded first and injected under `{namespace}.{key}`.

use super::recipe::RecipeProvider;
use super::shell::ShellProvider;
use super::Provider;
use crate::core::codegen::{self, RunnableModule};
use crate::core::parser;
use crate::core::recipe::Deps;
use crate::core::types::{PackageKind, Values};
use crate::error::{AutomateError, Result};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loads modules once each; shared dependencies get one provider instance.
#[derive(Default)]
pub struct ModuleLoader {
    loaded: FxHashMap<PathBuf, Arc<dyn Provider>>,
    loading: Vec<PathBuf>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, module_path: &Path) -> Result<Arc<dyn Provider>> {
        if let Some(provider) = self.loaded.get(module_path) {
            return Ok(Arc::clone(provider));
        }
        if self.loading.iter().any(|p| p == module_path) {
            return Err(AutomateError::DependencyCycle {
                path: module_path.to_path_buf(),
            });
        }

        let module = codegen::load_module(module_path)?;
        let defaults = load_values_file(&module.values_file)?;
        debug!(module = %module.name, entry = %module.entry.display(), "initializing provider");

        self.loading.push(module_path.to_path_buf());
        let provider = self.construct(&module, defaults);
        self.loading.pop();
        let provider = provider?;

        info!(module = %module.name, commands = provider.commands().len(), "provider ready");
        self.loaded
            .insert(module_path.to_path_buf(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Build the provider a module describes. Recipe dependencies load first.
    fn construct(&mut self, module: &RunnableModule, defaults: Values) -> Result<Arc<dyn Provider>> {
        match module.kind {
            PackageKind::Provider => {
                let config = parser::load_config(&module.entry)?;
                let spec = config.provider.unwrap_or_default();
                Ok(Arc::new(ShellProvider::from_spec(
                    module.provider_type.clone(),
                    &spec,
                    defaults,
                )))
            }
            PackageKind::Recipe => {
                let adapter = codegen::load_adapter(&module.entry)?;
                let mut deps = Deps::new();
                for dep in &adapter.dependencies {
                    let provider = self.load(&dep.module)?;
                    deps.insert(dep.namespace, dep.key.clone(), provider);
                }
                Ok(Arc::new(RecipeProvider::new(
                    module.provider_type.clone(),
                    adapter,
                    deps,
                    defaults,
                )))
            }
        }
    }
}

/// Load the module at `module_path` and everything it depends on.
pub fn initialize_provider(module_path: &Path) -> Result<Arc<dyn Provider>> {
    ModuleLoader::new().load(module_path)
}

/// Read a YAML values file; an empty document is an empty map.
pub fn load_values_file(path: &Path) -> Result<Values> {
    let content = std::fs::read_to_string(path).map_err(|e| AutomateError::io(path, e))?;
    let values: Option<Values> =
        serde_yaml_ng::from_str(&content).map_err(|e| AutomateError::parse(path, e))?;
    Ok(values.unwrap_or_default())
}
