//! Artifact generation: runnable module, recipe adapter, and registry file.
//!
//! Each artifact is rendered from an embedded minijinja template. Every
//! dynamic scalar goes through `tojson`, so the output is valid YAML and is
//! read back with the same serde types it was rendered from.

use super::naming::RegistryEntry;
use super::package::Package;
use super::state::RegistryRecord;
use super::types::{PackageKind, StepGroupSpec};
use crate::error::{AutomateError, Result};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MODULE_TEMPLATE: &str = "module";
const ADAPTER_TEMPLATE: &str = "adapter";
const REGISTRY_TEMPLATE: &str = "registry";

const GENERATOR: &str = env!("CARGO_PKG_VERSION");

/// The runnable module written to `cache/<registryName>/mod.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnableModule {
    pub kind: PackageKind,
    /// `{type}/{name}@{version}`
    pub name: String,
    pub registry_name: String,
    pub provider_type: String,
    /// Provider: cached descriptor. Recipe: adapter module.
    pub entry: PathBuf,
    pub values_file: PathBuf,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RunnableModule {
    pub fn for_entry(entry: &RegistryEntry, permissions: Vec<String>) -> Self {
        Self {
            kind: entry.identity.kind,
            name: entry.cli_name.clone(),
            registry_name: entry.registry_name.clone(),
            provider_type: entry.provider_type_name.clone(),
            entry: entry.entry_file().to_path_buf(),
            values_file: entry.cache_values_file.clone(),
            permissions,
        }
    }
}

/// A recipe's provider adapter, written to `cache/<registryName>/provider/mod.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterModule {
    pub registry_name: String,
    pub recipe: String,
    #[serde(default)]
    pub dependencies: Vec<ModuleDependency>,
    #[serde(default)]
    pub groups: Vec<ModuleGroup>,
}

/// One dependency injected into the recipe under `{namespace}.{key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub namespace: PackageKind,
    pub key: String,
    pub registry_name: String,
    /// The dependency's own runnable module.
    pub module: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleGroup {
    pub name: String,
    pub steps: StepGroupSpec,
}

impl AdapterModule {
    /// Collect dependencies and step groups of a loaded recipe package.
    pub fn for_package(pkg: &Package) -> Result<Self> {
        let mut dependencies = Vec::with_capacity(pkg.links.len());
        for link in &pkg.links {
            let dep = pkg
                .dependency(link)
                .ok_or_else(|| AutomateError::DependencyNotFound {
                    dep: format!("{}.{}", link.kind, link.key),
                })?;
            dependencies.push(ModuleDependency {
                namespace: link.kind,
                key: link.key.clone(),
                registry_name: dep.registry.registry_name.clone(),
                module: dep.registry.cache_module_file.clone(),
            });
        }
        let groups = pkg
            .config
            .recipe
            .as_ref()
            .map(|r| {
                r.steps
                    .iter()
                    .map(|(name, steps)| ModuleGroup {
                        name: name.clone(),
                        steps: steps.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            registry_name: pkg.registry.registry_name.clone(),
            recipe: pkg.name().to_string(),
            dependencies,
            groups,
        })
    }
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template(MODULE_TEMPLATE, include_str!("../templates/module.yaml.j2"))?;
    env.add_template(ADAPTER_TEMPLATE, include_str!("../templates/adapter.yaml.j2"))?;
    env.add_template(REGISTRY_TEMPLATE, include_str!("../templates/registry.yaml.j2"))?;
    Ok(env)
}

/// Render the runnable module.
pub fn render_module(module: &RunnableModule, source: &Path) -> Result<String> {
    let env = environment()?;
    let rendered = env.get_template(MODULE_TEMPLATE)?.render(context! {
        generator => GENERATOR,
        source => source,
        module => module,
    })?;
    Ok(rendered)
}

/// Render a recipe's provider adapter.
pub fn render_adapter(adapter: &AdapterModule) -> Result<String> {
    let env = environment()?;
    let rendered = env.get_template(ADAPTER_TEMPLATE)?.render(context! {
        generator => GENERATOR,
        adapter => adapter,
    })?;
    Ok(rendered)
}

/// Render a registry file.
pub fn render_registry(record: &RegistryRecord) -> Result<String> {
    let env = environment()?;
    let rendered = env.get_template(REGISTRY_TEMPLATE)?.render(context! {
        generator => GENERATOR,
        record => record,
    })?;
    Ok(rendered)
}

/// Load a runnable module.
pub fn load_module(path: &Path) -> Result<RunnableModule> {
    let content = std::fs::read_to_string(path).map_err(|e| AutomateError::io(path, e))?;
    serde_yaml_ng::from_str(&content).map_err(|e| AutomateError::parse(path, e))
}

/// Load a recipe adapter module.
pub fn load_adapter(path: &Path) -> Result<AdapterModule> {
    let content = std::fs::read_to_string(path).map_err(|e| AutomateError::io(path, e))?;
    serde_yaml_ng::from_str(&content).map_err(|e| AutomateError::parse(path, e))
}
