//! Package model: a validated descriptor plus its loaded dependency tree.

use super::naming::RegistryEntry;
use super::parser;
use super::resolver;
use super::settings::Settings;
use super::types::{AutomateConfig, DependencySpec, PackageKind, CONFIG_FILE};
use crate::error::{AutomateError, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a package refers to one of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyLink {
    /// Section the dependency was declared in.
    pub kind: PackageKind,
    /// Key in the declaring map; also the injection key at run time.
    pub key: String,
    /// Canonical path of the dependency's `Automate.yaml`.
    pub config_path: PathBuf,
}

/// A loaded package.
#[derive(Debug, Clone)]
pub struct Package {
    pub config: AutomateConfig,
    /// Canonical path of this package's `Automate.yaml`.
    pub config_path: PathBuf,
    pub registry: RegistryEntry,
    /// Loaded dependencies keyed by canonical config path.
    pub dependencies: IndexMap<PathBuf, Package>,
    /// Dependency references in declaration order: providers first, then recipes.
    pub links: Vec<DependencyLink>,
}

impl Package {
    /// Load the package at `path` (a directory or an `Automate.yaml`).
    ///
    /// With `skip_deps` the dependency tree is left empty.
    pub fn from_path(path: &Path, settings: &Settings, skip_deps: bool) -> Result<Self> {
        let config_path = config_file_for(path)?;
        let mut chain = Vec::new();
        Self::load(&config_path, settings, skip_deps, &mut chain)
    }

    fn load(
        config_path: &Path,
        settings: &Settings,
        skip_deps: bool,
        chain: &mut Vec<PathBuf>,
    ) -> Result<Self> {
        if chain.iter().any(|p| p == config_path) {
            return Err(AutomateError::DependencyCycle {
                path: config_path.to_path_buf(),
            });
        }

        let config = parser::load_config(config_path)?;
        let identity = parser::validate_package(&config)?;
        if identity.kind == PackageKind::Recipe {
            parser::validate_recipe(&config)?;
        }

        let source_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let registry = RegistryEntry::derive(&identity, &source_dir, settings);
        debug!(package = %registry.registry_name, path = %config_path.display(), "loaded package");

        let mut package = Package {
            config,
            config_path: config_path.to_path_buf(),
            registry,
            dependencies: IndexMap::new(),
            links: Vec::new(),
        };
        if skip_deps {
            return Ok(package);
        }

        chain.push(config_path.to_path_buf());
        let declared = declared_dependencies(&package.config);
        for (kind, key, spec) in declared {
            let dep_dir = resolver::resolve_dependency_path(&key, spec.path(), config_path)?;
            let dep_config = config_file_for(&dep_dir)?;
            debug!(dependency = %key, kind = %kind, path = %dep_config.display(), "resolving dependency");

            if !package.dependencies.contains_key(&dep_config) {
                let dep = Self::load(&dep_config, settings, false, chain)?;
                check_expected_name(&key, &spec, &dep)?;
                package.dependencies.insert(dep_config.clone(), dep);
            }
            if let Some(dep) = package.dependencies.get(&dep_config) {
                check_declared_kind(kind, &key, dep)?;
            }
            package.links.push(DependencyLink {
                kind,
                key,
                config_path: dep_config,
            });
        }
        chain.pop();

        Ok(package)
    }

    pub fn kind(&self) -> PackageKind {
        self.registry.identity.kind
    }

    pub fn name(&self) -> &str {
        &self.registry.identity.name
    }

    pub fn is_workspace(&self) -> bool {
        self.config.is_workspace()
    }

    /// The loaded package behind a link.
    pub fn dependency(&self, link: &DependencyLink) -> Option<&Package> {
        self.dependencies.get(&link.config_path)
    }
}

/// Provider dependencies then recipe dependencies, each in declaration order.
fn declared_dependencies(config: &AutomateConfig) -> Vec<(PackageKind, String, DependencySpec)> {
    let providers = config
        .dependencies
        .provider
        .iter()
        .map(|(k, s)| (PackageKind::Provider, k.clone(), s.clone()));
    let recipes = config
        .dependencies
        .recipe
        .iter()
        .map(|(k, s)| (PackageKind::Recipe, k.clone(), s.clone()));
    providers.chain(recipes).collect()
}

fn check_expected_name(key: &str, spec: &DependencySpec, dep: &Package) -> Result<()> {
    match spec.expected_name() {
        Some(expected) if expected != dep.name() => Err(AutomateError::validation(
            format!("dependencies.{}", key),
            format!(
                "expected package '{}' but {} declares '{}'",
                expected,
                dep.config_path.display(),
                dep.name()
            ),
        )),
        _ => Ok(()),
    }
}

/// A dependency listed under `dependencies.provider` must be a provider,
/// one under `dependencies.recipe` a recipe.
fn check_declared_kind(declared: PackageKind, key: &str, dep: &Package) -> Result<()> {
    if dep.kind() == declared {
        return Ok(());
    }
    Err(AutomateError::validation(
        format!("dependencies.{}.{}", declared, key),
        format!(
            "{} declares a {} package, not a {}",
            dep.config_path.display(),
            dep.kind(),
            declared
        ),
    ))
}

/// Canonical `Automate.yaml` path for a package directory or file.
pub fn config_file_for(path: &Path) -> Result<PathBuf> {
    let file = if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.to_path_buf()
    };
    file.canonicalize().map_err(|e| AutomateError::io(&file, e))
}
