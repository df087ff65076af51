//! Build pipeline: turn loaded packages into cache and registry artifacts.
//!
//! Dependencies are built before the package that declares them. Each
//! config path is built at most once per [`BuildContext`]; later requests
//! (shared dependencies, back-references) return [`BuildOutcome::Skipped`].

use super::codegen::{self, AdapterModule, RunnableModule};
use super::package::{config_file_for, Package};
use super::parser;
use super::settings::Settings;
use super::state::{self, RegistryRecord};
use super::types::{PackageKind, Workspace};
use crate::error::{AutomateError, Result};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

/// Whether a build request did any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    Skipped,
}

/// State for one build invocation: the visited set and the build order.
pub struct BuildContext<'a> {
    settings: &'a Settings,
    visited: FxHashSet<PathBuf>,
    order: Vec<String>,
}

impl<'a> BuildContext<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            visited: FxHashSet::default(),
            order: Vec::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    /// Registry names in the order their artifacts were written.
    pub fn build_order(&self) -> &[String] {
        &self.order
    }

    pub fn is_visited(&self, config_path: &Path) -> bool {
        self.visited.contains(config_path)
    }

    /// Build every member of a workspace, in member order.
    pub fn build_workspace(
        &mut self,
        config_path: &Path,
        workspace: &Workspace,
    ) -> Result<Vec<(String, BuildOutcome)>> {
        if workspace.members.is_empty() {
            return Err(AutomateError::EmptyWorkspace {
                config: config_path.to_path_buf(),
            });
        }
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let mut outcomes = Vec::with_capacity(workspace.members.len());
        for member in &workspace.members {
            let member_dir = base.join(member);
            let member_config = config_file_for(&member_dir).map_err(|_| {
                AutomateError::WorkspaceMemberNotFound {
                    member: member.clone(),
                    path: member_dir.clone(),
                }
            })?;
            info!(member = %member, "building workspace member");
            let pkg = Package::from_path(&member_config, self.settings, false)?;
            let outcome = self.build_package(&pkg)?;
            outcomes.push((pkg.registry.registry_name.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Build one package and, first, all of its dependencies.
    pub fn build_package(&mut self, pkg: &Package) -> Result<BuildOutcome> {
        if !self.visited.insert(pkg.config_path.clone()) {
            debug!(package = %pkg.registry.registry_name, "already built, skipping");
            return Ok(BuildOutcome::Skipped);
        }
        let start = Instant::now();

        for link in &pkg.links {
            let Some(dep) = pkg.dependency(link) else {
                return Err(AutomateError::DependencyNotFound {
                    dep: format!("{}.{}", link.kind, link.key),
                });
            };
            if let Err(e) = self.build_package(dep) {
                error!(
                    "error building {} dependency '{}' pointing to {}",
                    link.kind,
                    link.key,
                    link.config_path.display()
                );
                return Err(e);
            }
        }

        self.settings.ensure_dirs()?;
        write_artifacts(pkg)?;
        self.order.push(pkg.registry.registry_name.clone());

        info!(
            package = %pkg.registry.registry_name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built"
        );
        Ok(BuildOutcome::Built)
    }
}

/// Write cache artifacts then the registry file for one package.
fn write_artifacts(pkg: &Package) -> Result<()> {
    let entry = &pkg.registry;
    std::fs::create_dir_all(&entry.cache_dir).map_err(|e| AutomateError::io(&entry.cache_dir, e))?;

    std::fs::copy(&pkg.config_path, &entry.cache_config_file)
        .map_err(|e| AutomateError::io(&entry.cache_config_file, e))?;

    let values = serde_yaml_ng::to_string(&pkg.config.values)
        .map_err(|e| AutomateError::parse(&entry.cache_values_file, e))?;
    state::write_atomic(&entry.cache_values_file, &values)?;

    let meta = pkg.config.package.as_ref();
    let permissions = meta.map(|m| m.permissions.clone()).unwrap_or_default();
    let description = meta.and_then(|m| m.description.clone());

    let module = RunnableModule::for_entry(entry, permissions.clone());
    state::write_atomic(
        &entry.cache_module_file,
        &codegen::render_module(&module, &pkg.config_path)?,
    )?;

    if let Some(adapter_file) = &entry.adapter_module_file {
        let adapter = AdapterModule::for_package(pkg)?;
        state::write_atomic(adapter_file, &codegen::render_adapter(&adapter)?)?;
    }

    let provider = match pkg.kind() {
        PackageKind::Provider => pkg.config.provider.clone(),
        PackageKind::Recipe => None,
    };
    let record = RegistryRecord::new(entry, description, permissions, provider);
    state::write_atomic(&entry.registry_file, &codegen::render_registry(&record)?)?;
    debug!(registry = %entry.registry_file.display(), "registry entry written");
    Ok(())
}

/// Build whatever `config_path` describes: a workspace or a single package.
pub fn build_path(ctx: &mut BuildContext<'_>, config_path: &Path) -> Result<Vec<(String, BuildOutcome)>> {
    let config_path = config_file_for(config_path)?;
    let config = parser::load_config(&config_path)?;
    if config.is_workspace() {
        let workspace = parser::validate_workspace(&config)?;
        return ctx.build_workspace(&config_path, workspace);
    }
    let pkg = Package::from_path(&config_path, ctx.settings(), false)?;
    let outcome = ctx.build_package(&pkg)?;
    Ok(vec![(pkg.registry.registry_name.clone(), outcome)])
}
