//! Descriptor loading and structural validation.
//!
//! - namespace: alphanumerics and periods, no leading/trailing period
//! - name: alphanumerics, periods, dashes, underscores, no leading/trailing separator
//! - type: `provider` or `recipe`
//! - workspace: at least one member
//! - recipe steps: `dep` names a declared dependency

use super::types::*;
use crate::error::{AutomateError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.]+$").expect("namespace regex"));

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("name regex"));

/// Read and decode an `Automate.yaml` from disk.
pub fn load_config(path: &Path) -> Result<AutomateConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AutomateError::io(path, e))?;
    parse_config(&content).map_err(|e| AutomateError::parse(path, e))
}

/// Decode a descriptor from a string.
pub fn parse_config(yaml: &str) -> std::result::Result<AutomateConfig, serde_yaml_ng::Error> {
    serde_yaml_ng::from_str(yaml)
}

fn is_valid_namespace(ns: &str) -> bool {
    NAMESPACE_RE.is_match(ns) && !ns.starts_with('.') && !ns.ends_with('.')
}

fn is_valid_name(name: &str) -> bool {
    const SEPARATORS: &[char] = &['.', '-', '_'];
    NAME_RE.is_match(name) && !name.starts_with(SEPARATORS) && !name.ends_with(SEPARATORS)
}

/// Check the package section and return its typed identity.
pub fn validate_package(config: &AutomateConfig) -> Result<PackageIdentity> {
    let meta = config.package.as_ref().ok_or_else(|| {
        AutomateError::validation("package", "Package missing package definition")
    })?;

    let namespace = match meta.namespace.as_deref() {
        None | Some("") => {
            return Err(AutomateError::validation(
                "package.namespace",
                "Package namespace is missing",
            ))
        }
        Some(ns) if !is_valid_namespace(ns) => {
            return Err(AutomateError::validation(
                "package.namespace",
                format!(
                    "Package namespace '{}' should only contain alpha-numeric characters or periods. \
                     Namespace must not start or end with periods.",
                    ns
                ),
            ))
        }
        Some(ns) => ns.to_string(),
    };

    let name = match meta.name.as_deref() {
        None | Some("") => {
            return Err(AutomateError::validation(
                "package.name",
                "Package name is missing",
            ))
        }
        Some(n) if !is_valid_name(n) => {
            return Err(AutomateError::validation(
                "package.name",
                format!(
                    "Package name '{}' should only contain alpha-numeric characters, periods, dashes, \
                     or underscores. Name must not start or end with periods, dashes, or underscores.",
                    n
                ),
            ))
        }
        Some(n) => n.to_string(),
    };

    let kind = meta
        .kind
        .as_deref()
        .and_then(PackageKind::parse)
        .ok_or_else(|| {
            AutomateError::validation(
                "package.type",
                format!(
                    "Package {} is missing a type or type isn't defined properly. \
                     Only types allowed are 'recipe' or 'provider'",
                    name
                ),
            )
        })?;

    let version = match meta.version.as_deref().map(str::trim) {
        None | Some("") => {
            return Err(AutomateError::validation(
                "package.version",
                format!("Package {} is missing a version", name),
            ))
        }
        Some(v) => v.to_string(),
    };

    Ok(PackageIdentity {
        kind,
        namespace,
        name,
        version,
    })
}

/// Check the workspace section: it must list at least one member.
pub fn validate_workspace(config: &AutomateConfig) -> Result<&Workspace> {
    let workspace = config.workspace.as_ref().ok_or_else(|| {
        AutomateError::validation("workspace", "Config has no workspace definition")
    })?;
    if workspace.members.is_empty() {
        return Err(AutomateError::validation(
            "workspace.members",
            "Workspace has no members",
        ));
    }
    Ok(workspace)
}

/// Check every recipe step against the declared dependencies.
pub fn validate_recipe(config: &AutomateConfig) -> Result<()> {
    let Some(recipe) = config.recipe.as_ref() else {
        return Ok(());
    };
    for (group, spec) in &recipe.steps {
        for (index, step) in spec.steps().enumerate() {
            let field = format!("recipe.steps.{}[{}]", group, index);
            if step.cmd.trim().is_empty() {
                return Err(AutomateError::validation(field, "step has an empty cmd"));
            }
            let declared = match step.dep_parts() {
                Some(("provider", key)) => config.dependencies.provider.contains_key(key),
                Some(("recipe", key)) => config.dependencies.recipe.contains_key(key),
                _ => {
                    return Err(AutomateError::validation(
                        field,
                        format!(
                            "dep '{}' must look like 'provider.<key>' or 'recipe.<key>'",
                            step.dep
                        ),
                    ))
                }
            };
            if !declared {
                return Err(AutomateError::validation(
                    field,
                    format!("dep '{}' is not declared under dependencies", step.dep),
                ));
            }
        }
    }
    Ok(())
}
