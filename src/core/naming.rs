//! Registry naming: every name and path derived from a package identity.
//!
//! All derivations are pure functions of `(kind, namespace, name, version)`,
//! the package's source location, and the tool [`Settings`].

use super::settings::Settings;
use super::types::{PackageIdentity, PackageKind, CONFIG_FILE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the generated runnable module inside a cache directory.
pub const MODULE_FILE: &str = "mod.yaml";

/// File name of the cached default values.
pub const VALUES_FILE: &str = "values.yaml";

/// Subdirectory of a recipe's cache directory holding its provider adapter.
pub const ADAPTER_DIR: &str = "provider";

/// Derived naming and locations for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub identity: PackageIdentity,
    /// `{type}.{name}`
    pub dep_injection_name: String,
    /// `{type}.{namespace}.{name}@{version}`
    pub registry_name: String,
    /// `{type}/{name}@{version}`
    pub cli_name: String,
    /// `Provider` + PascalCase(name)
    pub provider_type_name: String,
    /// Directory holding the package's `Automate.yaml`.
    pub source_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_config_file: PathBuf,
    pub cache_values_file: PathBuf,
    pub cache_module_file: PathBuf,
    /// Recipe adapter module. `None` for providers.
    pub adapter_module_file: Option<PathBuf>,
    pub registry_file: PathBuf,
}

impl RegistryEntry {
    /// Derive every name and path for `identity` located at `source_dir`.
    pub fn derive(identity: &PackageIdentity, source_dir: &Path, settings: &Settings) -> Self {
        let registry_name = registry_name(identity);
        let cache_dir = settings.cache_dir().join(&registry_name);
        let adapter_module_file = match identity.kind {
            PackageKind::Recipe => Some(cache_dir.join(ADAPTER_DIR).join(MODULE_FILE)),
            PackageKind::Provider => None,
        };
        Self {
            identity: identity.clone(),
            dep_injection_name: format!("{}.{}", identity.kind, identity.name),
            cli_name: format!("{}/{}@{}", identity.kind, identity.name, identity.version),
            provider_type_name: format!("Provider{}", pascal_case(&identity.name)),
            source_dir: source_dir.to_path_buf(),
            cache_config_file: cache_dir.join(CONFIG_FILE),
            cache_values_file: cache_dir.join(VALUES_FILE),
            cache_module_file: cache_dir.join(MODULE_FILE),
            adapter_module_file,
            registry_file: registry_file_path(settings, &registry_name),
            registry_name,
            cache_dir,
        }
    }

    /// Module a runner loads: the adapter for recipes, the descriptor for providers.
    pub fn entry_file(&self) -> &Path {
        self.adapter_module_file
            .as_deref()
            .unwrap_or(&self.cache_config_file)
    }

    pub fn source_config_file(&self) -> PathBuf {
        self.source_dir.join(CONFIG_FILE)
    }
}

/// `{type}.{namespace}.{name}@{version}`
pub fn registry_name(identity: &PackageIdentity) -> String {
    format!(
        "{}.{}.{}@{}",
        identity.kind, identity.namespace, identity.name, identity.version
    )
}

/// `registry/<registryName>.yaml`
pub fn registry_file_path(settings: &Settings, registry_name: &str) -> PathBuf {
    settings.registry_dir().join(format!("{}.yaml", registry_name))
}

/// Upper-case the first letter of every word; separators are dropped.
///
/// `name1` → `Name1`, `my-pkg_v2` → `MyPkgV2`, `fooBar` → `FooBar`.
pub fn pascal_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = true;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if upper_next {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            upper_next = false;
        } else {
            upper_next = true;
        }
    }
    out
}
