//! Registry store: atomic artifact writes, registry file load and listing.

use super::naming::{registry_file_path, RegistryEntry};
use super::settings::Settings;
use super::types::{PackageIdentity, PackageKind, ProviderSpec};
use crate::error::{AutomateError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `registry/<registryName>.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// Registry name, `{type}.{namespace}.{name}@{version}`.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PackageKind,
    pub namespace: String,
    pub package_name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub dep_injection_name: String,
    pub cli_name: String,
    pub provider_type: String,
    /// Source package directory.
    pub package_path: PathBuf,
    pub package_file: PathBuf,
    pub values_file: PathBuf,
    /// Runnable module spawned by `run`.
    pub cli_mod: PathBuf,
    pub entry: PathBuf,
    pub cache_dir: PathBuf,
    pub registry_file: PathBuf,
    #[serde(default)]
    pub provider: Option<ProviderSpec>,
}

impl RegistryRecord {
    pub fn new(
        entry: &RegistryEntry,
        description: Option<String>,
        permissions: Vec<String>,
        provider: Option<ProviderSpec>,
    ) -> Self {
        let id = &entry.identity;
        Self {
            name: entry.registry_name.clone(),
            kind: id.kind,
            namespace: id.namespace.clone(),
            package_name: id.name.clone(),
            version: id.version.clone(),
            description,
            permissions,
            dep_injection_name: entry.dep_injection_name.clone(),
            cli_name: entry.cli_name.clone(),
            provider_type: entry.provider_type_name.clone(),
            package_path: entry.source_dir.clone(),
            package_file: entry.cache_config_file.clone(),
            values_file: entry.cache_values_file.clone(),
            cli_mod: entry.cache_module_file.clone(),
            entry: entry.entry_file().to_path_buf(),
            cache_dir: entry.cache_dir.clone(),
            registry_file: entry.registry_file.clone(),
            provider,
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity {
            kind: self.kind,
            namespace: self.namespace.clone(),
            name: self.package_name.clone(),
            version: self.version.clone(),
        }
    }

    /// Re-derive the full naming entry for this record.
    pub fn registry_entry(&self, settings: &Settings) -> RegistryEntry {
        RegistryEntry::derive(&self.identity(), &self.package_path, settings)
    }
}

/// Write a file atomically (temp file + rename), creating parent dirs.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AutomateError::io(parent, e))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, content).map_err(|e| AutomateError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| AutomateError::io(path, e))?;
    Ok(())
}

/// Load a registry record by registry name (a trailing `.yaml` is accepted).
pub fn load_registry(settings: &Settings, name: &str) -> Result<RegistryRecord> {
    let name = name.strip_suffix(".yaml").unwrap_or(name);
    let path = registry_file_path(settings, name);
    if !path.is_file() {
        return Err(AutomateError::RegistryNotFound {
            name: name.to_string(),
            path,
        });
    }
    load_registry_file(&path)
}

pub fn load_registry_file(path: &Path) -> Result<RegistryRecord> {
    let content = std::fs::read_to_string(path).map_err(|e| AutomateError::io(path, e))?;
    serde_yaml_ng::from_str(&content).map_err(|e| AutomateError::parse(path, e))
}

/// Every registry record, optionally filtered by kind, sorted by name.
pub fn list_registry(settings: &Settings, kind: Option<PackageKind>) -> Result<Vec<RegistryRecord>> {
    let pattern = settings.registry_dir().join("*.yaml");
    let pattern = pattern.to_string_lossy();
    let paths = glob::glob(&pattern)
        .map_err(|e| AutomateError::validation("registry", format!("bad registry pattern: {}", e)))?;

    let mut records = Vec::new();
    for path in paths {
        let path = path.map_err(|e| {
            let p = e.path().to_path_buf();
            AutomateError::io(p, e.into())
        })?;
        let record = load_registry_file(&path)?;
        if kind.is_none_or(|k| k == record.kind) {
            records.push(record);
        }
    }
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}
