//! Tool root configuration: where the cache and the registry live.

use crate::error::{AutomateError, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the tool root.
pub const ROOT_ENV: &str = "AUTOMATE_ROOT";

/// Directory name used under `$HOME` when no root is configured.
pub const DEFAULT_ROOT_DIR: &str = ".automate";

/// Resolved tool directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    root: PathBuf,
}

impl Settings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from an explicit override, else `$HOME/.automate`.
    pub fn resolve(root: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = root {
            return Ok(Self::new(root));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            AutomateError::validation(
                ROOT_ENV,
                "no home directory found; set AUTOMATE_ROOT or pass --root",
            )
        })?;
        Ok(Self::new(home.join(DEFAULT_ROOT_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.root.join("registry")
    }

    /// Create root, cache and registry directories (idempotent).
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.cache_dir(), self.registry_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| AutomateError::io(&dir, e))?;
        }
        Ok(())
    }
}
