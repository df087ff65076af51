//! Error taxonomy shared by parsing, building, and recipe execution.

use std::path::PathBuf;

/// Every failure surfaced by the library.
#[derive(Debug, thiserror::Error)]
pub enum AutomateError {
    /// Descriptor content violates a structural rule. `field` names the offender.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("dependency '{key}' has a path {path:?} that can't be found; fix {config:?}")]
    DependencyPathNotFound {
        key: String,
        path: PathBuf,
        config: PathBuf,
    },

    #[error("workspace member '{member}' can't be found at {path:?}")]
    WorkspaceMemberNotFound { member: String, path: PathBuf },

    /// A package transitively depends on itself while loading.
    #[error("dependency cycle detected at {path:?}")]
    DependencyCycle { path: PathBuf },

    #[error("recipe '{recipe}': step \"{step}\" defined twice")]
    DuplicateStepName { recipe: String, step: String },

    #[error("workspace {config:?} has no members")]
    EmptyWorkspace { config: PathBuf },

    #[error("provider '{provider}' has no command '{command}'")]
    CommandNotFound { provider: String, command: String },

    /// A step referenced a dependency that was never injected.
    #[error("dependency '{dep}' is not available to this recipe")]
    DependencyNotFound { dep: String },

    #[error("command '{command}' exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("recipe '{recipe}' failed at step '{step}': {source}")]
    StepFailed {
        recipe: String,
        step: String,
        #[source]
        source: Box<AutomateError>,
    },

    #[error("recipe '{recipe}' has already been cooked")]
    RecipeAlreadyCooked { recipe: String },

    #[error("'{name}' is not in the registry (looked for {path:?})")]
    RegistryNotFound { name: String, path: PathBuf },

    #[error("'{name}' is a {actual}, expected a {expected}")]
    WrongPackageType {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("template error: {message}")]
    Template { message: String },

    #[error("parse error in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AutomateError>;

impl AutomateError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap a `std::io::Error` with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }
}

impl From<minijinja::Error> for AutomateError {
    fn from(err: minijinja::Error) -> Self {
        Self::template(err.to_string())
    }
}
