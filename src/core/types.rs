//! Descriptor types for `Automate.yaml`.
//!
//! One file describes either a workspace (a list of member packages) or a
//! single package (provider or recipe) together with its dependencies,
//! default values, and provider/recipe sections. Every structure derives its
//! own decoder; nullable maps are normalized during decoding.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Arbitrary JSON-shaped values: package defaults, step inputs, recipe state.
pub type Values = serde_json::Map<String, serde_json::Value>;

/// Name of the descriptor file in every package directory.
pub const CONFIG_FILE: &str = "Automate.yaml";

/// Decode `null` (or an absent key, with `#[serde(default)]`) as `T::default()`.
///
/// YAML sections whose entries are all commented out decode as `null`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Top-level Automate.yaml
// ============================================================================

/// A whole descriptor file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<Workspace>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageMeta>,

    #[serde(default, deserialize_with = "nullable")]
    pub dependencies: Dependencies,

    /// Default values handed to commands and recipes.
    #[serde(default, deserialize_with = "nullable")]
    pub values: Values,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<RecipeSpec>,
}

impl AutomateConfig {
    pub fn is_workspace(&self) -> bool {
        self.workspace.is_some()
    }
}

/// Workspace section: member package directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub members: Vec<String>,
}

/// Package section exactly as written. Checked by `parser::validate_package`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMeta {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Opaque capability strings forwarded to the runtime.
    #[serde(default, deserialize_with = "nullable")]
    pub permissions: Vec<String>,
}

// ============================================================================
// Package kinds and identity
// ============================================================================

/// The two kinds of buildable package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Provider,
    Recipe,
}

impl PackageKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provider" => Some(Self::Provider),
            "recipe" => Some(Self::Recipe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Recipe => "recipe",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated identity of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub kind: PackageKind,
    pub namespace: String,
    pub name: String,
    pub version: String,
}

// ============================================================================
// Dependencies
// ============================================================================

/// Dependency declarations, keyed by the injection key the package uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default, deserialize_with = "nullable")]
    pub provider: IndexMap<String, DependencySpec>,

    #[serde(default, deserialize_with = "nullable")]
    pub recipe: IndexMap<String, DependencySpec>,

    /// Accepted for compatibility; templates are not built.
    #[serde(default, deserialize_with = "nullable")]
    pub template: IndexMap<String, DependencySpec>,
}

/// A dependency is a bare path or `{ name, path }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Path(String),
    Named {
        #[serde(default)]
        name: Option<String>,
        path: String,
    },
}

impl DependencySpec {
    pub fn path(&self) -> &str {
        match self {
            Self::Path(p) => p,
            Self::Named { path, .. } => path,
        }
    }

    /// Expected package name, when the object form states one.
    pub fn expected_name(&self) -> Option<&str> {
        match self {
            Self::Path(_) => None,
            Self::Named { name, .. } => name.as_deref(),
        }
    }
}

// ============================================================================
// Provider section
// ============================================================================

/// Provider section: documented types and commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Type documentation, passed through untouched.
    #[serde(default, deserialize_with = "nullable")]
    pub types: IndexMap<String, serde_json::Value>,

    #[serde(default, deserialize_with = "nullable")]
    pub commands: IndexMap<String, ProviderCommand>,
}

/// One command a provider offers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCommand {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(rename = "async", default)]
    pub is_async: bool,

    /// Input type name (documentation).
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Output type name (documentation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,

    /// Shell script implementing the command; `{{ values.x }}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

// ============================================================================
// Recipe section
// ============================================================================

/// Recipe section: named step groups, run in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeSpec {
    #[serde(default, deserialize_with = "nullable")]
    pub steps: IndexMap<String, StepGroupSpec>,
}

/// One step group. A plain list runs as a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepGroupSpec {
    Sequence(Vec<StepSpec>),
    Parallel { parallel: Vec<StepSpec> },
    Branch { branch: BranchSpec },
}

impl StepGroupSpec {
    /// All steps in the group, branch arms included.
    pub fn steps(&self) -> Box<dyn Iterator<Item = &StepSpec> + '_> {
        match self {
            Self::Sequence(steps) | Self::Parallel { parallel: steps } => Box::new(steps.iter()),
            Self::Branch { branch } => Box::new(branch.then.iter().chain(branch.otherwise.iter())),
        }
    }
}

/// Conditional group: `when` is resolved against `{state, values}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub when: String,

    #[serde(default, deserialize_with = "nullable")]
    pub then: Vec<StepSpec>,

    #[serde(rename = "else", default, deserialize_with = "nullable")]
    pub otherwise: Vec<StepSpec>,
}

/// One invocation of a dependency command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `provider.<key>` or `recipe.<key>`.
    pub dep: String,

    pub cmd: String,

    /// Input values; string leaves may hold `{{ }}` placeholders.
    #[serde(rename = "in", default, deserialize_with = "nullable")]
    pub input: Values,

    /// State key receiving the command's result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
}

impl StepSpec {
    /// Split `dep` into `(namespace, key)`.
    pub fn dep_parts(&self) -> Option<(&str, &str)> {
        self.dep.split_once('.')
    }

    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.dep, self.cmd))
    }
}
