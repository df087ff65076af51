//! CLI subcommands: build, clean, init, provider, recipe, exec.

use crate::core::executor::{build_path, BuildContext, BuildOutcome};
use crate::core::resolver::{merge_values, value_to_text};
use crate::core::settings::Settings;
use crate::core::types::{PackageKind, Values, CONFIG_FILE};
use crate::core::{codegen, parser, state};
use crate::error::{AutomateError, Result};
use crate::provider::module::{initialize_provider, load_values_file};
use crate::provider::recipe::COOK;
use crate::transport::local::run_inherited;
use clap::{Subcommand, ValueEnum};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a workspace or package into the cache and registry
    Build {
        /// Path to Automate.yaml (or its directory)
        #[arg(short, long, default_value = CONFIG_FILE)]
        file: PathBuf,
    },

    /// Remove every cached module and registry entry
    Clean {
        /// Required: the whole tool root is deleted
        #[arg(long)]
        force: bool,
    },

    /// Scaffold a new Automate.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = InitKind::Provider)]
        kind: InitKind,

        /// Package name (default: directory name)
        #[arg(long)]
        name: Option<String>,

        /// Overwrite an existing Automate.yaml
        #[arg(long)]
        force: bool,
    },

    /// Inspect and run registered providers
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },

    /// Inspect and run registered recipes
    Recipe {
        #[command(subcommand)]
        action: RecipeAction,
    },

    /// Run one command of a generated module (spawned by `run`)
    Exec {
        /// Path to a generated mod.yaml
        module: PathBuf,

        cmd: String,

        /// YAML values file, later files override earlier ones
        #[arg(long = "value")]
        values: Vec<PathBuf>,

        #[arg(long = "permission")]
        permissions: Vec<String>,

        /// Extra arguments, passed as `values.args`
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProviderAction {
    /// List registered providers
    List,
    /// Show a provider's registry entry and commands
    Show { name: String },
    /// Run a provider command
    Run {
        /// Registry name, CLI name or package name
        name: String,
        cmd: String,
        #[arg(long = "value")]
        values: Vec<PathBuf>,
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RecipeAction {
    /// List registered recipes
    List,
    /// Show a recipe's registry entry and step groups
    Show { name: String },
    /// Cook a recipe
    Run {
        /// Registry name, CLI name or package name
        name: String,
        #[arg(long = "value")]
        values: Vec<PathBuf>,
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitKind {
    Workspace,
    Provider,
    Recipe,
}

/// Dispatch a CLI command. Returns the process exit code.
pub async fn dispatch(cmd: Commands, settings: &Settings) -> Result<i32> {
    match cmd {
        Commands::Build { file } => cmd_build(settings, &file),
        Commands::Clean { force } => cmd_clean(settings, force),
        Commands::Init {
            path,
            kind,
            name,
            force,
        } => cmd_init(&path, kind, name.as_deref(), force),
        Commands::Provider { action } => match action {
            ProviderAction::List => cmd_list(settings, PackageKind::Provider),
            ProviderAction::Show { name } => cmd_show(settings, PackageKind::Provider, &name),
            ProviderAction::Run {
                name,
                cmd,
                values,
                args,
            } => cmd_run(settings, PackageKind::Provider, &name, &cmd, &values, &args).await,
        },
        Commands::Recipe { action } => match action {
            RecipeAction::List => cmd_list(settings, PackageKind::Recipe),
            RecipeAction::Show { name } => cmd_show(settings, PackageKind::Recipe, &name),
            RecipeAction::Run { name, values, args } => {
                cmd_run(settings, PackageKind::Recipe, &name, COOK, &values, &args).await
            }
        },
        Commands::Exec {
            module,
            cmd,
            values,
            permissions,
            args,
        } => cmd_exec(&module, &cmd, &values, &permissions, &args).await,
    }
}

fn cmd_build(settings: &Settings, file: &Path) -> Result<i32> {
    let mut ctx = BuildContext::new(settings);
    let outcomes = build_path(&mut ctx, file)?;

    for name in ctx.build_order() {
        println!("  built    {}", name);
    }
    for (name, outcome) in &outcomes {
        if *outcome == BuildOutcome::Skipped {
            println!("  skipped  {}", name);
        }
    }
    println!(
        "Built {} package(s) into {}",
        ctx.build_order().len(),
        settings.root().display()
    );
    Ok(0)
}

fn cmd_clean(settings: &Settings, force: bool) -> Result<i32> {
    let root = settings.root();
    if !force {
        return Err(AutomateError::validation(
            "force",
            format!("refusing to remove {} without --force", root.display()),
        ));
    }
    if root.exists() {
        std::fs::remove_dir_all(root).map_err(|e| AutomateError::io(root, e))?;
    }
    settings.ensure_dirs()?;
    println!("Cleaned {}", root.display());
    Ok(0)
}

fn cmd_init(path: &Path, kind: InitKind, name: Option<&str>, force: bool) -> Result<i32> {
    let config_path = path.join(CONFIG_FILE);
    if config_path.exists() && !force {
        return Err(AutomateError::validation(
            "init",
            format!("{} already exists (use --force to overwrite)", config_path.display()),
        ));
    }

    let name = match name {
        Some(n) => n.to_string(),
        None => default_package_name(path),
    };
    let content = init_template(kind, &name);
    if kind != InitKind::Workspace {
        let config = parser::parse_config(&content).map_err(|e| AutomateError::parse(&config_path, e))?;
        parser::validate_package(&config)?;
    }

    std::fs::create_dir_all(path).map_err(|e| AutomateError::io(path, e))?;
    std::fs::write(&config_path, content).map_err(|e| AutomateError::io(&config_path, e))?;

    println!("Initialized {:?} package at {}", kind, path.display());
    println!("  Created: {}", config_path.display());
    Ok(0)
}

fn default_package_name(path: &Path) -> String {
    std::fs::canonicalize(path)
        .ok()
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != ".")
        .unwrap_or_else(|| "my-package".to_string())
}

fn init_template(kind: InitKind, name: &str) -> String {
    match kind {
        InitKind::Workspace => "workspace:\n  members: []\n".to_string(),
        InitKind::Provider => format!(
            r#"package:
  type: provider
  namespace: local
  name: {name}
  version: 0.1.0
  description: ""
  permissions: []

values:
  greeting: hello

provider:
  commands:
    hello:
      description: Print a greeting
      in: Values
      out: string
      run: echo "{{{{ values.greeting }}}}"
"#
        ),
        InitKind::Recipe => format!(
            r#"package:
  type: recipe
  namespace: local
  name: {name}
  version: 0.1.0
  description: ""
  permissions: []

dependencies:
  provider: {{}}
  recipe: {{}}

values: {{}}

recipe:
  steps: {{}}
"#
        ),
    }
}

fn cmd_list(settings: &Settings, kind: PackageKind) -> Result<i32> {
    let records = state::list_registry(settings, Some(kind))?;
    if records.is_empty() {
        println!("No {}s registered in {}", kind, settings.registry_dir().display());
        return Ok(0);
    }
    for r in &records {
        println!(
            "{:<40} {:<28} {}",
            r.name,
            r.cli_name,
            r.description.as_deref().unwrap_or("")
        );
    }
    Ok(0)
}

fn cmd_show(settings: &Settings, kind: PackageKind, name: &str) -> Result<i32> {
    let record = find_record(settings, kind, name)?;
    println!("{} ({})", record.name, record.provider_type);
    println!("  cli:         {}", record.cli_name);
    println!("  source:      {}", record.package_path.display());
    println!("  module:      {}", record.cli_mod.display());
    if let Some(desc) = &record.description {
        println!("  description: {}", desc);
    }
    if !record.permissions.is_empty() {
        println!("  permissions: {}", record.permissions.join(", "));
    }

    match record.kind {
        PackageKind::Provider => {
            println!("  commands:");
            for (cmd, spec) in record.provider.iter().flat_map(|p| &p.commands) {
                println!("    {:<20} {}", cmd, spec.description.as_deref().unwrap_or(""));
            }
        }
        PackageKind::Recipe => {
            let adapter = codegen::load_adapter(&record.entry)?;
            println!("  dependencies:");
            for dep in &adapter.dependencies {
                println!("    {}.{:<16} {}", dep.namespace, dep.key, dep.registry_name);
            }
            println!("  steps:");
            for group in &adapter.groups {
                println!("    {} ({} step(s))", group.name, group.steps.steps().count());
            }
        }
    }
    Ok(0)
}

/// Find a registry record by registry name, CLI name or bare package name.
fn find_record(settings: &Settings, kind: PackageKind, name: &str) -> Result<state::RegistryRecord> {
    let record = match state::load_registry(settings, name) {
        Ok(record) => record,
        Err(not_found @ AutomateError::RegistryNotFound { .. }) => {
            let mut matches: Vec<_> = state::list_registry(settings, None)?
                .into_iter()
                .filter(|r| r.cli_name == name || (r.kind == kind && r.package_name == name))
                .collect();
            match matches.len() {
                0 => return Err(not_found),
                1 => matches.remove(0),
                n => {
                    return Err(AutomateError::validation(
                        "name",
                        format!("'{}' matches {} registry entries; use the registry name", name, n),
                    ))
                }
            }
        }
        Err(e) => return Err(e),
    };

    if record.kind != kind {
        return Err(AutomateError::WrongPackageType {
            name: record.name,
            expected: kind.to_string(),
            actual: record.kind.to_string(),
        });
    }
    Ok(record)
}

/// Merge value files in order onto `base`; later files win.
fn merge_value_files(base: Values, files: &[PathBuf]) -> Result<Values> {
    files.iter().try_fold(base, |acc, file| {
        let layer = load_values_file(file)?;
        Ok(merge_values([&acc, &layer]))
    })
}

/// `values.env` entries as environment variables for the spawned module.
fn env_from_values(values: &Values) -> Vec<(String, String)> {
    values
        .get("env")
        .and_then(Value::as_object)
        .map(|env| env.iter().map(|(k, v)| (k.clone(), value_to_text(v))).collect())
        .unwrap_or_default()
}

/// Arguments for `automate exec` on behalf of `record`.
fn exec_args(record: &state::RegistryRecord, cmd: &str, value_files: &[PathBuf], args: &[String]) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec!["exec".into(), record.cli_mod.clone().into(), cmd.into()];
    for file in value_files {
        argv.push("--value".into());
        argv.push(file.clone().into());
    }
    for perm in &record.permissions {
        argv.push("--permission".into());
        argv.push(perm.into());
    }
    if !args.is_empty() {
        argv.push("--".into());
        argv.extend(args.iter().map(OsString::from));
    }
    argv
}

async fn cmd_run(
    settings: &Settings,
    kind: PackageKind,
    name: &str,
    cmd: &str,
    value_files: &[PathBuf],
    args: &[String],
) -> Result<i32> {
    let record = find_record(settings, kind, name)?;
    let values = merge_value_files(load_values_file(&record.values_file)?, value_files)?;
    let env = env_from_values(&values);

    let exe = std::env::current_exe().map_err(|e| AutomateError::io("current_exe", e))?;
    let argv = exec_args(&record, cmd, value_files, args);
    debug!(module = %record.cli_mod.display(), cmd, env = env.len(), "running module");
    run_inherited(&exe, argv, env).await
}

/// Initialize the module's provider and call `cmd` with the merged values.
async fn exec_module(module: &Path, cmd: &str, value_files: &[PathBuf], args: &[String]) -> Result<Value> {
    let provider = initialize_provider(module)?;
    let mut values = merge_value_files(Values::new(), value_files)?;
    if !args.is_empty() {
        values.insert("args".into(), Value::from(args.to_vec()));
    }
    provider.call(cmd, values).await
}

async fn cmd_exec(
    module: &Path,
    cmd: &str,
    value_files: &[PathBuf],
    permissions: &[String],
    args: &[String],
) -> Result<i32> {
    debug!(module = %module.display(), ?permissions, "exec");
    let result = exec_module(module, cmd, value_files, args).await?;
    if let Some(text) = format_result(&result)? {
        println!("{}", text);
    }
    Ok(0)
}

/// Primitives print as text, containers as pretty JSON, null prints nothing.
fn format_result(value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(_) | Value::Array(_) => serde_json::to_string_pretty(value)
            .map(Some)
            .map_err(|e| AutomateError::template(format!("cannot encode result: {}", e))),
        other => Ok(Some(value_to_text(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::package::tests::write_pkg;
    use serde_json::json;

    const PROVIDER_A: &str = r#"
package:
  type: provider
  namespace: test
  name: a
  version: 1.0.0
  description: greeter
  permissions: [net]
values:
  name: world
  env:
    GREETING_STYLE: loud
provider:
  commands:
    hello:
      description: greet someone
      run: echo "hello {{ values.name }}"
    args:
      run: echo '{{ values.args }}'
"#;

    const RECIPE_B: &str = r#"
package: { type: recipe, namespace: test, name: b, version: 0.1.0 }
dependencies:
  provider:
    a: ../a
recipe:
  steps:
    main:
      - { dep: provider.a, cmd: hello, out: greeting }
"#;

    fn built(root: &Path) -> Settings {
        write_pkg(&root.join("a"), PROVIDER_A);
        write_pkg(&root.join("b"), RECIPE_B);
        std::fs::write(root.join(CONFIG_FILE), "workspace:\n  members: [a, b]\n").unwrap();
        let settings = Settings::new(root.join(".automate"));
        assert_eq!(cmd_build(&settings, &root.join(CONFIG_FILE)).unwrap(), 0);
        settings
    }

    #[test]
    fn test_cli_build_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let settings = built(dir.path());
        let providers = state::list_registry(&settings, Some(PackageKind::Provider)).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(cmd_list(&settings, PackageKind::Provider).unwrap(), 0);
        assert_eq!(cmd_show(&settings, PackageKind::Provider, "a").unwrap(), 0);
        assert_eq!(cmd_show(&settings, PackageKind::Recipe, "recipe/b@0.1.0").unwrap(), 0);
    }

    #[test]
    fn test_cli_find_record_by_any_name() {
        let dir = tempfile::tempdir().unwrap();
        let settings = built(dir.path());
        for name in ["provider.test.a@1.0.0", "provider/a@1.0.0", "a"] {
            let r = find_record(&settings, PackageKind::Provider, name).unwrap();
            assert_eq!(r.name, "provider.test.a@1.0.0");
        }
        let err = find_record(&settings, PackageKind::Provider, "ghost").unwrap_err();
        assert!(matches!(err, AutomateError::RegistryNotFound { .. }));
    }

    #[test]
    fn test_cli_find_record_wrong_type() {
        let dir = tempfile::tempdir().unwrap();
        let settings = built(dir.path());
        let err = find_record(&settings, PackageKind::Recipe, "provider.test.a@1.0.0").unwrap_err();
        match err {
            AutomateError::WrongPackageType { expected, actual, .. } => {
                assert_eq!(expected, "recipe");
                assert_eq!(actual, "provider");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cli_exec_module_with_value_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = built(dir.path());
        let record = find_record(&settings, PackageKind::Provider, "a").unwrap();

        let out = exec_module(&record.cli_mod, "hello", &[], &[]).await.unwrap();
        assert_eq!(out, json!("hello world"));

        let v1 = dir.path().join("v1.yaml");
        let v2 = dir.path().join("v2.yaml");
        std::fs::write(&v1, "name: first\n").unwrap();
        std::fs::write(&v2, "name: second\n").unwrap();
        let out = exec_module(&record.cli_mod, "hello", &[v1, v2], &[]).await.unwrap();
        assert_eq!(out, json!("hello second"));

        let out = exec_module(&record.cli_mod, "args", &[], &["x".into(), "y".into()])
            .await
            .unwrap();
        assert_eq!(out, json!(["x", "y"]));
    }

    #[tokio::test]
    async fn test_cli_exec_recipe_cook() {
        let dir = tempfile::tempdir().unwrap();
        let settings = built(dir.path());
        let record = find_record(&settings, PackageKind::Recipe, "b").unwrap();
        let summary = exec_module(&record.cli_mod, COOK, &[], &[]).await.unwrap();
        assert_eq!(summary["state"]["greeting"], json!("hello world"));
    }

    #[test]
    fn test_cli_exec_args_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let settings = built(dir.path());
        let record = find_record(&settings, PackageKind::Provider, "a").unwrap();

        let argv = exec_args(&record, "hello", &[PathBuf::from("v.yaml")], &["--x".into()]);
        let argv: Vec<String> = argv.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(argv[0], "exec");
        assert_eq!(argv[1], record.cli_mod.to_string_lossy());
        assert_eq!(&argv[2..], ["hello", "--value", "v.yaml", "--permission", "net", "--", "--x"]);

        let values = load_values_file(&record.values_file).unwrap();
        assert_eq!(
            env_from_values(&values),
            vec![("GREETING_STYLE".to_string(), "loud".to_string())]
        );
    }

    #[test]
    fn test_cli_clean_requires_force() {
        let dir = tempfile::tempdir().unwrap();
        let settings = built(dir.path());
        assert!(cmd_clean(&settings, false).is_err());
        assert!(settings.registry_dir().read_dir().unwrap().next().is_some());

        cmd_clean(&settings, true).unwrap();
        assert!(settings.registry_dir().is_dir());
        assert!(settings.registry_dir().read_dir().unwrap().next().is_none());
    }

    #[test]
    fn test_cli_init_kinds() {
        let dir = tempfile::tempdir().unwrap();
        for (kind, sub) in [
            (InitKind::Provider, "prov"),
            (InitKind::Recipe, "rec"),
            (InitKind::Workspace, "ws"),
        ] {
            let path = dir.path().join(sub);
            cmd_init(&path, kind, None, false).unwrap();
            let config = parser::load_config(&path.join(CONFIG_FILE)).unwrap();
            match kind {
                InitKind::Workspace => assert!(config.is_workspace()),
                _ => assert_eq!(parser::validate_package(&config).unwrap().name, sub),
            }
        }
    }

    #[test]
    fn test_cli_init_refuses_overwrite_and_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path(), InitKind::Provider, Some("ok"), false).unwrap();
        assert!(cmd_init(dir.path(), InitKind::Provider, Some("ok"), false).is_err());
        cmd_init(dir.path(), InitKind::Provider, Some("again"), true).unwrap();

        let other = dir.path().join("other");
        let err = cmd_init(&other, InitKind::Provider, Some("bad name!"), false).unwrap_err();
        assert!(matches!(err, AutomateError::Validation { .. }));
        assert!(!other.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_cli_format_result() {
        assert_eq!(format_result(&Value::Null).unwrap(), None);
        assert_eq!(format_result(&json!("hi")).unwrap().unwrap(), "hi");
        assert_eq!(format_result(&json!(3)).unwrap().unwrap(), "3");
        assert!(format_result(&json!({"a": 1})).unwrap().unwrap().contains("\"a\": 1"));
    }
}
