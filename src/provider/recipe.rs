//! Recipe-to-provider adapter.
//!
//! Compiles the step groups of a recipe adapter module into engine steps
//! and exposes the recipe as a provider with a single `cook` command. Each
//! `cook` call builds and runs a fresh [`Recipe`].

use super::{CommandTable, Provider};
use crate::core::codegen::AdapterModule;
use crate::core::recipe::{branch, condition, parallel, sequence, step, Deps, Opts, Recipe, Step};
use crate::core::resolver::{bind_values, is_truthy, merge_values, resolve_value};
use crate::core::types::{StepGroupSpec, StepSpec, Values};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// The command every recipe provider exposes.
pub const COOK: &str = "cook";

#[derive(Debug, Clone)]
pub struct RecipeProvider {
    name: String,
    table: CommandTable,
}

impl RecipeProvider {
    /// `defaults` are the recipe's own values, merged beneath each call's values.
    pub fn new(name: impl Into<String>, adapter: AdapterModule, deps: Deps, defaults: Values) -> Self {
        let adapter = Arc::new(adapter);
        let deps = Arc::new(deps);
        let defaults = Arc::new(defaults);
        let mut table = CommandTable::new();
        table.register(COOK, move |values: Values| {
            let adapter = Arc::clone(&adapter);
            let deps = Deps::clone(&deps);
            let merged = merge_values([defaults.as_ref(), &values]);
            async move {
                let mut recipe = build_recipe(&adapter, deps, merged)?;
                recipe.cook().await?;
                Ok(recipe.summary())
            }
        });
        Self {
            name: name.into(),
            table,
        }
    }
}

#[async_trait]
impl Provider for RecipeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn commands(&self) -> &CommandTable {
        &self.table
    }
}

/// Construct a runnable recipe from an adapter module: one top-level step per group.
pub fn build_recipe(adapter: &AdapterModule, deps: Deps, values: Values) -> Result<Recipe> {
    let mut recipe = Recipe::new(adapter.recipe.clone(), deps).with_values(values);
    for group in &adapter.groups {
        recipe.step(group.name.clone(), compile_group(&group.steps))?;
    }
    Ok(recipe)
}

/// Lists become sequences, `parallel` becomes a parallel group, and
/// `branch` tests `when` and runs `then` or `else` as a sequence.
pub fn compile_group(group: &StepGroupSpec) -> Step {
    match group {
        StepGroupSpec::Sequence(steps) => sequence(compile_all(steps)),
        StepGroupSpec::Parallel { parallel: steps } => parallel(compile_all(steps)),
        StepGroupSpec::Branch { branch: spec } => {
            let when = Arc::new(spec.when.clone());
            let cond = condition(move |opts: Opts, _deps| {
                let when = Arc::clone(&when);
                async move { Ok(is_truthy(&resolve_value(&when, &step_context(&opts))?)) }
            });
            branch(cond, sequence(compile_all(&spec.then)), sequence(compile_all(&spec.otherwise)))
        }
    }
}

fn compile_all(steps: &[StepSpec]) -> Vec<Step> {
    steps.iter().cloned().map(compile_step).collect()
}

/// One dependency call: bind inputs, call `dep.cmd`, store the result at `out`.
pub fn compile_step(spec: StepSpec) -> Step {
    let spec = Arc::new(spec);
    step(move |opts: Opts, deps: Arc<Deps>| {
        let spec = Arc::clone(&spec);
        async move {
            let provider = deps.resolve(&spec.dep)?;
            let merged = merge_values([&Values::new(), &opts.values, &spec.input]);
            let bound = bind_values(&merged, &step_context(&opts))?;
            info!(step = %spec.label(), provider = provider.name(), "calling {}", spec.cmd);

            let result = provider.call(&spec.cmd, bound).await?;
            if let Some(out) = &spec.out {
                opts.state.set(out.clone(), result.clone());
            }
            Ok(result)
        }
    })
}

/// Template context for step inputs and branch conditions.
fn step_context(opts: &Opts) -> Value {
    json!({
        "state": opts.state.snapshot(),
        "values": opts.values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codegen::ModuleGroup;
    use crate::core::types::{BranchSpec, PackageKind};
    use crate::error::AutomateError;
    use crate::provider::CommandProvider;
    use std::time::Duration;

    fn echo_provider() -> Arc<dyn Provider> {
        let mut p = CommandProvider::new("ProviderEcho");
        p.commands_mut()
            .register("echo", |values: Values| async move { Ok(Value::Object(values)) })
            .register("slow", |values: Values| async move {
                let ms = values.get("ms").and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(values.get("tag").cloned().unwrap_or(Value::Null))
            });
        Arc::new(p)
    }

    fn call(cmd: &str, input: Value, out: Option<&str>) -> StepSpec {
        StepSpec {
            name: None,
            description: None,
            dep: "provider.echo".into(),
            cmd: cmd.into(),
            input: input.as_object().cloned().unwrap_or_default(),
            out: out.map(String::from),
        }
    }

    fn adapter(groups: Vec<(&str, StepGroupSpec)>) -> AdapterModule {
        AdapterModule {
            registry_name: "recipe.test.r@0.1.0".into(),
            recipe: "r".into(),
            dependencies: vec![],
            groups: groups
                .into_iter()
                .map(|(name, steps)| ModuleGroup {
                    name: name.into(),
                    steps,
                })
                .collect(),
        }
    }

    fn deps() -> Deps {
        Deps::new().with(PackageKind::Provider, "echo", echo_provider())
    }

    #[tokio::test]
    async fn test_recipe_provider_cook_threads_state() {
        let module = adapter(vec![
            (
                "first",
                StepGroupSpec::Sequence(vec![call("echo", json!({"msg": "{{ values.who }}"}), Some("greeting"))]),
            ),
            (
                "second",
                StepGroupSpec::Sequence(vec![call("echo", json!({"prev": "{{ state.greeting.msg }}"}), Some("echoed"))]),
            ),
        ]);
        let provider = RecipeProvider::new(
            "ProviderR",
            module,
            deps(),
            json!({"who": "default", "extra": 1}).as_object().cloned().unwrap(),
        );
        let summary = provider
            .call(COOK, json!({"who": "bob"}).as_object().cloned().unwrap())
            .await
            .unwrap();

        assert_eq!(summary["state"]["greeting"]["msg"], json!("bob"));
        assert_eq!(summary["state"]["echoed"]["prev"], json!("bob"));
        // Recipe values reach every call, step input wins on conflicts.
        assert_eq!(summary["state"]["greeting"]["extra"], json!(1));
        assert_eq!(summary["results"]["first"][0]["msg"], json!("bob"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recipe_provider_parallel_group() {
        let module = adapter(vec![(
            "fan",
            StepGroupSpec::Parallel {
                parallel: vec![
                    call("slow", json!({"ms": 20, "tag": "a"}), Some("a")),
                    call("slow", json!({"ms": 0, "tag": "b"}), Some("b")),
                ],
            },
        )]);
        let recipe_values = Values::new();
        let mut recipe = build_recipe(&module, deps(), recipe_values).unwrap();
        recipe.cook().await.unwrap();
        assert_eq!(recipe.results()["fan"], json!(["a", "b"]));
        assert_eq!(recipe.state().get("b"), Some(json!("b")));
    }

    #[tokio::test]
    async fn test_recipe_provider_branch_group() {
        let module = adapter(vec![(
            "pick",
            StepGroupSpec::Branch {
                branch: BranchSpec {
                    when: "{{ values.enabled }}".into(),
                    then: vec![call("echo", json!({"side": "then"}), Some("side"))],
                    otherwise: vec![call("echo", json!({"side": "else"}), Some("side"))],
                },
            },
        )]);
        let on = json!({"enabled": true}).as_object().cloned().unwrap();
        let mut recipe = build_recipe(&module, deps(), on).unwrap();
        recipe.cook().await.unwrap();
        assert_eq!(recipe.state().get("side").unwrap()["side"], json!("then"));

        let off = json!({"enabled": false}).as_object().cloned().unwrap();
        let mut recipe = build_recipe(&module, deps(), off).unwrap();
        recipe.cook().await.unwrap();
        assert_eq!(recipe.state().get("side").unwrap()["side"], json!("else"));
    }

    #[tokio::test]
    async fn test_recipe_provider_missing_dependency() {
        let mut spec = call("echo", json!({}), None);
        spec.dep = "provider.ghost".into();
        let module = adapter(vec![("main", StepGroupSpec::Sequence(vec![spec]))]);
        let mut recipe = build_recipe(&module, deps(), Values::new()).unwrap();
        let err = recipe.cook().await.unwrap_err();
        match err {
            AutomateError::StepFailed { step, source, .. } => {
                assert_eq!(step, "main");
                assert!(matches!(*source, AutomateError::DependencyNotFound { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recipe_provider_unknown_command() {
        let provider = RecipeProvider::new("ProviderR", adapter(vec![]), deps(), Values::new());
        let err = provider.call("bake", Values::new()).await.unwrap_err();
        assert!(matches!(err, AutomateError::CommandNotFound { .. }));
        assert_eq!(provider.commands().names().collect::<Vec<_>>(), vec![COOK]);
    }
}
