//! Recipe execution engine: step combinators and the `Recipe` runner.
//!
//! A [`Step`] is an async function of the shared options (state + values)
//! and the injected dependencies. Steps compose with [`sequence`],
//! [`parallel`] and [`branch`]; a [`Recipe`] runs named top-level steps in
//! registration order and records each one's result.

use crate::core::types::{PackageKind, Values};
use crate::error::{AutomateError, Result};
use crate::provider::Provider;
use futures::future::{try_join_all, BoxFuture};
use indexmap::IndexMap;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

pub type Step = Arc<dyn Fn(Opts, Arc<Deps>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub type Condition = Arc<dyn Fn(Opts, Arc<Deps>) -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// Wrap an async closure as a [`Step`].
pub fn step<F, Fut>(f: F) -> Step
where
    F: Fn(Opts, Arc<Deps>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |opts: Opts, deps: Arc<Deps>| -> BoxFuture<'static, Result<Value>> {
        Box::pin(f(opts, deps))
    })
}

/// Wrap an async predicate as a [`Condition`].
pub fn condition<F, Fut>(f: F) -> Condition
where
    F: Fn(Opts, Arc<Deps>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    Arc::new(move |opts: Opts, deps: Arc<Deps>| -> BoxFuture<'static, Result<bool>> {
        Box::pin(f(opts, deps))
    })
}

// ============================================================================
// Shared state and options
// ============================================================================

/// Mutable key/value state shared by every step of one recipe.
///
/// Concurrent `parallel` siblings may interleave writes; writing the same
/// key from two siblings is last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct RecipeState(Arc<Mutex<Values>>);

impl RecipeState {
    pub fn new(initial: Values) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    /// Run `f` with exclusive access. Never hold this across an await.
    pub fn update<R>(&self, f: impl FnOnce(&mut Values) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.update(|s| s.get(key).cloned())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.update(|s| {
            s.insert(key.into(), value);
        });
    }

    pub fn snapshot(&self) -> Values {
        self.update(|s| s.clone())
    }
}

/// What every step receives besides the dependencies.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    pub state: RecipeState,
    pub values: Values,
}

/// Injected dependencies, addressed as `provider.<key>` / `recipe.<key>`.
#[derive(Clone, Default)]
pub struct Deps {
    provider: IndexMap<String, Arc<dyn Provider>>,
    recipe: IndexMap<String, Arc<dyn Provider>>,
}

impl Deps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: PackageKind, key: impl Into<String>, dep: Arc<dyn Provider>) {
        let slot = match namespace {
            PackageKind::Provider => &mut self.provider,
            PackageKind::Recipe => &mut self.recipe,
        };
        slot.insert(key.into(), dep);
    }

    pub fn with(mut self, namespace: PackageKind, key: impl Into<String>, dep: Arc<dyn Provider>) -> Self {
        self.insert(namespace, key, dep);
        self
    }

    pub fn get(&self, namespace: PackageKind, key: &str) -> Option<Arc<dyn Provider>> {
        let slot = match namespace {
            PackageKind::Provider => &self.provider,
            PackageKind::Recipe => &self.recipe,
        };
        slot.get(key).cloned()
    }

    /// Resolve a `namespace.key` reference.
    pub fn resolve(&self, dep: &str) -> Result<Arc<dyn Provider>> {
        dep.split_once('.')
            .and_then(|(ns, key)| PackageKind::parse(ns).and_then(|ns| self.get(ns, key)))
            .ok_or_else(|| AutomateError::DependencyNotFound {
                dep: dep.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.provider.len() + self.recipe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Deps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deps")
            .field("provider", &self.provider.keys().collect::<Vec<_>>())
            .field("recipe", &self.recipe.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Run steps one after another; the first failure stops the rest.
/// Result: the list of step results in order.
pub fn sequence(steps: Vec<Step>) -> Step {
    let steps = Arc::new(steps);
    step(move |opts, deps| {
        let steps = Arc::clone(&steps);
        async move {
            let mut results = Vec::with_capacity(steps.len());
            for s in steps.iter() {
                results.push(s(opts.clone(), Arc::clone(&deps)).await?);
            }
            Ok(Value::Array(results))
        }
    })
}

/// Start all steps concurrently. Results keep declaration order regardless
/// of completion order; the first failure fails the group and the
/// remaining siblings are dropped.
pub fn parallel(steps: Vec<Step>) -> Step {
    let steps = Arc::new(steps);
    step(move |opts, deps| {
        let pending: Vec<_> = steps
            .iter()
            .map(|s| s(opts.clone(), Arc::clone(&deps)))
            .collect();
        async move { Ok(Value::Array(try_join_all(pending).await?)) }
    })
}

/// Evaluate `cond`, then run exactly one of `left` / `right`.
pub fn branch(cond: Condition, left: Step, right: Step) -> Step {
    step(move |opts, deps| {
        let (cond, left, right) = (Arc::clone(&cond), Arc::clone(&left), Arc::clone(&right));
        async move {
            if cond(opts.clone(), Arc::clone(&deps)).await? {
                left(opts, deps).await
            } else {
                right(opts, deps).await
            }
        }
    })
}

// ============================================================================
// Recipe
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeStatus {
    Configured,
    Running,
    Completed,
    Failed,
}

/// A named, ordered set of top-level steps with their dependencies and state.
pub struct Recipe {
    name: String,
    steps: IndexMap<String, Step>,
    deps: Arc<Deps>,
    state: RecipeState,
    values: Values,
    results: IndexMap<String, Value>,
    status: RecipeStatus,
}

impl Recipe {
    pub fn new(name: impl Into<String>, deps: Deps) -> Self {
        Self {
            name: name.into(),
            steps: IndexMap::new(),
            deps: Arc::new(deps),
            state: RecipeState::default(),
            values: Values::new(),
            results: IndexMap::new(),
            status: RecipeStatus::Configured,
        }
    }

    /// Seed the shared state.
    pub fn with_state(mut self, state: Values) -> Self {
        self.state = RecipeState::new(state);
        self
    }

    /// Values handed to every step.
    pub fn with_values(mut self, values: Values) -> Self {
        self.values = values;
        self
    }

    /// Register a top-level step. Names are unique.
    pub fn step(&mut self, name: impl Into<String>, step: Step) -> Result<&mut Self> {
        let name = name.into();
        if self.steps.contains_key(&name) {
            return Err(AutomateError::DuplicateStepName {
                recipe: self.name.clone(),
                step: name,
            });
        }
        self.steps.insert(name, step);
        Ok(self)
    }

    pub fn sequence(&mut self, name: impl Into<String>, steps: Vec<Step>) -> Result<&mut Self> {
        self.step(name, sequence(steps))
    }

    pub fn parallel(&mut self, name: impl Into<String>, steps: Vec<Step>) -> Result<&mut Self> {
        self.step(name, parallel(steps))
    }

    pub fn branch(
        &mut self,
        name: impl Into<String>,
        cond: Condition,
        left: Step,
        right: Step,
    ) -> Result<&mut Self> {
        self.step(name, branch(cond, left, right))
    }

    /// Run every step in registration order, storing each result under its
    /// name. A recipe cooks at most once.
    pub async fn cook(&mut self) -> Result<()> {
        if self.status != RecipeStatus::Configured {
            return Err(AutomateError::RecipeAlreadyCooked {
                recipe: self.name.clone(),
            });
        }
        self.status = RecipeStatus::Running;
        info!(recipe = %self.name, steps = self.steps.len(), deps = self.deps.len(), "cooking");

        let opts = Opts {
            state: self.state.clone(),
            values: self.values.clone(),
        };
        for (name, step) in &self.steps {
            debug!(recipe = %self.name, step = %name, "running step");
            match step(opts.clone(), Arc::clone(&self.deps)).await {
                Ok(value) => {
                    self.results.insert(name.clone(), value);
                }
                Err(source) => {
                    warn!(recipe = %self.name, step = %name, error = %source, "step failed");
                    self.status = RecipeStatus::Failed;
                    return Err(AutomateError::StepFailed {
                        recipe: self.name.clone(),
                        step: name.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }

        self.status = RecipeStatus::Completed;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> RecipeStatus {
        self.status
    }

    pub fn state(&self) -> &RecipeState {
        &self.state
    }

    pub fn results(&self) -> &IndexMap<String, Value> {
        &self.results
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// `{ "results": {...}, "state": {...} }`
    pub fn summary(&self) -> Value {
        let results: Values = self
            .results
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::json!({
            "results": results,
            "state": self.state.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CommandProvider;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn task(name: &'static str, delay_ms: u64) -> Step {
        step(move |opts: Opts, _deps| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            opts.state.set("value", json!(name));
            opts.state.update(|s| {
                let done = s.entry("done").or_insert_with(|| json!([]));
                if let Value::Array(items) = done {
                    items.push(json!(name));
                }
            });
            Ok(json!(name))
        })
    }

    fn failing(msg: &'static str) -> Step {
        step(move |_opts, _deps| async move { Err(AutomateError::template(msg)) })
    }

    #[tokio::test(start_paused = true)]
    async fn test_recipe_sequence_runs_in_order() {
        let mut recipe = Recipe::new("seq", Deps::new());
        recipe
            .sequence("main", vec![task("task1", 0), task("task2", 50), task("task3", 0)])
            .unwrap();
        recipe.cook().await.unwrap();

        assert_eq!(recipe.results()["main"], json!(["task1", "task2", "task3"]));
        // task2 is the slowest, yet task3 only starts after it finishes.
        assert_eq!(recipe.state().get("done"), Some(json!(["task1", "task2", "task3"])));
        assert_eq!(recipe.state().get("value"), Some(json!("task3")));
        assert_eq!(recipe.status(), RecipeStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recipe_parallel_keeps_declaration_order() {
        let mut recipe = Recipe::new("par", Deps::new());
        recipe
            .parallel("fan", vec![task("task1", 10), task("task2", 5), task("task3", 0)])
            .unwrap();
        recipe.cook().await.unwrap();

        assert_eq!(recipe.results()["fan"], json!(["task1", "task2", "task3"]));
        assert_eq!(recipe.state().get("done"), Some(json!(["task3", "task2", "task1"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recipe_parallel_fails_fast() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        let slow = step(move |_opts, _deps| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        });
        let mut recipe = Recipe::new("par", Deps::new());
        recipe.parallel("fan", vec![slow, failing("boom")]).unwrap();
        let err = recipe.cook().await.unwrap_err();

        assert!(matches!(err, AutomateError::StepFailed { ref step, .. } if step == "fan"));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(recipe.status(), RecipeStatus::Failed);
    }

    #[tokio::test]
    async fn test_recipe_branch_runs_one_side() {
        let left_ran = condition(|_opts, _deps| async { Ok(true) });
        let mut recipe = Recipe::new("br", Deps::new());
        recipe
            .branch("pick", left_ran, task("task1", 0), task("task2", 0))
            .unwrap();
        recipe.cook().await.unwrap();

        assert_eq!(recipe.results()["pick"], json!("task1"));
        assert_eq!(recipe.state().get("value"), Some(json!("task1")));
        assert_eq!(recipe.state().get("done"), Some(json!(["task1"])));
    }

    #[tokio::test]
    async fn test_recipe_branch_reads_state() {
        let on_flag = condition(|opts: Opts, _deps| async move {
            Ok(opts.state.get("flag") == Some(json!(true)))
        });
        let mut recipe = Recipe::new("br", Deps::new()).with_state(
            json!({"flag": false}).as_object().cloned().unwrap(),
        );
        recipe
            .branch("pick", on_flag, task("task1", 0), task("task2", 0))
            .unwrap();
        recipe.cook().await.unwrap();
        assert_eq!(recipe.results()["pick"], json!("task2"));
    }

    #[test]
    fn test_recipe_duplicate_step_name() {
        let mut recipe = Recipe::new("dup", Deps::new());
        recipe.sequence("a", vec![]).unwrap();
        let err = recipe.parallel("a", vec![]).err().unwrap();
        assert!(err.to_string().contains("\"a\" defined twice"));
        assert_eq!(recipe.step_names().collect::<Vec<_>>(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_recipe_sequence_stops_at_failure() {
        let mut recipe = Recipe::new("stop", Deps::new());
        recipe
            .sequence("first", vec![task("task1", 0)])
            .unwrap()
            .sequence("second", vec![failing("nope"), task("task2", 0)])
            .unwrap()
            .sequence("third", vec![task("task3", 0)])
            .unwrap();
        let err = recipe.cook().await.unwrap_err();

        assert!(err.to_string().contains("second"));
        assert!(recipe.results().contains_key("first"));
        assert!(!recipe.results().contains_key("second"));
        assert_eq!(recipe.state().get("done"), Some(json!(["task1"])));
    }

    #[tokio::test]
    async fn test_recipe_cooks_once() {
        let mut recipe = Recipe::new("once", Deps::new());
        recipe.cook().await.unwrap();
        let err = recipe.cook().await.unwrap_err();
        assert!(matches!(err, AutomateError::RecipeAlreadyCooked { .. }));
    }

    #[tokio::test]
    async fn test_recipe_steps_reach_injected_deps() {
        let mut echo = CommandProvider::new("ProviderEcho");
        echo.commands_mut().register("echo", |values: Values| async move {
            Ok(Value::Object(values))
        });
        let deps = Deps::new().with(PackageKind::Provider, "echo", Arc::new(echo));

        let call = step(|opts: Opts, deps: Arc<Deps>| async move {
            let provider = deps.resolve("provider.echo")?;
            provider.call("echo", opts.values.clone()).await
        });
        let mut recipe = Recipe::new("di", deps)
            .with_values(json!({"who": "bob"}).as_object().cloned().unwrap());
        recipe.step("call", call).unwrap();
        recipe.cook().await.unwrap();

        assert_eq!(recipe.results()["call"], json!({"who": "bob"}));
        assert_eq!(recipe.summary()["results"]["call"]["who"], json!("bob"));
    }

    #[test]
    fn test_recipe_deps_resolve_errors() {
        let deps = Deps::new();
        assert!(deps.is_empty());
        assert!(matches!(
            deps.resolve("provider.missing"),
            Err(AutomateError::DependencyNotFound { .. })
        ));
        assert!(deps.resolve("garbage").is_err());
        assert!(deps.resolve("template.x").is_err());
    }
}
