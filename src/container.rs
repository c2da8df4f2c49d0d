//! Containers: lazy resolution of named instances
//!
//! A container owns an instance cache, the configuration that wires instances
//! together, and the release operations collected from scoped acquisitions.
//! Instances are constructed on first request and memoized; construction
//! recurses through configured parameters, declared defaults and implicit
//! wiring by parameter name. A build stack detects dependency cycles and
//! feeds error messages.
//!
//! The engine is written once, in suspending form. [`AsyncContainer`] exposes
//! it directly; the blocking [`Container`] polls each resolution exactly once
//! and reports [`DiError::WouldSuspend`] if it was not immediately ready,
//! which cannot happen for implementations prepared by a blocking registry.
//!
//! Containers take `&mut self` for every resolving call. Exclusive access is
//! the concurrency contract: one logical thread drives a container at a time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::config::{ContainerConfig, InstanceConfig};
use crate::deferred::Deferred;
use crate::error::{DiError, Result};
use crate::factory::Parameter;
use crate::prepare::{Prepared, ReleaseFn};
use crate::value::{Params, TypeSpec, Value};

// =============================================================================
// Resolution engine
// =============================================================================

struct Engine {
    impls: Arc<IndexMap<String, Prepared>>,
    config: ContainerConfig,
    instances: HashMap<String, Value>,
    /// Names with construction in flight; hitting one again is a cycle.
    /// Shared so a dropped in-flight resolution can still remove its entry.
    building: Arc<Mutex<HashSet<String>>>,
    /// Pending releases in acquisition order; teardown runs them reversed
    releases: Vec<ReleaseFn>,
}

/// Clears the in-flight marker for one instance name when construction
/// ends, whether it completed, failed, or the resolution future was dropped
/// mid-await.
struct BuildGuard {
    building: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        lock_building(&self.building).remove(&self.name);
    }
}

fn lock_building(building: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    // The set is only ever touched from the single thread driving the
    // container; a poisoned lock just means that thread panicked earlier.
    building.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Engine {
    fn new(impls: Arc<IndexMap<String, Prepared>>, config: ContainerConfig) -> Self {
        Self {
            impls,
            config,
            instances: HashMap::new(),
            building: Arc::new(Mutex::new(HashSet::new())),
            releases: Vec::new(),
        }
    }

    fn inject(&mut self, instances: Vec<(String, Value)>) -> Result<()> {
        for (name, _) in &instances {
            if self.instances.contains_key(name) {
                return Err(DiError::AlreadyInjected { name: name.clone() });
            }
        }

        for (name, value) in instances {
            tracing::debug!(target: "conject", instance = %name, "injected instance");
            self.instances.insert(name, value);
        }

        Ok(())
    }

    /// Top-level resolution: strips the skip-validation wrapper and applies
    /// the caller's optional type check.
    async fn resolve_entry(&mut self, name: &str, check: Option<&TypeSpec>) -> Result<Value> {
        let mut stack = Vec::new();
        let value = self.resolve_raw(name, &mut stack, false).await?;

        let (value, skip) = value.into_checked_or_inner();
        if skip {
            return Ok(value);
        }

        match check {
            None => Ok(value),
            Some(spec) => {
                spec.validate(value)
                    .map_err(|mismatch| DiError::InvalidInstanceType {
                        instance: name.to_owned(),
                        expected: mismatch.expected,
                        value: mismatch.value,
                    })
            }
        }
    }

    /// Walk the dependency graph of `name` without invoking any factory.
    async fn probe(&mut self, name: &str) -> Result<()> {
        let mut stack = Vec::new();
        self.resolve_raw(name, &mut stack, true).await.map(|_| ())
    }

    /// Resolve values for a free-standing parameter list, as if a factory
    /// with those parameters were being constructed.
    async fn factory_params(&mut self, parameters: &[Parameter]) -> Result<Params> {
        let mut stack = Vec::new();
        let mut out = Params::new();
        for param in parameters {
            let value = self
                .param_value("factory", param, None, &mut stack, false)
                .await?;
            out.insert(param.name().to_owned(), value);
        }
        Ok(out)
    }

    fn resolve_raw<'a>(
        &'a mut self,
        name: &'a str,
        stack: &'a mut Vec<String>,
        dry_run: bool,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            stack.push(name.to_owned());
            let result = self.resolve_cached(name, stack, dry_run).await;
            stack.pop();
            result
        }
        .boxed()
    }

    async fn resolve_cached(
        &mut self,
        name: &str,
        stack: &mut Vec<String>,
        dry_run: bool,
    ) -> Result<Value> {
        if let Some(value) = self.instances.get(name) {
            tracing::trace!(target: "conject", instance = name, "cache hit");
            return Ok(value.clone());
        }

        if !lock_building(&self.building).insert(name.to_owned()) {
            return Err(DiError::DependencyCycle {
                stack: stack.clone(),
            });
        }
        let _guard = BuildGuard {
            building: Arc::clone(&self.building),
            name: name.to_owned(),
        };

        let result = self.construct(name, stack, dry_run).await;

        // Probes and failures leave no trace in the cache
        if let Ok(value) = &result {
            if !dry_run {
                self.instances.insert(name.to_owned(), value.clone());
            }
        }

        result
    }

    async fn construct(
        &mut self,
        name: &str,
        stack: &mut Vec<String>,
        dry_run: bool,
    ) -> Result<Value> {
        let inst_config = self
            .config
            .get(name)
            .cloned()
            .unwrap_or_else(|| InstanceConfig::new(name));

        let Some(prepared) = self.impls.get(inst_config.impl_name()).cloned() else {
            return Err(DiError::MissingValue {
                stack: stack.clone(),
            });
        };

        tracing::debug!(
            target: "conject",
            instance = name,
            implementation = %prepared.name,
            dry_run,
            "constructing instance"
        );

        let mut params = Params::new();
        for (param_name, param) in prepared.params.iter() {
            let configured = inst_config.parameters().get(param_name);
            let value = self
                .param_value(name, param, configured, stack, dry_run)
                .await?;
            params.insert(param_name.clone(), value);
        }

        if dry_run {
            return Ok(Value::Null);
        }

        let acquired = (prepared.acquire)(params).await?;
        if let Some(release) = acquired.release {
            self.releases.push(release);
        }

        Ok(acquired.value)
    }

    /// One parameter value, in precedence order: configured value, declared
    /// default, then an instance with the parameter's own name.
    async fn param_value(
        &mut self,
        instance: &str,
        param: &Parameter,
        configured: Option<&Deferred>,
        stack: &mut Vec<String>,
        dry_run: bool,
    ) -> Result<Value> {
        let raw = match configured {
            Some(deferred) => {
                let mut resolved = HashMap::new();
                for dep in deferred.deps() {
                    let value = self.resolve_dep(&dep, stack, dry_run).await?;
                    resolved.insert(dep, value);
                }
                if dry_run {
                    return Ok(Value::Null);
                }
                deferred.eval(&resolved)?
            }
            None => match param.default() {
                Some(value) => value.clone(),
                None => self.resolve_raw(param.name(), stack, dry_run).await?,
            },
        };

        let (value, skip) = raw.into_checked_or_inner();
        if skip || dry_run {
            return Ok(value);
        }

        param
            .type_spec()
            .validate(value)
            .map_err(|mismatch| DiError::InvalidImplParam {
                instance: instance.to_owned(),
                param: param.name().to_owned(),
                expected: mismatch.expected,
                value: mismatch.value,
            })
    }

    async fn resolve_dep(
        &mut self,
        name: &str,
        stack: &mut Vec<String>,
        dry_run: bool,
    ) -> Result<Value> {
        let value = self.resolve_raw(name, stack, dry_run).await?;
        let (value, _) = value.into_checked_or_inner();
        Ok(value)
    }

    /// Run every pending release in reverse acquisition order. Failures are
    /// logged, remaining releases still run, and the first error is returned.
    async fn close(&mut self) -> Result<()> {
        let mut first_err = None;
        while let Some(release) = self.releases.pop() {
            if let Err(err) = release().await {
                tracing::error!(target: "conject", error = %err, "release failed during teardown");
                first_err.get_or_insert(err);
            }
        }
        self.instances.clear();
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

// =============================================================================
// Blocking container
// =============================================================================

/// A container whose factories never suspend.
///
/// Obtained from [`DepSpec::start_container`](crate::registry::DepSpec::start_container).
/// Dropping the container releases everything it acquired; call
/// [`Container::close`] to observe release errors instead.
pub struct Container {
    engine: Engine,
}

impl Container {
    pub(crate) fn new(impls: Arc<IndexMap<String, Prepared>>, config: ContainerConfig) -> Self {
        Self {
            engine: Engine::new(impls, config),
        }
    }

    /// Resolve the named instance, constructing it and its dependencies
    /// on first use.
    pub fn get(&mut self, name: &str) -> Result<Value> {
        block_on(name, self.engine.resolve_entry(name, None))
    }

    /// Resolve the named instance and require it to match `spec`.
    pub fn get_checked(&mut self, name: &str, spec: &TypeSpec) -> Result<Value> {
        block_on(name, self.engine.resolve_entry(name, Some(spec)))
    }

    /// Verify the named instance could be constructed, without constructing
    /// anything: every dependency is reachable and every required parameter
    /// has a source.
    pub fn ensure_constructible(&mut self, name: &str) -> Result<()> {
        block_on(name, self.engine.probe(name))
    }

    /// Resolve values for an arbitrary parameter list against this container.
    pub fn get_params(&mut self, parameters: &[Parameter]) -> Result<Params> {
        block_on("factory", self.engine.factory_params(parameters))
    }

    /// Seed already-built instances into the cache. All names are checked
    /// before any is inserted.
    pub fn inject(
        &mut self,
        instances: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<()> {
        self.engine.inject(instances.into_iter().collect())
    }

    /// Release everything acquired so far, in reverse acquisition order.
    pub fn close(&mut self) -> Result<()> {
        block_on("container", self.engine.close())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("instances", &self.engine.instances.len())
            .field("pending_releases", &self.engine.releases.len())
            .finish()
    }
}

/// Poll a future produced by a blocking registry's implementations; they
/// complete without suspending, so a single poll resolves them.
fn block_on<T>(name: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match fut.now_or_never() {
        Some(result) => result,
        None => Err(DiError::WouldSuspend {
            name: name.to_owned(),
        }),
    }
}

// =============================================================================
// Suspending container
// =============================================================================

/// A container whose factories may suspend.
///
/// Obtained from
/// [`AsyncDepSpec::start_container`](crate::registry::AsyncDepSpec::start_container).
/// Call [`AsyncContainer::close`] before dropping; `Drop` can only run
/// releases that complete without suspending and warns about the rest.
pub struct AsyncContainer {
    engine: Engine,
}

impl AsyncContainer {
    pub(crate) fn new(impls: Arc<IndexMap<String, Prepared>>, config: ContainerConfig) -> Self {
        Self {
            engine: Engine::new(impls, config),
        }
    }

    /// Resolve the named instance, constructing it and its dependencies
    /// on first use.
    pub async fn get(&mut self, name: &str) -> Result<Value> {
        self.engine.resolve_entry(name, None).await
    }

    /// Resolve the named instance and require it to match `spec`.
    pub async fn get_checked(&mut self, name: &str, spec: &TypeSpec) -> Result<Value> {
        self.engine.resolve_entry(name, Some(spec)).await
    }

    /// Verify the named instance could be constructed, without constructing
    /// anything.
    pub async fn ensure_constructible(&mut self, name: &str) -> Result<()> {
        self.engine.probe(name).await
    }

    /// Resolve values for an arbitrary parameter list against this container.
    pub async fn get_params(&mut self, parameters: &[Parameter]) -> Result<Params> {
        self.engine.factory_params(parameters).await
    }

    /// Seed already-built instances into the cache. All names are checked
    /// before any is inserted.
    pub fn inject(
        &mut self,
        instances: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<()> {
        self.engine.inject(instances.into_iter().collect())
    }

    /// Release everything acquired so far, in reverse acquisition order.
    pub async fn close(&mut self) -> Result<()> {
        self.engine.close().await
    }
}

impl Drop for AsyncContainer {
    fn drop(&mut self) {
        while let Some(release) = self.engine.releases.pop() {
            match release().now_or_never() {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    tracing::warn!(target: "conject", error = %err, "release failed while dropping container");
                }
                None => {
                    tracing::warn!(
                        target: "conject",
                        "release suspended while dropping container; call close() first"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for AsyncContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncContainer")
            .field("instances", &self.engine.instances.len())
            .field("pending_releases", &self.engine.releases.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::InstanceConfig;
    use crate::factory::{Factory, GeneratorIter, Parameter};
    use crate::prepare::{Discipline, prepare};
    use crate::value::TypeSpec;

    fn container(factories: Vec<Factory>, config: ContainerConfig) -> Container {
        let mut impls = IndexMap::new();
        for factory in factories {
            let prepared = prepare(factory, Discipline::Blocking).unwrap();
            impls.insert(prepared.name.clone(), prepared);
        }
        Container::new(Arc::new(impls), config)
    }

    fn return_7() -> Factory {
        Factory::function("return_7", |_| Ok(Value::Int(7)))
    }

    fn return_sum() -> Factory {
        Factory::function("return_sum", |p| {
            Ok(Value::Int(p.int("first")? + p.int("second")?))
        })
        .param(Parameter::new("first").of_type(TypeSpec::Int))
        .param(Parameter::new("second").of_type(TypeSpec::Int).with_default(10))
    }

    #[test]
    fn configured_instance_resolves() {
        let config = ContainerConfig::new().instance(
            "sum_inst",
            InstanceConfig::new("return_sum")
                .with("first", Deferred::reference("first_arg"))
                .with("second", 1),
        );
        let mut container = container(
            vec![
                return_7(),
                return_sum(),
                Factory::value("first_arg", 7),
            ],
            config,
        );

        assert_eq!(container.get("sum_inst").unwrap(), Value::Int(8));
    }

    #[test]
    fn unconfigured_name_falls_back_to_impl() {
        let mut container = container(vec![return_7()], ContainerConfig::new());
        assert_eq!(container.get("return_7").unwrap(), Value::Int(7));
    }

    #[test]
    fn instances_are_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = Factory::function("counted", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(1))
        });
        let mut container = container(vec![factory], ContainerConfig::new());

        container.get("counted").unwrap();
        container.get("counted").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn implicit_wiring_by_param_name() {
        let factory = Factory::function("uses_dep", |p| Ok(Value::Int(p.int("return_7")? + 10)))
            .param(Parameter::new("return_7"));
        let mut container = container(vec![factory, return_7()], ContainerConfig::new());

        assert_eq!(container.get("uses_dep").unwrap(), Value::Int(17));
    }

    #[test]
    fn default_takes_precedence_over_implicit_wiring() {
        let factory = Factory::function("prefers_default", |p| p.get("return_7").cloned().ok_or_else(|| "missing".into()))
            .param(Parameter::new("return_7").with_default(1));
        let mut container = container(vec![factory, return_7()], ContainerConfig::new());

        assert_eq!(container.get("prefers_default").unwrap(), Value::Int(1));
    }

    #[test]
    fn missing_single_name() {
        let mut container = container(vec![], ContainerConfig::new());
        let err = container.get("ghost").unwrap_err();
        assert!(matches!(err, DiError::MissingValue { ref stack } if stack == &["ghost"]));
    }

    #[test]
    fn missing_param_reports_build_chain() {
        let mut container = container(vec![return_sum()], ContainerConfig::new());
        let err = container.get("return_sum").unwrap_err();
        let DiError::MissingValue { stack } = err else {
            panic!("expected MissingValue");
        };
        assert_eq!(stack, ["return_sum", "first"]);
    }

    #[test]
    fn cycle_detected_with_stack() {
        let a = Factory::function("a", |_| Ok(Value::Null)).param(Parameter::new("b"));
        let b = Factory::function("b", |_| Ok(Value::Null)).param(Parameter::new("a"));
        let mut container = container(vec![a, b], ContainerConfig::new());

        let err = container.get("a").unwrap_err();
        let DiError::DependencyCycle { stack } = err else {
            panic!("expected DependencyCycle");
        };
        assert_eq!(stack, ["a", "b", "a"]);
    }

    #[test]
    fn failed_construction_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let factory = Factory::function("flaky", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("first attempt fails".into())
            } else {
                Ok(Value::Int(1))
            }
        });
        let mut container = container(vec![factory], ContainerConfig::new());

        assert!(container.get("flaky").is_err());
        assert_eq!(container.get("flaky").unwrap(), Value::Int(1));
    }

    #[test]
    fn dry_run_constructs_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = Factory::function("counted", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(1))
        });
        let dep = Factory::function("uses_counted", |p| p.get("counted").cloned().ok_or_else(|| "missing".into()))
            .param(Parameter::new("counted"));
        let mut container = container(vec![factory, dep], ContainerConfig::new());

        container.ensure_constructible("uses_counted").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dry_run_still_reports_missing_values() {
        let factory = Factory::function("needs", |_| Ok(Value::Null)).param(Parameter::new("ghost"));
        let mut container = container(vec![factory], ContainerConfig::new());

        let err = container.ensure_constructible("needs").unwrap_err();
        assert!(matches!(err, DiError::MissingValue { .. }));
    }

    #[test]
    fn param_type_enforced() {
        let config = ContainerConfig::new().instance(
            "sum_inst",
            InstanceConfig::new("return_sum").with("first", "seven"),
        );
        let mut container = container(vec![return_sum()], config);

        let err = container.get("sum_inst").unwrap_err();
        let DiError::InvalidImplParam {
            instance, param, ..
        } = err
        else {
            panic!("expected InvalidImplParam");
        };
        assert_eq!(instance, "sum_inst");
        assert_eq!(param, "first");
    }

    #[test]
    fn unchecked_values_skip_param_validation() {
        let factory = Factory::function("takes_int", |p| Ok(p.get("first").cloned().unwrap()))
            .param(Parameter::new("first").of_type(TypeSpec::Int));
        let config = ContainerConfig::new().instance(
            "takes_int",
            InstanceConfig::new("takes_int").with("first", Value::unchecked("one")),
        );
        let mut container = container(vec![factory], config);

        assert_eq!(container.get("takes_int").unwrap(), Value::from("one"));
    }

    #[test]
    fn implicit_unchecked_instance_skips_validation() {
        let source = Factory::value("first", Value::unchecked("one"));
        let factory = Factory::function("takes_int", |p| Ok(p.get("first").cloned().unwrap()))
            .param(Parameter::new("first").of_type(TypeSpec::Int));
        let mut container = container(vec![source, factory], ContainerConfig::new());

        assert_eq!(container.get("takes_int").unwrap(), Value::from("one"));
    }

    #[test]
    fn get_checked_validates_instance_type() {
        let mut container = container(vec![return_7()], ContainerConfig::new());

        assert!(container.get_checked("return_7", &TypeSpec::Int).is_ok());
        let err = container
            .get_checked("return_7", &TypeSpec::Map)
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidInstanceType { .. }));
    }

    #[test]
    fn inject_seeds_cache_and_rejects_duplicates() {
        let mut container = container(vec![], ContainerConfig::new());
        container
            .inject([("seeded".to_owned(), Value::Int(3))])
            .unwrap();
        assert_eq!(container.get("seeded").unwrap(), Value::Int(3));

        let err = container
            .inject([("seeded".to_owned(), Value::Int(4))])
            .unwrap_err();
        assert!(matches!(err, DiError::AlreadyInjected { .. }));
    }

    #[test]
    fn inject_is_all_or_nothing() {
        let mut container = container(vec![], ContainerConfig::new());
        container.inject([("a".to_owned(), Value::Int(1))]).unwrap();

        let err = container
            .inject([
                ("b".to_owned(), Value::Int(2)),
                ("a".to_owned(), Value::Int(3)),
            ])
            .unwrap_err();
        assert!(matches!(err, DiError::AlreadyInjected { .. }));
        assert!(matches!(
            container.get("b").unwrap_err(),
            DiError::MissingValue { .. }
        ));
    }

    #[test]
    fn get_params_resolves_free_parameter_list() {
        let mut container = container(vec![return_7()], ContainerConfig::new());
        let params = [
            Parameter::new("return_7"),
            Parameter::new("limit").with_default(5),
        ];
        let resolved = container.get_params(&params).unwrap();
        assert_eq!(resolved.int("return_7").unwrap(), 7);
        assert_eq!(resolved.int("limit").unwrap(), 5);
    }

    /// Generator yielding one value; the given closure runs when the
    /// sequence is finalized on release.
    fn tracked_generator(
        name: &'static str,
        value: i64,
        on_release: impl Fn() + Send + Sync + 'static,
    ) -> Factory {
        let on_release = Arc::new(on_release);
        Factory::generator(name, move |_| {
            let on_release = Arc::clone(&on_release);
            let mut yielded = false;
            let iter: GeneratorIter = Box::new(std::iter::from_fn(move || {
                if !yielded {
                    yielded = true;
                    Some(Ok(Value::Int(value)))
                } else {
                    on_release();
                    None
                }
            }));
            Ok(iter)
        })
    }

    #[test]
    fn teardown_runs_in_reverse_acquisition_order() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let log_outer = Arc::clone(&log);
        let outer = tracked_generator("outer", 1, move || {
            log_outer.lock().unwrap().push("outer released");
        });
        let log_inner = Arc::clone(&log);
        let inner = tracked_generator("inner", 2, move || {
            log_inner.lock().unwrap().push("inner released");
        });

        let mut container = container(vec![outer, inner], ContainerConfig::new());
        container.get("outer").unwrap();
        container.get("inner").unwrap();
        container.close().unwrap();

        assert_eq!(*log.lock().unwrap(), ["inner released", "outer released"]);
    }

    fn async_container(factories: Vec<Factory>) -> AsyncContainer {
        let mut impls = IndexMap::new();
        for factory in factories {
            let prepared = prepare(factory, Discipline::Cooperative).unwrap();
            impls.insert(prepared.name.clone(), prepared);
        }
        AsyncContainer::new(Arc::new(impls), ContainerConfig::new())
    }

    #[test]
    fn dropped_resolution_leaves_no_marker() {
        let stalled = Factory::async_function("slow", |_| futures::future::pending().boxed());
        let mut container = async_container(vec![stalled]);

        // Poll once, then drop the in-flight resolution
        assert!(container.get("slow").now_or_never().is_none());

        // The retry must suspend again instead of reporting a cycle
        assert!(container.get("slow").now_or_never().is_none());
    }

    #[test]
    fn dropped_resolution_does_not_poison_dependents() {
        let stalled = Factory::async_function("slow", |_| futures::future::pending().boxed());
        let dependent = Factory::function("uses_slow", |p| {
            p.get("slow").cloned().ok_or_else(|| "missing".into())
        })
        .param(Parameter::new("slow"));
        let mut container = async_container(vec![stalled, dependent]);

        assert!(container.get("uses_slow").now_or_never().is_none());
        assert!(container.get("uses_slow").now_or_never().is_none());
    }

    #[test]
    fn blocking_facade_reports_suspension() {
        // A suspending implementation can only reach a blocking container
        // when prepared for the cooperative discipline by hand; the facade's
        // single poll must surface the suspension as an error.
        let prepared = prepare(
            Factory::async_function("stalled", |_| futures::future::pending().boxed()),
            Discipline::Cooperative,
        )
        .unwrap();
        let mut impls = IndexMap::new();
        impls.insert(prepared.name.clone(), prepared);
        let mut container = Container::new(Arc::new(impls), ContainerConfig::new());

        let err = container.get("stalled").unwrap_err();
        assert!(matches!(err, DiError::WouldSuspend { name } if name == "stalled"));
    }

    #[test]
    fn close_runs_remaining_releases_after_failure() {
        let released = Arc::new(AtomicUsize::new(0));

        let failing = Factory::generator("failing", |_| {
            let iter: GeneratorIter = Box::new(
                [Ok(Value::Int(1)), Err::<Value, _>("release boom".into())].into_iter(),
            );
            Ok(iter)
        });
        let counter = Arc::clone(&released);
        let fine = tracked_generator("fine", 2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut container = container(vec![failing, fine], ContainerConfig::new());
        container.get("fine").unwrap();
        container.get("failing").unwrap();

        let err = container.close().unwrap_err();
        assert!(matches!(err, DiError::ReleaseFailed { .. }));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
