//! Sequential FPD pipeline: registry → priority order → fold → merged context.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, error, info, instrument};

use firstparty_shared::{Context, ContextDelta, FpdError, ModuleConfig, PipelineConfig, Result};

use crate::registry::{Submodule, SubmoduleRegistry, effective_priority};

/// Runtime options for a [`PipelineExecutor`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Bound on each submodule. `None` waits for as long as the submodule takes.
    pub submodule_timeout: Option<Duration>,
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            submodule_timeout: config.submodule_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// A submodule that failed during a run. Its contribution was dropped.
#[derive(Debug)]
pub struct SubmoduleFailure {
    pub name: String,
    pub error: FpdError,
}

/// Everything a single run produced.
#[derive(Debug)]
pub struct PipelineRun {
    /// The merged context.
    pub context: Context,
    /// Submodule names in the order they ran.
    pub executed: Vec<String>,
    /// Failures, in the order they happened.
    pub failures: Vec<SubmoduleFailure>,
}

/// Runs every registered submodule over a context.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    registry: Arc<SubmoduleRegistry>,
    options: PipelineOptions,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<SubmoduleRegistry>) -> Self {
        Self {
            registry,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<SubmoduleRegistry> {
        &self.registry
    }

    /// Run the pipeline and return the merged context.
    ///
    /// Never fails: submodule errors are logged and skipped. `initial` is
    /// left untouched.
    pub async fn run(&self, config: &ModuleConfig, initial: &Context) -> Context {
        self.run_with_report(config, initial).await.context
    }

    /// Run the pipeline and keep the execution order and failures.
    ///
    /// 1. Snapshot the registry
    /// 2. Stable sort by priority (ties keep registration order)
    /// 3. Invoke each submodule in turn on the accumulator, merging its delta
    #[instrument(skip_all, fields(submodules = tracing::field::Empty))]
    pub async fn run_with_report(&self, config: &ModuleConfig, initial: &Context) -> PipelineRun {
        let start = Instant::now();

        let mut ordered = self.registry.snapshot();
        ordered.sort_by_key(|s| effective_priority(s.as_ref()));
        tracing::Span::current().record("submodules", ordered.len());

        let mut context = initial.clone();
        let mut executed = Vec::with_capacity(ordered.len());
        let mut failures = Vec::new();

        for submodule in &ordered {
            let name = submodule.name().to_string();
            debug!(
                submodule = %name,
                priority = effective_priority(submodule.as_ref()),
                "running FPD submodule"
            );

            let delta = match self.invoke(submodule.as_ref(), config, &context).await {
                Ok(delta) => delta,
                Err(e) => {
                    error!(submodule = %name, error = %e, "error in FPD submodule");
                    failures.push(SubmoduleFailure {
                        name: name.clone(),
                        error: e,
                    });
                    ContextDelta::none()
                }
            };

            context.merge(delta);
            executed.push(name);
        }

        info!(
            executed = executed.len(),
            failed = failures.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "FPD pipeline complete"
        );

        PipelineRun {
            context,
            executed,
            failures,
        }
    }

    /// Await one submodule, applying the configured bound if any.
    ///
    /// A panic inside the submodule is caught and reported as
    /// [`FpdError::Panicked`].
    async fn invoke(
        &self,
        submodule: &dyn Submodule,
        config: &ModuleConfig,
        context: &Context,
    ) -> Result<ContextDelta> {
        let guarded = AssertUnwindSafe(async { submodule.enrich(config, context).await })
            .catch_unwind();
        let fut = async {
            guarded.await.unwrap_or_else(|payload| {
                Err(FpdError::Panicked {
                    name: submodule.name().to_string(),
                    message: panic_message(payload.as_ref()),
                })
            })
        };

        match self.options.submodule_timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| FpdError::Timeout {
                    name: submodule.name().to_string(),
                    after,
                })?,
            None => fut.await,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use super::*;
    use crate::registry::FnSubmodule;
    use firstparty_shared::FpdMap;

    fn map(value: Value) -> FpdMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn ctx(value: Value) -> Context {
        serde_json::from_value(value).unwrap()
    }

    fn returning(name: &str, priority: Option<i64>, delta: ContextDelta) -> Arc<dyn Submodule> {
        let sub = FnSubmodule::new(name, move |_config, _context| {
            let delta = delta.clone();
            async move { Ok(delta) }
        });
        match priority {
            Some(p) => Arc::new(sub.with_priority(p)),
            None => Arc::new(sub),
        }
    }

    fn failing(name: &str, priority: Option<i64>) -> Arc<dyn Submodule> {
        let owned = name.to_string();
        let sub = FnSubmodule::new(name, move |_config, _context| {
            let owned = owned.clone();
            async move { Err(FpdError::submodule(owned, "boom")) }
        });
        match priority {
            Some(p) => Arc::new(sub.with_priority(p)),
            None => Arc::new(sub),
        }
    }

    fn recording(name: &str, priority: i64, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn Submodule> {
        let owned = name.to_string();
        Arc::new(
            FnSubmodule::new(name, move |_config, _context| {
                log.lock().unwrap().push(owned.clone());
                async { Ok(ContextDelta::none()) }
            })
            .with_priority(priority),
        )
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn executor(subs: Vec<Arc<dyn Submodule>>) -> PipelineExecutor {
        let registry = Arc::new(SubmoduleRegistry::new());
        for sub in subs {
            registry.register(sub);
        }
        PipelineExecutor::new(registry)
    }

    #[tokio::test]
    async fn empty_registry_returns_input() {
        let pipeline = executor(vec![]);
        let initial = ctx(json!({"global": {"a": 1}, "bidder": {}}));

        let first = pipeline.run(&ModuleConfig::default(), &initial).await;
        let second = pipeline.run(&ModuleConfig::default(), &first).await;

        assert_eq!(first, initial);
        assert_eq!(second, initial);
    }

    #[tokio::test]
    async fn missing_bidder_defaults_to_empty() {
        let pipeline = executor(vec![]);
        let out = pipeline
            .run(&ModuleConfig::default(), &ctx(json!({"global": {"k": 1}})))
            .await;
        assert_eq!(out.global, map(json!({"k": 1})));
        assert!(out.bidder.is_empty());
    }

    #[tokio::test]
    async fn global_is_replaced_not_merged() {
        let pipeline = executor(vec![returning(
            "g",
            None,
            ContextDelta::none().with_global(map(json!({"b": 2}))),
        )]);
        let out = pipeline
            .run(
                &ModuleConfig::default(),
                &ctx(json!({"global": {"a": 1}, "bidder": {"c": 3}})),
            )
            .await;
        assert_eq!(out, ctx(json!({"global": {"b": 2}, "bidder": {"c": 3}})));
    }

    #[tokio::test]
    async fn lower_priority_runs_first() {
        let pipeline = executor(vec![
            returning(
                "a",
                Some(2),
                ContextDelta::none().with_bidder(map(json!({"x": 1}))),
            ),
            returning(
                "b",
                Some(1),
                ContextDelta::none().with_global(map(json!({"y": 2}))),
            ),
        ]);

        let run = pipeline
            .run_with_report(&ModuleConfig::default(), &Context::default())
            .await;

        assert_eq!(run.executed, vec!["b", "a"]);
        assert_eq!(
            run.context,
            ctx(json!({"global": {"y": 2}, "bidder": {"x": 1}}))
        );
    }

    #[tokio::test]
    async fn ties_keep_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = executor(vec![
            recording("third", 3, log.clone()),
            recording("first-a", 1, log.clone()),
            recording("second", 2, log.clone()),
            recording("first-b", 1, log.clone()),
            recording("first-c", 1, log.clone()),
        ]);

        pipeline
            .run(&ModuleConfig::default(), &Context::default())
            .await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first-a", "first-b", "first-c", "second", "third"]
        );
    }

    #[tokio::test]
    async fn failure_is_isolated_and_reported() {
        let pipeline = executor(vec![
            failing("c", Some(1)),
            returning(
                "d",
                Some(1),
                ContextDelta::none().with_global(map(json!({"z": 3}))),
            ),
        ]);

        let run = pipeline
            .run_with_report(&ModuleConfig::default(), &Context::default())
            .await;

        assert_eq!(run.context, ctx(json!({"global": {"z": 3}, "bidder": {}})));
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].name, "c");
        assert_eq!(run.executed, vec!["c", "d"]);
    }

    #[tokio::test]
    async fn failure_logs_one_error_naming_the_submodule() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_ansi(false)
            .without_time()
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let pipeline = executor(vec![
            failing("c", Some(1)),
            returning(
                "d",
                Some(1),
                ContextDelta::none().with_global(map(json!({"z": 3}))),
            ),
        ]);
        pipeline
            .run(&ModuleConfig::default(), &Context::default())
            .await;

        let errors: Vec<String> = logs
            .lines()
            .into_iter()
            .filter(|line| line.contains("ERROR"))
            .collect();
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("submodule=c"), "{}", errors[0]);
    }

    #[tokio::test]
    async fn panic_is_isolated_like_an_error() {
        let panicking: Arc<dyn Submodule> = Arc::new(
            FnSubmodule::new("bad", |_config, _context| async {
                let empty: Vec<FpdMap> = Vec::new();
                Ok(ContextDelta::none().with_global(empty[0].clone()))
            })
            .with_priority(1),
        );
        let pipeline = executor(vec![
            panicking,
            returning(
                "good",
                Some(2),
                ContextDelta::none().with_global(map(json!({"ok": true}))),
            ),
        ]);

        let run = pipeline
            .run_with_report(&ModuleConfig::default(), &Context::default())
            .await;

        assert_eq!(run.executed, vec!["bad", "good"]);
        assert_eq!(run.context.global, map(json!({"ok": true})));
        assert_eq!(run.failures.len(), 1);
        assert!(matches!(
            &run.failures[0].error,
            FpdError::Panicked { name, .. } if name == "bad"
        ));
    }

    #[tokio::test]
    async fn failure_keeps_earlier_contributions() {
        let pipeline = executor(vec![
            returning(
                "early",
                Some(1),
                ContextDelta::none().with_bidder(map(json!({"rubicon": {"k": 1}}))),
            ),
            failing("late", Some(5)),
        ]);

        let out = pipeline
            .run(&ModuleConfig::default(), &Context::default())
            .await;

        assert_eq!(out.bidder, map(json!({"rubicon": {"k": 1}})));
        assert!(out.global.is_empty());
    }

    #[tokio::test]
    async fn every_submodule_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subs: Vec<Arc<dyn Submodule>> = (0..5)
            .map(|i| {
                let calls = calls.clone();
                let sub: Arc<dyn Submodule> = Arc::new(
                    FnSubmodule::new(format!("s{i}"), move |_config, _context| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async { Ok(ContextDelta::none()) }
                    })
                    .with_priority(5 - i),
                );
                sub
            })
            .chain([failing("bad", Some(0))])
            .collect();
        let pipeline = executor(subs);

        let run = pipeline
            .run_with_report(&ModuleConfig::default(), &Context::default())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(run.executed.len(), 6);
        assert_eq!(run.executed[0], "bad");
    }

    #[tokio::test]
    async fn later_submodules_see_earlier_output() {
        let pipeline = executor(vec![
            returning(
                "writer",
                Some(1),
                ContextDelta::none().with_global(map(json!({"site": {"page": "p"}}))),
            ),
            Arc::new(
                FnSubmodule::new("reader", |_config, context: Context| async move {
                    let mut bidder = FpdMap::new();
                    bidder.insert("seen".into(), context.global["site"]["page"].clone());
                    Ok(ContextDelta::none().with_bidder(bidder))
                })
                .with_priority(2),
            ),
        ]);

        let out = pipeline
            .run(&ModuleConfig::default(), &Context::default())
            .await;

        assert_eq!(out.bidder, map(json!({"seen": "p"})));
    }

    #[tokio::test]
    async fn config_is_passed_to_every_submodule() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &str| -> Arc<dyn Submodule> {
            let seen = seen.clone();
            Arc::new(FnSubmodule::new(name, move |config: ModuleConfig, _context| {
                seen.lock().unwrap().push(config.skip_validations);
                async { Ok(ContextDelta::none()) }
            }))
        };
        let pipeline = executor(vec![make("one"), make("two")]);
        let config = ModuleConfig {
            skip_validations: true,
            ..ModuleConfig::default()
        };

        pipeline.run(&config, &Context::default()).await;

        assert_eq!(*seen.lock().unwrap(), vec![true, true]);
    }

    #[tokio::test]
    async fn input_context_is_not_mutated() {
        let pipeline = executor(vec![returning(
            "g",
            None,
            ContextDelta::none().with_global(map(json!({"new": 1}))),
        )]);
        let initial = ctx(json!({"global": {"old": 1}}));
        let snapshot = initial.clone();

        let _ = pipeline.run(&ModuleConfig::default(), &initial).await;

        assert_eq!(initial, snapshot);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let hanging: Arc<dyn Submodule> =
            Arc::new(FnSubmodule::new("hang", |_config, _context| async {
                std::future::pending::<Result<ContextDelta>>().await
            }));
        let pipeline = executor(vec![
            hanging,
            returning(
                "after",
                Some(2),
                ContextDelta::none().with_global(map(json!({"ok": true}))),
            ),
        ])
        .with_options(PipelineOptions {
            submodule_timeout: Some(Duration::from_millis(20)),
        });

        let run = pipeline
            .run_with_report(&ModuleConfig::default(), &Context::default())
            .await;

        assert_eq!(run.context.global, map(json!({"ok": true})));
        assert_eq!(run.failures.len(), 1);
        assert!(matches!(run.failures[0].error, FpdError::Timeout { .. }));
    }

    #[test]
    fn options_from_pipeline_config() {
        let options = PipelineOptions::from(&PipelineConfig {
            submodule_timeout_ms: Some(150),
        });
        assert_eq!(options.submodule_timeout, Some(Duration::from_millis(150)));
        assert!(
            PipelineOptions::from(&PipelineConfig::default())
                .submodule_timeout
                .is_none()
        );
    }
}
