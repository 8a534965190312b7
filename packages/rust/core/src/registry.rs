//! Submodule trait and the registry the pipeline reads from.
//!
//! Submodules are registered once at load time and live for the process
//! lifetime. The registry is constructor-injected so tests can build an
//! isolated one per case.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use firstparty_shared::{Context, ContextDelta, ModuleConfig, Result};

/// Priority assumed for submodules that do not declare one.
pub const DEFAULT_PRIORITY: i64 = 1;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A pluggable unit contributing a partial [`ContextDelta`].
#[async_trait]
pub trait Submodule: Send + Sync {
    /// Identifier used in diagnostics.
    fn name(&self) -> &str;

    /// Execution priority; lower runs earlier. `None` means [`DEFAULT_PRIORITY`].
    fn priority(&self) -> Option<i64> {
        None
    }

    /// Produce a delta from the accumulated context.
    ///
    /// An `Err` is logged by the pipeline and counts as no contribution.
    async fn enrich(&self, config: &ModuleConfig, context: &Context) -> Result<ContextDelta>;
}

/// The priority the pipeline sorts by.
pub fn effective_priority(submodule: &dyn Submodule) -> i64 {
    submodule.priority().unwrap_or(DEFAULT_PRIORITY)
}

// ---------------------------------------------------------------------------
// Closure-backed submodule
// ---------------------------------------------------------------------------

/// A submodule built from a name and an async closure.
///
/// The closure receives owned copies of the config and the accumulated
/// context, so the returned future is free of borrows.
pub struct FnSubmodule<F> {
    name: String,
    priority: Option<i64>,
    func: F,
}

impl<F, Fut> FnSubmodule<F>
where
    F: Fn(ModuleConfig, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ContextDelta>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            priority: None,
            func,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[async_trait]
impl<F, Fut> Submodule for FnSubmodule<F>
where
    F: Fn(ModuleConfig, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ContextDelta>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Option<i64> {
        self.priority
    }

    async fn enrich(&self, config: &ModuleConfig, context: &Context) -> Result<ContextDelta> {
        (self.func)(config.clone(), context.clone()).await
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registration callback handed to the host's module registry.
pub type Registrar = Arc<dyn Fn(Arc<dyn Submodule>) + Send + Sync>;

/// Holds registered submodules in registration order.
#[derive(Default)]
pub struct SubmoduleRegistry {
    submodules: RwLock<Vec<Arc<dyn Submodule>>>,
}

impl SubmoduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a submodule. No de-duplication and no shape checks.
    pub fn register(&self, submodule: Arc<dyn Submodule>) {
        tracing::debug!(
            submodule = submodule.name(),
            priority = effective_priority(submodule.as_ref()),
            "registered FPD submodule"
        );
        self.submodules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(submodule);
    }

    /// Remove every submodule. Meant for test isolation.
    pub fn reset(&self) {
        self.submodules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Registration-ordered copy of the current submodules.
    pub fn snapshot(&self) -> Vec<Arc<dyn Submodule>> {
        self.submodules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.submodules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// A callback that registers into this registry.
    pub fn registrar(self: &Arc<Self>) -> Registrar {
        let registry = Arc::clone(self);
        Arc::new(move |submodule| registry.register(submodule))
    }
}

impl std::fmt::Debug for SubmoduleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmoduleRegistry")
            .field("submodules", &self.names())
            .finish()
    }
}
