//! Module wiring: registry + executor + interceptor, installed on a host.

use std::sync::Arc;

use tracing::{info, instrument};

use firstparty_shared::{AppConfig, ConfigSource, Context, DEFAULT_HOOK_PRIORITY, ModuleConfig};

use crate::host::{AUCTION_START, BeforeInterceptor, Host, MODULE_NAME};
use crate::interceptor::FpdInterceptor;
use crate::pipeline::{PipelineExecutor, PipelineOptions};
use crate::registry::{Submodule, SubmoduleRegistry};

/// Settings that shape how the module is installed.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Priority of the interceptor on [`AUCTION_START`].
    pub hook_priority: i32,
    /// Executor options.
    pub pipeline: PipelineOptions,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            hook_priority: DEFAULT_HOOK_PRIORITY,
            pipeline: PipelineOptions::default(),
        }
    }
}

impl From<&AppConfig> for BootstrapOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            hook_priority: config.hook.priority,
            pipeline: PipelineOptions::from(&config.pipeline),
        }
    }
}

/// Handle to an FPD module instance.
///
/// Exposes the same surface other modules and tests use: `register`,
/// `reset`, and a directly callable `run`.
#[derive(Clone)]
pub struct FirstPartyData {
    registry: Arc<SubmoduleRegistry>,
    interceptor: Arc<FpdInterceptor>,
    config: Arc<dyn ConfigSource>,
}

impl FirstPartyData {
    /// Build a module instance without installing it anywhere.
    pub fn new(config: Arc<dyn ConfigSource>, options: BootstrapOptions) -> Self {
        let registry = Arc::new(SubmoduleRegistry::new());
        let executor = PipelineExecutor::new(Arc::clone(&registry)).with_options(options.pipeline);
        let interceptor = FpdInterceptor::new(executor, Arc::clone(&config))
            .with_priority(options.hook_priority);

        Self {
            registry,
            interceptor: Arc::new(interceptor),
            config,
        }
    }

    /// Register the module and its interceptor with `host`.
    pub fn install(&self, host: &dyn Host) {
        host.register_module(MODULE_NAME, self.registry.registrar());

        let interceptor: Arc<dyn BeforeInterceptor> = self.interceptor.clone();
        host.before(AUCTION_START, interceptor, self.interceptor.priority());

        info!(
            module = MODULE_NAME,
            hook = AUCTION_START,
            priority = self.interceptor.priority(),
            "FPD module installed"
        );
    }

    pub fn register(&self, submodule: Arc<dyn Submodule>) {
        self.registry.register(submodule);
    }

    /// Clear all submodules. Test isolation only.
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// Run the pipeline outside the hook.
    ///
    /// A missing `config` is read from the config source; a missing
    /// `context` starts from empty mappings.
    pub async fn run(&self, config: Option<&ModuleConfig>, context: Option<&Context>) -> Context {
        let loaded;
        let config = match config {
            Some(config) => config,
            None => {
                loaded = ModuleConfig::load(self.config.as_ref());
                &loaded
            }
        };
        let empty = Context::default();
        let context = context.unwrap_or(&empty);

        self.interceptor.executor().run(config, context).await
    }

    pub fn registry(&self) -> &Arc<SubmoduleRegistry> {
        &self.registry
    }

    pub fn interceptor(&self) -> Arc<FpdInterceptor> {
        Arc::clone(&self.interceptor)
    }
}

impl std::fmt::Debug for FirstPartyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirstPartyData")
            .field("registry", &self.registry)
            .field("interceptor", &self.interceptor)
            .finish_non_exhaustive()
    }
}

/// Create the module and install it on `host`.
///
/// Calling this twice installs two independent modules.
#[instrument(skip_all, fields(priority = options.hook_priority))]
pub fn bootstrap(
    host: &dyn Host,
    config: Arc<dyn ConfigSource>,
    options: BootstrapOptions,
) -> FirstPartyData {
    let module = FirstPartyData::new(config, options);
    module.install(host);
    module
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry::FnSubmodule;
    use firstparty_shared::{ContextDelta, SharedConfig};

    #[test]
    fn options_follow_app_config() {
        let mut app = AppConfig::default();
        app.hook.priority = 42;
        app.pipeline.submodule_timeout_ms = Some(10);

        let options = BootstrapOptions::from(&app);
        assert_eq!(options.hook_priority, 42);
        assert!(options.pipeline.submodule_timeout.is_some());
    }

    #[tokio::test]
    async fn reset_then_run_returns_input() {
        let module = FirstPartyData::new(
            Arc::new(SharedConfig::default()),
            BootstrapOptions::default(),
        );
        module.register(Arc::new(FnSubmodule::new("wipe", |_config, _context| async {
            Ok(ContextDelta::none().with_global(Default::default()))
        })));
        module.reset();

        let initial: Context = serde_json::from_value(json!({"global": {"k": 1}})).unwrap();
        let out = module.run(None, Some(&initial)).await;

        assert_eq!(out.global["k"], json!(1));
        assert!(out.bidder.is_empty());
    }

    #[test]
    fn interceptor_shares_the_module_registry() {
        let module = FirstPartyData::new(
            Arc::new(SharedConfig::default()),
            BootstrapOptions {
                hook_priority: 7,
                ..BootstrapOptions::default()
            },
        );
        let interceptor = module.interceptor();
        assert_eq!(interceptor.priority(), 7);

        module.register(Arc::new(FnSubmodule::new("noop", |_config, _context| async {
            Ok(ContextDelta::none())
        })));
        assert_eq!(interceptor.executor().registry().names(), vec!["noop"]);
    }

    #[tokio::test]
    async fn run_without_arguments_starts_empty() {
        let module = FirstPartyData::new(
            Arc::new(SharedConfig::default()),
            BootstrapOptions::default(),
        );
        let out = module.run(None, None).await;
        assert_eq!(out, Context::default());
    }
}
