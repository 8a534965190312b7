//! The auction-start interceptor: enrich, apply, then resume.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use firstparty_shared::{
    AuctionRequest, ConfigSource, Context, DEFAULT_HOOK_PRIORITY, ModuleConfig, Ortb2Fragments,
};

use crate::host::{BeforeInterceptor, MODULE_NAME, Next};
use crate::pipeline::PipelineExecutor;

/// Wraps the auction-start extension point with an FPD pipeline run.
///
/// Per invocation the request moves through pending enrichment, merged,
/// and continuation invoked, each exactly once. There is no retry; with no
/// submodule timeout configured a submodule that never settles stalls the
/// request.
pub struct FpdInterceptor {
    executor: PipelineExecutor,
    config: Arc<dyn ConfigSource>,
    priority: i32,
}

impl FpdInterceptor {
    pub fn new(executor: PipelineExecutor, config: Arc<dyn ConfigSource>) -> Self {
        Self {
            executor,
            config,
            priority: DEFAULT_HOOK_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Priority this interceptor wants on the extension point.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// Compute the enriched context for a request's fragments.
    ///
    /// Reads the module config fresh and leaves `fragments` untouched.
    pub async fn enrich(&self, fragments: &Ortb2Fragments) -> Context {
        let config = ModuleConfig::load(self.config.as_ref());
        self.executor.run(&config, &fragments.context()).await
    }

    /// Enrich `req`, write the result onto its fragments, then hand it to `next`.
    #[instrument(
        skip_all,
        fields(auction_id = req.auction_id.as_deref().unwrap_or("-"))
    )]
    pub async fn handle<F, Fut>(&self, mut req: AuctionRequest, next: F) -> Fut::Output
    where
        F: FnOnce(AuctionRequest) -> Fut,
        Fut: Future,
    {
        let context = self.enrich(&req.ortb2_fragments).await;
        req.ortb2_fragments.apply(context);
        debug!(
            global_keys = req.ortb2_fragments.global.len(),
            bidders = req.ortb2_fragments.bidder.len(),
            "first-party data applied, resuming auction"
        );
        next(req).await
    }
}

#[async_trait]
impl BeforeInterceptor for FpdInterceptor {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    async fn intercept(&self, req: AuctionRequest, next: Next) {
        self.handle(req, next).await
    }
}

impl std::fmt::Debug for FpdInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FpdInterceptor")
            .field("executor", &self.executor)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
