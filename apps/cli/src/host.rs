//! In-process host used by the CLI to drive an auction start.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use color_eyre::eyre::{Result, eyre};
use firstparty_core::{BeforeInterceptor, BoxFuture, Host, Next, Registrar};
use firstparty_shared::AuctionRequest;
use tracing::debug;

type Hook = (i32, Arc<dyn BeforeInterceptor>);

/// Records registered modules and hooks; runs a hook chain on demand.
#[derive(Default)]
pub(crate) struct LocalHost {
    modules: Mutex<HashMap<String, Registrar>>,
    hooks: Mutex<HashMap<String, Vec<Hook>>>,
}

impl Host for LocalHost {
    fn register_module(&self, name: &str, registrar: Registrar) {
        debug!(module = name, "module registered");
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), registrar);
    }

    fn before(&self, point: &str, interceptor: Arc<dyn BeforeInterceptor>, priority: i32) {
        debug!(point, interceptor = interceptor.name(), priority, "hook registered");
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(point.to_string())
            .or_default()
            .push((priority, interceptor));
    }
}

impl LocalHost {
    /// The registration callback a module exposed under `name`.
    pub(crate) fn registrar(&self, name: &str) -> Result<Registrar> {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| eyre!("no module registered as '{name}'"))
    }

    /// Run every before-interceptor of `point`, lowest priority first, and
    /// return the request that reached the end of the chain.
    pub(crate) async fn run(&self, point: &str, req: AuctionRequest) -> Result<AuctionRequest> {
        let mut chain = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(point)
            .cloned()
            .unwrap_or_default();
        chain.sort_by_key(|(priority, _)| *priority);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut next: Next = Box::new(move |req| {
            Box::pin(async move {
                let _ = tx.send(req);
            }) as BoxFuture<'static, ()>
        });
        for (_, interceptor) in chain.into_iter().rev() {
            let inner = next;
            next = Box::new(move |req| {
                Box::pin(async move { interceptor.intercept(req, inner).await })
                    as BoxFuture<'static, ()>
            });
        }

        next(req).await;
        rx.await
            .map_err(|_| eyre!("'{point}' interceptor chain ended without resuming the request"))
    }
}
