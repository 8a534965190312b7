//! The contract FirstParty consumes from the host auction system.
//!
//! The host owns module registration, hook dispatch, and process-wide
//! configuration. This module only names what the FPD module needs from
//! each of them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use firstparty_shared::AuctionRequest;

pub use crate::registry::Registrar;
pub use firstparty_shared::ConfigSource;

/// Name the module registers under.
pub const MODULE_NAME: &str = "firstPartyData";

/// The auction-start extension point.
pub const AUCTION_START: &str = "startAuction";

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The wrapped continuation of an extension point.
///
/// Calling it resumes the host's pipeline with the (possibly mutated) request.
pub type Next = Box<dyn FnOnce(AuctionRequest) -> BoxFuture<'static, ()> + Send>;

/// A "before" interceptor on an extension point.
#[async_trait]
pub trait BeforeInterceptor: Send + Sync {
    /// Name for diagnostics.
    fn name(&self) -> &str;

    /// Handle one invocation. Must call `next` to let the request proceed.
    async fn intercept(&self, req: AuctionRequest, next: Next);
}

/// Registration facilities provided by the host.
pub trait Host: Send + Sync {
    /// Expose `registrar` under `name` so other modules can add submodules.
    fn register_module(&self, name: &str, registrar: Registrar);

    /// Register `interceptor` before the default behavior of `point`.
    ///
    /// Lower `priority` runs first among interceptors on the same point.
    fn before(&self, point: &str, interceptor: Arc<dyn BeforeInterceptor>, priority: i32);
}
