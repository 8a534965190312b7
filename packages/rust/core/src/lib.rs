//! First-party-data enrichment pipeline for FirstParty.
//!
//! This crate wires a registry of pluggable submodules into the host's
//! auction-start hook: each auction's `ortb2Fragments` are run through
//! every submodule in priority order before the auction proceeds.

pub mod bootstrap;
pub mod host;
pub mod interceptor;
pub mod pipeline;
pub mod registry;
pub mod submodules;

pub use bootstrap::{BootstrapOptions, FirstPartyData, bootstrap};
pub use host::{AUCTION_START, BeforeInterceptor, BoxFuture, Host, MODULE_NAME, Next};
pub use interceptor::FpdInterceptor;
pub use pipeline::{PipelineExecutor, PipelineOptions, PipelineRun, SubmoduleFailure};
pub use registry::{DEFAULT_PRIORITY, FnSubmodule, Registrar, Submodule, SubmoduleRegistry};
