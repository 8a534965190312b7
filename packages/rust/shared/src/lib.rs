//! Shared types, error model, and configuration for FirstParty.
//!
//! This crate is the foundation depended on by all other FirstParty crates.
//! It provides:
//! - [`FpdError`] — the unified error type
//! - Domain types ([`Context`], [`ContextDelta`], [`Ortb2Fragments`], [`AuctionRequest`])
//! - Configuration ([`AppConfig`], [`ModuleConfig`], [`ConfigSource`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CONFIG_NAMESPACE, ConfigSource, DEFAULT_HOOK_PRIORITY, HookConfig, ModuleConfig,
    PipelineConfig, SharedConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{FpdError, Result};
pub use types::{AuctionRequest, Context, ContextDelta, FpdMap, Ortb2Fragments};
