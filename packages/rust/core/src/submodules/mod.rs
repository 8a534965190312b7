//! Built-in FPD submodules.
//!
//! `enrichments` fills page-derived defaults; `validation` runs after it
//! and drops malformed entries. Either can be switched off through the
//! `skipEnrichments` / `skipValidations` config keys.

mod enrichment;
mod validation;

use std::sync::Arc;

pub use enrichment::{EnrichmentSubmodule, PageInfo};
pub use validation::ValidationSubmodule;

use crate::registry::Submodule;

/// The built-in submodules, in registration order.
pub fn builtin(page: PageInfo) -> Vec<Arc<dyn Submodule>> {
    vec![
        Arc::new(EnrichmentSubmodule::new(page)),
        Arc::new(ValidationSubmodule),
    ]
}
