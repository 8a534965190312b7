//! Shape checks on the accumulated first-party data.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use firstparty_shared::{Context, ContextDelta, FpdMap, ModuleConfig, Result};

use crate::registry::Submodule;

/// Drops malformed entries before the data reaches bidders.
///
/// - `global`: top-level sections must be objects or arrays
/// - `bidder`: each bidder's entry must be an object, and its sections
///   follow the same rule as `global`
/// - inside object sections, `null` and empty-string values are removed
pub struct ValidationSubmodule;

#[async_trait]
impl Submodule for ValidationSubmodule {
    fn name(&self) -> &str {
        "validation"
    }

    fn priority(&self) -> Option<i64> {
        Some(2)
    }

    async fn enrich(&self, config: &ModuleConfig, context: &Context) -> Result<ContextDelta> {
        if config.skip_validations {
            return Ok(ContextDelta::none());
        }

        let global = clean_sections(&context.global);

        let bidder: FpdMap = context
            .bidder
            .iter()
            .filter_map(|(code, entry)| match entry {
                Value::Object(sections) => {
                    Some((code.clone(), Value::Object(clean_sections(sections))))
                }
                _ => {
                    debug!(bidder = %code, "dropping non-object bidder entry");
                    None
                }
            })
            .collect();

        let mut delta = ContextDelta::none();
        if global != context.global {
            delta = delta.with_global(global);
        }
        if bidder != context.bidder {
            delta = delta.with_bidder(bidder);
        }
        Ok(delta)
    }
}

/// Keep object/array sections and strip empty leaves from object sections.
fn clean_sections(sections: &FpdMap) -> FpdMap {
    sections
        .iter()
        .filter_map(|(name, value)| match value {
            Value::Object(fields) => {
                let kept = fields
                    .iter()
                    .filter(|(_, v)| !is_empty_leaf(v))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Some((name.clone(), Value::Object(kept)))
            }
            Value::Array(_) => Some((name.clone(), value.clone())),
            _ => {
                debug!(section = %name, "dropping scalar FPD section");
                None
            }
        })
        .collect()
}

fn is_empty_leaf(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
