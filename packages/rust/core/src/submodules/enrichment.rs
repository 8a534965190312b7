//! Page-derived defaults for `global.site` and `global.device`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use firstparty_shared::{Context, ContextDelta, FpdMap, ModuleConfig, Result};

use crate::registry::Submodule;

/// What the page knows about itself.
#[derive(Debug, Clone, Default)]
pub struct PageInfo {
    /// Canonical page URL.
    pub page: Option<Url>,
    /// Referring URL.
    pub referrer: Option<Url>,
    /// Page keywords, e.g. from `<meta name="keywords">`.
    pub keywords: Vec<String>,
    /// Viewport width and height in CSS pixels.
    pub viewport: Option<(u32, u32)>,
}

/// Fills `site.page`, `site.domain`, `site.ref`, `site.keywords`,
/// `device.w` and `device.h` when the publisher has not set them.
pub struct EnrichmentSubmodule {
    page: PageInfo,
}

impl EnrichmentSubmodule {
    pub fn new(page: PageInfo) -> Self {
        Self { page }
    }
}

#[async_trait]
impl Submodule for EnrichmentSubmodule {
    fn name(&self) -> &str {
        "enrichments"
    }

    fn priority(&self) -> Option<i64> {
        Some(1)
    }

    async fn enrich(&self, config: &ModuleConfig, context: &Context) -> Result<ContextDelta> {
        if config.skip_enrichments {
            return Ok(ContextDelta::none());
        }

        let mut site = Vec::new();
        if let Some(page) = &self.page.page {
            site.push(("page", json!(page.as_str())));
            if let Some(domain) = page.host_str() {
                site.push(("domain", json!(domain.trim_start_matches("www."))));
            }
        }
        if let Some(referrer) = &self.page.referrer {
            site.push(("ref", json!(referrer.as_str())));
        }
        if !self.page.keywords.is_empty() {
            site.push(("keywords", json!(self.page.keywords.join(","))));
        }

        let device = match self.page.viewport {
            Some((w, h)) => vec![("w", json!(w)), ("h", json!(h))],
            None => Vec::new(),
        };

        let mut global = context.global.clone();
        fill_section(&mut global, "site", site);
        fill_section(&mut global, "device", device);

        if global == context.global {
            return Ok(ContextDelta::none());
        }
        Ok(ContextDelta::none().with_global(global))
    }
}

/// Set each field under `global[key]` unless the publisher already supplied it.
///
/// The section is created when missing; a non-object section is left alone.
fn fill_section(global: &mut FpdMap, key: &str, fields: Vec<(&str, Value)>) {
    if fields.is_empty() {
        return;
    }
    let Some(section) = global
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
    else {
        debug!(section = key, "existing section is not an object, skipping");
        return;
    };
    for (field, value) in fields {
        section.entry(field).or_insert(value);
    }
}
