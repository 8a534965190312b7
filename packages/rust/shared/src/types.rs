//! Core domain types for first-party data flowing through an auction.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{FpdError, Result};

/// An open mapping of first-party attributes. Keys are unconstrained.
pub type FpdMap = Map<String, Value>;

/// Treat an explicit `null` the same as an absent field.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<FpdMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<FpdMap>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The `{global, bidder}` pair threaded through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Attributes applying to the whole auction.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub global: FpdMap,
    /// Attributes scoped per bidder, keyed by bidder code.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bidder: FpdMap,
}

impl Context {
    pub fn new(global: FpdMap, bidder: FpdMap) -> Self {
        Self { global, bidder }
    }

    /// Apply a submodule delta.
    ///
    /// Each field is replaced wholesale when the delta supplies it and kept
    /// otherwise. There is no key-by-key merge.
    pub fn merge(&mut self, delta: ContextDelta) {
        if let Some(global) = delta.global {
            self.global = global;
        }
        if let Some(bidder) = delta.bidder {
            self.bidder = bidder;
        }
    }
}

// ---------------------------------------------------------------------------
// ContextDelta
// ---------------------------------------------------------------------------

/// The partial result of one submodule invocation.
///
/// `None` means "no contribution" and leaves the accumulated value alone;
/// `Some(FpdMap::new())` replaces it with an empty mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<FpdMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidder: Option<FpdMap>,
}

impl ContextDelta {
    /// A delta that contributes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, global: FpdMap) -> Self {
        self.global = Some(global);
        self
    }

    pub fn with_bidder(mut self, bidder: FpdMap) -> Self {
        self.bidder = Some(bidder);
        self
    }

    /// True when neither field is contributed.
    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.bidder.is_none()
    }
}

impl From<Context> for ContextDelta {
    fn from(context: Context) -> Self {
        Self {
            global: Some(context.global),
            bidder: Some(context.bidder),
        }
    }
}

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// The `ortb2Fragments` object carried by an auction-start request.
///
/// Only `global` and `bidder` are owned by the pipeline; anything else the
/// host stores here is kept in `extra` and survives [`Ortb2Fragments::apply`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ortb2Fragments {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub global: FpdMap,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bidder: FpdMap,
    #[serde(flatten)]
    pub extra: FpdMap,
}

impl Ortb2Fragments {
    /// Snapshot the pipeline-owned fields as a fresh [`Context`].
    pub fn context(&self) -> Context {
        Context::new(self.global.clone(), self.bidder.clone())
    }

    /// Overwrite `global` and `bidder` with the pipeline result.
    pub fn apply(&mut self, context: Context) {
        self.global = context.global;
        self.bidder = context.bidder;
    }
}

/// An in-flight auction-start request as seen by the interceptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<String>,
    #[serde(default)]
    pub ortb2_fragments: Ortb2Fragments,
    /// Every other request field (ad units, timeout, ...), passed through untouched.
    #[serde(flatten)]
    pub extra: FpdMap,
}

impl AuctionRequest {
    /// Parse a request from its JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| FpdError::parse(format!("invalid request: {e}")))
    }
}
