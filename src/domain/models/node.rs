//! Resolved node snapshots produced by the reference resolver.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::pointer::{GraphPointer, Scalar};

/// A node with one level of pointer fields dereferenced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedNode {
    /// The node's own path.
    pub soul: GraphPointer,
    pub fields: BTreeMap<String, ResolvedField>,
}

/// Field of a resolved node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResolvedField {
    Scalar(Scalar),
    /// Pointer target inlined as its scalar subset.
    Inline(InlinedNode),
    /// Pointer back to a node already visited in this resolve call.
    Cycle(GraphPointer),
    /// Pointer whose target does not exist (yet).
    Dangling(GraphPointer),
}

/// Scalar subset of a pointed-to node. Its own pointer fields are kept as
/// unfollowed links; those pointing back to a node already visited in the
/// same resolve call are recorded under `cycles` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlinedNode {
    pub soul: GraphPointer,
    pub fields: BTreeMap<String, Scalar>,
    pub links: BTreeMap<String, GraphPointer>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub cycles: BTreeMap<String, GraphPointer>,
}

impl InlinedNode {
    pub fn new(soul: GraphPointer) -> Self {
        Self {
            soul,
            fields: BTreeMap::new(),
            links: BTreeMap::new(),
            cycles: BTreeMap::new(),
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Scalar::as_text)
    }
}

impl ResolvedField {
    /// Pointer carried by this field, whatever its resolution.
    pub fn pointer(&self) -> Option<&GraphPointer> {
        match self {
            Self::Scalar(_) => None,
            Self::Inline(node) => Some(&node.soul),
            Self::Cycle(p) | Self::Dangling(p) => Some(p),
        }
    }
}

impl ResolvedNode {
    pub fn new(soul: GraphPointer) -> Self {
        Self {
            soul,
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.soul.last_segment()
    }

    pub fn scalar(&self, name: &str) -> Option<&Scalar> {
        match self.fields.get(name) {
            Some(ResolvedField::Scalar(s)) if !s.is_null() => Some(s),
            _ => None,
        }
    }

    /// Text field; a present field of another shape is logged and ignored.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.fields.get(name) {
            None | Some(ResolvedField::Scalar(Scalar::Null)) => None,
            Some(ResolvedField::Scalar(Scalar::Text(s))) => Some(s.clone()),
            Some(ResolvedField::Scalar(Scalar::Int(n))) => Some(n.to_string()),
            Some(other) => {
                warn!(soul = %self.soul, field = name, value = ?other, "expected text field, skipping");
                None
            }
        }
    }

    pub fn pointer(&self, name: &str) -> Option<&GraphPointer> {
        self.fields.get(name).and_then(ResolvedField::pointer)
    }

    pub fn inline(&self, name: &str) -> Option<&InlinedNode> {
        match self.fields.get(name) {
            Some(ResolvedField::Inline(node)) => Some(node),
            _ => None,
        }
    }

    /// Id referenced by a field that is either a pointer or a plain id string.
    pub fn reference_id(&self, name: &str) -> Option<String> {
        self.pointer(name)
            .map(|p| p.last_segment().to_string())
            .or_else(|| self.text(name))
    }

    /// Timestamp stored as RFC 3339 text or epoch milliseconds.
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.scalar(name)? {
            Scalar::Int(ms) => DateTime::from_timestamp_millis(*ms),
            Scalar::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok(),
            _ => None,
        }
    }
}
