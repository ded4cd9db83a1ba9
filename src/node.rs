//! Node schema: canonical typed node kinds and field contracts (design §4.2).
//!
//! Per-node data lives inside the CRDT substrate's per-node meta map under
//! the reserved keys below; this module only defines the schema and the
//! pure validation/sanitization rules, not the storage itself (see
//! [`crate::substrate`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DocumentError, DocumentResult};
use crate::types::NodeId;

/// Reserved meta-map keys (design §4.2).
pub mod keys {
    pub const KIND: &str = "kind";
    pub const TAG: &str = "tag";
    pub const ATTRS: &str = "attrs";
    pub const TEXT: &str = "text";
    pub const OPERATION: &str = "operation";
    pub const REF_TARGET: &str = "refTarget";
    pub const LABEL: &str = "label";
    pub const TARGET: &str = "target";
    pub const ACTIONS: &str = "actions";
    pub const REPLAY_MODE: &str = "replayMode";
    pub const SOURCE_ID: &str = "sourceId";
}

/// A scalar or nested value usable for element `attrs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(BTreeMap<String, AttrValue>),
}

/// The kind tag stored at `keys::KIND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Element,
    Value,
    Ref,
    Formula,
    Action,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Element => "element",
            NodeKind::Value => "value",
            NodeKind::Ref => "ref",
            NodeKind::Formula => "formula",
            NodeKind::Action => "action",
        }
    }
}

/// `replayMode` on action nodes (design §3, open question resolved in §9):
/// `Fixed` binds `$0` to the node's stored `target` at replay time;
/// `Selected` binds `$0` to the caller-supplied start id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    Fixed,
    Selected,
}

/// A materialized, read-only snapshot of one node's fields, as produced by
/// the [`crate::index::Index`] (design §4.3). Scalars only; text containers
/// are resolved to their current string value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeSnapshot {
    Element {
        tag: String,
        attrs: BTreeMap<String, AttrValue>,
    },
    Value {
        text: String,
    },
    Ref {
        target: Option<NodeId>,
    },
    Formula {
        operation: String,
    },
    Action {
        label: String,
        target: Option<NodeId>,
        actions: Vec<crate::patch::Patch>,
        replay_mode: Option<ReplayMode>,
    },
}

impl NodeSnapshot {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSnapshot::Element { .. } => NodeKind::Element,
            NodeSnapshot::Value { .. } => NodeKind::Value,
            NodeSnapshot::Ref { .. } => NodeKind::Ref,
            NodeSnapshot::Formula { .. } => NodeKind::Formula,
            NodeSnapshot::Action { .. } => NodeKind::Action,
        }
    }
}

/// A node template used by `add_children` and, after resolving symbols, by
/// `tree.create` replay (design §4.4, §6: the `data` payload of a create
/// patch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeSpec {
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, AttrValue>,
    },
    Value {
        #[serde(default)]
        value: String,
    },
    Ref {
        target: Option<NodeId>,
    },
    Formula {
        operation: String,
    },
    Action {
        label: String,
        target: Option<NodeId>,
        #[serde(default)]
        actions: Vec<crate::patch::Patch>,
        #[serde(default)]
        replay_mode: Option<ReplayMode>,
    },
}

/// Sanitize an element tag per design §4.2: strip angle brackets, trim,
/// lowercase, then require `^[a-z][a-z0-9-]*$`.
pub fn sanitize_tag(raw: &str) -> DocumentResult<String> {
    let stripped: String = raw.chars().filter(|c| *c != '<' && *c != '>').collect();
    let tag = stripped.trim().to_lowercase();

    if tag.is_empty() {
        return Err(DocumentError::invalid_input("tag must not be empty"));
    }

    let mut chars = tag.chars();
    let first_ok = chars.next().map(|c| c.is_ascii_lowercase()).unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if !first_ok || !rest_ok {
        return Err(DocumentError::invalid_input(format!(
            "tag '{tag}' does not match ^[a-z][a-z0-9-]*$"
        )));
    }

    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_angle_brackets_and_case() {
        assert_eq!(sanitize_tag("<Div>").unwrap(), "div");
        assert_eq!(sanitize_tag("  Span  ").unwrap(), "span");
        assert_eq!(sanitize_tag("list-item-2").unwrap(), "list-item-2");
    }

    #[test]
    fn rejects_empty_and_malformed_tags() {
        assert!(sanitize_tag("").is_err());
        assert!(sanitize_tag("<>").is_err());
        assert!(sanitize_tag("1div").is_err());
        assert!(sanitize_tag("div_item").is_err());
    }
}
