//! Substrate-level diff shapes, translated from `loro`'s `DiffEvent` into a
//! form the patch-derivation layer (§4.5) can consume without depending on
//! `loro` types directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use loro::LoroTree;

use crate::types::NodeId;
use serde_json::Value as Json;

/// A single quill-style text delta operation (design §4.5 rule 5).
#[derive(Debug, Clone, PartialEq)]
pub enum TextOp {
    Retain(usize),
    Insert(String),
    Delete(usize),
}

/// One container-level diff, tagged with enough identity to resolve back
/// to an owning node (design §4.5 rule 1).
#[derive(Debug, Clone)]
pub enum RawDiff {
    TreeCreate {
        target: NodeId,
        parent: Option<NodeId>,
        index: usize,
    },
    TreeDelete {
        target: NodeId,
    },
    TreeMove {
        target: NodeId,
        parent: Option<NodeId>,
        index: usize,
    },
    /// `container` is the owning node's id (as `Display`-formatted text),
    /// already resolved from the raw container diff via the substrate's
    /// owned-container index (meta map, attrs sub-map, or actions list).
    /// `entries` pairs a key with its new value, or `None` for a deletion.
    Map {
        container: String,
        entries: Vec<(String, Option<Json>)>,
    },
    Text {
        container: String,
        ops: Vec<TextOp>,
    },
}

fn value_to_json(value: &loro::LoroValue) -> Json {
    match value {
        loro::LoroValue::Null => Json::Null,
        loro::LoroValue::Bool(b) => Json::Bool(*b),
        loro::LoroValue::I64(i) => Json::Number((*i).into()),
        loro::LoroValue::Double(d) => serde_json::Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
        loro::LoroValue::String(s) => Json::String(s.to_string()),
        loro::LoroValue::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        loro::LoroValue::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect()),
        _ => Json::Null,
    }
}

fn parent_node_id(parent: &loro::TreeParentId) -> Option<NodeId> {
    match parent {
        loro::TreeParentId::Node(id) => Some(*id),
        _ => None,
    }
}

/// Resolves a container's debug-formatted key back to the node that owns it,
/// rebuilding the index from a full tree scan on a miss (design §4.5 rule 1:
/// a remote peer may have created the node in the same commit this diff
/// reports, so the registry can legitimately be behind).
fn resolve_owner(
    container_index: &Arc<Mutex<HashMap<String, NodeId>>>,
    tree: &LoroTree,
    key: &str,
) -> Option<NodeId> {
    if let Some(id) = container_index.lock().unwrap().get(key).copied() {
        return Some(id);
    }

    let mut index = HashMap::new();
    for id in tree.nodes() {
        let Ok(meta) = tree.get_meta(id) else { continue };
        index.insert(format!("{:?}", meta.id()), id);
        for sub_key in ["attrs", "text", "actions"] {
            if let Some(loro::ValueOrContainer::Container(c)) = meta.get(sub_key) {
                index.insert(format!("{:?}", c.id()), id);
            }
        }
    }
    let found = index.get(key).copied();
    *container_index.lock().unwrap() = index;
    found
}

/// Translates one commit's raw `loro` event into the substrate's own diff
/// shape. This is the one place in the crate that reads `loro::event`
/// types directly.
pub(super) fn translate(
    diff_event: &loro::event::DiffEvent,
    container_index: &Arc<Mutex<HashMap<String, NodeId>>>,
    tree: &LoroTree,
) -> Vec<RawDiff> {
    let mut out = Vec::new();

    for container_diff in diff_event.events.iter() {
        let key = format!("{:?}", container_diff.target);

        match &container_diff.diff {
            loro::event::Diff::Tree(tree_diff) => {
                for item in tree_diff.diff.iter() {
                    match &item.action {
                        loro::TreeExternalDiff::Create { parent, index, .. } => {
                            out.push(RawDiff::TreeCreate {
                                target: item.target,
                                parent: parent_node_id(parent),
                                index: *index,
                            });
                        }
                        loro::TreeExternalDiff::Delete { .. } => {
                            out.push(RawDiff::TreeDelete { target: item.target });
                        }
                        loro::TreeExternalDiff::Move { parent, index, .. } => {
                            out.push(RawDiff::TreeMove {
                                target: item.target,
                                parent: parent_node_id(parent),
                                index: *index,
                            });
                        }
                    }
                }
            }
            loro::event::Diff::Map(map_delta) => {
                let Some(owner) = resolve_owner(container_index, tree, &key) else { continue };
                let entries = map_delta
                    .updated
                    .iter()
                    .map(|(k, v)| {
                        let value = v.as_ref().and_then(|voc| match voc {
                            loro::ValueOrContainer::Value(value) => Some(value_to_json(value)),
                            loro::ValueOrContainer::Container(_) => None,
                        });
                        (k.to_string(), value)
                    })
                    .collect();
                out.push(RawDiff::Map { container: owner.to_string(), entries });
            }
            loro::event::Diff::Text(deltas) => {
                let Some(owner) = resolve_owner(container_index, tree, &key) else { continue };
                let ops = deltas
                    .iter()
                    .map(|d| match d {
                        loro::TextDelta::Retain { retain, .. } => TextOp::Retain(*retain),
                        loro::TextDelta::Insert { insert, .. } => TextOp::Insert(insert.clone()),
                        loro::TextDelta::Delete { delete, .. } => TextOp::Delete(*delete),
                    })
                    .collect();
                out.push(RawDiff::Text { container: owner.to_string(), ops });
            }
            _ => {}
        }
    }

    out
}
