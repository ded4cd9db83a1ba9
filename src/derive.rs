//! Event-Diff -> Patch Derivation (design §4.5): turns one commit's raw
//! substrate diffs into an ordered stream of generalized patches.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value as Json};

use crate::node::keys;
use crate::patch::{Patch, APPEND};
use crate::substrate::{CommitEvent, Origin, RawDiff, TextOp};
use crate::types::NodeId;

/// Turns one commit's diffs into patches, applying redundant-init
/// suppression (rule 2) and copy-provenance rewriting (rule 3). Only
/// `origin = Local` events are recorded (rule 6); everything else returns
/// an empty stream (the substrate still applies the state change, this
/// just skips history recording).
pub fn derive_patches(event: &CommitEvent) -> Vec<Patch> {
    if event.origin != Origin::Local {
        return Vec::new();
    }

    let created_this_event: HashSet<NodeId> = event
        .diffs
        .iter()
        .filter_map(|d| match d {
            RawDiff::TreeCreate { target, .. } => Some(*target),
            _ => None,
        })
        .collect();

    // Reconstruct `data` for each freshly created node purely from this
    // event's own map/text diffs (rule 4: never read the live node, since
    // an undo of the create can make it gone by the time we'd read it).
    let mut reconstructed: HashMap<NodeId, Json> = HashMap::new();
    for diff in &event.diffs {
        match diff {
            RawDiff::Map { container, entries } => {
                let Some(owner) = parse_owner(container) else { continue };
                if !created_this_event.contains(&owner) {
                    continue;
                }
                let entry = reconstructed.entry(owner).or_insert_with(|| json!({}));
                let Json::Object(map) = entry else { continue };
                for (key, value) in entries {
                    if is_reserved_field(key) {
                        match value {
                            Some(v) => {
                                map.insert(wire_key(key), v.clone());
                            }
                            None => {
                                map.remove(&wire_key(key));
                            }
                        }
                        continue;
                    }

                    // Not one of the node's own reserved fields: this entry
                    // came from the nested `attrs` sub-map, which resolves
                    // to the same owning node (design §4.5 rule 1).
                    if !map.contains_key("attrs") {
                        map.insert("attrs".into(), json!({}));
                    }
                    if let Some(Json::Object(attrs)) = map.get_mut("attrs") {
                        match value {
                            Some(v) => {
                                attrs.insert(key.clone(), v.clone());
                            }
                            None => {
                                attrs.remove(key);
                            }
                        }
                    }
                }
            }
            RawDiff::Text { container, ops } => {
                let Some(owner) = parse_owner(container) else { continue };
                if !created_this_event.contains(&owner) {
                    continue;
                }
                let text = collect_inserted_text(ops);
                let entry = reconstructed.entry(owner).or_insert_with(|| json!({}));
                if let Json::Object(map) = entry {
                    map.insert("value".into(), Json::String(text));
                }
            }
            _ => {}
        }
    }

    let mut patches = Vec::with_capacity(event.diffs.len());

    for diff in &event.diffs {
        match diff {
            RawDiff::TreeCreate { target, parent, index } => {
                let data = reconstructed.get(target).cloned();
                let source_id = data
                    .as_ref()
                    .and_then(|d| d.get("sourceId"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);

                patches.push(Patch::TreeCreate {
                    target: target.to_string(),
                    parent: parent.map(|p| p.to_string()).unwrap_or_else(|| "root".to_string()),
                    index: index_or_append(Some(*index)),
                    data: if source_id.is_some() { None } else { data },
                    source_id,
                });
            }
            RawDiff::TreeDelete { target } => {
                patches.push(Patch::TreeDelete { target: target.to_string() });
            }
            RawDiff::TreeMove { target, parent, index } => {
                patches.push(Patch::TreeMove {
                    target: target.to_string(),
                    parent: parent.map(|p| p.to_string()).unwrap_or_else(|| "root".to_string()),
                    index: index_or_append(Some(*index)),
                });
            }
            RawDiff::Map { container, entries } => {
                let Some(owner) = parse_owner(container) else { continue };
                if created_this_event.contains(&owner) {
                    continue; // suppressed: folded into the TreeCreate's `data` above
                }
                for (key, value) in entries {
                    patches.push(Patch::Map {
                        target: owner.to_string(),
                        key: key.clone(),
                        value: value.clone().unwrap_or(Json::Null),
                    });
                }
            }
            RawDiff::Text { container, ops } => {
                let Some(owner) = parse_owner(container) else { continue };
                if created_this_event.contains(&owner) {
                    continue;
                }
                let mut cursor = 0usize;
                for op in ops {
                    match op {
                        TextOp::Retain(n) => cursor += n,
                        TextOp::Insert(s) => {
                            patches.push(Patch::Text {
                                target: owner.to_string(),
                                index: cursor,
                                delete: 0,
                                insert: s.clone(),
                            });
                            cursor += s.chars().count();
                        }
                        TextOp::Delete(n) => {
                            patches.push(Patch::Text {
                                target: owner.to_string(),
                                index: cursor,
                                delete: *n,
                                insert: String::new(),
                            });
                        }
                    }
                }
            }
        }
    }

    patches
}

fn index_or_append(index: Option<usize>) -> i64 {
    index.map(|i| i as i64).unwrap_or(APPEND)
}

fn parse_owner(container: &str) -> Option<NodeId> {
    crate::types::parse_node_id(container)
}

/// True for the node's own reserved meta fields (design §4.2); anything
/// else is treated as an `attrs` sub-map entry.
fn is_reserved_field(key: &str) -> bool {
    matches!(
        key,
        k if k == keys::KIND
            || k == keys::TAG
            || k == keys::REF_TARGET
            || k == keys::OPERATION
            || k == keys::LABEL
            || k == keys::TARGET
            || k == keys::REPLAY_MODE
            || k == keys::SOURCE_ID
    )
}

/// Maps a reserved meta key onto the wire-level field name used inside a
/// create patch's `data` template (design §6).
fn wire_key(key: &str) -> String {
    match key {
        k if k == keys::REF_TARGET => "target".into(),
        other => other.to_string(),
    }
}

fn collect_inserted_text(ops: &[TextOp]) -> String {
    ops.iter()
        .filter_map(|op| match op {
            TextOp::Insert(s) => Some(s.as_str()),
            _ => None,
        })
        .collect()
}

/// Bundles a recorded history's patches by `target` for display; re-exported
/// from [`crate::patch`] since it's a pure view over the patch stream.
pub use crate::patch::group_by_target;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn id(counter: u32, peer: u64) -> NodeId {
        NodeId { peer, counter }
    }

    #[test]
    fn suppresses_map_diffs_for_nodes_created_in_the_same_event() {
        let target = id(3, 1);
        let event = CommitEvent {
            origin: Origin::Local,
            diffs: vec![
                RawDiff::TreeCreate { target, parent: Some(id(0, 1)), index: 0 },
                RawDiff::Map {
                    container: target.to_string(),
                    entries: vec![("tag".to_string(), Some(json!("li")))],
                },
            ],
        };

        let patches = derive_patches(&event);
        assert_eq!(patches.len(), 1);
        match &patches[0] {
            Patch::TreeCreate { data, .. } => {
                assert_eq!(data.as_ref().unwrap()["tag"], "li");
            }
            other => panic!("expected TreeCreate, got {other:?}"),
        }
    }

    #[test]
    fn ignores_remote_events() {
        let event = CommitEvent {
            origin: Origin::Remote,
            diffs: vec![RawDiff::TreeDelete { target: id(1, 1) }],
        };
        assert!(derive_patches(&event).is_empty());
    }

    #[test]
    fn converts_text_delta_runs_into_indexed_patches() {
        let target = id(5, 1);
        let event = CommitEvent {
            origin: Origin::Local,
            diffs: vec![RawDiff::Text {
                container: target.to_string(),
                ops: vec![TextOp::Retain(2), TextOp::Insert("ab".into()), TextOp::Delete(1)],
            }],
        };
        let patches = derive_patches(&event);
        assert_eq!(patches.len(), 2);
        match &patches[0] {
            Patch::Text { index, insert, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(insert, "ab");
            }
            other => panic!("expected Text, got {other:?}"),
        }
    }
}
