//! Replay Engine (design §4.6): applies a generalized patch list in which
//! symbolic names `$0, $1, ...` stand for identifiers bound during replay.
//!
//! Per the open question resolved in design §9, the whole replay is
//! bracketed by a single substrate commit rather than one commit per patch,
//! so a concurrent remote update can never interleave with a partially
//! replayed history.

use std::collections::{HashMap, HashSet};

use serde_json::Value as Json;

use crate::error::log_and_drop;
use crate::index::Index;
use crate::node::{keys, NodeSnapshot, NodeSpec};
use crate::patch::{Patch, APPEND};
use crate::substrate::Substrate;
use crate::types::{is_symbol, parse_node_id, NodeId};

/// Replays `patches` onto `substrate`, binding `$0` to `start_id`. Errors on
/// individual patches are logged and that patch is skipped; replay always
/// completes (design §4.6, "best-effort playback").
pub fn replay(substrate: &dyn Substrate, patches: &[Patch], start_id: NodeId) {
    if patches.is_empty() {
        return;
    }

    let started = std::time::Instant::now();
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("$0".to_string(), start_id.to_string());
    let mut created_in_replay: HashSet<String> = HashSet::new();

    for patch in patches {
        apply_one(substrate, patch, &mut vars, &mut created_in_replay);
    }

    substrate.commit("local");
    crate::observability::DocumentMetrics::record_replay(patches.len(), started.elapsed());
}

fn resolve(vars: &HashMap<String, String>, value: &str) -> String {
    vars.get(value).cloned().unwrap_or_else(|| value.to_string())
}

fn resolve_json(vars: &HashMap<String, String>, value: &Json) -> Json {
    crate::patch::substitute(value, vars)
}

fn apply_one(
    substrate: &dyn Substrate,
    patch: &Patch,
    vars: &mut HashMap<String, String>,
    created_in_replay: &mut HashSet<String>,
) {
    match patch {
        Patch::TreeCreate { target, parent, index, data, source_id } => {
            let parent_str = resolve(vars, parent);
            let parent_id = parse_node_id(&parent_str);
            let at = normalize_index(*index);

            let new_id = if let Some(source) = source_id {
                let source_str = resolve(vars, source);
                let Some(source_id) = parse_node_id(&source_str) else {
                    log_and_drop(
                        "replay: copy",
                        crate::error::DocumentError::invalid_input(format!("unresolved sourceId '{source_str}'")),
                    );
                    return;
                };
                copy_node(substrate, source_id, parent_id, at)
            } else {
                let Some(data) = data else {
                    log_and_drop(
                        "replay: create",
                        crate::error::DocumentError::invalid_input("tree.create missing data and sourceId"),
                    );
                    return;
                };
                let resolved = resolve_json(vars, data);
                create_from_data(substrate, parent_id, at, &resolved)
            };

            let Some(new_id) = new_id else { return };

            if is_symbol(target) {
                vars.insert(target.clone(), new_id.to_string());
            }
            created_in_replay.insert(new_id.to_string());
        }
        Patch::TreeDelete { target } => {
            let target_str = resolve(vars, target);
            let Some(id) = parse_node_id(&target_str) else { return };
            if let Err(err) = substrate.delete_node(id) {
                log_and_drop("replay: delete", err);
            }
        }
        Patch::TreeMove { target, parent, index } => {
            let target_str = resolve(vars, target);
            let Some(id) = parse_node_id(&target_str) else { return };
            let parent_id = parse_node_id(&resolve(vars, parent));
            if let Err(err) = substrate.move_node(id, parent_id, normalize_index(*index)) {
                log_and_drop("replay: move", err);
            }
        }
        Patch::Map { target, key, value } => {
            let target_str = resolve(vars, target);
            if created_in_replay.contains(&target_str) {
                return; // freshness invariant (design §4.6 rule 3)
            }
            let Some(id) = parse_node_id(&target_str) else { return };
            let value = resolve_json(vars, value);
            apply_map_patch(substrate, id, key, value);
        }
        Patch::Text { target, index, delete, insert } => {
            let target_str = resolve(vars, target);
            if created_in_replay.contains(&target_str) {
                return;
            }
            let Some(id) = parse_node_id(&target_str) else { return };
            if let Err(err) = substrate.text_splice(id, *index, *delete, insert) {
                log_and_drop("replay: text", err);
            }
        }
    }
}

fn normalize_index(index: i64) -> Option<usize> {
    if index == APPEND {
        None
    } else {
        usize::try_from(index).ok()
    }
}

/// `map` patches targeting a reserved field become the kind-specific
/// setter; everything else is an `attrs` entry (design §4.6 step 2b).
fn apply_map_patch(substrate: &dyn Substrate, id: NodeId, key: &str, value: Json) {
    let is_reserved = matches!(
        key,
        k if k == keys::TAG
            || k == keys::REF_TARGET
            || k == keys::OPERATION
            || k == keys::LABEL
            || k == keys::TARGET
            || k == keys::REPLAY_MODE
            || k == keys::SOURCE_ID
    );

    let result = if is_reserved {
        substrate.map_set(id, key, value)
    } else if value.is_null() {
        substrate.attr_set(id, key, None)
    } else {
        substrate.attr_set(id, key, Some(value))
    };

    if let Err(err) = result {
        log_and_drop("replay: map", err);
    }
}

fn create_from_data(substrate: &dyn Substrate, parent: Option<NodeId>, at: Option<usize>, data: &Json) -> Option<NodeId> {
    let spec: NodeSpec = match serde_json::from_value(data.clone()) {
        Ok(spec) => spec,
        Err(err) => {
            log_and_drop("replay: malformed create data", crate::error::DocumentError::invalid_input(err.to_string()));
            return None;
        }
    };

    let id = match substrate.create_node(parent, at) {
        Ok(id) => id,
        Err(err) => {
            log_and_drop("replay: create_node", err);
            return None;
        }
    };
    if let Err(err) = substrate.init_node(id, &spec) {
        log_and_drop("replay: init_node", err);
        let _ = substrate.delete_node(id);
        return None;
    }
    Some(id)
}

fn copy_node(substrate: &dyn Substrate, source_id: NodeId, parent: Option<NodeId>, at: Option<usize>) -> Option<NodeId> {
    let index = Index::rebuild(substrate);
    let Some(snapshot) = index.node(source_id) else {
        log_and_drop("replay: copy_node", crate::error::DocumentError::not_found(format!("source {source_id} missing")));
        return None;
    };

    let spec = match snapshot {
        NodeSnapshot::Element { tag, attrs } => NodeSpec::Element { tag: tag.clone(), attrs: attrs.clone() },
        NodeSnapshot::Value { text } => NodeSpec::Value { value: text.clone() },
        NodeSnapshot::Ref { target } => NodeSpec::Ref { target: *target },
        NodeSnapshot::Formula { operation } => NodeSpec::Formula { operation: operation.clone() },
        NodeSnapshot::Action { label, target, actions, replay_mode } => {
            NodeSpec::Action { label: label.clone(), target: *target, actions: actions.clone(), replay_mode: *replay_mode }
        }
    };

    let id = match substrate.create_node(parent, at) {
        Ok(id) => id,
        Err(err) => {
            log_and_drop("replay: copy create_node", err);
            return None;
        }
    };
    if let Err(err) = substrate.init_node(id, &spec) {
        log_and_drop("replay: copy init_node", err);
        let _ = substrate.delete_node(id);
        return None;
    }
    if let Err(err) = substrate.map_set(id, keys::SOURCE_ID, Json::String(source_id.to_string())) {
        log_and_drop("replay: copy sourceId", err);
    }
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_list_is_a_no_op() {
        let (substrate, root) = crate::substrate::LoroSubstrate::new(1).unwrap();
        let before = Index::rebuild(&substrate).len();
        replay(&substrate, &[], root);
        assert_eq!(Index::rebuild(&substrate).len(), before);
    }

    #[test]
    fn normalizes_append_sentinel() {
        assert_eq!(normalize_index(APPEND), None);
        assert_eq!(normalize_index(3), Some(3));
    }
}
