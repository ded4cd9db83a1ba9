//! Mutation API: single-effect primitives over the substrate (design §4.4).
//!
//! Each primitive ends with exactly one substrate commit; there are no
//! multi-op transactions (design §9, "two legacy wrap attempts ...
//! deliberately excluded"). Following the propagation policy in design §7,
//! every primitive here swallows its own errors: failures are logged and
//! the caller gets the typed empty sentinel (`None`, or an empty `Vec`),
//! never a propagated `Err`.

use std::collections::BTreeMap;

use crate::error::{log_and_drop, DocumentError};
use crate::index::Index;
use crate::node::{sanitize_tag, AttrValue, NodeSnapshot, NodeSpec};
use crate::patch::Patch;
use crate::substrate::Substrate;
use crate::types::NodeId;

/// Thin wrapper binding the mutation primitives to one substrate + the
/// index used to read "current" state for `copy_node` and `update_value`.
pub struct Mutations<'a> {
    substrate: &'a dyn Substrate,
}

impl<'a> Mutations<'a> {
    pub fn new(substrate: &'a dyn Substrate) -> Self {
        Self { substrate }
    }

    /// Creates an element node with no parent.
    pub fn create_root(&self, tag: &str) -> Option<NodeId> {
        let tag = match sanitize_tag(tag) {
            Ok(t) => t,
            Err(err) => {
                log_and_drop("create_root", err);
                return None;
            }
        };
        let id = self.create_one(None, None, &NodeSpec::Element { tag, attrs: BTreeMap::new() });
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("create_root");
        id
    }

    /// Allocates one node per spec under `parent`, assigning positions
    /// sequentially from `start_index` (or appending). Invalid element tags
    /// are skipped with a logged error; other specs still get created.
    pub fn add_children(
        &self,
        parent: NodeId,
        specs: Vec<NodeSpec>,
        start_index: Option<usize>,
    ) -> Vec<NodeId> {
        let mut created = Vec::with_capacity(specs.len());
        let mut next_index = start_index;

        for spec in specs {
            let index = next_index;
            match self.create_one(Some(parent), index, &spec) {
                Some(id) => {
                    created.push(id);
                    next_index = index.map(|i| i + 1);
                }
                None => continue,
            }
        }

        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("add_children");
        created
    }

    fn create_one(&self, parent: Option<NodeId>, index: Option<usize>, spec: &NodeSpec) -> Option<NodeId> {
        if let NodeSpec::Element { tag, .. } = spec {
            if let Err(err) = sanitize_tag(tag) {
                log_and_drop("add_children: invalid tag", err);
                return None;
            }
        }

        let id = match self.substrate.create_node(parent, index) {
            Ok(id) => id,
            Err(err) => {
                log_and_drop("create_node", err);
                return None;
            }
        };

        if let Err(err) = self.substrate.init_node(id, spec) {
            log_and_drop("init_node", err);
            let _ = self.substrate.delete_node(id);
            return None;
        }

        Some(id)
    }

    pub fn delete(&self, ids: &[NodeId]) {
        for &id in ids {
            if let Err(err) = self.substrate.delete_node(id) {
                log_and_drop("delete", err);
            }
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("delete");
    }

    /// `index = None` means append.
    pub fn move_nodes(&self, ids: &[NodeId], new_parent: NodeId, index: Option<usize>) {
        let mut next_index = index;
        for &id in ids {
            if let Err(err) = self.substrate.move_node(id, Some(new_parent), next_index) {
                log_and_drop("move", err);
                continue;
            }
            next_index = next_index.map(|i| i + 1);
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("move");
    }

    /// Reads `source_id`'s **current** fields from `index` and materializes
    /// a new node with the same kind and content, recording `sourceId`.
    /// Element children are never deep-copied (design §4.4).
    pub fn copy_node(&self, index: &Index, source_id: NodeId, parent: NodeId, at: Option<usize>) -> Option<NodeId> {
        let Some(snapshot) = index.node(source_id) else {
            log_and_drop("copy_node", DocumentError::not_found(format!("source {source_id} missing")));
            return None;
        };

        let spec = match snapshot {
            NodeSnapshot::Element { tag, attrs } => NodeSpec::Element { tag: tag.clone(), attrs: attrs.clone() },
            NodeSnapshot::Value { text } => NodeSpec::Value { value: text.clone() },
            NodeSnapshot::Ref { target } => NodeSpec::Ref { target: *target },
            NodeSnapshot::Formula { operation } => NodeSpec::Formula { operation: operation.clone() },
            NodeSnapshot::Action { label, target, actions, replay_mode } => NodeSpec::Action {
                label: label.clone(),
                target: *target,
                actions: actions.clone(),
                replay_mode: *replay_mode,
            },
        };

        let id = match self.substrate.create_node(Some(parent), at) {
            Ok(id) => id,
            Err(err) => {
                log_and_drop("copy_node: create_node", err);
                return None;
            }
        };

        if let Err(err) = self.substrate.init_node(id, &spec) {
            log_and_drop("copy_node: init_node", err);
            let _ = self.substrate.delete_node(id);
            self.substrate.commit("local");
            return None;
        }
        if let Err(err) = self.substrate.map_set(id, crate::node::keys::SOURCE_ID, source_id.to_string().into()) {
            log_and_drop("copy_node: sourceId", err);
        }

        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("copy_node");
        Some(id)
    }

    pub fn update_attribute(&self, ids: &[NodeId], key: &str, value: Option<AttrValue>) {
        let json = value.map(|v| attr_value_to_json(&v));
        for &id in ids {
            if let Err(err) = self.substrate.attr_set(id, key, json.clone()) {
                log_and_drop("update_attribute", err);
            }
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("update_attribute");
    }

    pub fn update_tag(&self, ids: &[NodeId], new_tag: &str) {
        let tag = match sanitize_tag(new_tag) {
            Ok(t) => t,
            Err(err) => {
                log_and_drop("update_tag", err);
                return;
            }
        };
        for &id in ids {
            if let Err(err) = self.substrate.map_set(id, crate::node::keys::TAG, tag.clone().into()) {
                log_and_drop("update_tag", err);
            }
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("update_tag");
    }

    pub fn splice_value(&self, ids: &[NodeId], index: usize, delete_count: usize, insert: &str) {
        for &id in ids {
            if let Err(err) = self.substrate.text_splice(id, index, delete_count, insert) {
                log_and_drop("splice_value", err);
            }
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("splice_value");
    }

    /// Computes the minimal common-prefix/common-suffix diff between `old`
    /// and `new` and dispatches a single `splice_value` (design §4.4). A
    /// no-op when both sides are empty.
    pub fn update_value(&self, ids: &[NodeId], old: &str, new: &str) {
        if old.is_empty() && new.is_empty() {
            return;
        }

        let old_chars: Vec<char> = old.chars().collect();
        let new_chars: Vec<char> = new.chars().collect();

        let mut prefix = 0;
        while prefix < old_chars.len()
            && prefix < new_chars.len()
            && old_chars[prefix] == new_chars[prefix]
        {
            prefix += 1;
        }

        let mut suffix = 0;
        while suffix < old_chars.len() - prefix
            && suffix < new_chars.len() - prefix
            && old_chars[old_chars.len() - 1 - suffix] == new_chars[new_chars.len() - 1 - suffix]
        {
            suffix += 1;
        }

        let delete_count = old_chars.len() - prefix - suffix;
        let insert: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();

        self.splice_value(ids, prefix, delete_count, &insert);
    }

    pub fn action_append(&self, id: NodeId, patch: Patch) {
        if let Err(err) = self.substrate.action_append(id, patch) {
            log_and_drop("action_append", err);
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("action_append");
    }

    pub fn action_delete(&self, id: NodeId, index: usize) {
        if let Err(err) = self.substrate.action_delete(id, index) {
            log_and_drop("action_delete", err);
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("action_delete");
    }

    pub fn action_move(&self, id: NodeId, from: usize, to: usize) {
        if let Err(err) = self.substrate.action_move(id, from, to) {
            log_and_drop("action_move", err);
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("action_move");
    }

    pub fn action_replace_all(&self, id: NodeId, patches: Vec<Patch>) {
        if let Err(err) = self.substrate.action_replace_all(id, patches) {
            log_and_drop("action_replace_all", err);
        }
        self.substrate.commit("local");
        crate::observability::DocumentMetrics::record_mutation("action_replace_all");
    }
}

fn attr_value_to_json(value: &AttrValue) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
