//! `loro`-backed implementation of the [`Substrate`] trait.
//!
//! This is the one place in the crate that talks to `loro` directly. Every
//! node lives in a single `LoroTree` container named `"nodes"`; each
//! `TreeID`'s associated meta `LoroMap` (`tree.get_meta(id)`) holds the
//! reserved fields from `node::keys`, with `attrs`/`text`/`actions` as
//! nested containers reached through it (design §3, §4.2).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use loro::{LoroDoc, LoroList, LoroMap, LoroText, LoroTree, LoroValue, TreeParentId};
use serde_json::Value as Json;

use super::events::{RawDiff, TextOp};
use super::{CommitEvent, Index, Origin, Substrate};
use crate::error::{DocumentError, DocumentResult};
use crate::node::{keys, AttrValue, NodeKind, NodeSnapshot, NodeSpec};
use crate::patch::Patch;
use crate::types::{NodeId, PeerId};

const NODES_TREE: &str = "nodes";
const PEER_NAMES_MAP: &str = "peerNames";

pub struct LoroSubstrate {
    doc: LoroDoc,
    tree: LoroTree,
    peer_names: LoroMap,
    peer_id: PeerId,
    /// Every container we created that belongs to a node (the node's meta
    /// map itself, plus its `attrs`/`text`/`actions` sub-containers),
    /// keyed by the container's debug-formatted id. Used to resolve a raw
    /// container diff back to the node it belongs to (design §4.5 rule 1).
    container_index: Arc<Mutex<HashMap<String, NodeId>>>,
    undo: Mutex<loro::UndoManager>,
}

fn container_key<T: std::fmt::Debug>(id: &T) -> String {
    format!("{id:?}")
}

fn reserved_meta_key(key: &str) -> bool {
    matches!(
        key,
        k if k == keys::TAG
            || k == keys::REF_TARGET
            || k == keys::OPERATION
            || k == keys::LABEL
            || k == keys::TARGET
            || k == keys::REPLAY_MODE
            || k == keys::SOURCE_ID
    )
}

fn json_to_loro(value: &Json) -> LoroValue {
    match value {
        Json::Null => LoroValue::Null,
        Json::Bool(b) => LoroValue::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                LoroValue::I64(i)
            } else {
                LoroValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        Json::String(s) => LoroValue::String(s.as_str().into()),
        Json::Array(items) => LoroValue::List(Arc::new(items.iter().map(json_to_loro).collect())),
        Json::Object(map) => LoroValue::Map(Arc::new(
            map.iter().map(|(k, v)| (k.clone(), json_to_loro(v))).collect(),
        )),
    }
}

fn loro_to_json(value: &LoroValue) -> Json {
    match value {
        LoroValue::Null => Json::Null,
        LoroValue::Bool(b) => Json::Bool(*b),
        LoroValue::I64(i) => Json::Number((*i).into()),
        LoroValue::Double(d) => serde_json::Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
        LoroValue::String(s) => Json::String(s.to_string()),
        LoroValue::List(items) => Json::Array(items.iter().map(loro_to_json).collect()),
        LoroValue::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), loro_to_json(v))).collect()),
        _ => Json::Null,
    }
}

fn attr_value_to_json(value: &AttrValue) -> Json {
    match value {
        AttrValue::Null => Json::Null,
        AttrValue::Bool(b) => Json::Bool(*b),
        AttrValue::Number(n) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        AttrValue::String(s) => Json::String(s.clone()),
        AttrValue::Object(map) => {
            Json::Object(map.iter().map(|(k, v)| (k.clone(), attr_value_to_json(v))).collect())
        }
    }
}

fn json_to_attr_value(value: &Json) -> AttrValue {
    match value {
        Json::Null => AttrValue::Null,
        Json::Bool(b) => AttrValue::Bool(*b),
        Json::Number(n) => AttrValue::Number(n.as_f64().unwrap_or_default()),
        Json::String(s) => AttrValue::String(s.clone()),
        Json::Array(items) => AttrValue::Object(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), json_to_attr_value(v)))
                .collect(),
        ),
        Json::Object(map) => {
            AttrValue::Object(map.iter().map(|(k, v)| (k.clone(), json_to_attr_value(v))).collect())
        }
    }
}

fn to_parent(parent: Option<NodeId>) -> TreeParentId {
    match parent {
        Some(id) => TreeParentId::Node(id),
        None => TreeParentId::Root,
    }
}

fn from_parent(parent: TreeParentId) -> Option<NodeId> {
    match parent {
        TreeParentId::Node(id) => Some(id),
        _ => None,
    }
}

impl LoroSubstrate {
    pub fn new(peer_id: PeerId) -> DocumentResult<(Self, NodeId)> {
        Self::with_undo_config(peer_id, crate::undo::DEFAULT_MAX_STEPS, crate::undo::DEFAULT_MERGE_INTERVAL_MS)
    }

    /// Same as [`LoroSubstrate::new`], but with the undo manager tuned by
    /// `max_undo_steps`/`merge_interval_ms` instead of the design defaults
    /// (design §4.7, host-configurable via [`crate::config::DocumentConfig`]).
    pub fn with_undo_config(peer_id: PeerId, max_undo_steps: u32, merge_interval_ms: u64) -> DocumentResult<(Self, NodeId)> {
        let doc = LoroDoc::new();
        doc.set_peer_id(peer_id)?;
        let tree = doc.get_tree(NODES_TREE);
        let peer_names = doc.get_map(PEER_NAMES_MAP);

        let mut undo = loro::UndoManager::new(&doc);
        undo.set_max_undo_steps(max_undo_steps);
        undo.set_merge_interval(merge_interval_ms);

        let root = tree.create(TreeParentId::Root)?;
        let meta = tree.get_meta(root)?;
        meta.insert(keys::KIND, NodeKind::Element.as_str())?;
        meta.insert(keys::TAG, "root")?;
        let attrs = meta.get_or_create_container(keys::ATTRS, LoroMap::new())?;
        doc.commit_with(loro::CommitOptions::new().origin("local"));

        let container_index = Arc::new(Mutex::new(HashMap::new()));
        container_index.lock().unwrap().insert(container_key(&meta.id()), root);
        container_index.lock().unwrap().insert(container_key(&attrs.id()), root);

        Ok((
            Self {
                doc,
                tree,
                peer_names,
                peer_id,
                container_index,
                undo: Mutex::new(undo),
            },
            root,
        ))
    }

    fn meta(&self, id: NodeId) -> DocumentResult<LoroMap> {
        self.tree.get_meta(id).map_err(DocumentError::from)
    }

    fn register(&self, key: String, id: NodeId) {
        self.container_index.lock().unwrap().insert(key, id);
    }

    /// Full re-scan of every node's owned containers, used to self-heal the
    /// registry after importing remote-created nodes we have not yet seen
    /// (design §4.5 rule 1).
    fn rebuild_container_index(&self) {
        let mut index = HashMap::new();
        for id in self.tree.nodes() {
            let Ok(meta) = self.tree.get_meta(id) else { continue };
            index.insert(container_key(&meta.id()), id);
            if let Some(loro::ValueOrContainer::Container(c)) = meta.get(keys::ATTRS) {
                index.insert(container_key(&c.id()), id);
            }
            if let Some(loro::ValueOrContainer::Container(c)) = meta.get(keys::TEXT) {
                index.insert(container_key(&c.id()), id);
            }
            if let Some(loro::ValueOrContainer::Container(c)) = meta.get(keys::ACTIONS) {
                index.insert(container_key(&c.id()), id);
            }
        }
        *self.container_index.lock().unwrap() = index;
    }

    fn resolve_container(&self, key: &str) -> Option<NodeId> {
        if let Some(id) = self.container_index.lock().unwrap().get(key).copied() {
            return Some(id);
        }
        self.rebuild_container_index();
        self.container_index.lock().unwrap().get(key).copied()
    }
}

impl Substrate for LoroSubstrate {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn root_id(&self) -> NodeId {
        self.tree
            .children(&TreeParentId::Root)
            .and_then(|c| c.first().copied())
            .expect("root node created at construction")
    }

    fn subscribe(&self, listener: Box<dyn Fn(CommitEvent) + Send + Sync>) -> Box<dyn FnOnce() + Send> {
        let container_index = self.container_index.clone();
        let tree = self.tree.clone();

        let sub = self.doc.subscribe_root(Arc::new(move |diff_event| {
            let origin = match diff_event.triggered_by {
                loro::EventTriggerKind::Local => Origin::Local,
                loro::EventTriggerKind::Import => Origin::Import,
                loro::EventTriggerKind::Checkout => Origin::Checkout,
            };
            let diffs = super::events::translate(&diff_event, &container_index, &tree);
            listener(CommitEvent { origin, diffs });
        }));

        let holder = Arc::new(Mutex::new(Some(sub)));
        Box::new(move || {
            holder.lock().unwrap().take();
        })
    }

    fn create_node(&self, parent: Option<NodeId>, index: Index) -> DocumentResult<NodeId> {
        let parent = to_parent(parent);
        let id = match index {
            Some(i) => self.tree.create_at(parent, i)?,
            None => self.tree.create(parent)?,
        };
        Ok(id)
    }

    fn move_node(&self, id: NodeId, new_parent: Option<NodeId>, index: Index) -> DocumentResult<()> {
        let parent = to_parent(new_parent);
        match index {
            Some(i) => self.tree.mov_to(id, parent, i)?,
            None => self.tree.mov(id, parent)?,
        }
        Ok(())
    }

    fn delete_node(&self, id: NodeId) -> DocumentResult<()> {
        self.tree.delete(id)?;
        Ok(())
    }

    fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        self.tree.children(&to_parent(parent)).unwrap_or_default()
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.parent(id).and_then(from_parent)
    }

    fn contains(&self, id: NodeId) -> bool {
        self.tree.contains(id)
    }

    fn all_nodes(&self) -> Vec<NodeId> {
        self.tree.nodes()
    }

    fn init_node(&self, id: NodeId, spec: &NodeSpec) -> DocumentResult<()> {
        let meta = self.meta(id)?;
        self.register(container_key(&meta.id()), id);

        match spec {
            NodeSpec::Element { tag, attrs } => {
                let tag = crate::node::sanitize_tag(tag)?;
                meta.insert(keys::KIND, NodeKind::Element.as_str())?;
                meta.insert(keys::TAG, tag.as_str())?;
                let attrs_map = meta.get_or_create_container(keys::ATTRS, LoroMap::new())?;
                self.register(container_key(&attrs_map.id()), id);
                for (k, v) in attrs {
                    attrs_map.insert(k, json_to_loro(&attr_value_to_json(v)))?;
                }
            }
            NodeSpec::Value { value } => {
                meta.insert(keys::KIND, NodeKind::Value.as_str())?;
                let text = meta.get_or_create_container(keys::TEXT, LoroText::new())?;
                self.register(container_key(&text.id()), id);
                if !value.is_empty() {
                    text.insert(0, value)?;
                }
            }
            NodeSpec::Ref { target } => {
                meta.insert(keys::KIND, NodeKind::Ref.as_str())?;
                meta.insert(
                    keys::REF_TARGET,
                    target.map(|t| t.to_string()).unwrap_or_default(),
                )?;
            }
            NodeSpec::Formula { operation } => {
                meta.insert(keys::KIND, NodeKind::Formula.as_str())?;
                meta.insert(keys::OPERATION, operation.as_str())?;
            }
            NodeSpec::Action { label, target, actions, replay_mode } => {
                meta.insert(keys::KIND, NodeKind::Action.as_str())?;
                meta.insert(keys::LABEL, label.as_str())?;
                meta.insert(keys::TARGET, target.map(|t| t.to_string()).unwrap_or_default())?;
                if let Some(rm) = replay_mode {
                    let s = match rm {
                        crate::node::ReplayMode::Fixed => "fixed",
                        crate::node::ReplayMode::Selected => "selected",
                    };
                    meta.insert(keys::REPLAY_MODE, s)?;
                }
                let list = meta.get_or_create_container(keys::ACTIONS, LoroList::new())?;
                self.register(container_key(&list.id()), id);
                for patch in actions {
                    let encoded = serde_json::to_string(patch)
                        .map_err(|e| DocumentError::Internal(e.to_string()))?;
                    list.push(encoded)?;
                }
            }
        }

        Ok(())
    }

    fn map_set(&self, id: NodeId, key: &str, value: Json) -> DocumentResult<()> {
        if !reserved_meta_key(key) {
            return Err(DocumentError::invalid_input(format!("'{key}' is not a reserved node field")));
        }
        let meta = self.meta(id)?;
        meta.insert(key, json_to_loro(&value))?;
        Ok(())
    }

    fn map_delete(&self, id: NodeId, key: &str) -> DocumentResult<()> {
        let meta = self.meta(id)?;
        meta.delete(key)?;
        Ok(())
    }

    fn map_get(&self, id: NodeId, key: &str) -> Option<Json> {
        let meta = self.meta(id).ok()?;
        match meta.get(key)? {
            loro::ValueOrContainer::Value(v) => Some(loro_to_json(&v)),
            loro::ValueOrContainer::Container(_) => None,
        }
    }

    fn attr_set(&self, id: NodeId, key: &str, value: Option<Json>) -> DocumentResult<()> {
        let meta = self.meta(id)?;
        let attrs = meta.get_or_create_container(keys::ATTRS, LoroMap::new())?;
        self.register(container_key(&attrs.id()), id);
        match value {
            Some(v) => attrs.insert(key, json_to_loro(&v))?,
            None => attrs.delete(key)?,
        }
        Ok(())
    }

    fn read_fields(&self, id: NodeId) -> DocumentResult<NodeSnapshot> {
        let meta = self.meta(id)?;
        let kind = match meta.get(keys::KIND) {
            Some(loro::ValueOrContainer::Value(LoroValue::String(s))) => s.to_string(),
            _ => return Err(DocumentError::not_found(format!("node {id} has no kind"))),
        };

        Ok(match kind.as_str() {
            "element" => {
                let tag = match meta.get(keys::TAG) {
                    Some(loro::ValueOrContainer::Value(LoroValue::String(s))) => s.to_string(),
                    _ => String::new(),
                };
                let attrs = match meta.get(keys::ATTRS) {
                    Some(loro::ValueOrContainer::Container(c)) => {
                        let m = c.into_map().map_err(|_| DocumentError::Internal("attrs is not a map".into()))?;
                        m.get_deep_value()
                            .into_map()
                            .map(|entries| {
                                entries
                                    .iter()
                                    .map(|(k, v)| (k.clone(), json_to_attr_value(&loro_to_json(v))))
                                    .collect()
                            })
                            .unwrap_or_default()
                    }
                    _ => Default::default(),
                };
                NodeSnapshot::Element { tag, attrs }
            }
            "value" => NodeSnapshot::Value { text: self.text_value(id)? },
            "ref" => {
                let target = match meta.get(keys::REF_TARGET) {
                    Some(loro::ValueOrContainer::Value(LoroValue::String(s))) => crate::types::parse_node_id(&s),
                    _ => None,
                };
                NodeSnapshot::Ref { target }
            }
            "formula" => {
                let operation = match meta.get(keys::OPERATION) {
                    Some(loro::ValueOrContainer::Value(LoroValue::String(s))) => s.to_string(),
                    _ => String::new(),
                };
                NodeSnapshot::Formula { operation }
            }
            "action" => {
                let label = match meta.get(keys::LABEL) {
                    Some(loro::ValueOrContainer::Value(LoroValue::String(s))) => s.to_string(),
                    _ => String::new(),
                };
                let target = match meta.get(keys::TARGET) {
                    Some(loro::ValueOrContainer::Value(LoroValue::String(s))) => crate::types::parse_node_id(&s),
                    _ => None,
                };
                let replay_mode = match meta.get(keys::REPLAY_MODE) {
                    Some(loro::ValueOrContainer::Value(LoroValue::String(s))) if s.as_str() == "fixed" => {
                        Some(crate::node::ReplayMode::Fixed)
                    }
                    Some(loro::ValueOrContainer::Value(LoroValue::String(s))) if s.as_str() == "selected" => {
                        Some(crate::node::ReplayMode::Selected)
                    }
                    _ => None,
                };
                let actions = match meta.get(keys::ACTIONS) {
                    Some(loro::ValueOrContainer::Container(c)) => {
                        let list = c.into_list().map_err(|_| DocumentError::Internal("actions is not a list".into()))?;
                        list.get_deep_value()
                            .into_list()
                            .map(|items| {
                                items
                                    .iter()
                                    .filter_map(|v| v.as_string().cloned())
                                    .filter_map(|s| serde_json::from_str::<Patch>(&s).ok())
                                    .collect()
                            })
                            .unwrap_or_default()
                    }
                    _ => Vec::new(),
                };
                NodeSnapshot::Action { label, target, actions, replay_mode }
            }
            other => return Err(DocumentError::Internal(format!("unknown node kind '{other}'"))),
        })
    }

    fn text_splice(&self, id: NodeId, index: usize, delete_count: usize, insert: &str) -> DocumentResult<()> {
        let meta = self.meta(id)?;
        let text = meta.get_or_create_container(keys::TEXT, LoroText::new())?;
        self.register(container_key(&text.id()), id);
        if delete_count > 0 {
            text.delete(index, delete_count)?;
        }
        if !insert.is_empty() {
            text.insert(index, insert)?;
        }
        Ok(())
    }

    fn text_value(&self, id: NodeId) -> DocumentResult<String> {
        let meta = self.meta(id)?;
        match meta.get(keys::TEXT) {
            Some(loro::ValueOrContainer::Container(c)) => {
                let text = c.into_text().map_err(|_| DocumentError::Internal("text is not a text container".into()))?;
                Ok(text.to_string())
            }
            _ => Ok(String::new()),
        }
    }

    fn action_append(&self, id: NodeId, patch: Patch) -> DocumentResult<()> {
        let meta = self.meta(id)?;
        let list = meta.get_or_create_container(keys::ACTIONS, LoroList::new())?;
        self.register(container_key(&list.id()), id);
        let encoded = serde_json::to_string(&patch).map_err(|e| DocumentError::Internal(e.to_string()))?;
        list.push(encoded)?;
        Ok(())
    }

    fn action_delete(&self, id: NodeId, index: usize) -> DocumentResult<()> {
        let meta = self.meta(id)?;
        let list = meta.get_or_create_container(keys::ACTIONS, LoroList::new())?;
        list.delete(index, 1)?;
        Ok(())
    }

    fn action_move(&self, id: NodeId, from: usize, to: usize) -> DocumentResult<()> {
        let meta = self.meta(id)?;
        let list = meta.get_or_create_container(keys::ACTIONS, LoroList::new())?;
        let items = list.get_deep_value();
        let Some(values) = items.into_list() else {
            return Err(DocumentError::Internal("actions is not a list".into()));
        };
        let Some(item) = values.get(from).cloned() else {
            return Err(DocumentError::not_found(format!("action index {from} out of range")));
        };
        list.delete(from, 1)?;
        let encoded = item.as_string().cloned().unwrap_or_default();
        list.insert(to, encoded)?;
        Ok(())
    }

    fn action_replace_all(&self, id: NodeId, patches: Vec<Patch>) -> DocumentResult<()> {
        let meta = self.meta(id)?;
        let list = meta.get_or_create_container(keys::ACTIONS, LoroList::new())?;
        self.register(container_key(&list.id()), id);
        let len = list.len();
        if len > 0 {
            list.delete(0, len)?;
        }
        for patch in patches {
            let encoded = serde_json::to_string(&patch).map_err(|e| DocumentError::Internal(e.to_string()))?;
            list.push(encoded)?;
        }
        Ok(())
    }

    fn commit(&self, origin: &str) {
        self.doc.commit_with(loro::CommitOptions::new().origin(origin));
    }

    fn export_snapshot(&self) -> DocumentResult<Vec<u8>> {
        self.doc.export(loro::ExportMode::Snapshot).map_err(DocumentError::from)
    }

    fn export_update(&self, from: Option<Vec<u8>>) -> DocumentResult<Vec<u8>> {
        match from {
            Some(bytes) => {
                let vv = loro::VersionVector::decode(&bytes).map_err(DocumentError::from)?;
                self.doc.export(loro::ExportMode::updates(&vv)).map_err(DocumentError::from)
            }
            None => self.doc.export(loro::ExportMode::all_updates()).map_err(DocumentError::from),
        }
    }

    fn import(&self, bytes: &[u8]) -> DocumentResult<()> {
        self.doc.import(bytes)?;
        Ok(())
    }

    fn frontiers(&self) -> Vec<u8> {
        self.doc.state_frontiers().encode()
    }

    fn checkout(&self, frontiers: &[u8]) -> DocumentResult<()> {
        let f = loro::Frontiers::decode(frontiers).map_err(DocumentError::from)?;
        self.doc.checkout(&f)?;
        Ok(())
    }

    fn checkout_latest(&self) -> DocumentResult<()> {
        self.doc.checkout_to_latest();
        Ok(())
    }

    fn undo(&self) -> DocumentResult<bool> {
        Ok(self.undo.lock().unwrap().undo(&self.doc)?)
    }

    fn redo(&self) -> DocumentResult<bool> {
        Ok(self.undo.lock().unwrap().redo(&self.doc)?)
    }

    fn can_undo(&self) -> bool {
        self.undo.lock().unwrap().can_undo()
    }

    fn can_redo(&self) -> bool {
        self.undo.lock().unwrap().can_redo()
    }

    /// Sets this peer's human-readable display name in the shared
    /// peer-id -> name map (design §6 "Peer identity").
    fn set_peer_name(&self, peer: PeerId, name: &str) -> DocumentResult<()> {
        self.peer_names.insert(&peer.to_string(), name)?;
        Ok(())
    }

    fn peer_name(&self, peer: PeerId) -> Option<String> {
        match self.peer_names.get(&peer.to_string())? {
            loro::ValueOrContainer::Value(LoroValue::String(s)) => Some(s.to_string()),
            _ => None,
        }
    }
}
