//! The `Document` facade: wires the substrate, indexed view, mutation API,
//! patch history, undo manager, selection generalizer, formula evaluator,
//! and sync gate into the one object host applications construct (design
//! §3, §9 "a single facade object, not a pile of free functions").

use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value as Json;

use crate::config::DocumentConfig;
use crate::derive::derive_patches;
use crate::error::{log_and_drop, DocumentResult};
use crate::formula::OperationRegistry;
use crate::index::Index;
use crate::mutation::Mutations;
use crate::node::{AttrValue, NodeSnapshot, NodeSpec};
use crate::patch::{group_by_target, Patch};
use crate::selection;
use crate::substrate::{LoroSubstrate, Substrate};
use crate::sync::{NullSyncAdaptor, SyncAdaptor, SyncGate, SyncState};
use crate::types::{NodeId, PeerId};
use crate::undo::UndoManager as UndoHandle;

/// A live collaborative document: the substrate plus everything derived
/// from it (design §3).
///
/// `index` and `history` are rebuilt/appended synchronously inside the
/// substrate's commit listener, so any call into `Document` after a
/// mutation observes up-to-date state without the caller driving a
/// separate refresh step (design §4.3, §4.5).
pub struct Document {
    substrate: Arc<LoroSubstrate>,
    index: Arc<RwLock<Index>>,
    history: Arc<Mutex<Vec<Patch>>>,
    sync: SyncGate,
    registry: OperationRegistry,
    formula_max_depth: usize,
    default_ping_interval_ms: Option<u64>,
    _unsubscribe: Box<dyn FnOnce() + Send>,
}

impl Document {
    /// Creates a new document with a fresh root, using `peer_id` as this
    /// process's CRDT peer identity (design §6) and no sync transport
    /// (callers that need collaboration call [`Document::with_sync`]).
    pub fn new(peer_id: PeerId) -> DocumentResult<Self> {
        Self::with_sync(peer_id, Arc::new(NullSyncAdaptor))
    }

    pub fn with_sync(peer_id: PeerId, adaptor: Arc<dyn SyncAdaptor>) -> DocumentResult<Self> {
        Self::with_config(peer_id, adaptor, DocumentConfig { peer_id, ..DocumentConfig::default() })
    }

    /// Same as [`Document::with_sync`], but tuning the undo manager and
    /// formula recursion guard from `config` instead of the design defaults
    /// (design §6, host-configurable via [`DocumentConfig`]).
    pub fn with_config(peer_id: PeerId, adaptor: Arc<dyn SyncAdaptor>, config: DocumentConfig) -> DocumentResult<Self> {
        config.validate()?;
        let (substrate, _root) =
            LoroSubstrate::with_undo_config(peer_id, config.max_undo_steps, config.undo_merge_interval_ms)?;
        let substrate = Arc::new(substrate);

        let index = Arc::new(RwLock::new(Index::rebuild(substrate.as_ref())));
        let history = Arc::new(Mutex::new(Vec::new()));

        let listener_index = index.clone();
        let listener_history = history.clone();
        let listener_substrate = substrate.clone();
        let unsubscribe = substrate.subscribe(Box::new(move |event| {
            let mut patches = derive_patches(&event);
            *listener_index.write().unwrap() = Index::rebuild(listener_substrate.as_ref());
            if !patches.is_empty() {
                crate::observability::DocumentMetrics::record_commit();
                listener_history.lock().unwrap().append(&mut patches);
            }
        }));

        Ok(Self {
            substrate,
            index,
            history,
            sync: SyncGate::new(adaptor),
            registry: OperationRegistry::with_builtins(),
            formula_max_depth: config.formula_max_depth,
            default_ping_interval_ms: config.sync_ping_interval_ms,
            _unsubscribe: unsubscribe,
        })
    }

    /// The current materialized view (design §4.3). Cheap to call
    /// repeatedly; it is a clone of the index kept in lockstep with every
    /// commit, not rebuilt on read.
    pub fn index(&self) -> Index {
        self.index.read().unwrap().clone()
    }

    pub fn root(&self) -> NodeId {
        self.substrate.root_id()
    }

    pub fn peer_id(&self) -> PeerId {
        self.substrate.peer_id()
    }

    pub fn set_peer_name(&self, peer: PeerId, name: &str) {
        if let Err(err) = self.substrate.set_peer_name(peer, name) {
            log_and_drop("set_peer_name", err);
        }
    }

    pub fn peer_name(&self, peer: PeerId) -> Option<String> {
        self.substrate.peer_name(peer)
    }

    /// The mutation API (design §4.4): every call here ends in one commit
    /// and is immediately reflected in [`Document::index`].
    pub fn mutate(&self) -> Mutations<'_> {
        Mutations::new(self.substrate.as_ref())
    }

    /// Full recorded patch history, oldest first (design §4.5).
    pub fn history(&self) -> Vec<Patch> {
        self.history.lock().unwrap().clone()
    }

    /// History grouped by target node, in first-seen order (design §4.5
    /// "Grouping for UI").
    pub fn history_by_target(&self) -> Vec<(String, Vec<Patch>)> {
        group_by_target(&self.history())
    }

    /// Drops all recorded history without touching document state
    /// (design §4.5 "clearable independent of undo").
    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }

    /// Replays `patches` rooted at `start_id`, binding `$0` (design §4.6).
    pub fn replay(&self, patches: &[Patch], start_id: NodeId) {
        crate::replay::replay(self.substrate.as_ref(), patches, start_id);
    }

    /// Generalizes `selection` into every structurally matching node
    /// (design §4.8).
    pub fn generalize_selection(&self, selection_ids: &[NodeId]) -> Vec<NodeId> {
        let index = self.index.read().unwrap();
        selection::generalize(&index, selection_ids)
    }

    /// Evaluates the formula rooted at `formula_id` against the current
    /// index (design §4.10).
    pub fn evaluate_formula(&self, formula_id: NodeId) -> Json {
        let index = self.index.read().unwrap();
        let started = std::time::Instant::now();
        let result = crate::formula::evaluate_with_max_depth(&index, &self.registry, formula_id, self.formula_max_depth);
        let errored = matches!(&result, Json::String(s) if s.starts_with("#ERR:"));
        crate::observability::DocumentMetrics::record_formula_eval(started.elapsed(), errored);
        result
    }

    pub fn formula_registry_mut(&mut self) -> &mut OperationRegistry {
        &mut self.registry
    }

    pub fn undo_manager(&self) -> UndoHandle<'_> {
        UndoHandle::new(self.substrate.as_ref())
    }

    pub fn sync(&self) -> &SyncGate {
        &self.sync
    }

    /// Connects the sync gate to `room_id` using the configured default
    /// ping interval (design §5, `sync_ping_interval_ms`); callers that want
    /// a different interval call [`SyncGate::connect`] on [`Document::sync`]
    /// directly.
    pub async fn connect_to_sync(&self, room_id: &str) -> DocumentResult<()> {
        let interval = self.default_ping_interval_ms.map(std::time::Duration::from_millis);
        self.sync.connect(room_id, interval).await
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn export_snapshot(&self) -> DocumentResult<Vec<u8>> {
        self.substrate.export_snapshot()
    }

    pub fn export_update(&self, since: Option<Vec<u8>>) -> DocumentResult<Vec<u8>> {
        self.substrate.export_update(since)
    }

    /// Imports bytes produced by [`Document::export_snapshot`] or
    /// [`Document::export_update`]; the commit listener fires as usual, so
    /// the index/history update is transparent to the caller (design §4.1).
    pub fn import(&self, bytes: &[u8]) -> DocumentResult<()> {
        self.substrate.import(bytes)
    }

    pub fn frontiers(&self) -> Vec<u8> {
        self.substrate.frontiers()
    }

    pub fn checkout(&self, frontiers: &[u8]) -> DocumentResult<()> {
        self.substrate.checkout(frontiers)
    }

    pub fn checkout_latest(&self) -> DocumentResult<()> {
        self.substrate.checkout_latest()
    }

    /// Reads one node's full field snapshot straight from the index
    /// (design §4.3).
    pub fn node(&self, id: NodeId) -> Option<NodeSnapshot> {
        self.index.read().unwrap().node(id).cloned()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.index.read().unwrap().children(id).to_vec()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.index.read().unwrap().parent(id)
    }
}

/// Convenience re-export so callers building node templates don't need a
/// separate `use crate::node::{NodeSpec, AttrValue}` alongside `Document`.
pub use crate::node::NodeSpec as Template;
pub type Attribute = AttrValue;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn create_root_child_and_read_it_back_through_the_index() {
        let doc = Document::new(1).unwrap();
        let root = doc.root();
        let ids = doc.mutate().add_children(
            root,
            vec![NodeSpec::Element { tag: "p".into(), attrs: BTreeMap::new() }],
            None,
        );
        assert_eq!(ids.len(), 1);

        let snapshot = doc.node(ids[0]).unwrap();
        match snapshot {
            NodeSnapshot::Element { tag, .. } => assert_eq!(tag, "p"),
            other => panic!("expected Element, got {other:?}"),
        }
        assert_eq!(doc.parent(ids[0]), Some(root));
    }

    #[test]
    fn mutations_are_recorded_in_history() {
        let doc = Document::new(1).unwrap();
        let root = doc.root();
        doc.mutate().add_children(
            root,
            vec![NodeSpec::Value { value: "hi".into() }],
            None,
        );
        assert!(!doc.history().is_empty());
    }

    #[test]
    fn clear_history_empties_the_log_without_touching_the_tree() {
        let doc = Document::new(1).unwrap();
        let root = doc.root();
        doc.mutate().add_children(root, vec![NodeSpec::Value { value: "x".into() }], None);
        assert!(!doc.history().is_empty());
        doc.clear_history();
        assert!(doc.history().is_empty());
        assert_eq!(doc.index().len(), 2); // root + the value node
    }

    #[test]
    fn undo_reverts_the_last_mutation() {
        let doc = Document::new(1).unwrap();
        let root = doc.root();
        let before = doc.index().len();
        doc.mutate().add_children(root, vec![NodeSpec::Value { value: "x".into() }], None);
        assert_eq!(doc.index().len(), before + 1);
        assert!(doc.undo_manager().undo());
        assert_eq!(doc.index().len(), before);
    }

    #[test]
    fn snapshot_export_import_round_trips_into_a_fresh_document() {
        let doc = Document::new(1).unwrap();
        let root = doc.root();
        doc.mutate().add_children(root, vec![NodeSpec::Value { value: "hello".into() }], None);
        let bytes = doc.export_snapshot().unwrap();

        let doc2 = Document::new(2).unwrap();
        doc2.import(&bytes).unwrap();
        assert_eq!(doc2.index().len(), doc.index().len());
    }
}
