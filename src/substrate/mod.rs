//! CRDT Substrate Adaptor (design §4.1): an opaque handle over a tree CRDT
//! with LWW parent/position, LWW maps, op-based text, frontiers, and
//! byte-level export/import.
//!
//! The trait below is the capability set the rest of the crate programs
//! against; [`backend::LoroSubstrate`] is the only implementation, backed
//! by the `loro` crate. Keeping the boundary as a trait means the one
//! Loro-specific translation layer ([`events`]) stays contained to this
//! module instead of leaking `loro` types into mutation, patch derivation,
//! undo, or replay.

mod backend;
mod events;

pub use backend::LoroSubstrate;
pub use events::{RawDiff, TextOp};

use crate::error::DocumentResult;
use crate::node::NodeSpec;
use crate::types::{NodeId, PeerId};
use serde_json::Value as Json;

/// Where a batch of substrate events came from (design §4.1, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A local mutation committed by this process.
    Local,
    /// Bytes applied through the sync adaptor from a remote peer.
    Remote,
    /// Bytes applied through a plain `import` call (snapshot load, test
    /// fixture) rather than the sync path.
    Import,
    /// A `checkout` to a different frontier (time travel read).
    Checkout,
}

/// One commit's worth of diffs, as delivered to a [`Substrate::subscribe`]
/// listener.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub origin: Origin,
    pub diffs: Vec<RawDiff>,
}

/// `index = None` means append; this is the ergonomic form mutation callers
/// use. The wire/patch form normalizes this to the sentinel `-1`
/// (design §4.6 rule 4, §6).
pub type Index = Option<usize>;

/// The CRDT Substrate Adaptor contract (design §4.1).
pub trait Substrate {
    fn peer_id(&self) -> PeerId;
    fn root_id(&self) -> NodeId;

    /// Registers a listener invoked synchronously on every commit (local
    /// or remote). Returns a disposer; dropping it does not unsubscribe by
    /// itself (callers must call the disposer, matching design §9's
    /// "listener set with returned disposers").
    fn subscribe(&self, listener: Box<dyn Fn(CommitEvent) + Send + Sync>) -> Box<dyn FnOnce() + Send>;

    fn create_node(&self, parent: Option<NodeId>, index: Index) -> DocumentResult<NodeId>;
    fn move_node(&self, id: NodeId, new_parent: Option<NodeId>, index: Index) -> DocumentResult<()>;
    fn delete_node(&self, id: NodeId) -> DocumentResult<()>;

    fn children(&self, parent: Option<NodeId>) -> Vec<NodeId>;
    fn parent(&self, id: NodeId) -> Option<NodeId>;
    fn contains(&self, id: NodeId) -> bool;
    fn all_nodes(&self) -> Vec<NodeId>;

    /// Initializes a freshly created node's fields according to `spec`.
    /// Called once, immediately after `create_node`, by the mutation API.
    fn init_node(&self, id: NodeId, spec: &NodeSpec) -> DocumentResult<()>;

    /// Sets one of the node's reserved top-level fields (`tag`, `refTarget`,
    /// `operation`, `label`, `target`, `replayMode`, `sourceId`) — anything
    /// other than `attrs`, whose entries go through [`Substrate::attr_set`]
    /// instead since `attrs` is a nested sub-map container.
    fn map_set(&self, id: NodeId, key: &str, value: Json) -> DocumentResult<()>;
    fn map_delete(&self, id: NodeId, key: &str) -> DocumentResult<()>;
    fn map_get(&self, id: NodeId, key: &str) -> Option<Json>;

    /// Sets (`Some`) or deletes (`None`) one entry of an element's `attrs`
    /// sub-map (design §4.4 `update_attribute`).
    fn attr_set(&self, id: NodeId, key: &str, value: Option<Json>) -> DocumentResult<()>;

    /// Reads a node's full materialized field set (design §4.3's per-node
    /// snapshot is built from repeated calls to this across the index).
    fn read_fields(&self, id: NodeId) -> DocumentResult<crate::node::NodeSnapshot>;

    fn text_splice(&self, id: NodeId, index: usize, delete_count: usize, insert: &str) -> DocumentResult<()>;
    fn text_value(&self, id: NodeId) -> DocumentResult<String>;

    /// Action-node list operations (design §4.4).
    fn action_append(&self, id: NodeId, patch: crate::patch::Patch) -> DocumentResult<()>;
    fn action_delete(&self, id: NodeId, index: usize) -> DocumentResult<()>;
    fn action_move(&self, id: NodeId, from: usize, to: usize) -> DocumentResult<()>;
    fn action_replace_all(&self, id: NodeId, patches: Vec<crate::patch::Patch>) -> DocumentResult<()>;

    fn commit(&self, origin: &str);
    fn export_snapshot(&self) -> DocumentResult<Vec<u8>>;
    fn export_update(&self, from: Option<Vec<u8>>) -> DocumentResult<Vec<u8>>;
    fn import(&self, bytes: &[u8]) -> DocumentResult<()>;

    fn frontiers(&self) -> Vec<u8>;
    fn checkout(&self, frontiers: &[u8]) -> DocumentResult<()>;
    fn checkout_latest(&self) -> DocumentResult<()>;

    fn undo(&self) -> DocumentResult<bool>;
    fn redo(&self) -> DocumentResult<bool>;
    fn can_undo(&self) -> bool;
    fn can_redo(&self) -> bool;

    /// Peer identity (design §6): a 64-bit peer id -> human-readable name
    /// mapping stored in a reserved map container.
    fn set_peer_name(&self, peer: PeerId, name: &str) -> DocumentResult<()>;
    fn peer_name(&self, peer: PeerId) -> Option<String>;
}
