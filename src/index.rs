//! Indexed View: a derived id→node / id→parent / id→children materialization
//! rebuilt from the substrate on every commit event (design §4.3).

use std::collections::HashMap;

use crate::node::NodeSnapshot;
use crate::substrate::Substrate;
use crate::types::NodeId;

/// A frozen, cloneable materialization of the document tree at one commit.
///
/// The read path always hands out the current index; [`Index::clone`] is
/// how callers get a diff-able snapshot (design §4.3, "frozen value usable
/// for diffing").
#[derive(Debug, Clone, Default)]
pub struct Index {
    nodes: HashMap<NodeId, NodeSnapshot>,
    parents: HashMap<NodeId, Option<NodeId>>,
    children: HashMap<NodeId, Vec<NodeId>>,
    root: Option<NodeId>,
}

impl Index {
    /// Rebuilds the index from scratch by reading the substrate. Called
    /// unconditionally on every commit event (local or remote); cheap
    /// relative to a commit since it only does substrate reads.
    pub fn rebuild(substrate: &dyn Substrate) -> Self {
        let root = substrate.root_id();
        let mut nodes = HashMap::new();
        let mut parents = HashMap::new();

        for id in substrate.all_nodes() {
            match substrate.read_fields(id) {
                Ok(snapshot) => {
                    nodes.insert(id, snapshot);
                }
                Err(err) => {
                    crate::error::log_and_drop("index rebuild: read_fields", err);
                    continue;
                }
            }

            parents.insert(id, substrate.parent(id));
        }

        // `substrate.children` is authoritative for order; `all_nodes` has no
        // guaranteed order, so re-derive each parent's child list from it.
        let mut ordered_children = HashMap::new();
        for &id in nodes.keys() {
            ordered_children.insert(id, substrate.children(Some(id)));
        }
        ordered_children.insert(root, substrate.children(None));

        Self {
            nodes,
            parents,
            children: ordered_children,
            root: Some(root),
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.get(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied().flatten()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids currently in the index, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Resolves `text` (`Value` nodes) or the empty string otherwise;
    /// convenience for the formula evaluator (design §4.10).
    pub fn text_of(&self, id: NodeId) -> Option<&str> {
        match self.node(id)? {
            NodeSnapshot::Value { text } => Some(text.as_str()),
            _ => None,
        }
    }
}
