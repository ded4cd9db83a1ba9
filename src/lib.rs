//! # Weave Core
//!
//! A collaborative structured-document engine backed by a tree CRDT.
//!
//! Weave models a document as a tree of typed nodes (elements, text values,
//! references, formulas, and action lists) living inside a [`loro`]-backed
//! CRDT substrate. On top of that substrate it layers:
//!
//! - an indexed, materialized view of the tree (§4.3),
//! - a single-effect mutation API (§4.4),
//! - event-diff -> generalized-patch derivation, for a recorded, replayable
//!   history (§4.5),
//! - a parameterized replay engine with copy-from-source semantics (§4.6),
//! - local undo/redo (§4.7),
//! - a selection-generalization algorithm (§4.8),
//! - a transport-agnostic sync adaptor gate (§4.9),
//! - and a dual-mode formula evaluator (§4.10).
//!
//! [`Document`] is the facade that ties all of this together; most callers
//! only need that type and [`node::NodeSpec`].
//!
//! ```rust,ignore
//! use weave_core::Document;
//! use weave_core::node::NodeSpec;
//!
//! let doc = Document::new(1)?;
//! let root = doc.root();
//! doc.mutate().add_children(root, vec![NodeSpec::Element {
//!     tag: "p".into(),
//!     attrs: Default::default(),
//! }], None);
//! # Ok::<(), weave_core::error::DocumentError>(())
//! ```

pub mod config;
pub mod derive;
pub mod document;
pub mod error;
pub mod formula;
pub mod index;
pub mod mutation;
pub mod node;
pub mod observability;
pub mod patch;
pub mod replay;
pub mod selection;
pub mod substrate;
pub mod sync;
pub mod types;
pub mod undo;

pub use document::Document;
pub use error::{DocumentError, DocumentResult};
pub use types::{NodeId, PeerId};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TARGET: &str = env!("BUILD_TARGET");
pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");
