//! Undo Manager (design §4.7): a thin wrapper over the substrate's own undo
//! stack. Undo/redo are substrate-level operations that produce ordinary
//! local commit events; the derived inverse patches fall out of the normal
//! derivation path (§4.5) rather than anything special here.

use crate::substrate::Substrate;

/// Defaults from design §4.7.
pub const DEFAULT_MAX_STEPS: u32 = 100;
pub const DEFAULT_MERGE_INTERVAL_MS: u64 = 1000;

pub struct UndoManager<'a> {
    substrate: &'a dyn Substrate,
}

impl<'a> UndoManager<'a> {
    pub fn new(substrate: &'a dyn Substrate) -> Self {
        Self { substrate }
    }

    pub fn undo(&self) -> bool {
        match self.substrate.undo() {
            Ok(applied) => applied,
            Err(err) => {
                crate::error::log_and_drop("undo", err);
                false
            }
        }
    }

    pub fn redo(&self) -> bool {
        match self.substrate.redo() {
            Ok(applied) => applied,
            Err(err) => {
                crate::error::log_and_drop("redo", err);
                false
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.substrate.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.substrate.can_redo()
    }
}
