//! Lock eligibility predicates.
//!
//! One predicate set decides locked/lockable/buyable/next-position status
//! for any slot in a profile's subtree. The reconciler uses it to validate
//! lock tasks and the tree view uses it to annotate rendered nodes; the two
//! must never diverge, so both go through [`LockContext`].

use serde::Serialize;
use shared_types::{Lock, Place, SlotPos, TreePath};

/// True when any active lock's path is a prefix of `path`.
///
/// Shared with the next-position search, which skips candidate child slots
/// on exactly this predicate.
pub fn path_is_locked(locks: &[Lock], path: &TreePath) -> bool {
    locks.iter().any(|lock| lock.path.is_prefix_of(path))
}

/// Lock/placement status of one slot, as rendered to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub pos: SlotPos,
    pub is_root: bool,
    /// Some lock path equals this slot's path.
    pub is_lock: bool,
    /// Some lock path is a prefix of this slot's path.
    pub is_locked: bool,
    pub can_lock: bool,
    pub is_next_position: bool,
    pub can_buy: bool,
}

/// Evaluation context for one profile's subtree: its root place, the active
/// lock set, and the path of the next open slot (when known).
pub struct LockContext<'a> {
    root: &'a Place,
    locks: &'a [Lock],
    next_slot_path: Option<TreePath>,
}

impl<'a> LockContext<'a> {
    pub fn new(root: &'a Place, locks: &'a [Lock], next_slot_path: Option<TreePath>) -> Self {
        Self {
            root,
            locks,
            next_slot_path,
        }
    }

    /// Path of the next open slot under `root`, derived from the place the
    /// next-position search returned.
    pub fn next_slot_of(next_place: &Place) -> TreePath {
        next_place
            .path
            .child(SlotPos::from_filling(next_place.filling))
    }

    pub fn is_locked(&self, path: &TreePath) -> bool {
        path_is_locked(self.locks, path)
    }

    pub fn is_lock(&self, path: &TreePath) -> bool {
        self.locks.iter().any(|lock| lock.path == *path)
    }

    pub fn is_next_position(&self, path: &TreePath) -> bool {
        self.next_slot_path.as_ref() == Some(path)
    }

    /// Placement under this slot stays inside the owning profile's
    /// structure.
    pub fn can_buy(&self, path: &TreePath) -> bool {
        match path.parent() {
            Some(parent) => parent.starts_with(&self.root.path),
            None => false,
        }
    }

    /// Whether a lock may be taken on `path`.
    ///
    /// `parent` is the place row above the slot, when one exists. A slot
    /// under an empty parent is never lockable, and neither is a slot whose
    /// sibling is already held.
    pub fn can_lock(&self, path: &TreePath, parent: Option<&Place>) -> bool {
        if self.is_locked(path) {
            return false;
        }
        if let Some(sibling) = path.sibling() {
            if self.is_locked(&sibling) {
                return false;
            }
        }
        if *path == self.root.path {
            return false;
        }
        if !path.starts_with(&self.root.path) {
            return false;
        }
        match parent {
            Some(parent) => parent.filling > 0,
            None => false,
        }
    }

    /// Full annotation for one slot.
    pub fn slot_status(&self, path: &TreePath, parent: Option<&Place>) -> SlotStatus {
        SlotStatus {
            pos: path.last_pos().unwrap_or(SlotPos::Left),
            is_root: *path == self.root.path,
            is_lock: self.is_lock(path),
            is_locked: self.is_locked(path),
            can_lock: self.can_lock(path, parent),
            is_next_position: self.is_next_position(path),
            can_buy: self.can_buy(path),
        }
    }
}
