//! # Core Domain Entities
//!
//! Defines the entities mirrored off-chain and the queue task read from the
//! ledger.
//!
//! ## Clusters
//!
//! - **Tree**: `Place`, `NewPlace` — nodes of the per-profile binary trees
//! - **Locks**: `Lock`, `NewLock` — subtree exclusion markers
//! - **Queue**: `Task`, `TaskPayload` — pending on-chain intents
//! - **Ledger views**: `PlaceSnapshot`, `ProfileIdentity`, `ProfilePlacement`

use crate::path::{SlotPos, TreePath};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel address carried by a place row until the ledger has emitted the
/// real one.
pub const UNCONFIRMED_ADDRESS: &str = "00";

/// Identifier of one placement matrix. Each matrix holds one binary tree per
/// participating profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixId(pub u32);

impl fmt::Display for MatrixId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Surrogate id of a place row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(pub u64);

/// Surrogate id of a lock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(pub u64);

/// Key of a queue task. Unique and monotonic on the ledger side; doubles as
/// the idempotency key for everything the task produced off-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(pub u64);

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque ledger-assigned identity string (contract or profile address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainAddress(String);

impl ChainAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        ChainAddress(raw.into())
    }

    /// The `"00"` sentinel used while a place awaits on-chain confirmation.
    pub fn unconfirmed() -> Self {
        ChainAddress(UNCONFIRMED_ADDRESS.to_string())
    }

    pub fn is_unconfirmed(&self) -> bool {
        self.0 == UNCONFIRMED_ADDRESS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainAddress {
    fn from(raw: &str) -> Self {
        ChainAddress(raw.to_string())
    }
}

/// Identifier of a submitted ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

/// A node in a per-(matrix, profile) binary tree.
///
/// Exactly one place per (matrix, profile) has `place_number == 1` and no
/// parent; its path is the subtree root prefix for all of that profile's
/// descendants. `filling` never exceeds 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub matrix: MatrixId,
    /// Profile that owns the subtree this place was allocated in.
    pub profile: ChainAddress,
    /// On-chain address; `"00"` until confirmed.
    pub address: ChainAddress,
    pub parent_id: Option<PlaceId>,
    pub parent_address: Option<ChainAddress>,
    pub path: TreePath,
    pub pos: SlotPos,
    /// 1-based allocation sequence per profile; 1 is the root.
    pub place_number: u32,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
    /// Number of direct children currently present (0..=2).
    pub filling: u8,
    /// Grandchild counter: incremented on the grandparent when a place gains
    /// a child. Maintained on write; descendant counts for presentation are
    /// recomputed from stored paths instead.
    pub filling2: u32,
    pub clone: bool,
    pub login: String,
    /// Search key, `login` followed by `place_number`.
    pub index: String,
    pub inviter_profile: Option<ChainAddress>,
    pub task_key: TaskKey,
    pub task_query_id: u64,
    pub task_source: Option<ChainAddress>,
    pub confirmed: bool,
}

/// Insert payload for a place row. Counters start at zero; the store assigns
/// the surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlace {
    pub matrix: MatrixId,
    pub profile: ChainAddress,
    pub address: ChainAddress,
    pub parent_id: Option<PlaceId>,
    pub parent_address: Option<ChainAddress>,
    pub path: TreePath,
    pub pos: SlotPos,
    pub place_number: u32,
    pub created_at: i64,
    pub clone: bool,
    pub login: String,
    pub inviter_profile: Option<ChainAddress>,
    pub task_key: TaskKey,
    pub task_query_id: u64,
    pub task_source: Option<ChainAddress>,
    pub confirmed: bool,
}

/// A hold on a subtree, keyed by the materialized path of the locked place.
///
/// A path is locked iff some lock's path is a prefix of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub id: LockId,
    pub matrix: MatrixId,
    /// Profile that requested the lock.
    pub profile: ChainAddress,
    pub place_address: ChainAddress,
    pub path: TreePath,
    pub locked_pos: SlotPos,
    pub place_number: u32,
    pub created_at: i64,
    pub task_key: TaskKey,
    pub confirmed: bool,
}

/// Insert payload for a lock row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLock {
    pub matrix: MatrixId,
    pub profile: ChainAddress,
    pub place_address: ChainAddress,
    pub path: TreePath,
    pub locked_pos: SlotPos,
    pub place_number: u32,
    pub created_at: i64,
    pub task_key: TaskKey,
    pub confirmed: bool,
}

/// Head-of-queue task read from the ledger. Exists only until the ledger
/// advances past it; consumed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub key: TaskKey,
    pub query_id: u64,
    pub matrix: MatrixId,
    pub profile: ChainAddress,
    pub payload: TaskPayload,
}

/// Tagged intent carried by a queue task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Allocate a new place, optionally under a caller-chosen parent.
    CreatePlace {
        source: ChainAddress,
        fixed_parent: Option<ChainAddress>,
    },
    /// Allocate a clone place for an already-participating profile.
    CreateClone,
    /// Lock the subtree under the named place.
    LockPos {
        source: ChainAddress,
        target: ChainAddress,
    },
    /// Release a lock previously taken on the named place.
    UnlockPos {
        source: ChainAddress,
        target: ChainAddress,
    },
    /// Wire tag the gateway did not recognize.
    Unknown { tag: u32 },
}

impl TaskPayload {
    /// Stable label for logs.
    pub fn tag_name(&self) -> &'static str {
        match self {
            TaskPayload::CreatePlace { .. } => "create_place",
            TaskPayload::CreateClone => "create_clone",
            TaskPayload::LockPos { .. } => "lock_pos",
            TaskPayload::UnlockPos { .. } => "unlock_pos",
            TaskPayload::Unknown { .. } => "unknown",
        }
    }
}

/// Point-in-time view of an on-chain place: its fill counter and the child
/// addresses the contract has emitted so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceSnapshot {
    pub fill_count: u8,
    pub left_child: Option<ChainAddress>,
    pub right_child: Option<ChainAddress>,
}

impl PlaceSnapshot {
    /// The child address present in `current` but not in `self`, if any.
    pub fn new_child_in(&self, current: &PlaceSnapshot) -> Option<ChainAddress> {
        if current.left_child.is_some() && current.left_child != self.left_child {
            return current.left_child.clone();
        }
        if current.right_child.is_some() && current.right_child != self.right_child {
            return current.right_child.clone();
        }
        None
    }

    /// True when the contract reports any progress over `self`.
    pub fn advanced_by(&self, current: &PlaceSnapshot) -> bool {
        current.fill_count > self.fill_count
            || current.left_child != self.left_child
            || current.right_child != self.right_child
    }
}

/// On-chain identity of a profile, as read from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileIdentity {
    pub login: String,
    /// Wallet allowed to act for this profile.
    pub owner: ChainAddress,
    /// Profile that invited this one, if any.
    pub inviter: Option<ChainAddress>,
}

/// Profile data attached to a deploy transaction so the contract can
/// materialize the allocated place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePlacement {
    pub clone: bool,
    pub profile: ChainAddress,
    pub place_number: u32,
    pub inviter_profile: Option<ChainAddress>,
}
