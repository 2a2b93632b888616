//! Error types for the placement reconciler.
//!
//! The taxonomy mirrors how failures are handled, not where they occur:
//! rejections cancel the task, transient I/O is retried then surfaced,
//! timeouts and invariant violations abort the cycle without rollback.

use shared_types::{ChainAddress, TaskKey, TreePath};
use thiserror::Error;

/// Failures surfaced by a place/lock store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying query failed.
    #[error("store query failed: {0}")]
    Query(String),

    /// An update targeted a row that does not exist.
    #[error("row missing: {0}")]
    RowMissing(String),
}

/// Failures surfaced by the ledger gateway.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Network or node failure; candidates for retry.
    #[error("ledger transport failure: {0}")]
    Transport(String),

    /// The node answered but the payload could not be decoded.
    #[error("could not decode ledger response: {0}")]
    Decode(String),

    /// A submitted transaction was not accepted within its deadline.
    #[error("transaction not accepted: {0}")]
    NotAccepted(String),
}

/// A task payload failed a business rule. Triggers cancel-and-acknowledge,
/// never a retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The inviter chain ended at a profile with no root place.
    #[error("profile {0} has no root place and no inviter to inherit one from")]
    InviterNotFound(ChainAddress),

    /// The ledger has no identity record for the profile.
    #[error("no on-chain identity for profile {0}")]
    ProfileIdentityMissing(ChainAddress),

    /// The profile login sanitized down to nothing.
    #[error("profile {0} has no usable login")]
    LoginUnusable(ChainAddress),

    /// A caller-chosen parent does not exist off-chain.
    #[error("fixed parent {0} not found")]
    FixedParentMissing(ChainAddress),

    /// A caller-chosen parent belongs to another matrix.
    #[error("fixed parent {parent} belongs to matrix {matrix}")]
    FixedParentForeignMatrix {
        parent: ChainAddress,
        matrix: shared_types::MatrixId,
    },

    /// A caller-chosen parent lies outside the requester's subtree.
    #[error("fixed parent {parent} is outside the subtree rooted at {root}")]
    FixedParentOutsideSubtree { parent: ChainAddress, root: TreePath },

    /// A caller-chosen parent already has both children.
    #[error("fixed parent {0} already has two children")]
    FixedParentFull(ChainAddress),

    /// The task sender is not the wallet that owns the profile.
    #[error("sender {sender} does not own profile {profile}")]
    SenderNotOwner {
        sender: ChainAddress,
        profile: ChainAddress,
    },

    /// The profile has no tree in this matrix to lock within.
    #[error("profile {0} has no root place in this matrix")]
    NoRootPlace(ChainAddress),

    /// The lock/unlock target place does not exist off-chain.
    #[error("target place {0} not found")]
    TargetPlaceMissing(ChainAddress),

    /// The subtree root can never be locked.
    #[error("the subtree root cannot be locked")]
    RootNotLockable,

    /// The lock target lies outside the requester's subtree.
    #[error("target {target} is outside the subtree rooted at {root}")]
    TargetOutsideSubtree { target: ChainAddress, root: TreePath },

    /// The lock eligibility predicate said no.
    #[error("place {0} is not lockable")]
    NotLockable(ChainAddress),

    /// No active lock exists for the unlock target.
    #[error("no lock held on place {0}")]
    LockNotFound(ChainAddress),

    /// The lock belongs to someone else.
    #[error("lock on {place} belongs to {owner}, not {requester}")]
    LockOwnershipMismatch {
        place: ChainAddress,
        owner: ChainAddress,
        requester: ChainAddress,
    },
}

/// Anything that ends a reconciler cycle early.
///
/// `Rejected` is handled at the dispatch boundary (cancel transaction, cycle
/// reaches `Cancelled`); every other variant aborts the cycle as `Failed`
/// and is retried from scratch on the next tick.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("task rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Confirmation polling exceeded its deadline. No partial state is
    /// rolled back; the unconfirmed row feeds the next cycle's idempotency
    /// guard.
    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: &'static str, waited_ms: u64 },

    /// The next-position search exhausted the subtree.
    #[error("no open position left in the subtree rooted at {0}")]
    TreeExhausted(TreePath),

    /// The inviter chain walk hit its hop bound.
    #[error("inviter chain from {profile} exceeded {limit} hops")]
    InviterChainTooDeep { profile: ChainAddress, limit: u32 },

    /// The inviter chain visited the same profile twice.
    #[error("inviter chain loops back to {0}")]
    InviterCycle(ChainAddress),

    /// The gateway produced a payload tag the reconciler does not know.
    #[error("task {key} carries unknown payload tag {tag}")]
    UnknownPayload { key: TaskKey, tag: u32 },

    /// The parent snapshot advanced but neither child address changed.
    #[error("parent snapshot advanced without a new child address")]
    ChildAddressMissing,
}
