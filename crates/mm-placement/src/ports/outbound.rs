//! Outbound Ports (Driven Ports)
//!
//! Dependencies the reconciler and the tree view require the host
//! application to implement: the two relational stores and the ledger
//! gateway. The storage engine and the blockchain client live behind these
//! contracts; nothing in this workspace knows their wire formats.

use crate::domain::errors::{LedgerError, StoreError};
use async_trait::async_trait;
use shared_types::{
    ChainAddress, Lock, LockId, MatrixId, NewLock, NewPlace, Page, PageOf, Place, PlaceId,
    PlaceSnapshot, ProfileIdentity, ProfilePlacement, Task, TaskKey, TreePath, TxId,
};

/// Place rows: one table, exclusively written by the reconciler.
///
/// Production: relational store adapter (host application).
/// Testing and local runs: `adapters::memory::MemoryPlaceStore`.
#[async_trait]
pub trait PlaceStore: Send + Sync {
    /// The profile's root place (`place_number == 1`), if the profile has a
    /// tree in this matrix.
    async fn root(&self, matrix: MatrixId, profile: &ChainAddress)
        -> Result<Option<Place>, StoreError>;

    async fn by_address(&self, address: &ChainAddress) -> Result<Option<Place>, StoreError>;

    async fn by_path(&self, matrix: MatrixId, path: &TreePath)
        -> Result<Option<Place>, StoreError>;

    /// Idempotency lookup: the place a task already produced, if any.
    async fn by_task_key(&self, key: TaskKey) -> Result<Option<Place>, StoreError>;

    /// Places with `filling < 2` inside the prefix subtree, ordered by
    /// (path length, path). Callers re-sort each page and must not rely on
    /// store-side ordering.
    async fn open_by_prefix(
        &self,
        matrix: MatrixId,
        prefix: &TreePath,
        page: Page,
    ) -> Result<PageOf<Place>, StoreError>;

    /// All places inside the prefix subtree down to `max_depth` levels below
    /// the prefix, ordered by (path length, path).
    async fn by_prefix(
        &self,
        matrix: MatrixId,
        prefix: &TreePath,
        max_depth: u32,
        page: Page,
    ) -> Result<PageOf<Place>, StoreError>;

    /// Number of places inside the prefix subtree, the prefix place included.
    async fn count_by_prefix(&self, matrix: MatrixId, prefix: &TreePath)
        -> Result<u64, StoreError>;

    /// Number of places allocated to a profile.
    async fn count(&self, matrix: MatrixId, profile: &ChainAddress) -> Result<u64, StoreError>;

    /// A profile's places ordered by `place_number`.
    async fn list(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
        page: Page,
    ) -> Result<PageOf<Place>, StoreError>;

    /// Places inside `root_prefix` whose search index starts with
    /// `index_prefix`, ordered by index.
    async fn search(
        &self,
        matrix: MatrixId,
        root_prefix: &TreePath,
        index_prefix: &str,
        page: Page,
    ) -> Result<PageOf<Place>, StoreError>;

    /// Highest `place_number` a profile holds, 0 when it holds none.
    async fn max_place_number(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
    ) -> Result<u32, StoreError>;

    async fn insert(&self, place: NewPlace) -> Result<Place, StoreError>;

    async fn increment_filling(&self, id: PlaceId) -> Result<(), StoreError>;

    async fn increment_filling2(&self, id: PlaceId) -> Result<(), StoreError>;

    /// Record the ledger-assigned address and flip `confirmed`.
    async fn confirm_address(&self, id: PlaceId, address: &ChainAddress)
        -> Result<(), StoreError>;
}

/// Lock rows: the active subtree holds per matrix and profile.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// A profile's locks ordered by `place_number`.
    async fn list(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
        page: Page,
    ) -> Result<PageOf<Lock>, StoreError>;

    async fn by_path(&self, matrix: MatrixId, path: &TreePath) -> Result<Option<Lock>, StoreError>;

    async fn by_address(&self, address: &ChainAddress) -> Result<Option<Lock>, StoreError>;

    async fn insert(&self, lock: NewLock) -> Result<Lock, StoreError>;

    async fn confirm(&self, id: LockId) -> Result<(), StoreError>;

    async fn remove(&self, id: LockId) -> Result<(), StoreError>;
}

/// The smart-contract queue and its surrounding reads.
///
/// All calls are subject to an externally imposed rate limit and must
/// tolerate transient failures; the reconciler wraps reads in bounded
/// backoff. `submit_*` return only after the wallet sequence number has
/// advanced (30 s cap inside the adapter), so a returned `TxId` means the
/// transaction was accepted.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// The single outstanding queue task, if any.
    async fn fetch_head_task(&self) -> Result<Option<Task>, LedgerError>;

    /// Fill counter and child addresses of an on-chain place.
    async fn fetch_place_snapshot(
        &self,
        place: &ChainAddress,
    ) -> Result<Option<PlaceSnapshot>, LedgerError>;

    /// Login, owner wallet and inviter of a profile.
    async fn fetch_profile_identity(
        &self,
        profile: &ChainAddress,
    ) -> Result<Option<ProfileIdentity>, LedgerError>;

    /// Pay the contract to materialize a placement decision.
    async fn submit_deploy(
        &self,
        task_key: TaskKey,
        parent: &ChainAddress,
        placement: &ProfilePlacement,
        query_id: u64,
    ) -> Result<TxId, LedgerError>;

    /// Acknowledge-and-drop the head task.
    async fn submit_cancel(&self, task_key: TaskKey, query_id: u64) -> Result<TxId, LedgerError>;
}

/// Mock implementations for testing
#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted ledger: a queue of tasks, per-address snapshot scripts, and
    /// a record of every submitted transaction.
    ///
    /// Snapshot scripts are drained one fetch at a time; the last entry
    /// repeats, so a `[before, after]` script models a contract that emits a
    /// child between two polls.
    #[derive(Default)]
    pub struct ScriptedLedger {
        tasks: Mutex<VecDeque<Task>>,
        snapshots: Mutex<HashMap<ChainAddress, VecDeque<PlaceSnapshot>>>,
        identities: Mutex<HashMap<ChainAddress, ProfileIdentity>>,
        deploys: Mutex<Vec<(TaskKey, ChainAddress, ProfilePlacement, u64)>>,
        cancels: Mutex<Vec<(TaskKey, u64)>>,
    }

    impl ScriptedLedger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_task(&self, task: Task) {
            self.tasks.lock().unwrap().push_back(task);
        }

        pub fn script_snapshots(&self, place: &ChainAddress, script: Vec<PlaceSnapshot>) {
            self.snapshots
                .lock()
                .unwrap()
                .insert(place.clone(), script.into());
        }

        pub fn set_identity(&self, profile: &ChainAddress, identity: ProfileIdentity) {
            self.identities
                .lock()
                .unwrap()
                .insert(profile.clone(), identity);
        }

        pub fn deploys(&self) -> Vec<(TaskKey, ChainAddress, ProfilePlacement, u64)> {
            self.deploys.lock().unwrap().clone()
        }

        pub fn cancels(&self) -> Vec<(TaskKey, u64)> {
            self.cancels.lock().unwrap().clone()
        }

        fn advance_queue(&self, key: TaskKey) {
            let mut tasks = self.tasks.lock().unwrap();
            if tasks.front().is_some_and(|t| t.key == key) {
                tasks.pop_front();
            }
        }
    }

    #[async_trait]
    impl LedgerGateway for ScriptedLedger {
        async fn fetch_head_task(&self) -> Result<Option<Task>, LedgerError> {
            Ok(self.tasks.lock().unwrap().front().cloned())
        }

        async fn fetch_place_snapshot(
            &self,
            place: &ChainAddress,
        ) -> Result<Option<PlaceSnapshot>, LedgerError> {
            let mut snapshots = self.snapshots.lock().unwrap();
            let Some(script) = snapshots.get_mut(place) else {
                return Ok(None);
            };
            if script.len() > 1 {
                Ok(script.pop_front())
            } else {
                Ok(script.front().cloned())
            }
        }

        async fn fetch_profile_identity(
            &self,
            profile: &ChainAddress,
        ) -> Result<Option<ProfileIdentity>, LedgerError> {
            Ok(self.identities.lock().unwrap().get(profile).cloned())
        }

        async fn submit_deploy(
            &self,
            task_key: TaskKey,
            parent: &ChainAddress,
            placement: &ProfilePlacement,
            query_id: u64,
        ) -> Result<TxId, LedgerError> {
            self.deploys
                .lock()
                .unwrap()
                .push((task_key, parent.clone(), placement.clone(), query_id));
            self.advance_queue(task_key);
            Ok(TxId(format!("deploy-{task_key}")))
        }

        async fn submit_cancel(
            &self,
            task_key: TaskKey,
            query_id: u64,
        ) -> Result<TxId, LedgerError> {
            self.cancels.lock().unwrap().push((task_key, query_id));
            self.advance_queue(task_key);
            Ok(TxId(format!("cancel-{task_key}")))
        }
    }
}
