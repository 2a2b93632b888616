//! In-process ledger emulation.
//!
//! Stands in for the chain client during local runs and integration tests:
//! a task queue, per-place snapshots, and profile identities, all mutated
//! the way the real contract would react to deploy and cancel
//! transactions. Wallet mechanics, fees and rate limiting do not exist
//! here; submissions are accepted instantly.

use async_trait::async_trait;
use mm_placement::{LedgerError, LedgerGateway};
use shared_types::{
    ChainAddress, PlaceSnapshot, ProfileIdentity, ProfilePlacement, Task, TaskKey, TxId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct SimState {
    queue: VecDeque<Task>,
    places: HashMap<ChainAddress, PlaceSnapshot>,
    identities: HashMap<ChainAddress, ProfileIdentity>,
    deploys: Vec<TaskKey>,
    cancels: Vec<TaskKey>,
    allocated: u64,
}

/// Simulated smart-contract queue.
#[derive(Default)]
pub struct SimulatedLedger {
    state: Mutex<SimState>,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an on-chain place with no children yet.
    pub fn register_place(&self, address: &ChainAddress) {
        self.state
            .lock()
            .unwrap()
            .places
            .insert(address.clone(), PlaceSnapshot::default());
    }

    pub fn register_identity(&self, profile: &ChainAddress, identity: ProfileIdentity) {
        self.state
            .lock()
            .unwrap()
            .identities
            .insert(profile.clone(), identity);
    }

    /// Append a task to the simulated queue.
    pub fn enqueue(&self, task: Task) {
        self.state.lock().unwrap().queue.push_back(task);
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    /// Task keys that were paid a deploy, in order.
    pub fn deploys(&self) -> Vec<TaskKey> {
        self.state.lock().unwrap().deploys.clone()
    }

    /// Task keys that were acknowledged via cancel, in order.
    pub fn cancels(&self) -> Vec<TaskKey> {
        self.state.lock().unwrap().cancels.clone()
    }
}

impl SimState {
    fn advance_past(&mut self, key: TaskKey) {
        if self.queue.front().is_some_and(|t| t.key == key) {
            self.queue.pop_front();
        }
    }

    /// What the contract does on a paid deploy: emit a child address under
    /// the parent and bump its fill counter.
    fn materialize_child(&mut self, parent: &ChainAddress) -> ChainAddress {
        self.allocated += 1;
        let child = ChainAddress::new(format!("EQsim{}", self.allocated));
        let snapshot = self.places.entry(parent.clone()).or_default();
        snapshot.fill_count += 1;
        if snapshot.left_child.is_none() {
            snapshot.left_child = Some(child.clone());
        } else {
            snapshot.right_child = Some(child.clone());
        }
        self.places.insert(child.clone(), PlaceSnapshot::default());
        child
    }
}

#[async_trait]
impl LedgerGateway for SimulatedLedger {
    async fn fetch_head_task(&self) -> Result<Option<Task>, LedgerError> {
        Ok(self.state.lock().unwrap().queue.front().cloned())
    }

    async fn fetch_place_snapshot(
        &self,
        place: &ChainAddress,
    ) -> Result<Option<PlaceSnapshot>, LedgerError> {
        Ok(self.state.lock().unwrap().places.get(place).cloned())
    }

    async fn fetch_profile_identity(
        &self,
        profile: &ChainAddress,
    ) -> Result<Option<ProfileIdentity>, LedgerError> {
        Ok(self.state.lock().unwrap().identities.get(profile).cloned())
    }

    async fn submit_deploy(
        &self,
        task_key: TaskKey,
        parent: &ChainAddress,
        placement: &ProfilePlacement,
        _query_id: u64,
    ) -> Result<TxId, LedgerError> {
        let mut state = self.state.lock().unwrap();
        let child = state.materialize_child(parent);
        state.advance_past(task_key);
        state.deploys.push(task_key);
        debug!(
            task_key = %task_key,
            parent = %parent,
            child = %child,
            place_number = placement.place_number,
            "simulated deploy accepted"
        );
        Ok(TxId(format!("sim-deploy-{task_key}")))
    }

    async fn submit_cancel(&self, task_key: TaskKey, _query_id: u64) -> Result<TxId, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.advance_past(task_key);
        state.cancels.push(task_key);
        debug!(task_key = %task_key, "simulated cancel accepted");
        Ok(TxId(format!("sim-cancel-{task_key}")))
    }
}
