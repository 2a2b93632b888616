//! Process container: owns the stores, the gateway and the reconciler.

use crate::config::RuntimeConfig;
use crate::sim::SimulatedLedger;
use anyhow::Result;
use chrono::Utc;
use mm_placement::adapters::memory::{MemoryLockStore, MemoryPlaceStore};
use mm_placement::{PlaceStore, Reconciler, ReconcilerLoop};
use mm_tree_view::{MatrixQueries, TreeView};
use shared_types::{ChainAddress, NewPlace, ProfileIdentity, SlotPos, TaskKey, TreePath};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// All long-lived services of one mirror process.
pub struct Mirror {
    config: RuntimeConfig,
    places: Arc<MemoryPlaceStore>,
    locks: Arc<MemoryLockStore>,
    ledger: Arc<SimulatedLedger>,
    reconciler: Arc<Reconciler>,
}

impl Mirror {
    pub fn new(config: RuntimeConfig) -> Self {
        let places = Arc::new(MemoryPlaceStore::new());
        let locks = Arc::new(MemoryLockStore::new());
        let ledger = Arc::new(SimulatedLedger::new());
        let reconciler = Arc::new(Reconciler::new(
            places.clone(),
            locks.clone(),
            ledger.clone(),
            config.reconciler.clone(),
        ));
        Self {
            config,
            places,
            locks,
            ledger,
            reconciler,
        }
    }

    pub fn ledger(&self) -> Arc<SimulatedLedger> {
        self.ledger.clone()
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }

    pub fn places(&self) -> Arc<MemoryPlaceStore> {
        self.places.clone()
    }

    pub fn locks(&self) -> Arc<MemoryLockStore> {
        self.locks.clone()
    }

    pub fn tree_view(&self) -> TreeView {
        TreeView::new(self.places.clone(), self.locks.clone())
    }

    pub fn queries(&self) -> MatrixQueries {
        MatrixQueries::new(self.places.clone(), self.locks.clone())
    }

    /// Seed the matrix anchor: the one place every other placement descends
    /// from. Skipped when the store already has it, so restarts are safe.
    pub async fn bootstrap(&self) -> Result<()> {
        let config = &self.config;
        if self
            .places
            .root(config.matrix, &config.anchor_profile)
            .await?
            .is_some()
        {
            info!(matrix = %config.matrix, "anchor place already present");
            return Ok(());
        }

        self.places
            .insert(NewPlace {
                matrix: config.matrix,
                profile: config.anchor_profile.clone(),
                address: config.anchor_address.clone(),
                parent_id: None,
                parent_address: None,
                path: TreePath::root(),
                pos: SlotPos::Left,
                place_number: 1,
                created_at: Utc::now().timestamp_millis(),
                clone: false,
                login: config.anchor_login.clone(),
                inviter_profile: None,
                task_key: TaskKey(0),
                task_query_id: 0,
                task_source: None,
                confirmed: true,
            })
            .await?;
        self.ledger.register_place(&config.anchor_address);
        self.ledger.register_identity(
            &config.anchor_profile,
            ProfileIdentity {
                login: config.anchor_login.clone(),
                owner: ChainAddress::new(format!("{}-owner", config.anchor_profile)),
                inviter: None,
            },
        );
        info!(
            matrix = %config.matrix,
            profile = %config.anchor_profile,
            address = %config.anchor_address,
            "anchor place seeded"
        );
        Ok(())
    }

    /// Spawn the reconciler loop; it runs until `shutdown` flips to true.
    pub fn spawn_reconciler(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let tick_loop = ReconcilerLoop::new(
            self.reconciler.clone(),
            self.config.reconciler.poll_interval(),
            shutdown,
        );
        tokio::spawn(tick_loop.run())
    }
}
