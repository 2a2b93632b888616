//! Reconciler tick loop.
//!
//! A fixed-interval ticker drives the reconciler with strictly one cycle in
//! flight: a tick that lands while a cycle is still running is suppressed by
//! a non-blocking semaphore rather than a boolean flag. Shutdown arrives on
//! a watch channel; the loop drains the in-flight cycle before returning.

use crate::application::service::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Drives [`Reconciler::tick`] on a fixed interval, single-flight.
pub struct ReconcilerLoop {
    reconciler: Arc<Reconciler>,
    poll_interval: Duration,
    in_flight: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
}

impl ReconcilerLoop {
    pub fn new(
        reconciler: Arc<Reconciler>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reconciler,
            poll_interval,
            in_flight: Arc::new(Semaphore::new(1)),
            shutdown,
        }
    }

    /// Run until the shutdown channel flips to `true` (or its sender drops).
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.poll_interval.as_millis() as u64, "reconciler loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match Arc::clone(&self.in_flight).try_acquire_owned() {
                        Ok(permit) => {
                            let reconciler = Arc::clone(&self.reconciler);
                            tokio::spawn(async move {
                                reconciler.tick().await;
                                drop(permit);
                            });
                        }
                        Err(_) => {
                            debug!("previous cycle still running, tick suppressed");
                        }
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Let an in-flight cycle finish before reporting the loop stopped.
        let _drain = self.in_flight.acquire().await;
        info!("reconciler loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryLockStore, MemoryPlaceStore};
    use crate::config::ReconcilerConfig;
    use crate::domain::errors::LedgerError;
    use crate::ports::outbound::LedgerGateway;
    use async_trait::async_trait;
    use shared_types::{
        ChainAddress, PlaceSnapshot, ProfileIdentity, ProfilePlacement, Task, TaskKey, TxId,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Ledger whose head-task fetch blocks long enough to overlap several
    /// ticks, counting how many cycles actually started.
    struct SlowLedger {
        fetches: AtomicU32,
        hold: Duration,
    }

    #[async_trait]
    impl LedgerGateway for SlowLedger {
        async fn fetch_head_task(&self) -> Result<Option<Task>, LedgerError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            Ok(None)
        }

        async fn fetch_place_snapshot(
            &self,
            _place: &ChainAddress,
        ) -> Result<Option<PlaceSnapshot>, LedgerError> {
            Ok(None)
        }

        async fn fetch_profile_identity(
            &self,
            _profile: &ChainAddress,
        ) -> Result<Option<ProfileIdentity>, LedgerError> {
            Ok(None)
        }

        async fn submit_deploy(
            &self,
            _task_key: TaskKey,
            _parent: &ChainAddress,
            _placement: &ProfilePlacement,
            _query_id: u64,
        ) -> Result<TxId, LedgerError> {
            Ok(TxId("tx".into()))
        }

        async fn submit_cancel(
            &self,
            _task_key: TaskKey,
            _query_id: u64,
        ) -> Result<TxId, LedgerError> {
            Ok(TxId("tx".into()))
        }
    }

    #[tokio::test]
    async fn test_overlapping_ticks_are_suppressed() {
        let ledger = Arc::new(SlowLedger {
            fetches: AtomicU32::new(0),
            hold: Duration::from_millis(300),
        });
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(MemoryPlaceStore::new()),
            Arc::new(MemoryLockStore::new()),
            ledger.clone(),
            ReconcilerConfig::default(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(
            ReconcilerLoop::new(reconciler, Duration::from_millis(5), shutdown_rx).run(),
        );

        // Many 5 ms ticks land while one 300 ms cycle holds the permit.
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(ledger.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let ledger = Arc::new(SlowLedger {
            fetches: AtomicU32::new(0),
            hold: Duration::from_millis(1),
        });
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(MemoryPlaceStore::new()),
            Arc::new(MemoryLockStore::new()),
            ledger,
            ReconcilerConfig::default(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(
            ReconcilerLoop::new(reconciler, Duration::from_millis(5), shutdown_rx).run(),
        );

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop exits promptly")
            .unwrap();
    }
}
