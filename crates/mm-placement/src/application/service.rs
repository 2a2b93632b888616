//! Reconciler Service
//!
//! Processes the on-chain queue one task at a time:
//! fetch head → idempotency guard → validate → apply off-chain → pay the
//! contract → await confirmation. Every failure is contained to the cycle;
//! the next tick re-reads the same head task and retries from scratch, which
//! is safe because applied work is found again through the task key.

use crate::algorithms::next_position::find_next_position;
use crate::config::ReconcilerConfig;
use crate::domain::eligibility::LockContext;
use crate::domain::errors::{CycleError, RejectReason};
use crate::ports::outbound::{LedgerGateway, LockStore, PlaceStore};
use crate::util::retry::retry_exp;
use chrono::Utc;
use shared_types::{
    ChainAddress, Lock, MatrixId, NewLock, NewPlace, Page, Place, PlaceSnapshot, ProfilePlacement,
    SlotPos, Task, TaskKey, TaskPayload,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Page size used when draining a profile's full lock set.
const LOCK_PAGE_SIZE: u32 = 100;

/// How a reconciler cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The queue was empty.
    Idle,
    /// The idempotency guard found earlier work under this task key.
    AlreadyApplied { key: TaskKey },
    /// The task's effects are persisted and acknowledged on-chain.
    Applied { key: TaskKey },
    /// Validation failed; a cancel transaction acknowledged the task.
    Cancelled { key: TaskKey, reason: RejectReason },
}

/// The single writer of the off-chain mirror.
///
/// Owns no tree state between cycles; the stores are the source of truth.
/// The only carried state is the last task key a deploy was paid for, which
/// stops a retried cycle from paying twice.
pub struct Reconciler {
    places: Arc<dyn PlaceStore>,
    locks: Arc<dyn LockStore>,
    ledger: Arc<dyn LedgerGateway>,
    config: ReconcilerConfig,
    last_paid_task_key: Mutex<Option<TaskKey>>,
}

impl Reconciler {
    pub fn new(
        places: Arc<dyn PlaceStore>,
        locks: Arc<dyn LockStore>,
        ledger: Arc<dyn LedgerGateway>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            places,
            locks,
            ledger,
            config,
            last_paid_task_key: Mutex::new(None),
        }
    }

    /// One scheduler tick. Never propagates an error: a failed cycle is
    /// logged and the loop resumes on the next tick.
    pub async fn tick(&self) {
        match self.run_cycle().await {
            Ok(CycleOutcome::Idle) => {}
            Ok(outcome) => info!(?outcome, "cycle finished"),
            Err(error) => error!(error = %error, "cycle failed"),
        }
    }

    /// Run one full cycle against the current queue head.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let head = retry_exp(|| self.ledger.fetch_head_task(), &self.config.retry).await?;
        let Some(task) = head else {
            return Ok(CycleOutcome::Idle);
        };

        if let Some(existing) = self.places.by_task_key(task.key).await? {
            debug!(
                task_key = %task.key,
                place = %existing.address,
                "task already applied, skipping"
            );
            return Ok(CycleOutcome::AlreadyApplied { key: task.key });
        }

        info!(
            task_key = %task.key,
            payload = task.payload.tag_name(),
            matrix = %task.matrix,
            profile = %task.profile,
            "processing queue task"
        );

        let result = match task.payload.clone() {
            TaskPayload::CreatePlace {
                source,
                fixed_parent,
            } => {
                self.process_create(&task, Some(source), fixed_parent, false)
                    .await
            }
            TaskPayload::CreateClone => self.process_create(&task, None, None, true).await,
            TaskPayload::LockPos { source, target } => {
                self.process_lock(&task, source, target).await
            }
            TaskPayload::UnlockPos { source, target } => {
                self.process_unlock(&task, source, target).await
            }
            TaskPayload::Unknown { tag } => Err(CycleError::UnknownPayload {
                key: task.key,
                tag,
            }),
        };

        match result {
            Err(CycleError::Rejected(reason)) => {
                warn!(
                    task_key = %task.key,
                    payload = task.payload.tag_name(),
                    reason = %reason,
                    "task rejected, cancelling"
                );
                self.ledger.submit_cancel(task.key, task.query_id).await?;
                Ok(CycleOutcome::Cancelled {
                    key: task.key,
                    reason,
                })
            }
            other => other,
        }
    }

    async fn process_create(
        &self,
        task: &Task,
        source: Option<ChainAddress>,
        fixed_parent: Option<ChainAddress>,
        clone: bool,
    ) -> Result<CycleOutcome, CycleError> {
        let root = self.find_root_place(task.matrix, &task.profile).await?;
        debug!(
            task_key = %task.key,
            root = %root.address,
            root_path = %root.path,
            "resolved root place"
        );

        let parent = match fixed_parent {
            Some(address) => {
                self.validate_fixed_parent(task.matrix, &root, &address)
                    .await?
            }
            None => {
                let locks = self.load_locks(task.matrix, &root.profile).await?;
                find_next_position(
                    self.places.as_ref(),
                    &root,
                    &locks,
                    self.config.finder_page_size,
                )
                .await?
                .ok_or_else(|| CycleError::TreeExhausted(root.path.clone()))?
            }
        };
        info!(
            task_key = %task.key,
            parent = %parent.address,
            parent_path = %parent.path,
            "placement parent selected"
        );

        let identity = retry_exp(
            || self.ledger.fetch_profile_identity(&task.profile),
            &self.config.retry,
        )
        .await?
        .ok_or_else(|| RejectReason::ProfileIdentityMissing(task.profile.clone()))?;
        let login = shared_types::sanitize_login(&identity.login)
            .ok_or_else(|| RejectReason::LoginUnusable(task.profile.clone()))?;

        let place_number = self
            .places
            .max_place_number(task.matrix, &task.profile)
            .await?
            + 1;
        let pos = SlotPos::from_filling(parent.filling);
        let path = parent.path.child(pos);

        // Snapshot the parent before paying so the confirmation poll can
        // tell a newly emitted child apart from pre-existing ones.
        let parent_snapshot = retry_exp(
            || self.ledger.fetch_place_snapshot(&parent.address),
            &self.config.retry,
        )
        .await?;

        let created = self
            .places
            .insert(NewPlace {
                matrix: task.matrix,
                profile: task.profile.clone(),
                address: ChainAddress::unconfirmed(),
                parent_id: Some(parent.id),
                parent_address: Some(parent.address.clone()),
                path,
                pos,
                place_number,
                created_at: now_ms(),
                clone,
                login,
                inviter_profile: identity.inviter.clone(),
                task_key: task.key,
                task_query_id: task.query_id,
                task_source: source,
                confirmed: false,
            })
            .await?;
        self.places.increment_filling(parent.id).await?;
        if let Some(grandparent) = parent.parent_id {
            self.places.increment_filling2(grandparent).await?;
        }
        info!(
            task_key = %task.key,
            path = %created.path,
            place_number,
            "place recorded, paying deploy"
        );

        let placement = ProfilePlacement {
            clone,
            profile: task.profile.clone(),
            place_number,
            inviter_profile: identity.inviter,
        };
        self.submit_deploy_guarded(task, &parent.address, &placement)
            .await?;

        let child = self
            .wait_for_new_child(&parent.address, parent_snapshot)
            .await?;
        self.places.confirm_address(created.id, &child).await?;
        info!(
            task_key = %task.key,
            address = %child,
            "place confirmed with on-chain address"
        );
        Ok(CycleOutcome::Applied { key: task.key })
    }

    async fn process_lock(
        &self,
        task: &Task,
        source: ChainAddress,
        target: ChainAddress,
    ) -> Result<CycleOutcome, CycleError> {
        self.require_owner(&task.profile, &source).await?;

        let root = self
            .places
            .root(task.matrix, &task.profile)
            .await?
            .ok_or_else(|| RejectReason::NoRootPlace(task.profile.clone()))?;
        let place = self
            .places
            .by_address(&target)
            .await?
            .ok_or_else(|| RejectReason::TargetPlaceMissing(target.clone()))?;
        if place.matrix != task.matrix || !place.path.starts_with(&root.path) {
            return Err(RejectReason::TargetOutsideSubtree {
                target,
                root: root.path.clone(),
            }
            .into());
        }
        if place.path == root.path {
            return Err(RejectReason::RootNotLockable.into());
        }

        // A row left behind by an aborted cycle just needs its
        // acknowledgement finished.
        if let Some(existing) = self.locks.by_path(task.matrix, &place.path).await? {
            if existing.task_key == task.key {
                self.ledger.submit_cancel(task.key, task.query_id).await?;
                self.locks.confirm(existing.id).await?;
                info!(task_key = %task.key, path = %place.path, "lock acknowledgement resumed");
                return Ok(CycleOutcome::Applied { key: task.key });
            }
        }

        let locks = self.load_locks(task.matrix, &task.profile).await?;
        let parent = match place.path.parent() {
            Some(parent_path) => self.places.by_path(task.matrix, &parent_path).await?,
            None => None,
        };
        let eligibility = LockContext::new(&root, &locks, None);
        if !eligibility.can_lock(&place.path, parent.as_ref()) {
            return Err(RejectReason::NotLockable(target).into());
        }

        let lock = self
            .locks
            .insert(NewLock {
                matrix: task.matrix,
                profile: task.profile.clone(),
                place_address: place.address.clone(),
                path: place.path.clone(),
                locked_pos: place.pos,
                place_number: place.place_number,
                created_at: now_ms(),
                task_key: task.key,
                confirmed: false,
            })
            .await?;
        // Locking is pure off-chain bookkeeping: acknowledge via cancel to
        // free the queue, then confirm locally. Nothing further is awaited
        // from the contract.
        self.ledger.submit_cancel(task.key, task.query_id).await?;
        self.locks.confirm(lock.id).await?;
        info!(task_key = %task.key, path = %lock.path, "lock recorded and confirmed");
        Ok(CycleOutcome::Applied { key: task.key })
    }

    async fn process_unlock(
        &self,
        task: &Task,
        source: ChainAddress,
        target: ChainAddress,
    ) -> Result<CycleOutcome, CycleError> {
        self.require_owner(&task.profile, &source).await?;

        let lock = self
            .locks
            .by_address(&target)
            .await?
            .ok_or_else(|| RejectReason::LockNotFound(target.clone()))?;
        if lock.profile != task.profile {
            return Err(RejectReason::LockOwnershipMismatch {
                place: target,
                owner: lock.profile,
                requester: task.profile.clone(),
            }
            .into());
        }

        self.ledger.submit_cancel(task.key, task.query_id).await?;
        self.locks.remove(lock.id).await?;
        info!(task_key = %task.key, path = %lock.path, "lock released");
        Ok(CycleOutcome::Applied { key: task.key })
    }

    /// Resolve the subtree root for a profile, walking up the inviter chain
    /// when the profile has no tree of its own. The walk is bounded and
    /// cycle-checked; malformed chains end the cycle, chains that run out of
    /// inviters reject the task.
    async fn find_root_place(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
    ) -> Result<Place, CycleError> {
        let mut visited: HashSet<ChainAddress> = HashSet::new();
        let mut current = profile.clone();
        for _ in 0..self.config.max_inviter_hops {
            if !visited.insert(current.clone()) {
                return Err(CycleError::InviterCycle(current));
            }
            if let Some(root) = self.places.root(matrix, &current).await? {
                return Ok(root);
            }
            let identity = retry_exp(
                || self.ledger.fetch_profile_identity(&current),
                &self.config.retry,
            )
            .await?
            .ok_or_else(|| RejectReason::ProfileIdentityMissing(current.clone()))?;
            match identity.inviter {
                Some(inviter) => current = inviter,
                None => return Err(RejectReason::InviterNotFound(current).into()),
            }
        }
        Err(CycleError::InviterChainTooDeep {
            profile: profile.clone(),
            limit: self.config.max_inviter_hops,
        })
    }

    async fn validate_fixed_parent(
        &self,
        matrix: MatrixId,
        root: &Place,
        address: &ChainAddress,
    ) -> Result<Place, CycleError> {
        let parent = self
            .places
            .by_address(address)
            .await?
            .ok_or_else(|| RejectReason::FixedParentMissing(address.clone()))?;
        if parent.matrix != matrix {
            return Err(RejectReason::FixedParentForeignMatrix {
                parent: address.clone(),
                matrix: parent.matrix,
            }
            .into());
        }
        if !parent.path.starts_with(&root.path) {
            return Err(RejectReason::FixedParentOutsideSubtree {
                parent: address.clone(),
                root: root.path.clone(),
            }
            .into());
        }
        if parent.filling >= 2 {
            return Err(RejectReason::FixedParentFull(address.clone()).into());
        }
        Ok(parent)
    }

    async fn require_owner(
        &self,
        profile: &ChainAddress,
        sender: &ChainAddress,
    ) -> Result<(), CycleError> {
        let identity = retry_exp(
            || self.ledger.fetch_profile_identity(profile),
            &self.config.retry,
        )
        .await?
        .ok_or_else(|| RejectReason::ProfileIdentityMissing(profile.clone()))?;
        if identity.owner != *sender {
            return Err(RejectReason::SenderNotOwner {
                sender: sender.clone(),
                profile: profile.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn load_locks(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
    ) -> Result<Vec<Lock>, CycleError> {
        let mut page = Page::first(LOCK_PAGE_SIZE);
        let mut all = Vec::new();
        loop {
            let batch = self.locks.list(matrix, profile, page).await?;
            let fetched = batch.items.len() as u32;
            all.extend(batch.items);
            if fetched < page.size {
                return Ok(all);
            }
            page = page.next();
        }
    }

    /// Pay the deploy unless this task key was already paid in an earlier
    /// (aborted) cycle. Submissions are never retried: only the contract
    /// knows whether a lost response was in fact accepted.
    async fn submit_deploy_guarded(
        &self,
        task: &Task,
        parent: &ChainAddress,
        placement: &ProfilePlacement,
    ) -> Result<(), CycleError> {
        if *self.last_paid_task_key.lock().unwrap() == Some(task.key) {
            debug!(task_key = %task.key, "deploy already paid, skipping");
            return Ok(());
        }
        let tx = self
            .ledger
            .submit_deploy(task.key, parent, placement, task.query_id)
            .await?;
        *self.last_paid_task_key.lock().unwrap() = Some(task.key);
        debug!(task_key = %task.key, tx = %tx.0, "deploy accepted");
        Ok(())
    }

    /// Poll the parent's on-chain snapshot until a child address appears
    /// that was not present before the deploy.
    async fn wait_for_new_child(
        &self,
        parent: &ChainAddress,
        before: Option<PlaceSnapshot>,
    ) -> Result<ChainAddress, CycleError> {
        let before = before.unwrap_or_default();
        let started = Instant::now();
        loop {
            let current = retry_exp(
                || self.ledger.fetch_place_snapshot(parent),
                &self.config.retry,
            )
            .await?;
            if let Some(current) = current {
                if before.advanced_by(&current) {
                    return before
                        .new_child_in(&current)
                        .ok_or(CycleError::ChildAddressMissing);
                }
            }
            if started.elapsed() >= self.config.child_wait_timeout() {
                return Err(CycleError::Timeout {
                    what: "a new child address",
                    waited_ms: self.config.child_wait_timeout_ms,
                });
            }
            sleep(self.config.child_wait_interval()).await;
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
