//! # Integration Test Flows
//!
//! End-to-end reconciler scenarios over the runtime container: placement
//! tasks flowing from the simulated queue through the reconciler into the
//! stores, lock/unlock handling, and the tree view rendered from the
//! reconciled state.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mirror_runtime::{Mirror, RuntimeConfig, SimulatedLedger};
    use mm_placement::domain::invariants::{
        invariant_filling_matches_children, invariant_one_root_per_profile,
        invariant_parent_linkage, invariant_unique_paths,
    };
    use mm_placement::{CycleOutcome, LockStore, PlaceStore, RejectReason};
    use shared_types::{
        ChainAddress, MatrixId, Page, ProfileIdentity, Task, TaskKey, TaskPayload, TreePath,
    };

    const MATRIX: MatrixId = MatrixId(1);

    fn addr(s: &str) -> ChainAddress {
        ChainAddress::from(s)
    }

    fn path(s: &str) -> TreePath {
        TreePath::parse(s).unwrap()
    }

    async fn mirror() -> Mirror {
        let mirror = Mirror::new(RuntimeConfig::default());
        mirror.bootstrap().await.unwrap();
        mirror
    }

    /// Register a member profile invited by the anchor and return its
    /// wallet address.
    fn register_member(ledger: &SimulatedLedger, profile: &str, login: &str) -> ChainAddress {
        let wallet = ChainAddress::new(format!("{profile}-wallet"));
        ledger.register_identity(
            &addr(profile),
            ProfileIdentity {
                login: login.to_string(),
                owner: wallet.clone(),
                inviter: Some(addr("EQanchor-profile")),
            },
        );
        wallet
    }

    fn create_task(key: u64, profile: &str, wallet: &ChainAddress) -> Task {
        Task {
            key: TaskKey(key),
            query_id: key,
            matrix: MATRIX,
            profile: addr(profile),
            payload: TaskPayload::CreatePlace {
                source: wallet.clone(),
                fixed_parent: None,
            },
        }
    }

    #[tokio::test]
    async fn test_placement_flow_end_to_end() {
        let mirror = mirror().await;
        let ledger = mirror.ledger();
        let wallet = register_member(&ledger, "EQmember1", "Alice");
        ledger.enqueue(create_task(42, "EQmember1", &wallet));

        let outcome = mirror.reconciler().run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Applied { key: TaskKey(42) });
        assert_eq!(ledger.deploys(), vec![TaskKey(42)]);
        assert_eq!(ledger.queue_len(), 0);

        let created = mirror
            .places()
            .by_task_key(TaskKey(42))
            .await
            .unwrap()
            .expect("place mirrored");
        assert_eq!(created.path, path("0"));
        assert_eq!(created.login, "alice");
        assert!(created.confirmed);
        // The address comes from the contract, not the sentinel.
        assert!(!created.address.is_unconfirmed());

        let anchor = mirror
            .places()
            .root(MATRIX, &addr("EQanchor-profile"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anchor.filling, 1);
    }

    #[tokio::test]
    async fn test_many_placements_keep_the_tree_valid() {
        let mirror = mirror().await;
        let ledger = mirror.ledger();

        for n in 0..14u64 {
            let profile = format!("EQmember{n}");
            let wallet = register_member(&ledger, &profile, &format!("user{n}"));
            ledger.enqueue(create_task(100 + n, &profile, &wallet));
        }
        for _ in 0..14 {
            let outcome = mirror.reconciler().run_cycle().await.unwrap();
            assert!(matches!(outcome, CycleOutcome::Applied { .. }));
        }

        let places = mirror
            .places()
            .by_prefix(MATRIX, &TreePath::root(), u32::MAX, Page::all())
            .await
            .unwrap()
            .items;
        assert_eq!(places.len(), 15);
        assert!(invariant_unique_paths(&places));
        assert!(invariant_parent_linkage(&places));
        assert!(invariant_filling_matches_children(&places));
        assert!(invariant_one_root_per_profile(&places));

        // Breadth-first fill: the first three levels are complete.
        for p in ["", "0", "1", "00", "01", "10", "11"] {
            let place = mirror
                .places()
                .by_path(MATRIX, &path(p))
                .await
                .unwrap()
                .unwrap_or_else(|| panic!("path {p:?} occupied"));
            assert_eq!(place.filling, 2, "path {p:?} full");
        }
    }

    #[tokio::test]
    async fn test_replay_after_restart_is_idempotent() {
        let mirror = mirror().await;
        let ledger = mirror.ledger();
        let wallet = register_member(&ledger, "EQmember1", "Alice");
        ledger.enqueue(create_task(42, "EQmember1", &wallet));
        mirror.reconciler().run_cycle().await.unwrap();

        // A duplicate poll surfaces the consumed task again, e.g. after the
        // process restarted with a fresh in-memory payment guard.
        ledger.enqueue(create_task(42, "EQmember1", &wallet));
        let outcome = mirror.reconciler().run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::AlreadyApplied { key: TaskKey(42) });

        assert_eq!(
            mirror.places().count(MATRIX, &addr("EQmember1")).await.unwrap(),
            1
        );
        assert_eq!(ledger.deploys(), vec![TaskKey(42)]);
    }

    #[tokio::test]
    async fn test_lock_excludes_subtree_from_later_placements() {
        let mirror = mirror().await;
        let ledger = mirror.ledger();

        // Fill the anchor's two child slots first.
        for n in 0..2u64 {
            let profile = format!("EQmember{n}");
            let wallet = register_member(&ledger, &profile, &format!("user{n}"));
            ledger.enqueue(create_task(100 + n, &profile, &wallet));
            mirror.reconciler().run_cycle().await.unwrap();
        }
        let left = mirror
            .places()
            .by_path(MATRIX, &path("0"))
            .await
            .unwrap()
            .unwrap();

        // The anchor profile locks its left child.
        let anchor_wallet = addr("EQanchor-profile-owner");
        ledger.enqueue(Task {
            key: TaskKey(200),
            query_id: 200,
            matrix: MATRIX,
            profile: addr("EQanchor-profile"),
            payload: TaskPayload::LockPos {
                source: anchor_wallet,
                target: left.address.clone(),
            },
        });
        let outcome = mirror.reconciler().run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Applied { key: TaskKey(200) });
        assert_eq!(ledger.cancels(), vec![TaskKey(200)]);

        // The next placement must land under "1", not "0".
        let wallet = register_member(&ledger, "EQmember9", "late");
        ledger.enqueue(create_task(201, "EQmember9", &wallet));
        mirror.reconciler().run_cycle().await.unwrap();
        let created = mirror
            .places()
            .by_task_key(TaskKey(201))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.path, path("10"));
    }

    #[tokio::test]
    async fn test_unlock_from_wrong_profile_is_cancelled() {
        let mirror = mirror().await;
        let ledger = mirror.ledger();

        let wallet = register_member(&ledger, "EQmember1", "Alice");
        ledger.enqueue(create_task(42, "EQmember1", &wallet));
        mirror.reconciler().run_cycle().await.unwrap();
        let place = mirror
            .places()
            .by_task_key(TaskKey(42))
            .await
            .unwrap()
            .unwrap();

        // Anchor locks the new place.
        ledger.enqueue(Task {
            key: TaskKey(50),
            query_id: 50,
            matrix: MATRIX,
            profile: addr("EQanchor-profile"),
            payload: TaskPayload::LockPos {
                source: addr("EQanchor-profile-owner"),
                target: place.address.clone(),
            },
        });
        mirror.reconciler().run_cycle().await.unwrap();

        // A different profile tries to release it.
        let intruder_wallet = register_member(&ledger, "EQmember2", "Mallory");
        ledger.enqueue(Task {
            key: TaskKey(51),
            query_id: 51,
            matrix: MATRIX,
            profile: addr("EQmember2"),
            payload: TaskPayload::UnlockPos {
                source: intruder_wallet,
                target: place.address.clone(),
            },
        });
        let outcome = mirror.reconciler().run_cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Cancelled {
                key: TaskKey(51),
                reason: RejectReason::LockOwnershipMismatch { .. },
            }
        ));

        // The lock survives and still shadows the slot.
        let locks = mirror
            .locks()
            .list(MATRIX, &addr("EQanchor-profile"), Page::first(10))
            .await
            .unwrap();
        assert_eq!(locks.total, 1);
    }

    #[tokio::test]
    async fn test_tree_view_reflects_reconciled_state() {
        let mirror = mirror().await;
        let ledger = mirror.ledger();

        for n in 0..3u64 {
            let profile = format!("EQmember{n}");
            let wallet = register_member(&ledger, &profile, &format!("user{n}"));
            ledger.enqueue(create_task(300 + n, &profile, &wallet));
            mirror.reconciler().run_cycle().await.unwrap();
        }

        let anchor = mirror
            .places()
            .root(MATRIX, &addr("EQanchor-profile"))
            .await
            .unwrap()
            .unwrap();
        let tree = mirror
            .tree_view()
            .build(&addr("EQanchor-profile"), &anchor.address, 2)
            .await
            .unwrap();

        let mm_tree_view::TreeNode::Filled {
            descendants,
            is_root,
            children,
            ..
        } = &tree
        else {
            panic!("anchor renders filled");
        };
        assert!(*is_root);
        assert_eq!(*descendants, 3);

        // Three placements: "0", "1", "00". The next open slot is "01".
        let children = children.as_ref().unwrap();
        assert!(children[0].is_filled());
        assert!(children[1].is_filled());
        let left_children = children[0].children().unwrap();
        assert!(left_children[0].is_filled());
        let mm_tree_view::TreeNode::Empty {
            is_next_position, ..
        } = &left_children[1]
        else {
            panic!("slot \"01\" renders empty");
        };
        assert!(*is_next_position);
    }

    #[tokio::test]
    async fn test_reconciler_loop_drains_the_queue() {
        let mut config = RuntimeConfig::default();
        config.reconciler.poll_interval_ms = 10;
        let mirror = Mirror::new(config);
        mirror.bootstrap().await.unwrap();
        let ledger = mirror.ledger();

        for n in 0..4u64 {
            let profile = format!("EQmember{n}");
            let wallet = register_member(&ledger, &profile, &format!("user{n}"));
            ledger.enqueue(create_task(400 + n, &profile, &wallet));
        }

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = mirror.spawn_reconciler(shutdown_rx);

        tokio::time::timeout(Duration::from_secs(10), async {
            while ledger.queue_len() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("queue drains");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(ledger.deploys().len(), 4);
        assert_eq!(
            mirror
                .places()
                .count_by_prefix(MATRIX, &TreePath::root())
                .await
                .unwrap(),
            5
        );
    }
}
