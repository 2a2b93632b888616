//! Domain invariants for the placement tree.
//!
//! Checkable over any snapshot of a matrix's place rows. Production code
//! upholds these by construction; tests assert them over generated
//! placement sequences.

use shared_types::{Place, TreePath};
use std::collections::{HashMap, HashSet};

/// No materialized path repeats within a matrix.
pub fn invariant_unique_paths(places: &[Place]) -> bool {
    let mut seen: HashSet<(_, &TreePath)> = HashSet::new();
    places.iter().all(|p| seen.insert((p.matrix, &p.path)))
}

/// Every place with a parent link points at an existing row whose path is
/// one digit shorter than its own.
pub fn invariant_parent_linkage(places: &[Place]) -> bool {
    let by_id: HashMap<_, &Place> = places.iter().map(|p| (p.id, p)).collect();
    places.iter().all(|p| match p.parent_id {
        None => true,
        Some(parent_id) => by_id
            .get(&parent_id)
            .is_some_and(|parent| p.path.parent().as_ref() == Some(&parent.path)),
    })
}

/// `filling` of every place equals the number of its materialized children
/// and never exceeds 2.
pub fn invariant_filling_matches_children(places: &[Place]) -> bool {
    let mut child_counts: HashMap<_, u8> = HashMap::new();
    for p in places {
        if let Some(parent_id) = p.parent_id {
            *child_counts.entry(parent_id).or_default() += 1;
        }
    }
    places.iter().all(|p| {
        p.filling <= 2 && p.filling == child_counts.get(&p.id).copied().unwrap_or(0)
    })
}

/// Each profile holds exactly one place numbered 1 (its subtree root).
pub fn invariant_one_root_per_profile(places: &[Place]) -> bool {
    let mut roots: HashMap<(_, _), u32> = HashMap::new();
    for p in places {
        if p.place_number == 1 {
            *roots.entry((p.matrix, p.profile.clone())).or_default() += 1;
        }
    }
    let profiles: HashSet<_> = places.iter().map(|p| (p.matrix, p.profile.clone())).collect();
    profiles
        .iter()
        .all(|key| roots.get(key).copied() == Some(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryPlaceStore;
    use crate::algorithms::next_position::find_next_position;
    use crate::ports::outbound::PlaceStore;
    use proptest::prelude::*;
    use shared_types::{
        ChainAddress, Lock, LockId, MatrixId, NewPlace, Page, SlotPos, TaskKey, TreePath,
    };

    const MATRIX: MatrixId = MatrixId(1);

    async fn seed_root(store: &MemoryPlaceStore) -> Place {
        store
            .insert(NewPlace {
                matrix: MATRIX,
                profile: ChainAddress::from("EQP1"),
                address: ChainAddress::from("EQroot"),
                parent_id: None,
                parent_address: None,
                path: TreePath::root(),
                pos: SlotPos::Left,
                place_number: 1,
                created_at: 0,
                clone: false,
                login: "anchor".into(),
                inviter_profile: None,
                task_key: TaskKey(0),
                task_query_id: 0,
                task_source: None,
                confirmed: true,
            })
            .await
            .unwrap()
    }

    /// Apply one placement the way the reconciler does: search, insert,
    /// bump the parent's fill counter and the grandparent's grandchild
    /// counter.
    async fn place_next(
        store: &MemoryPlaceStore,
        root: &Place,
        locks: &[Lock],
        seq: u64,
    ) -> Option<Place> {
        let parent = find_next_position(store, root, locks, 8).await.unwrap()?;
        let pos = SlotPos::from_filling(parent.filling);
        let profile = ChainAddress::new(format!("EQmember{seq}"));
        let created = store
            .insert(NewPlace {
                matrix: MATRIX,
                profile,
                address: ChainAddress::new(format!("EQaddr{seq}")),
                parent_id: Some(parent.id),
                parent_address: Some(parent.address.clone()),
                path: parent.path.child(pos),
                pos,
                place_number: 1,
                created_at: seq as i64,
                clone: false,
                login: format!("member{seq}"),
                inviter_profile: None,
                task_key: TaskKey(100 + seq),
                task_query_id: 0,
                task_source: None,
                confirmed: true,
            })
            .await
            .unwrap();
        store.increment_filling(parent.id).await.unwrap();
        if let Some(grandparent) = parent.parent_id {
            store.increment_filling2(grandparent).await.unwrap();
        }
        Some(created)
    }

    async fn all_places(store: &MemoryPlaceStore) -> Vec<Place> {
        store
            .by_prefix(MATRIX, &TreePath::root(), u32::MAX, Page::all())
            .await
            .unwrap()
            .items
    }

    fn lock_at(path: &str) -> Lock {
        let path = TreePath::parse(path).unwrap();
        Lock {
            id: LockId(1),
            matrix: MATRIX,
            profile: ChainAddress::from("EQP1"),
            place_address: ChainAddress::from("EQlocked"),
            locked_pos: path.last_pos().unwrap_or(SlotPos::Left),
            path,
            place_number: 0,
            created_at: 0,
            task_key: TaskKey(1),
            confirmed: true,
        }
    }

    fn run<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        /// Any sequence of placements against an empty matrix yields a
        /// valid binary tree.
        #[test]
        fn prop_placement_sequences_build_valid_trees(count in 1usize..48) {
            run(async move {
                let store = MemoryPlaceStore::new();
                let root = seed_root(&store).await;
                for seq in 0..count {
                    let created = place_next(&store, &root, &[], seq as u64).await;
                    prop_assert!(created.is_some(), "tree never fills up without locks");
                }

                let places = all_places(&store).await;
                prop_assert_eq!(places.len(), count + 1);
                prop_assert!(invariant_unique_paths(&places));
                prop_assert!(invariant_parent_linkage(&places));
                prop_assert!(invariant_filling_matches_children(&places));
                prop_assert!(invariant_one_root_per_profile(&places));
                Ok(())
            })?;
        }

        /// Without locks the tree fills breadth-first: after k placements
        /// the occupied paths are exactly the first k slots in (depth, lex)
        /// order.
        #[test]
        fn prop_unlocked_fill_order_is_breadth_first(count in 1usize..32) {
            run(async move {
                let store = MemoryPlaceStore::new();
                let root = seed_root(&store).await;
                for seq in 0..count {
                    place_next(&store, &root, &[], seq as u64).await;
                }

                let mut expected = vec![TreePath::root()];
                let mut frontier = 0;
                while expected.len() < count + 1 {
                    let parent = expected[frontier].clone();
                    expected.push(parent.child(SlotPos::Left));
                    expected.push(parent.child(SlotPos::Right));
                    frontier += 1;
                }
                expected.truncate(count + 1);

                let places = all_places(&store).await;
                let mut actual: Vec<TreePath> =
                    places.iter().map(|p| p.path.clone()).collect();
                actual.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.cmp(b)));
                prop_assert_eq!(actual, expected);
                Ok(())
            })?;
        }

        /// No placement ever lands inside a locked subtree.
        #[test]
        fn prop_locked_subtrees_receive_no_placements(
            count in 1usize..24,
            lock_path in prop::sample::select(vec!["0", "1", "01", "10"]),
        ) {
            run(async move {
                let store = MemoryPlaceStore::new();
                let root = seed_root(&store).await;
                let locks = vec![lock_at(lock_path)];
                for seq in 0..count {
                    if place_next(&store, &root, &locks, seq as u64).await.is_none() {
                        break;
                    }
                }

                let places = all_places(&store).await;
                let lock = TreePath::parse(lock_path).unwrap();
                prop_assert!(
                    places.iter().all(|p| !lock.is_prefix_of(&p.path)),
                    "lock {} must shadow its subtree",
                    lock
                );
                prop_assert!(invariant_filling_matches_children(&places));
                Ok(())
            })?;
        }
    }

    #[test]
    fn test_invariants_reject_bad_snapshots() {
        run(async {
            let store = MemoryPlaceStore::new();
            let root = seed_root(&store).await;
            place_next(&store, &root, &[], 0).await.unwrap();
            let mut places = all_places(&store).await;

            // Tamper: duplicate a path.
            let mut copy = places[1].clone();
            copy.id = shared_types::PlaceId(999);
            places.push(copy);
            assert!(!invariant_unique_paths(&places));
            places.pop();

            // Tamper: break a fill counter.
            places[0].filling = 2;
            assert!(!invariant_filling_matches_children(&places));
        });
    }
}
