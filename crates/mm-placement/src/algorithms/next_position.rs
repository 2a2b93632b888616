//! Breadth-first search for the next open tree position.

use crate::domain::eligibility::path_is_locked;
use crate::domain::errors::StoreError;
use crate::ports::outbound::PlaceStore;
use shared_types::{Lock, Page, Place, SlotPos};

/// Find the next open position in the subtree rooted at `root`: the
/// shallowest, leftmost place with fewer than two children whose next child
/// slot is not under an active lock.
///
/// Walks the open places page by page, re-sorting each page by (path depth,
/// path) so the choice is deterministic regardless of store-side ordering.
/// Returns `None` once the store is exhausted — the caller treats that as a
/// fatal condition for its task, since no legal placement exists.
pub async fn find_next_position(
    places: &dyn PlaceStore,
    root: &Place,
    locks: &[Lock],
    page_size: u32,
) -> Result<Option<Place>, StoreError> {
    let mut page = Page::first(page_size);
    loop {
        let mut batch = places.open_by_prefix(root.matrix, &root.path, page).await?;
        batch.items.sort_by(|a, b| {
            a.path
                .depth()
                .cmp(&b.path.depth())
                .then_with(|| a.path.cmp(&b.path))
        });

        for candidate in &batch.items {
            let child_slot = candidate.path.child(SlotPos::from_filling(candidate.filling));
            if !path_is_locked(locks, &child_slot) {
                return Ok(Some(candidate.clone()));
            }
        }

        if (batch.items.len() as u32) < page.size {
            return Ok(None);
        }
        page = page.next();
    }
}
