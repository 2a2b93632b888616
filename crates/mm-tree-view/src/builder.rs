//! Bounded-depth tree rendering.

use crate::domain::errors::ViewError;
use crate::domain::node::TreeNode;
use mm_placement::{find_next_position, LockContext, LockStore, PlaceStore, StoreError};
use shared_types::{ChainAddress, Lock, MatrixId, Page, PageOf, Place, PlaceId, SlotPos};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Page size used when draining subtrees and lock sets.
const SCAN_PAGE_SIZE: u32 = 200;

/// Drain every page of a profile's lock set.
pub(crate) async fn load_all_locks(
    locks: &dyn LockStore,
    matrix: MatrixId,
    profile: &ChainAddress,
) -> Result<Vec<Lock>, StoreError> {
    let mut page = Page::first(SCAN_PAGE_SIZE);
    let mut all = Vec::new();
    loop {
        let batch = locks.list(matrix, profile, page).await?;
        let fetched = batch.items.len() as u32;
        all.extend(batch.items);
        if fetched < page.size {
            return Ok(all);
        }
        page = page.next();
    }
}

/// Renders bounded-depth subtree views.
///
/// Stateless per request; annotations come from the same [`LockContext`]
/// the reconciler validates lock tasks with.
pub struct TreeView {
    places: Arc<dyn PlaceStore>,
    locks: Arc<dyn LockStore>,
    finder_page_size: u32,
}

impl TreeView {
    pub fn new(places: Arc<dyn PlaceStore>, locks: Arc<dyn LockStore>) -> Self {
        Self {
            places,
            locks,
            finder_page_size: 50,
        }
    }

    /// Render the subtree under `place_address`, `depth` levels deep, as
    /// seen by `viewer` (whose root place and lock set drive the
    /// annotations).
    pub async fn build(
        &self,
        viewer: &ChainAddress,
        place_address: &ChainAddress,
        depth: u32,
    ) -> Result<TreeNode, ViewError> {
        let selected = self
            .places
            .by_address(place_address)
            .await?
            .ok_or_else(|| ViewError::PlaceNotFound(place_address.clone()))?;
        let matrix = selected.matrix;
        let root = self
            .places
            .root(matrix, viewer)
            .await?
            .ok_or_else(|| ViewError::RootNotFound {
                matrix,
                profile: viewer.clone(),
            })?;

        let locks = load_all_locks(self.locks.as_ref(), matrix, viewer).await?;
        let next_slot = find_next_position(
            self.places.as_ref(),
            &root,
            &locks,
            self.finder_page_size,
        )
        .await?
        .map(|place| LockContext::next_slot_of(&place));
        let eligibility = LockContext::new(&root, &locks, next_slot);

        let subtree = self.fetch_subtree(matrix, &selected, depth).await?;
        debug!(
            matrix = %matrix,
            path = %selected.path,
            depth,
            nodes = subtree.len(),
            "rendering subtree"
        );

        // One slot array per parent; the first row wins a slot, mirroring
        // how duplicate rows are deduplicated upstream.
        let mut children: HashMap<PlaceId, [Option<Place>; 2]> = HashMap::new();
        for place in &subtree {
            if let Some(parent_id) = place.parent_id {
                let slots = children.entry(parent_id).or_default();
                let slot = &mut slots[place.pos.index() as usize];
                if slot.is_none() {
                    *slot = Some(place.clone());
                }
            }
        }

        // Descendant counts are recomputed from stored paths, not from the
        // incrementally maintained counters.
        let mut descendants: HashMap<PlaceId, u64> = HashMap::new();
        for place in &subtree {
            let in_subtree = self.places.count_by_prefix(matrix, &place.path).await?;
            descendants.insert(place.id, in_subtree.saturating_sub(1));
        }

        let selected_parent = match selected.path.parent() {
            Some(parent_path) => self.places.by_path(matrix, &parent_path).await?,
            None => None,
        };

        Ok(render_filled(
            &selected,
            selected_parent.as_ref(),
            depth,
            &children,
            &descendants,
            &eligibility,
        ))
    }

    /// All places of the depth-bounded subtree, across every store page.
    /// The selected place itself is part of the result.
    async fn fetch_subtree(
        &self,
        matrix: MatrixId,
        selected: &Place,
        depth: u32,
    ) -> Result<Vec<Place>, ViewError> {
        let mut page = Page::first(SCAN_PAGE_SIZE);
        let mut all = Vec::new();
        loop {
            let batch: PageOf<Place> = self
                .places
                .by_prefix(matrix, &selected.path, depth, page)
                .await?;
            let fetched = batch.items.len() as u32;
            all.extend(batch.items);
            if fetched < page.size {
                return Ok(all);
            }
            page = page.next();
        }
    }
}

fn render_filled(
    place: &Place,
    parent: Option<&Place>,
    depth: u32,
    children: &HashMap<PlaceId, [Option<Place>; 2]>,
    descendants: &HashMap<PlaceId, u64>,
    eligibility: &LockContext<'_>,
) -> TreeNode {
    let status = eligibility.slot_status(&place.path, parent);

    let rendered_children = if depth == 0 {
        None
    } else {
        let slots = children.get(&place.id);
        let render_slot = |pos: SlotPos| {
            match slots.and_then(|s| s[pos.index() as usize].as_ref()) {
                Some(child) => render_filled(
                    child,
                    Some(place),
                    depth - 1,
                    children,
                    descendants,
                    eligibility,
                ),
                None => render_empty(place.path.child(pos), Some(place), depth - 1, eligibility),
            }
        };
        Some(Box::new([
            render_slot(SlotPos::Left),
            render_slot(SlotPos::Right),
        ]))
    };

    TreeNode::Filled {
        address: place.address.clone(),
        parent_address: place.parent_address.clone(),
        pos: status.pos,
        place_number: place.place_number,
        clone: place.clone,
        created_at: place.created_at,
        login: place.login.clone(),
        descendants: descendants.get(&place.id).copied().unwrap_or(0),
        locked: status.is_locked,
        can_lock: status.can_lock,
        is_lock: status.is_lock,
        is_root: status.is_root,
        children: rendered_children,
    }
}

/// Empty slots recurse one further level into plain placeholders while
/// depth remains, without touching the store.
fn render_empty(
    path: shared_types::TreePath,
    parent: Option<&Place>,
    depth: u32,
    eligibility: &LockContext<'_>,
) -> TreeNode {
    let status = eligibility.slot_status(&path, parent);

    let children = if depth == 0 {
        None
    } else {
        let left = render_empty(path.child(SlotPos::Left), None, 0, eligibility);
        let right = render_empty(path.child(SlotPos::Right), None, 0, eligibility);
        Some(Box::new([left, right]))
    };

    TreeNode::Empty {
        pos: status.pos,
        parent_address: parent.map(|p| p.address.clone()),
        locked: status.is_locked,
        can_lock: status.can_lock,
        is_lock: status.is_lock,
        is_next_position: status.is_next_position,
        can_buy: status.can_buy,
        children,
    }
}
