//! In-memory store adapters.
//!
//! Back the `PlaceStore`/`LockStore` ports with plain vectors for unit
//! tests and local runs. Production deployments plug a relational adapter
//! into the same ports; the sort orders here mirror the SQL those adapters
//! issue (`ORDER BY length(path), path` and friends), since callers may not
//! assume anything beyond the port contract.

use crate::domain::errors::StoreError;
use crate::ports::outbound::{LockStore, PlaceStore};
use async_trait::async_trait;
use shared_types::{
    search_index, ChainAddress, Lock, LockId, MatrixId, NewLock, NewPlace, Page, PageOf, Place,
    PlaceId, TaskKey, TreePath,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

fn paginate<T: Clone>(mut items: Vec<T>, page: Page) -> PageOf<T> {
    let total = items.len() as u64;
    let offset = page.offset().min(items.len());
    let end = offset.saturating_add(page.size as usize).min(items.len());
    PageOf {
        items: items.drain(offset..end).collect(),
        total,
    }
}

/// In-memory place table.
#[derive(Default)]
pub struct MemoryPlaceStore {
    rows: RwLock<Vec<Place>>,
    next_id: AtomicU64,
}

impl MemoryPlaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test convenience: overwrite a row's fill counter directly instead of
    /// replaying child insertions.
    pub async fn set_filling(&self, id: PlaceId, filling: u8) {
        let mut rows = self.rows.write().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.filling = filling;
        }
    }

    fn sorted_by_path(mut items: Vec<Place>) -> Vec<Place> {
        items.sort_by(|a, b| {
            a.path
                .depth()
                .cmp(&b.path.depth())
                .then_with(|| a.path.cmp(&b.path))
        });
        items
    }
}

#[async_trait]
impl PlaceStore for MemoryPlaceStore {
    async fn root(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
    ) -> Result<Option<Place>, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .find(|r| r.matrix == matrix && r.profile == *profile && r.place_number == 1)
            .cloned())
    }

    async fn by_address(&self, address: &ChainAddress) -> Result<Option<Place>, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows.iter().find(|r| r.address == *address).cloned())
    }

    async fn by_path(
        &self,
        matrix: MatrixId,
        path: &TreePath,
    ) -> Result<Option<Place>, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .find(|r| r.matrix == matrix && r.path == *path)
            .cloned())
    }

    async fn by_task_key(&self, key: TaskKey) -> Result<Option<Place>, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows.iter().find(|r| r.task_key == key).cloned())
    }

    async fn open_by_prefix(
        &self,
        matrix: MatrixId,
        prefix: &TreePath,
        page: Page,
    ) -> Result<PageOf<Place>, StoreError> {
        let rows = self.rows.read().unwrap();
        let matches: Vec<Place> = rows
            .iter()
            .filter(|r| r.matrix == matrix && r.path.starts_with(prefix) && r.filling < 2)
            .cloned()
            .collect();
        Ok(paginate(Self::sorted_by_path(matches), page))
    }

    async fn by_prefix(
        &self,
        matrix: MatrixId,
        prefix: &TreePath,
        max_depth: u32,
        page: Page,
    ) -> Result<PageOf<Place>, StoreError> {
        let deepest = prefix.depth() + max_depth as usize;
        let rows = self.rows.read().unwrap();
        let matches: Vec<Place> = rows
            .iter()
            .filter(|r| r.matrix == matrix && r.path.starts_with(prefix) && r.path.depth() <= deepest)
            .cloned()
            .collect();
        Ok(paginate(Self::sorted_by_path(matches), page))
    }

    async fn count_by_prefix(
        &self,
        matrix: MatrixId,
        prefix: &TreePath,
    ) -> Result<u64, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.matrix == matrix && r.path.starts_with(prefix))
            .count() as u64)
    }

    async fn count(&self, matrix: MatrixId, profile: &ChainAddress) -> Result<u64, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.matrix == matrix && r.profile == *profile)
            .count() as u64)
    }

    async fn list(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
        page: Page,
    ) -> Result<PageOf<Place>, StoreError> {
        let rows = self.rows.read().unwrap();
        let mut matches: Vec<Place> = rows
            .iter()
            .filter(|r| r.matrix == matrix && r.profile == *profile)
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.place_number);
        Ok(paginate(matches, page))
    }

    async fn search(
        &self,
        matrix: MatrixId,
        root_prefix: &TreePath,
        index_prefix: &str,
        page: Page,
    ) -> Result<PageOf<Place>, StoreError> {
        let rows = self.rows.read().unwrap();
        let mut matches: Vec<Place> = rows
            .iter()
            .filter(|r| {
                r.matrix == matrix
                    && r.path.starts_with(root_prefix)
                    && r.index.starts_with(index_prefix)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.index.cmp(&b.index));
        Ok(paginate(matches, page))
    }

    async fn max_place_number(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
    ) -> Result<u32, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.matrix == matrix && r.profile == *profile)
            .map(|r| r.place_number)
            .max()
            .unwrap_or(0))
    }

    async fn insert(&self, place: NewPlace) -> Result<Place, StoreError> {
        let id = PlaceId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let row = Place {
            id,
            matrix: place.matrix,
            profile: place.profile,
            address: place.address,
            parent_id: place.parent_id,
            parent_address: place.parent_address,
            path: place.path,
            pos: place.pos,
            place_number: place.place_number,
            created_at: place.created_at,
            filling: 0,
            filling2: 0,
            clone: place.clone,
            index: search_index(&place.login, place.place_number),
            login: place.login,
            inviter_profile: place.inviter_profile,
            task_key: place.task_key,
            task_query_id: place.task_query_id,
            task_source: place.task_source,
            confirmed: place.confirmed,
        };
        self.rows.write().unwrap().push(row.clone());
        Ok(row)
    }

    async fn increment_filling(&self, id: PlaceId) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::RowMissing(format!("place {}", id.0)))?;
        row.filling += 1;
        Ok(())
    }

    async fn increment_filling2(&self, id: PlaceId) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::RowMissing(format!("place {}", id.0)))?;
        row.filling2 += 1;
        Ok(())
    }

    async fn confirm_address(
        &self,
        id: PlaceId,
        address: &ChainAddress,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::RowMissing(format!("place {}", id.0)))?;
        row.address = address.clone();
        row.confirmed = true;
        Ok(())
    }
}

/// In-memory lock table.
#[derive(Default)]
pub struct MemoryLockStore {
    rows: RwLock<Vec<Lock>>,
    next_id: AtomicU64,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn list(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
        page: Page,
    ) -> Result<PageOf<Lock>, StoreError> {
        let rows = self.rows.read().unwrap();
        let mut matches: Vec<Lock> = rows
            .iter()
            .filter(|r| r.matrix == matrix && r.profile == *profile)
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.place_number);
        Ok(paginate(matches, page))
    }

    async fn by_path(&self, matrix: MatrixId, path: &TreePath) -> Result<Option<Lock>, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .iter()
            .find(|r| r.matrix == matrix && r.path == *path)
            .cloned())
    }

    async fn by_address(&self, address: &ChainAddress) -> Result<Option<Lock>, StoreError> {
        let rows = self.rows.read().unwrap();
        Ok(rows.iter().find(|r| r.place_address == *address).cloned())
    }

    async fn insert(&self, lock: NewLock) -> Result<Lock, StoreError> {
        let id = LockId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let row = Lock {
            id,
            matrix: lock.matrix,
            profile: lock.profile,
            place_address: lock.place_address,
            path: lock.path,
            locked_pos: lock.locked_pos,
            place_number: lock.place_number,
            created_at: lock.created_at,
            task_key: lock.task_key,
            confirmed: lock.confirmed,
        };
        self.rows.write().unwrap().push(row.clone());
        Ok(row)
    }

    async fn confirm(&self, id: LockId) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::RowMissing(format!("lock {}", id.0)))?;
        row.confirmed = true;
        Ok(())
    }

    async fn remove(&self, id: LockId) -> Result<(), StoreError> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(StoreError::RowMissing(format!("lock {}", id.0)));
        }
        Ok(())
    }
}
