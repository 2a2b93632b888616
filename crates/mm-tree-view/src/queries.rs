//! Plain matrix queries.
//!
//! The read surface next to the tree view: root lookup, next open position,
//! root-to-place paths, paginated listings, counts and search. All of it is
//! derived from the stores; nothing here mutates.

use crate::builder::load_all_locks;
use crate::domain::errors::ViewError;
use mm_placement::{find_next_position, LockStore, PlaceStore};
use shared_types::{ChainAddress, Lock, MatrixId, Page, PageOf, Place};
use std::sync::Arc;

/// Read-only query service over the placement stores.
pub struct MatrixQueries {
    places: Arc<dyn PlaceStore>,
    locks: Arc<dyn LockStore>,
    finder_page_size: u32,
}

impl MatrixQueries {
    pub fn new(places: Arc<dyn PlaceStore>, locks: Arc<dyn LockStore>) -> Self {
        Self {
            places,
            locks,
            finder_page_size: 50,
        }
    }

    /// The profile's root place.
    pub async fn root(&self, matrix: MatrixId, profile: &ChainAddress) -> Result<Place, ViewError> {
        self.places
            .root(matrix, profile)
            .await?
            .ok_or_else(|| ViewError::RootNotFound {
                matrix,
                profile: profile.clone(),
            })
    }

    /// The place the next placement for this profile would land under.
    pub async fn next_position(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
    ) -> Result<Place, ViewError> {
        let root = self.root(matrix, profile).await?;
        let locks = load_all_locks(self.locks.as_ref(), matrix, profile).await?;
        find_next_position(self.places.as_ref(), &root, &locks, self.finder_page_size)
            .await?
            .ok_or_else(|| ViewError::NextPositionNotFound(profile.clone()))
    }

    /// The chain of places from `from_address` down to `to_address` (or up,
    /// when `to` is the ancestor), ordered ancestor first.
    pub async fn path_between(
        &self,
        matrix: MatrixId,
        from_address: &ChainAddress,
        to_address: &ChainAddress,
    ) -> Result<Vec<Place>, ViewError> {
        let from = self
            .places
            .by_address(from_address)
            .await?
            .ok_or_else(|| ViewError::PlaceNotFound(from_address.clone()))?;
        let to = self
            .places
            .by_address(to_address)
            .await?
            .ok_or_else(|| ViewError::PlaceNotFound(to_address.clone()))?;

        let not_found = || ViewError::PathNotFound {
            from: from_address.clone(),
            to: to_address.clone(),
        };

        // One endpoint must contain the other; walk up from the deeper one.
        let (upper, lower) = if from.path.is_prefix_of(&to.path) {
            (from, to)
        } else if to.path.is_prefix_of(&from.path) {
            (to, from)
        } else {
            return Err(not_found());
        };

        let mut chain = Vec::new();
        let mut cursor = lower.path.clone();
        loop {
            let place = self
                .places
                .by_path(matrix, &cursor)
                .await?
                .ok_or_else(not_found)?;
            chain.push(place);
            if cursor == upper.path {
                break;
            }
            match cursor.parent() {
                Some(parent) if parent.depth() >= upper.path.depth() => cursor = parent,
                _ => return Err(not_found()),
            }
        }
        chain.reverse();
        Ok(chain)
    }

    /// A profile's places, ordered by place number.
    pub async fn places(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
        page: Page,
    ) -> Result<PageOf<Place>, ViewError> {
        Ok(self.places.list(matrix, profile, page).await?)
    }

    pub async fn place_count(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
    ) -> Result<u64, ViewError> {
        Ok(self.places.count(matrix, profile).await?)
    }

    /// Search within the profile's subtree by index prefix (login plus
    /// place number).
    pub async fn search(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
        query: &str,
        page: Page,
    ) -> Result<PageOf<Place>, ViewError> {
        let root = self.root(matrix, profile).await?;
        Ok(self.places.search(matrix, &root.path, query, page).await?)
    }

    /// A profile's active locks.
    pub async fn locks(
        &self,
        matrix: MatrixId,
        profile: &ChainAddress,
        page: Page,
    ) -> Result<PageOf<Lock>, ViewError> {
        Ok(self.locks.list(matrix, profile, page).await?)
    }
}
