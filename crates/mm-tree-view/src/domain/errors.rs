//! Error types for the read side.

use mm_placement::StoreError;
use shared_types::{ChainAddress, MatrixId};
use thiserror::Error;

/// Failures surfaced by tree rendering and matrix queries.
#[derive(Debug, Error)]
pub enum ViewError {
    /// No place row exists for the requested address.
    #[error("place {0} not found")]
    PlaceNotFound(ChainAddress),

    /// The profile has no root place in this matrix.
    #[error("no root place for profile {profile} in {matrix}")]
    RootNotFound {
        matrix: MatrixId,
        profile: ChainAddress,
    },

    /// Neither endpoint is an ancestor of the other.
    #[error("no path between {from} and {to}")]
    PathNotFound { from: ChainAddress, to: ChainAddress },

    /// Every open slot is excluded by an active lock.
    #[error("no next position available for profile {0}")]
    NextPositionNotFound(ChainAddress),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ViewError::RootNotFound {
            matrix: MatrixId(3),
            profile: ChainAddress::from("EQp"),
        };
        assert_eq!(err.to_string(), "no root place for profile EQp in m3");
    }
}
