//! # Placement Reconciler Subsystem
//!
//! Mirrors the on-chain placement queue into the off-chain tree store: picks
//! up each queued intent exactly once, computes where it belongs under
//! positional and locking constraints, persists the decision, pays the
//! contract to materialize it, and waits for on-chain confirmation.
//!
//! ## Architecture
//!
//! - **Domain**: lock eligibility predicates, reconciler error taxonomy
//! - **Algorithms**: breadth-first next-open-position search
//! - **Ports**: Outbound (`PlaceStore`, `LockStore`, `LedgerGateway`)
//! - **Application**: `Reconciler` cycle state machine and its tick loop
//! - **Adapters**: in-memory stores for tests and local runs

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod util;

pub use algorithms::next_position::find_next_position;
pub use application::scheduler::ReconcilerLoop;
pub use application::service::{CycleOutcome, Reconciler};
pub use config::{ReconcilerConfig, RetryConfig};
pub use domain::eligibility::{path_is_locked, LockContext, SlotStatus};
pub use domain::errors::{CycleError, LedgerError, RejectReason, StoreError};
pub use ports::outbound::{LedgerGateway, LockStore, PlaceStore};
