//! # Matrix Mirror Runtime
//!
//! Wiring for the reconciler process: configuration from the environment,
//! store and gateway construction, genesis-style bootstrap of the matrix
//! anchor place, and the reconciler loop lifecycle.
//!
//! The ledger gateway wired here is [`sim::SimulatedLedger`], an in-process
//! contract emulation for local runs and integration tests. Production
//! deployments implement [`mm_placement::LedgerGateway`] against a real
//! chain client and swap it in through the container.

pub mod config;
pub mod container;
pub mod sim;

pub use config::RuntimeConfig;
pub use container::Mirror;
pub use sim::SimulatedLedger;
