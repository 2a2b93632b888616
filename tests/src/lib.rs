//! # Matrix Mirror Test Suite
//!
//! Unified test crate for cross-crate flows: the reconciler, the stores,
//! the simulated ledger and the tree view working together.
//!
//! ```bash
//! cargo test -p mm-tests
//! ```

#![allow(dead_code)]

pub mod integration;
