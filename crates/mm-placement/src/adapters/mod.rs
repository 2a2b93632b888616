//! Adapters implementing the outbound ports.

pub mod memory;
