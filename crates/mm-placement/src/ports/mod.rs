//! Ports (interfaces) of the placement subsystem.

pub mod outbound;
