//! Pure algorithms over store results.

pub mod next_position;
