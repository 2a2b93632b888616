//! # Tree View Subsystem
//!
//! Read-side rendering of the placement mirror: bounded-depth subtree views
//! annotated through the same lock-eligibility predicates the reconciler
//! validates with, plus the plain matrix queries (root, next position,
//! root-to-place path, listings, search).
//!
//! Stateless per request: every call reads the stores fresh and never
//! mutates them, so callers may run with unbounded read concurrency.

pub mod builder;
pub mod domain;
pub mod queries;

pub use builder::TreeView;
pub use domain::errors::ViewError;
pub use domain::node::TreeNode;
pub use queries::MatrixQueries;
