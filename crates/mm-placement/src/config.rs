//! Configuration for the placement reconciler.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconciler configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Interval between queue polls, milliseconds.
    pub poll_interval_ms: u64,
    /// Page size used when scanning open places for the next position.
    pub finder_page_size: u32,
    /// How long to wait for the contract to emit a new child address.
    pub child_wait_timeout_ms: u64,
    /// Interval between child-address polls.
    pub child_wait_interval_ms: u64,
    /// Upper bound on the inviter chain walk when resolving a root place.
    pub max_inviter_hops: u32,
    /// Backoff policy for ledger reads.
    pub retry: RetryConfig,
}

impl ReconcilerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn child_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.child_wait_timeout_ms)
    }

    pub fn child_wait_interval(&self) -> Duration {
        Duration::from_millis(self.child_wait_interval_ms)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            finder_page_size: 50,
            child_wait_timeout_ms: 120_000,
            child_wait_interval_ms: 1_000,
            max_inviter_hops: 64,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded exponential backoff for a single ledger call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt.
    pub attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 300,
        }
    }
}
