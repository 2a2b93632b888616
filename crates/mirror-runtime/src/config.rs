//! Runtime configuration from the environment.

use mm_placement::ReconcilerConfig;
use shared_types::{ChainAddress, MatrixId};
use std::env;

/// Process-level configuration.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `MIRROR_MATRIX_ID` | `1` | Matrix this process mirrors |
/// | `MIRROR_ANCHOR_PROFILE` | `EQanchor-profile` | Profile owning the matrix anchor place |
/// | `MIRROR_ANCHOR_ADDRESS` | `EQanchor-place` | On-chain address of the anchor place |
/// | `MIRROR_ANCHOR_LOGIN` | `anchor` | Login recorded on the anchor place |
/// | `MIRROR_POLL_INTERVAL_MS` | `2000` | Queue poll interval |
/// | `MIRROR_LOG` | `info` | Log filter when `RUST_LOG` is unset |
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub matrix: MatrixId,
    pub anchor_profile: ChainAddress,
    pub anchor_address: ChainAddress,
    pub anchor_login: String,
    pub log_filter: String,
    pub reconciler: ReconcilerConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let mut reconciler = ReconcilerConfig::default();
        if let Some(interval) = parse_env("MIRROR_POLL_INTERVAL_MS") {
            reconciler.poll_interval_ms = interval;
        }

        Self {
            matrix: MatrixId(parse_env("MIRROR_MATRIX_ID").unwrap_or(1)),
            anchor_profile: ChainAddress::new(
                env_or("MIRROR_ANCHOR_PROFILE", "EQanchor-profile"),
            ),
            anchor_address: ChainAddress::new(env_or("MIRROR_ANCHOR_ADDRESS", "EQanchor-place")),
            anchor_login: env_or("MIRROR_ANCHOR_LOGIN", "anchor"),
            log_filter: env_or("MIRROR_LOG", "info"),
            reconciler,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            matrix: MatrixId(1),
            anchor_profile: ChainAddress::from("EQanchor-profile"),
            anchor_address: ChainAddress::from("EQanchor-place"),
            anchor_login: "anchor".to_string(),
            log_filter: "info".to_string(),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.parse().ok())
}
