//! Configuration system.
//!
//! Loads sync configuration from JSON strings/files (file IO left to app).
//! Durations are stored as milliseconds so configs stay human-editable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Server address, e.g. `127.0.0.1:40100`. TCP and UDP share it.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Quiet period after the last local move before a send is attempted.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How long the sink's moving flag stays up after the last move.
    #[serde(default = "default_moving_flag_ms")]
    pub moving_flag_ms: u64,
    /// Minimum distance from the last sent position worth a network call.
    #[serde(default = "default_move_threshold")]
    pub move_threshold: f32,
    /// Delay before a failed send is retried.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Cap for exponential backoff. `None` keeps the retry delay fixed.
    #[serde(default)]
    pub retry_max_delay_ms: Option<u64>,
    /// Upper bound on a single normal-path request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub grid: GridConfig,
}

/// Logical grid used by discrete (keyboard) movement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cell edge length in position units.
    pub cell_size: f32,
    pub columns: u32,
    pub rows: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: 64.0,
            columns: 50,
            rows: 50,
        }
    }
}

fn default_server_addr() -> String {
    "127.0.0.1:40100".to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_moving_flag_ms() -> u64 {
    300
}

fn default_move_threshold() -> f32 {
    32.0
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            debounce_ms: default_debounce_ms(),
            moving_flag_ms: default_moving_flag_ms(),
            move_threshold: default_move_threshold(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: None,
            request_timeout_ms: default_request_timeout_ms(),
            grid: GridConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn moving_flag(&self) -> Duration {
        Duration::from_millis(self.moving_flag_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// Fixed at `retry_delay_ms` unless `retry_max_delay_ms` is set, in which
    /// case the delay doubles per attempt up to the cap.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_delay_ms;
        let ms = match self.retry_max_delay_ms {
            None => base,
            Some(cap) => base
                .saturating_mul(1u64 << attempt.min(16))
                .min(cap.max(base)),
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let cfg = SyncConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, SyncConfig::default());
        assert_eq!(cfg.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.moving_flag(), Duration::from_millis(300));
        assert_eq!(cfg.move_threshold, 32.0);
        assert_eq!(cfg.grid.cell_size, 64.0);
    }

    #[test]
    fn partial_json_overrides() {
        let cfg = SyncConfig::from_json_str(
            r#"{ "server_addr": "10.0.0.2:9000", "debounce_ms": 250, "grid": { "cell_size": 32.0, "columns": 10, "rows": 8 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.server_addr, "10.0.0.2:9000");
        assert_eq!(cfg.debounce(), Duration::from_millis(250));
        assert_eq!(cfg.retry_delay_ms, 3000);
        assert_eq!(cfg.grid.columns, 10);
    }

    #[test]
    fn retry_delay_is_fixed_by_default() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.retry_delay(0), Duration::from_millis(3000));
        assert_eq!(cfg.retry_delay(5), Duration::from_millis(3000));
    }

    #[test]
    fn retry_delay_backs_off_to_cap() {
        let cfg = SyncConfig {
            retry_max_delay_ms: Some(20_000),
            ..SyncConfig::default()
        };
        assert_eq!(cfg.retry_delay(0), Duration::from_millis(3000));
        assert_eq!(cfg.retry_delay(1), Duration::from_millis(6000));
        assert_eq!(cfg.retry_delay(2), Duration::from_millis(12_000));
        assert_eq!(cfg.retry_delay(3), Duration::from_millis(20_000));
        assert_eq!(cfg.retry_delay(40), Duration::from_millis(20_000));
    }
}
