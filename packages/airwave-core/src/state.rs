//! Core configuration.
//!
//! [`Config`] holds the tunables of the broadcast core. The standalone server
//! fills it from its YAML file and environment; embedders can construct it
//! directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    EVENT_CHANNEL_CAPACITY, FALLBACK_TRACK_SECS, STATUS_HISTORY_LIMIT, WS_HEARTBEAT_CHECK_INTERVAL_SECS,
    WS_HEARTBEAT_TIMEOUT_SECS,
};

/// Configuration for the Airwave core.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    // AutoDJ
    /// Air time of a track whose duration is unknown (seconds).
    pub fallback_track_secs: u64,

    // WebSocket
    /// WebSocket heartbeat timeout (seconds).
    pub ws_heartbeat_timeout_secs: u64,

    /// Interval between WebSocket heartbeat checks (seconds).
    pub ws_heartbeat_check_interval_secs: u64,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    // Stats
    /// Number of snapshots returned by the stats endpoint.
    pub history_limit: usize,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.fallback_track_secs == 0 {
            return Err("fallback_track_secs must be >= 1".to_string());
        }
        if self.ws_heartbeat_check_interval_secs == 0 {
            return Err("ws_heartbeat_check_interval_secs must be >= 1".to_string());
        }
        if self.ws_heartbeat_timeout_secs < self.ws_heartbeat_check_interval_secs {
            return Err(
                "ws_heartbeat_timeout_secs must be >= ws_heartbeat_check_interval_secs".to_string(),
            );
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }

    /// Air time of a track with no known duration.
    #[must_use]
    pub fn fallback_track_duration(&self) -> Duration {
        Duration::from_secs(self.fallback_track_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            fallback_track_secs: FALLBACK_TRACK_SECS,
            ws_heartbeat_timeout_secs: WS_HEARTBEAT_TIMEOUT_SECS,
            ws_heartbeat_check_interval_secs: WS_HEARTBEAT_CHECK_INTERVAL_SECS,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            history_limit: STATUS_HISTORY_LIMIT,
        }
    }
}
