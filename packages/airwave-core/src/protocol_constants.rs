//! Fixed protocol and scheduling constants.
//!
//! Values here are shared between the HTTP/WebSocket surface and the
//! broadcast services. Tunable values live in [`crate::state::Config`];
//! these are the defaults it falls back to.

// ─────────────────────────────────────────────────────────────────────────────
// AutoDJ Scheduling
// ─────────────────────────────────────────────────────────────────────────────

/// Seconds a track occupies the rotation when its duration is unknown (0).
pub const FALLBACK_TRACK_SECS: u64 = 180;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// Close a connection after this many seconds without any inbound frame.
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Interval between heartbeat timeout checks (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 1;

/// Prefix for generated connection identifiers (`ws-1`, `ws-2`, ...).
pub const CONNECTION_ID_PREFIX: &str = "ws";

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the station-wide event broadcast channel.
///
/// Slow WebSocket consumers that fall further behind than this skip events
/// (they only ever need the latest mode/track/count).
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Status History
// ─────────────────────────────────────────────────────────────────────────────

/// Number of snapshots returned by the stats endpoint.
pub const STATUS_HISTORY_LIMIT: usize = 100;

/// Snapshots kept in memory and on disk; older rows are dropped.
pub const STATUS_HISTORY_RETENTION: usize = 1000;

/// File name of the persisted snapshot history inside the data directory.
pub const STATUS_HISTORY_FILE: &str = "status_history.json";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "airwave";

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// First port tried when no port is configured.
pub const DEFAULT_PORT_RANGE_START: u16 = 3000;

/// Last port tried when no port is configured.
pub const DEFAULT_PORT_RANGE_END: u16 = 3010;
