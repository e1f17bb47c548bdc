//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const RACE_TPS: u32 = 20; // 20 race ticks per second
pub const RACE_TICK_MILLIS: u64 = 1_000 / RACE_TPS as u64;
pub const BATTLE_TICK_MILLIS: u64 = 1_000;
pub const BATTLE_TIMER_MILLIS: u64 = 1_000;

/// Race loop period
pub fn race_tick() -> Duration {
    Duration::from_millis(RACE_TICK_MILLIS)
}

/// Battle loop period
pub fn battle_tick() -> Duration {
    Duration::from_millis(BATTLE_TICK_MILLIS)
}
