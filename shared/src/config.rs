//! Tunables for the transport, synchronizer and interpolator

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9999;

/// Transport and sync timing configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub port: u16,
    /// Upper bound on a client connection attempt
    pub connect_timeout: Duration,
    /// Pending outbound messages written per socket write
    pub batch_size: usize,
    pub read_buffer: usize,
    pub tick_rate: u32,
    /// Ticks between full `game_state` snapshots from the host
    pub snapshot_interval_ticks: u32,
    /// Ticks between position resends while the local player is idle
    pub idle_resend_ticks: u32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            batch_size: 5,
            read_buffer: 4096,
            tick_rate: 30,
            snapshot_interval_ticks: 30,
            idle_resend_ticks: 15,
        }
    }
}

impl NetConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    /// Rescales the tick-based intervals to keep ~1s snapshots and ~0.5s idle resends
    pub fn with_tick_rate(mut self, tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        self.tick_rate = tick_rate;
        self.snapshot_interval_ticks = tick_rate;
        self.idle_resend_ticks = (tick_rate / 2).max(1);
        self
    }
}

/// Remote motion smoothing parameters
#[derive(Debug, Clone, Copy)]
pub struct InterpolationConfig {
    /// Displacements larger than this are treated as teleports
    pub snap_threshold: f32,
    /// Fraction of the remaining distance covered per tick
    pub approach_factor: f32,
    /// Below this distance the displayed position lands exactly on target
    pub settle_threshold: f32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            snap_threshold: 50.0,
            approach_factor: 0.3,
            settle_threshold: 0.5,
        }
    }
}
