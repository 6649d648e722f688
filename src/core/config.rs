//! Simulation configuration with documented constants
//!
//! All engine-level knobs are collected here with explanations of their
//! purpose and how they interact with each other. Per-type values that are
//! part of the domain model (dwell durations, event priorities, generation
//! intervals) live as methods on the corresponding enums instead.

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the simulation engine
///
/// The defaults reproduce the reference warehouse instance. Changing them
/// affects pacing and dispatch behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // === TICK SCHEDULER ===
    /// Wall-clock milliseconds between ticks
    ///
    /// The logical clock advances by this amount every tick; the speed
    /// multiplier scales elapsed time where it is consumed, not the tick
    /// cadence itself.
    pub tick_ms: u64,

    // === GRID ===
    /// Warehouse floor width in tiles
    pub grid_width: i32,

    /// Warehouse floor height in tiles
    pub grid_height: i32,

    // === ROBOTS ===
    /// Battery units consumed per tile fully traversed
    pub battery_drain_per_tile: f32,

    /// Battery units restored per second while docked at the charger
    pub charge_rate_per_second: f32,

    /// Battery level below which a robot preempts its task and recharges
    ///
    /// Also the floor for the availability predicate: robots under this
    /// level are skipped by the first assignment tier.
    pub low_battery_threshold: f32,

    /// Milliseconds to traverse one tile while moving
    ///
    /// A tick whose scaled elapsed time spans several tile-times advances
    /// the robot several tiles.
    pub tile_travel_ms: f32,

    /// Maximum queued tasks per robot
    ///
    /// Assignment is denied once the queue is at this length; the cap is
    /// enforced at the assignment boundary, never by silent truncation.
    pub task_queue_cap: usize,

    // === SAFETY & CONGESTION ===
    /// Manhattan radius within which two moving robots count as congested
    pub congestion_radius: i32,

    /// Manhattan radius around a human entry inside which robots pause
    pub human_pause_radius: i32,

    /// Ticks between human-worker steps at speed 1
    pub human_step_ticks: f32,

    // === NOTIFICATION CADENCE ===
    /// Ticks between robot-state notifications
    pub robot_update_interval_ticks: u64,

    /// Ticks between metrics notifications
    pub metrics_interval_ticks: u64,

    /// Milliseconds between task-history samples
    pub history_interval_ms: u64,

    // === BOUNDED BUFFERS ===
    /// Event-log high-water mark; overflow truncates to `log_retain`
    pub log_capacity: usize,

    /// Entries kept after an event-log truncation
    pub log_retain: usize,

    /// Most recent events retained for AI context and the snapshot
    pub recent_events_cap: usize,

    // === AI ASSIST ===
    /// Minimum spacing between external reasoning calls (milliseconds)
    ///
    /// Calls inside the window skip the collaborator entirely and use the
    /// deterministic fallback.
    pub assist_debounce_ms: u64,

    /// Hard timeout for one external reasoning call (milliseconds)
    pub assist_timeout_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,

            grid_width: 20,
            grid_height: 15,

            battery_drain_per_tile: 1.0,
            charge_rate_per_second: 5.0,
            low_battery_threshold: 15.0,
            tile_travel_ms: 200.0,
            task_queue_cap: 3,

            congestion_radius: 2,
            human_pause_radius: 3,
            human_step_ticks: 10.0,

            robot_update_interval_ticks: 5,
            metrics_interval_ticks: 20,
            history_interval_ms: 10_000,

            log_capacity: 200,
            log_retain: 100,
            recent_events_cap: 50,

            assist_debounce_ms: 1500,
            assist_timeout_ms: 10_000,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file, with defaults for absent keys
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        use crate::core::error::SimError;

        if self.tick_ms == 0 {
            return Err(SimError::ConfigError("tick_ms must be positive".into()));
        }
        if self.grid_width <= 0 || self.grid_height <= 0 {
            return Err(SimError::ConfigError(format!(
                "grid dimensions must be positive, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if self.log_retain > self.log_capacity {
            return Err(SimError::ConfigError(format!(
                "log_retain ({}) must be <= log_capacity ({})",
                self.log_retain, self.log_capacity
            )));
        }
        if !(0.0..=100.0).contains(&self.low_battery_threshold) {
            return Err(SimError::ConfigError(
                "low_battery_threshold must be within [0, 100]".into(),
            ));
        }
        if self.tile_travel_ms <= 0.0 {
            return Err(SimError::ConfigError(
                "tile_travel_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
