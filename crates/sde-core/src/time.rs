//! Simulation clock
//!
//! Turns variable wall-clock frame deltas into a whole number of fixed
//! simulation ticks.

use serde::{Deserialize, Serialize};

/// Clock configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Length of one simulation tick in seconds
    pub fixed_timestep: f32,
    /// Frame deltas above this are clamped (avoids a spiral of catch-up ticks)
    pub max_delta_time: f32,
    /// Multiplier applied to every frame delta
    pub time_scale: f32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 60.0,
            max_delta_time: 0.25,
            time_scale: 1.0,
        }
    }
}

/// Running simulation time
#[derive(Debug, Clone)]
pub struct SimTime {
    /// Configuration
    pub config: TimeConfig,
    /// Scaled time since start in seconds
    pub elapsed: f64,
    /// Scaled delta of the last frame
    pub delta_time: f32,
    /// Ticks handed out by [`SimTime::fixed_steps`] so far
    pub tick_count: u64,
    /// Frames fed through [`SimTime::update`] so far
    pub frame_count: u64,
    /// Whether the clock is paused
    pub paused: bool,
    accumulator: f32,
}

impl Default for SimTime {
    fn default() -> Self {
        Self::new(TimeConfig::default())
    }
}

impl SimTime {
    pub fn new(config: TimeConfig) -> Self {
        Self {
            config,
            elapsed: 0.0,
            delta_time: 0.0,
            tick_count: 0,
            frame_count: 0,
            paused: false,
            accumulator: 0.0,
        }
    }

    /// Advance by the raw delta of the previous frame
    pub fn update(&mut self, raw_delta: f32) {
        self.frame_count += 1;
        if self.paused {
            self.delta_time = 0.0;
            return;
        }
        // Config values may be negative or NaN, where `clamp` would panic.
        let clamped = raw_delta.max(0.0).min(self.config.max_delta_time.max(0.0));
        let scaled = clamped * self.config.time_scale.max(0.0);
        self.delta_time = if scaled.is_finite() { scaled } else { 0.0 };
        self.elapsed += self.delta_time as f64;
        self.accumulator += self.delta_time;
    }

    /// Number of fixed ticks to run for the time accumulated so far
    ///
    /// Always 0 when the configured timestep is not positive.
    pub fn fixed_steps(&mut self) -> u32 {
        if !self.has_valid_timestep() {
            return 0;
        }
        let step = self.config.fixed_timestep;
        // Division, not repeated subtraction: a tiny step would never drain
        // the accumulator. The float-to-int cast saturates.
        let steps = (self.accumulator / step).floor() as u32;
        self.accumulator = (self.accumulator - steps as f32 * step).max(0.0);
        self.tick_count += steps as u64;
        steps
    }

    /// Fraction of a tick left in the accumulator
    pub fn tick_fraction(&self) -> f32 {
        if !self.has_valid_timestep() {
            return 0.0;
        }
        self.accumulator / self.config.fixed_timestep
    }

    /// Whether the configured timestep can produce ticks at all
    pub fn has_valid_timestep(&self) -> bool {
        self.config.fixed_timestep.is_finite() && self.config.fixed_timestep > 0.0
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Set the time scale (0.0 = frozen, 1.0 = normal, 2.0 = double speed)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.config.time_scale = scale.max(0.0);
    }
}
