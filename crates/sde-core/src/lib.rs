//! SDE Core - shared pieces for simulation drivers
//!
//! - Tick clock with a fixed-timestep accumulator

pub mod time;

pub use time::{SimTime, TimeConfig};
