//! Simulated plot of soil the node reports on.
//!
//! Each sample advances a simulated clock by one hour regardless of how
//! often the node actually publishes.  The hub stamps readings on arrival,
//! so only a publish interval of [`SIM_STEP_SECS`] keeps its detected lag
//! and hour-of-day in line with the simulated weather.  A faster rate
//! replays days of weather in minutes, but the hub then sees a dense series
//! whose hours no longer match the simulated diurnal cycle.

use chrono::{Duration, NaiveDateTime};
use soil_forecast::{sim, SensorReading, WaterCommand, WeatherSim};

/// Simulated time covered by one sample.
pub const SIM_STEP_SECS: i64 = 3600;

pub struct SimulatedField {
    sim: WeatherSim,
    clock: NaiveDateTime,
    step: Duration,
}

impl SimulatedField {
    pub fn new(seed: u64) -> Self {
        Self::starting_at(sim::default_start(), seed)
    }

    pub fn starting_at(start: NaiveDateTime, seed: u64) -> Self {
        Self {
            sim: WeatherSim::new(seed),
            clock: start,
            step: Duration::seconds(SIM_STEP_SECS),
        }
    }

    /// Sample the soil at the current simulated time, then advance the clock.
    pub fn next_reading(&mut self) -> SensorReading {
        let reading = self.sim.sample(self.clock);
        self.clock += self.step;
        reading
    }

    /// Apply a watering command to the simulated soil.  The jump does not
    /// depend on the requested duration.
    pub fn water(&mut self, command: WaterCommand) -> f64 {
        let before = self.sim.moisture();
        self.sim.irrigate();
        tracing::info!(
            seconds = command.seconds(),
            before = format!("{before:.1}"),
            after = format!("{:.1}", self.sim.moisture()),
            "field watered"
        );
        self.sim.moisture()
    }

    pub fn clock(&self) -> NaiveDateTime {
        self.clock
    }
}

// ===========================================================================
// Tests
// ===========================================================================
