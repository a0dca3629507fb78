//! Multi-step forecasting by feeding each prediction back in as the newest
//! reading.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::features::lag_interval;
use crate::model::ForecastModel;
use crate::reading::{round1, timestamp_format, SensorReading};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastStep {
    /// 1-based step number.
    pub step: usize,
    pub predicted_moisture: f64,
    /// Timestamp given to the synthetic reading for this step.
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
}

pub struct RecursiveForecaster<'a> {
    model: &'a ForecastModel,
}

impl<'a> RecursiveForecaster<'a> {
    pub fn new(model: &'a ForecastModel) -> Self {
        Self { model }
    }

    /// Forecast up to `horizon` steps ahead.
    ///
    /// Each step appends a synthetic reading carrying the prediction, the
    /// latest real reading's other fields and a timestamp one lag interval
    /// after the previous one.  The sequence ends early at the first step
    /// that cannot be predicted.
    pub fn forecast(&self, readings: &[SensorReading], horizon: usize) -> Vec<ForecastStep> {
        let Some(anchor) = readings.last() else {
            return Vec::new();
        };
        let interval = lag_interval(readings);

        let mut window: Vec<SensorReading> = readings.to_vec();
        let mut steps = Vec::with_capacity(horizon);

        for step in 1..=horizon {
            let predicted = match self.model.predict_next(&window) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(step, "forecast stopped early: {e}");
                    break;
                }
            };

            let previous_ts = window.last().map_or(anchor.timestamp, |r| r.timestamp);
            let synthetic = SensorReading {
                timestamp: previous_ts + interval,
                soil_moisture: predicted,
                ..anchor.clone()
            };

            steps.push(ForecastStep {
                step,
                predicted_moisture: round1(predicted),
                timestamp: synthetic.timestamp,
            });

            window = extend(&window, synthetic);
        }

        steps
    }
}

/// A new window with `next` appended; the input is never touched.
fn extend(window: &[SensorReading], next: SensorReading) -> Vec<SensorReading> {
    let mut extended = Vec::with_capacity(window.len() + 1);
    extended.extend_from_slice(window);
    extended.push(next);
    extended
}

// ===========================================================================
// Tests
// ===========================================================================
