//! Turns a reading series into supervised rows for the forecast model.
//!
//! The lag is the number of samples that make up one hour: a series sampled
//! faster than every ten minutes is assumed to run at five-minute spacing
//! (lag 12), anything slower is treated as hourly (lag 1).

use chrono::{Duration, Timelike};
use serde::Serialize;

use crate::reading::SensorReading;

/// Spacing below which a series counts as dense (seconds).
const DENSE_INTERVAL_SEC: i64 = 600;
const DENSE_LAG: usize = 12;
const HOURLY_LAG: usize = 1;

/// Number of model inputs.
pub const FEATURE_COUNT: usize = 6;

/// Input names in model order, used for logging coefficients.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "soil_moisture",
    "soil_moisture_lag",
    "moisture_change",
    "temperature",
    "humidity",
    "hour",
];

/// The six model inputs for one row, in model order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub moisture: f64,
    pub lag_moisture: f64,
    pub moisture_delta: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub hour: f64,
}

impl FeatureVector {
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.moisture,
            self.lag_moisture,
            self.moisture_delta,
            self.temperature,
            self.humidity,
            self.hour,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }
}

/// Aligned feature rows and their lag-ahead targets.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub lag: usize,
    pub features: Vec<FeatureVector>,
    pub targets: Vec<f64>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Most recent complete row.
    pub fn latest(&self) -> Option<&FeatureVector> {
        self.features.last()
    }
}

/// Spacing between the first two readings, if there are two.
fn sample_spacing(readings: &[SensorReading]) -> Option<Duration> {
    match readings {
        [first, second, ..] => Some(second.timestamp - first.timestamp),
        _ => None,
    }
}

/// Samples per hour, detected from the first two readings.
pub fn detect_lag(readings: &[SensorReading]) -> usize {
    match sample_spacing(readings) {
        Some(spacing) if spacing.num_seconds() < DENSE_INTERVAL_SEC => DENSE_LAG,
        _ => HOURLY_LAG,
    }
}

/// Wall-clock span of one lag: `lag` samples of the detected spacing.
/// One hour when the spacing cannot be detected.
pub fn lag_interval(readings: &[SensorReading]) -> Duration {
    match sample_spacing(readings) {
        Some(spacing) => spacing * detect_lag(readings) as i32,
        None => Duration::hours(1),
    }
}

/// Build aligned `(features, targets)` rows.
///
/// Row `i` is kept only when both `i - lag` and `i + lag` exist, so an
/// `L`-row input yields `max(0, L - 2 * lag)` rows.  `None` means no row
/// survived.
pub fn build_features(readings: &[SensorReading]) -> Option<FeatureSet> {
    let lag = detect_lag(readings);
    if readings.len() <= 2 * lag {
        return None;
    }

    let (features, targets): (Vec<FeatureVector>, Vec<f64>) = (lag..readings.len() - lag)
        .map(|i| {
            let now = &readings[i];
            let before = readings[i - lag].soil_moisture;
            let row = FeatureVector {
                moisture: now.soil_moisture,
                lag_moisture: before,
                moisture_delta: now.soil_moisture - before,
                temperature: now.temperature,
                humidity: now.humidity,
                hour: now.timestamp.hour() as f64,
            };
            (row, readings[i + lag].soil_moisture)
        })
        .unzip();

    Some(FeatureSet {
        lag,
        features,
        targets,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;

    /// `n` readings spaced `step_min` minutes apart with moisture 0, 1, 2, …
    fn series(n: usize, step_min: i64) -> Vec<SensorReading> {
        let start =
            NaiveDateTime::parse_from_str("2025-05-01 00:00:00", TIMESTAMP_FORMAT).unwrap();
        (0..n)
            .map(|i| {
                SensorReading::with_moisture(
                    start + Duration::minutes(step_min * i as i64),
                    i as f64,
                    i as f64,
                    i as f64,
                    20.0,
                    60.0,
                )
            })
            .collect()
    }

    #[test]
    fn five_minute_series_uses_lag_12() {
        assert_eq!(detect_lag(&series(40, 5)), 12);
    }

    #[test]
    fn hourly_series_uses_lag_1() {
        assert_eq!(detect_lag(&series(40, 60)), 1);
    }

    #[test]
    fn ten_minute_boundary_is_hourly() {
        assert_eq!(detect_lag(&series(5, 10)), 1);
        assert_eq!(detect_lag(&series(5, 9)), 12);
    }

    #[test]
    fn short_series_uses_lag_1() {
        assert_eq!(detect_lag(&series(1, 5)), 1);
        assert_eq!(detect_lag(&[]), 1);
    }

    #[test]
    fn lag_interval_is_one_hour_for_both_densities() {
        assert_eq!(lag_interval(&series(30, 5)), Duration::hours(1));
        assert_eq!(lag_interval(&series(30, 60)), Duration::hours(1));
        assert_eq!(lag_interval(&series(1, 60)), Duration::hours(1));
        assert_eq!(lag_interval(&series(3, 120)), Duration::hours(2));
    }

    #[test]
    fn row_count_is_len_minus_two_lags() {
        for (n, step) in [(10, 60), (3, 60), (2, 60), (30, 5), (25, 5), (24, 5), (100, 5)] {
            let readings = series(n, step);
            let lag = detect_lag(&readings);
            let expected = n.saturating_sub(2 * lag);
            let got = build_features(&readings).map_or(0, |f| f.len());
            assert_eq!(got, expected, "n={n} step={step}");
        }
    }

    #[test]
    fn too_short_yields_none() {
        assert!(build_features(&series(2, 60)).is_none());
        assert!(build_features(&series(24, 5)).is_none());
        assert!(build_features(&[]).is_none());
    }

    #[test]
    fn rows_are_aligned() {
        let set = build_features(&series(30, 5)).unwrap();
        assert_eq!(set.lag, 12);
        assert_eq!(set.features.len(), set.targets.len());

        // First kept row is index 12: lag value is row 0, target is row 24.
        let first = set.features[0];
        assert_eq!(first.moisture, 12.0);
        assert_eq!(first.lag_moisture, 0.0);
        assert_eq!(first.moisture_delta, 12.0);
        assert_eq!(set.targets[0], 24.0);
        assert_eq!(first.hour, 1.0); // 12 * 5 min past midnight

        let last = set.latest().unwrap();
        assert_eq!(last.moisture, 17.0);
        assert_eq!(*set.targets.last().unwrap(), 29.0);
    }

    #[test]
    fn hour_comes_from_timestamp() {
        let set = build_features(&series(30, 60)).unwrap();
        let hours: Vec<f64> = set.features.iter().map(|f| f.hour).collect();
        assert_eq!(hours[0], 1.0);
        assert_eq!(hours[22], 23.0);
        assert_eq!(hours[23], 0.0);
    }

    #[test]
    fn as_array_keeps_model_order() {
        let f = FeatureVector {
            moisture: 1.0,
            lag_moisture: 2.0,
            moisture_delta: 3.0,
            temperature: 4.0,
            humidity: 5.0,
            hour: 6.0,
        };
        assert_eq!(f.as_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(f.is_finite());
        assert!(!FeatureVector { hour: f64::NAN, ..f }.is_finite());
    }
}
