//! Sensor reading type shared by the simulator, the feature builder and the
//! hub's ingestion path.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tabular timestamp layout (`YYYY-MM-DD HH:MM:SS`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Plausible ranges enforced on every reading.
pub const MOISTURE_RANGE: (f64, f64) = (0.0, 100.0);
pub const TEMPERATURE_RANGE: (f64, f64) = (10.0, 40.0);
pub const HUMIDITY_RANGE: (f64, f64) = (30.0, 100.0);

// ---------------------------------------------------------------------------
// Weather regime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weather {
    Sunny,
    Cloudy,
    Rainy,
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sunny => write!(f, "Sunny"),
            Self::Cloudy => write!(f, "Cloudy"),
            Self::Rainy => write!(f, "Rainy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One sample from the soil probe pair plus the air sensor.  Never mutated
/// after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub soil_upper: f64,
    pub soil_lower: f64,
    pub soil_moisture: f64,
    pub temperature: f64,
    pub humidity: f64,
    /// Debug label from the simulator; nothing downstream reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<Weather>,
}

impl SensorReading {
    /// Build a reading whose moisture is the mean of the two probes.
    pub fn new(
        timestamp: NaiveDateTime,
        soil_upper: f64,
        soil_lower: f64,
        temperature: f64,
        humidity: f64,
    ) -> Self {
        let soil_upper = clamp_to(soil_upper, MOISTURE_RANGE);
        let soil_lower = clamp_to(soil_lower, MOISTURE_RANGE);
        Self::with_moisture(
            timestamp,
            soil_upper,
            soil_lower,
            (soil_upper + soil_lower) / 2.0,
            temperature,
            humidity,
        )
    }

    /// Build a reading whose moisture was supplied directly.
    pub fn with_moisture(
        timestamp: NaiveDateTime,
        soil_upper: f64,
        soil_lower: f64,
        soil_moisture: f64,
        temperature: f64,
        humidity: f64,
    ) -> Self {
        Self {
            timestamp,
            soil_upper: clamp_to(soil_upper, MOISTURE_RANGE),
            soil_lower: clamp_to(soil_lower, MOISTURE_RANGE),
            soil_moisture: clamp_to(soil_moisture, MOISTURE_RANGE),
            temperature: clamp_to(temperature, TEMPERATURE_RANGE),
            humidity: clamp_to(humidity, HUMIDITY_RANGE),
            weather: None,
        }
    }

    pub fn with_weather(mut self, weather: Weather) -> Self {
        self.weather = Some(weather);
        self
    }

    /// Render as an ingestion line, e.g.
    /// `SOIL_UP:45.2,SOIL_LOW:40.1,TEMP:25.3,HUMID:60.5`.
    pub fn to_line(&self) -> String {
        format!(
            "SOIL_UP:{:.1},SOIL_LOW:{:.1},TEMP:{:.1},HUMID:{:.1}",
            self.soil_upper, self.soil_lower, self.temperature, self.humidity
        )
    }
}

fn clamp_to(value: f64, (lo, hi): (f64, f64)) -> f64 {
    value.clamp(lo, hi)
}

/// Round to one decimal place, the resolution sensors report at.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Serde helper for the tabular timestamp layout
// ---------------------------------------------------------------------------

pub mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn moisture_is_mean_of_probes() {
        let r = SensorReading::new(ts("2025-01-01 00:00:00"), 45.0, 41.0, 25.0, 60.0);
        assert_eq!(r.soil_moisture, 43.0);
    }

    #[test]
    fn values_are_clamped() {
        let r = SensorReading::new(ts("2025-01-01 00:00:00"), 120.0, -5.0, 55.0, 5.0);
        assert_eq!(r.soil_upper, 100.0);
        assert_eq!(r.soil_lower, 0.0);
        assert_eq!(r.soil_moisture, 50.0);
        assert_eq!(r.temperature, 40.0);
        assert_eq!(r.humidity, 30.0);
    }

    #[test]
    fn direct_moisture_is_kept() {
        let r = SensorReading::with_moisture(
            ts("2025-01-01 00:00:00"),
            40.0,
            30.0,
            33.3,
            20.0,
            70.0,
        );
        assert_eq!(r.soil_moisture, 33.3);
    }

    #[test]
    fn serializes_tabular_timestamp() {
        let r = SensorReading::new(ts("2025-03-04 05:06:07"), 40.0, 40.0, 20.0, 70.0);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["timestamp"], "2025-03-04 05:06:07");
        assert!(json.get("weather").is_none());

        let back: SensorReading = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn weather_label_serialized_when_present() {
        let r = SensorReading::new(ts("2025-03-04 05:06:07"), 40.0, 40.0, 20.0, 70.0)
            .with_weather(Weather::Rainy);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["weather"], "Rainy");
    }

    #[test]
    fn to_line_uses_one_decimal() {
        let r = SensorReading::new(ts("2025-01-01 00:00:00"), 45.24, 40.1, 25.3, 60.5);
        assert_eq!(r.to_line(), "SOIL_UP:45.2,SOIL_LOW:40.1,TEMP:25.3,HUMID:60.5");
    }

    #[test]
    fn round1_keeps_one_decimal() {
        assert_eq!(round1(12.34), 12.3);
        assert_eq!(round1(12.36), 12.4);
    }
}
