//! Line protocol spoken with the sensor node.
//!
//! Inbound: `SOIL_UP:45.2,SOIL_LOW:40.1,TEMP:25.3,HUMID:60.5` (one reading
//! per line).  Outbound: `WATER_ON:<seconds>\n`.

use chrono::NaiveDateTime;
use std::fmt;

use crate::error::{ForecastError, Result};
use crate::reading::SensorReading;

const WATER_ON_PREFIX: &str = "WATER_ON:";

// ---------------------------------------------------------------------------
// Reading lines
// ---------------------------------------------------------------------------

/// Fields found on one line.  Absent keys stay `None`; nothing is defaulted.
#[derive(Debug, Default, PartialEq)]
struct LineFields {
    soil_upper: Option<f64>,
    soil_lower: Option<f64>,
    soil: Option<f64>,
    temperature: Option<f64>,
    humidity: Option<f64>,
}

/// Parse one ingestion line into a reading stamped with `timestamp`.
///
/// Unknown keys are ignored.  A pair without `:`, a non-numeric value, or a
/// line missing TEMP, HUMID or the soil probes is rejected.
pub fn parse_line(line: &str, timestamp: NaiveDateTime) -> Result<SensorReading> {
    let fields = scan_fields(line)?;

    let temperature = fields
        .temperature
        .ok_or_else(|| malformed("missing TEMP", line))?;
    let humidity = fields
        .humidity
        .ok_or_else(|| malformed("missing HUMID", line))?;

    match (fields.soil_upper, fields.soil_lower, fields.soil) {
        (Some(up), Some(low), None) => Ok(SensorReading::new(
            timestamp,
            up,
            low,
            temperature,
            humidity,
        )),
        (Some(up), Some(low), Some(soil)) => Ok(SensorReading::with_moisture(
            timestamp,
            up,
            low,
            soil,
            temperature,
            humidity,
        )),
        (None, None, Some(soil)) => Ok(SensorReading::with_moisture(
            timestamp,
            soil,
            soil,
            soil,
            temperature,
            humidity,
        )),
        _ => Err(malformed("missing soil probe values", line)),
    }
}

fn scan_fields(line: &str) -> Result<LineFields> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ForecastError::MalformedReading("empty line".to_string()));
    }

    let mut fields = LineFields::default();
    for part in line.split(',') {
        let (key, value) = part
            .split_once(':')
            .ok_or_else(|| malformed("pair without ':'", line))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| malformed("non-numeric value", line))?;
        if !value.is_finite() {
            return Err(malformed("non-finite value", line));
        }

        match key.trim() {
            "SOIL_UP" => fields.soil_upper = Some(value),
            "SOIL_LOW" => fields.soil_lower = Some(value),
            "SOIL" => fields.soil = Some(value),
            "TEMP" => fields.temperature = Some(value),
            "HUMID" => fields.humidity = Some(value),
            _ => {}
        }
    }
    Ok(fields)
}

fn malformed(reason: &str, line: &str) -> ForecastError {
    ForecastError::MalformedReading(format!("{reason}: {line:?}"))
}

// ---------------------------------------------------------------------------
// Actuator command
// ---------------------------------------------------------------------------

/// Run the pump for `seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaterCommand {
    seconds: u32,
}

impl WaterCommand {
    pub fn new(seconds: u32) -> Result<Self> {
        if seconds == 0 {
            return Err(ForecastError::MalformedCommand(
                "watering duration must be positive".to_string(),
            ));
        }
        Ok(Self { seconds })
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Wire form including the trailing newline.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }

    /// Parse `WATER_ON:<seconds>` (case-insensitive, surrounding whitespace
    /// ignored).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let s = String::from_utf8_lossy(payload).trim().to_uppercase();
        let secs = s.strip_prefix(WATER_ON_PREFIX).ok_or_else(|| {
            ForecastError::MalformedCommand(format!("unknown command '{s}'"))
        })?;
        let seconds: u32 = secs.trim().parse().map_err(|_| {
            ForecastError::MalformedCommand(format!("bad duration in '{s}'"))
        })?;
        Self::new(seconds)
    }
}

impl fmt::Display for WaterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{WATER_ON_PREFIX}{}", self.seconds)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
