//! TOML config file loading and validation for the control loop and the
//! forecast model.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control: ControlConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Sensor node whose readings drive the loop and which receives
    /// watering commands.
    pub node_id: String,
    /// Moisture percentage below which watering is recommended.
    pub threshold: f64,
    pub watering_duration_sec: u32,
    pub prediction_interval_sec: u64,
    /// Readings required before the first prediction is attempted.
    pub min_readings: usize,
    /// Steps in the recursive forecast reported on each tick.
    pub horizon: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            node_id: "node-a".to_string(),
            threshold: 35.0,
            watering_duration_sec: 180,
            prediction_interval_sec: 300,
            min_readings: 12,
            horizon: 6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    /// Days of simulated history to train on when no saved model exists.
    /// Zero disables bootstrapping.
    pub bootstrap_days: usize,
    pub bootstrap_seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "soil_model.json".to_string(),
            bootstrap_days: 14,
            bootstrap_seed: 42,
        }
    }
}

/// Fewest readings from which a feature row can be built.
const MIN_READINGS_FLOOR: usize = 3;

const MAX_BOOTSTRAP_DAYS: usize = 365;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_control(&mut errors);
        self.validate_model(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_control(&self, errors: &mut Vec<String>) {
        let c = &self.control;

        // ── Node identity (used verbatim in MQTT topics) ────────────
        if c.node_id.trim().is_empty() {
            errors.push("control: node_id is empty".to_string());
        } else if c.node_id.contains(['/', '+', '#']) {
            errors.push(format!(
                "control: node_id '{}' must not contain '/', '+' or '#'",
                c.node_id
            ));
        }

        // ── Threshold ───────────────────────────────────────────────
        if !(c.threshold > 0.0 && c.threshold <= 100.0) {
            errors.push(format!(
                "control: threshold {} out of range (0, 100]",
                c.threshold
            ));
        }

        // ── Timing ──────────────────────────────────────────────────
        if c.watering_duration_sec == 0 {
            errors.push("control: watering_duration_sec must be positive".to_string());
        }
        if c.prediction_interval_sec == 0 {
            errors.push("control: prediction_interval_sec must be positive".to_string());
        }

        // ── Forecast window ─────────────────────────────────────────
        if c.min_readings < MIN_READINGS_FLOOR {
            errors.push(format!(
                "control: min_readings must be at least {MIN_READINGS_FLOOR}, got {}",
                c.min_readings
            ));
        }
        if c.horizon == 0 {
            errors.push("control: horizon must be positive".to_string());
        }
    }

    fn validate_model(&self, errors: &mut Vec<String>) {
        let m = &self.model;

        if m.path.trim().is_empty() {
            errors.push("model: path is empty".to_string());
        }
        if m.bootstrap_days > MAX_BOOTSTRAP_DAYS {
            errors.push(format!(
                "model: bootstrap_days {} exceeds {MAX_BOOTSTRAP_DAYS}",
                m.bootstrap_days
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.  A missing file yields the
/// defaults.
pub fn load(path: &str) -> Result<Config> {
    let config = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?
    } else {
        tracing::info!(path, "config file not found, using defaults");
        Config::default()
    };

    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;

    tracing::info!(
        node = %config.control.node_id,
        threshold = config.control.threshold,
        interval_sec = config.control.prediction_interval_sec,
        model = %config.model.path,
        "config loaded"
    );
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
