use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use soil_forecast::{ForecastStep, SensorReading, TrainingReport, WaterCommand, WateringRecommendation};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub node_id: String,
    pub buffered_readings: usize,
    pub last_reading: Option<SensorReading>,
    pub model: ModelStatus,
    pub last_training: Option<TrainingReport>,
    pub last_prediction: Option<f64>,
    pub last_forecast: Vec<ForecastStep>,
    pub last_recommendation: Option<WateringRecommendation>,
    pub last_watering: Option<DateTime<Utc>>,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Untrained,
    Loaded,
    Trained,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Reading,
    Model,
    Forecast,
    Watering,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    pub node_id: String,
    pub buffered_readings: usize,
    pub last_reading: Option<SensorReading>,
    pub model: ModelStatus,
    pub last_training: Option<TrainingReport>,
    pub last_prediction: Option<f64>,
    pub last_forecast: Vec<ForecastStep>,
    pub last_recommendation: Option<WateringRecommendation>,
    pub last_watering: Option<DateTime<Utc>>,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(node_id: &str) -> Self {
        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            node_id: node_id.to_string(),
            buffered_readings: 0,
            last_reading: None,
            model: ModelStatus::Untrained,
            last_training: None,
            last_prediction: None,
            last_forecast: Vec::new(),
            last_recommendation: None,
            last_watering: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record a reading accepted into the buffer, which now holds `buffered`.
    pub fn record_reading(&mut self, reading: SensorReading, buffered: usize) {
        let detail = format!(
            "{}: moisture={:.1}% (up={:.1}, low={:.1}) temp={:.1}C humid={:.1}%",
            self.node_id,
            reading.soil_moisture,
            reading.soil_upper,
            reading.soil_lower,
            reading.temperature,
            reading.humidity
        );
        self.buffered_readings = buffered;
        self.last_reading = Some(reading);
        self.push_event(EventKind::Reading, detail);
    }

    /// Record that a persisted model was loaded from `path`.
    pub fn record_model_loaded(&mut self, path: &str) {
        self.model = ModelStatus::Loaded;
        self.push_event(EventKind::Model, format!("model loaded from {path}"));
    }

    /// Record a successful training pass.
    pub fn record_training(&mut self, report: TrainingReport, source: &str) {
        let detail = format!(
            "model trained on {source}: {} train / {} test rows, r2={:.3} rmse={:.2} mae={:.2}",
            report.train_rows,
            report.test_rows,
            report.metrics.r2,
            report.metrics.rmse,
            report.metrics.mae
        );
        self.model = ModelStatus::Trained;
        self.last_training = Some(report);
        self.push_event(EventKind::Model, detail);
    }

    /// Record the next-step prediction and the multi-step forecast.
    pub fn record_forecast(&mut self, next: f64, steps: Vec<ForecastStep>) {
        let detail = format!(
            "next={next:.1}% forecast=[{}]",
            steps
                .iter()
                .map(|s| format!("{:.1}", s.predicted_moisture))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.last_prediction = Some(next);
        self.last_forecast = steps;
        self.push_event(EventKind::Forecast, detail);
    }

    /// Record the decision derived from the latest prediction.
    pub fn record_recommendation(&mut self, rec: WateringRecommendation) {
        let detail = format!("{} ({})", rec.message, rec.urgency);
        self.last_recommendation = Some(rec);
        self.push_event(EventKind::Forecast, detail);
    }

    /// Record a watering command sent to the node.
    pub fn record_watering(&mut self, command: WaterCommand) {
        self.last_watering = Some(Utc::now());
        self.push_event(
            EventKind::Watering,
            format!("{}: {command}", self.node_id),
        );
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            node_id: self.node_id.clone(),
            buffered_readings: self.buffered_readings,
            last_reading: self.last_reading.clone(),
            model: self.model,
            last_training: self.last_training.clone(),
            last_prediction: self.last_prediction,
            last_forecast: self.last_forecast.clone(),
            last_recommendation: self.last_recommendation.clone(),
            last_watering: self.last_watering,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: Utc::now(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
