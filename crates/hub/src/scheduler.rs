//! Forecast-driven watering loop.
//!
//! Every `prediction_interval_sec` the scheduler snapshots the reading
//! buffer, trains the model if none is present, predicts the next moisture
//! value plus a short recursive forecast, and publishes `WATER_ON:<sec>` to
//! `cmd/<node_id>/water` when the prediction falls below the threshold.
//!
//! Model work is CPU-bound and runs on the blocking pool; the predictor's
//! single-flight lock rejects a pass that overlaps a previous one.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, QoS};
use tracing::{error, info, warn};

use soil_forecast::{
    recommend, ForecastError, ForecastStep, Predictor, ReadingBuffer, SensorReading,
    TrainingReport,
};

use crate::config::ControlConfig;
use crate::mqtt::command_topic;
use crate::state::SharedState;

/// Readings handed to the forecaster.  Enough for a dense series to form
/// complete lag rows; older history only matters for training.
const PREDICTION_WINDOW: usize = 288;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything one tick needs besides the MQTT client and shared state.
pub struct Controller {
    pub predictor: Arc<Predictor>,
    pub buffer: Arc<ReadingBuffer>,
    pub control: ControlConfig,
}

/// Result of one forecasting pass on the blocking pool.
struct Pass {
    trained: Option<TrainingReport>,
    next: f64,
    steps: Vec<ForecastStep>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Waiting { have: usize, need: usize },
    Failed,
    Decided { watered: bool },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the scheduler loop.  Intended to be `tokio::spawn`-ed from main.
pub async fn run(ctrl: Controller, mqtt: AsyncClient, shared: SharedState) {
    let interval_sec = ctrl.control.prediction_interval_sec;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_sec));

    info!(
        node = %ctrl.control.node_id,
        interval_sec,
        threshold = ctrl.control.threshold,
        horizon = ctrl.control.horizon,
        "scheduler started"
    );
    {
        let mut st = shared.write().await;
        st.record_system(format!(
            "scheduler started (every {interval_sec}s, threshold {:.1}%)",
            ctrl.control.threshold
        ));
    }

    loop {
        ticker.tick().await;
        tick(&ctrl, &mqtt, &shared).await;
    }
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One control cycle: forecast, decide, actuate.
pub(crate) async fn tick(ctrl: &Controller, mqtt: &AsyncClient, shared: &SharedState) -> TickOutcome {
    let cfg = &ctrl.control;

    // ── Guard: enough readings ───────────────────────────────────
    let have = ctrl.buffer.len();
    if have < cfg.min_readings {
        info!(have, need = cfg.min_readings, "scheduler: waiting for readings");
        shared.write().await.record_system(format!(
            "waiting for readings ({have}/{})",
            cfg.min_readings
        ));
        return TickOutcome::Waiting {
            have,
            need: cfg.min_readings,
        };
    }

    // ── Train (if needed), predict, forecast ─────────────────────
    let history = if ctrl.predictor.is_trained() {
        Vec::new()
    } else {
        ctrl.buffer.snapshot()
    };
    let window = ctrl.buffer.tail(PREDICTION_WINDOW);
    let current = match window.last() {
        Some(r) => r.soil_moisture,
        None => return TickOutcome::Failed,
    };

    let predictor = Arc::clone(&ctrl.predictor);
    let horizon = cfg.horizon;
    let joined =
        tokio::task::spawn_blocking(move || forecast_pass(&predictor, &history, &window, horizon))
            .await;

    let pass = match joined {
        Ok(Ok(pass)) => pass,
        Ok(Err(e)) => {
            warn!("scheduler: forecast pass failed: {e}");
            shared
                .write()
                .await
                .record_error(format!("forecast failed: {e}"));
            return TickOutcome::Failed;
        }
        Err(e) => {
            error!("scheduler: forecast task panicked: {e}");
            shared
                .write()
                .await
                .record_error(format!("forecast task failed: {e}"));
            return TickOutcome::Failed;
        }
    };

    // ── Decide ───────────────────────────────────────────────────
    let rec = recommend(current, pass.next, cfg.threshold);
    info!(
        current = format!("{current:.1}"),
        predicted = format!("{:.1}", pass.next),
        urgency = %rec.urgency,
        "scheduler: {}",
        rec.message
    );

    let command = rec.command(cfg.watering_duration_sec);
    {
        let mut st = shared.write().await;
        if let Some(report) = pass.trained {
            st.record_training(report, "buffered readings");
        }
        st.record_forecast(pass.next, pass.steps);
        st.record_recommendation(rec);
    }

    // ── Actuate ──────────────────────────────────────────────────
    let command = match command {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return TickOutcome::Decided { watered: false },
        Err(e) => {
            error!("scheduler: cannot build watering command: {e}");
            shared.write().await.record_error(e.to_string());
            return TickOutcome::Failed;
        }
    };

    let topic = command_topic(&cfg.node_id);
    if let Err(e) = mqtt
        .publish(&topic, QoS::AtLeastOnce, false, command.to_line().into_bytes())
        .await
    {
        error!(topic = %topic, "scheduler: failed to publish water command: {e}");
        shared
            .write()
            .await
            .record_error(format!("publish to {topic} failed: {e}"));
        return TickOutcome::Failed;
    }

    info!(topic = %topic, seconds = command.seconds(), "scheduler: watering");
    shared.write().await.record_watering(command);
    TickOutcome::Decided { watered: true }
}

/// Train on `history` when it is non-empty, then predict from `window`.
fn forecast_pass(
    predictor: &Predictor,
    history: &[SensorReading],
    window: &[SensorReading],
    horizon: usize,
) -> Result<Pass, ForecastError> {
    let trained = if history.is_empty() {
        None
    } else {
        Some(predictor.train(history)?)
    };
    let next = predictor.predict_next(window)?;
    let steps = predictor.forecast(window, horizon)?;
    Ok(Pass {
        trained,
        next,
        steps,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
