mod config;
mod mqtt;
mod scheduler;
mod state;
mod web;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use soil_forecast::{sim, Predictor, ReadingBuffer};

use config::ModelConfig;
use mqtt::{handle_publish, TELEMETRY_FILTER};
use scheduler::Controller;
use state::{SharedState, SystemState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    let node_id = cfg.control.node_id.clone();

    // ── Shared state (ephemeral, for the status API) ────────────────
    let shared: SharedState = Arc::new(RwLock::new(SystemState::new(&node_id)));
    shared.write().await.record_system("hub started".to_string());

    // ── Model ───────────────────────────────────────────────────────
    let predictor = Arc::new(Predictor::with_path(&cfg.model.path));
    prepare_model(&predictor, &cfg.model, &shared).await?;

    let buffer = Arc::new(ReadingBuffer::new());

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new("irrigation-hub", broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    client
        .subscribe(TELEMETRY_FILTER, QoS::AtLeastOnce)
        .await
        .context("failed to queue telemetry subscription")?;
    info!(filter = TELEMETRY_FILTER, node = %node_id, "hub subscribed");

    // ── Web server ──────────────────────────────────────────────────
    let web_state = Arc::clone(&shared);
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_state).await {
            error!("status api stopped: {e:#}");
        }
    });

    // ── Scheduler ───────────────────────────────────────────────────
    let ctrl = Controller {
        predictor: Arc::clone(&predictor),
        buffer: Arc::clone(&buffer),
        control: cfg.control.clone(),
    };
    tokio::spawn(scheduler::run(ctrl, client.clone(), Arc::clone(&shared)));

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let received_at = chrono::Local::now().naive_local();
                handle_publish(&p.topic, &p.payload, &node_id, received_at, &buffer, &shared).await;
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                let mut st = shared.write().await;
                st.mqtt_connected = true;
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                warn!("mqtt error: {e}. reconnecting...");

                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_error(format!("mqtt error: {e}"));
                drop(st);

                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Load the saved model, or bootstrap one from simulated history.  Without
/// either, the scheduler trains on live readings once enough arrive.
async fn prepare_model(predictor: &Arc<Predictor>, cfg: &ModelConfig, shared: &SharedState) -> Result<()> {
    if predictor.load()? {
        shared.write().await.record_model_loaded(&cfg.path);
        return Ok(());
    }

    if cfg.bootstrap_days == 0 {
        info!("no saved model; will train on live readings");
        return Ok(());
    }

    info!(
        days = cfg.bootstrap_days,
        seed = cfg.bootstrap_seed,
        "no saved model; bootstrapping from simulated history"
    );
    let history = sim::generate(cfg.bootstrap_days, cfg.bootstrap_seed);
    let worker = Arc::clone(predictor);
    let trained = tokio::task::spawn_blocking(move || worker.train(&history))
        .await
        .context("bootstrap training task failed")?;

    let mut st = shared.write().await;
    match trained {
        Ok(report) => st.record_training(report, "simulated history"),
        Err(e) => {
            warn!("bootstrap training failed: {e}");
            st.record_error(format!("bootstrap training failed: {e}"));
        }
    }
    Ok(())
}
