mod field;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::{Arc, Mutex};
use std::{env, time::Duration};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use soil_forecast::WaterCommand;

use field::{SimulatedField, SIM_STEP_SECS};

/// Publishing once per simulated step keeps the hub's arrival timestamps
/// on the simulated clock.
const DEFAULT_SAMPLE_EVERY_S: u64 = SIM_STEP_SECS as u64;

fn reading_topic(node_id: &str) -> String {
    format!("tele/{node_id}/reading")
}

fn command_topic(node_id: &str) -> String {
    format!("cmd/{node_id}/water")
}

/// Apply a command payload to the field.  Malformed payloads are logged and
/// dropped.
fn handle_command(payload: &[u8], field: &Mutex<SimulatedField>) -> Option<WaterCommand> {
    match WaterCommand::parse(payload) {
        Ok(cmd) => {
            field
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .water(cmd);
            Some(cmd)
        }
        Err(e) => {
            warn!("dropping command: {e}");
            None
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Env config
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let node_id = env::var("NODE_ID").unwrap_or_else(|_| "node-a".to_string());

    let sample_every_s: u64 = env::var("SAMPLE_EVERY_S")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SAMPLE_EVERY_S);
    let seed: u64 = env::var("SIM_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(42);

    let field = Arc::new(Mutex::new(SimulatedField::new(seed)));

    let client_id = format!("irrigation-node-{node_id}");
    let mut mqttoptions = MqttOptions::new(client_id, broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    let cmd_topic = command_topic(&node_id);
    client
        .subscribe(&cmd_topic, QoS::AtLeastOnce)
        .await
        .context("failed to queue command subscription")?;

    let cmd_field = Arc::clone(&field);
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("node connected to mqtt");
                }
                Ok(Event::Incoming(Packet::Publish(p))) if p.topic == cmd_topic => {
                    handle_command(&p.payload, &cmd_field);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("mqtt error: {e}. retrying...");
                    sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    let topic = reading_topic(&node_id);
    info!(%topic, sample_every_s, seed, "publishing simulated readings");

    loop {
        let reading = field
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_reading();
        let line = reading.to_line();

        if let Err(e) = client
            .publish(&topic, QoS::AtLeastOnce, false, line.clone().into_bytes())
            .await
        {
            warn!("publish error: {e}");
        } else {
            info!(sim_time = %reading.timestamp, weather = ?reading.weather, "published {line}");
        }

        sleep(Duration::from_secs(sample_every_s)).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_match_hub_conventions() {
        assert_eq!(reading_topic("node-a"), "tele/node-a/reading");
        assert_eq!(command_topic("node-a"), "cmd/node-a/water");
    }

    #[test]
    fn default_pace_matches_simulated_clock() {
        let mut field = SimulatedField::new(42);
        let first = field.next_reading();
        let second = field.next_reading();
        assert_eq!(
            (second.timestamp - first.timestamp).num_seconds() as u64,
            DEFAULT_SAMPLE_EVERY_S
        );

        // Arrival-stamped at the default pace, the hub sees an hourly series.
        let arrived: Vec<_> = (0..3)
            .map(|i| {
                let mut r = field.next_reading();
                r.timestamp = first.timestamp
                    + chrono::Duration::seconds(i * DEFAULT_SAMPLE_EVERY_S as i64);
                r
            })
            .collect();
        assert_eq!(soil_forecast::detect_lag(&arrived), 1);
    }

    #[test]
    fn valid_command_waters_field() {
        let field = Mutex::new(SimulatedField::new(3));
        field.lock().unwrap().next_reading();

        let cmd = handle_command(b"WATER_ON:180\n", &field);
        assert_eq!(cmd.map(|c| c.seconds()), Some(180));
    }

    #[test]
    fn malformed_command_is_dropped() {
        let field = Mutex::new(SimulatedField::new(3));
        assert!(handle_command(b"WATER_OFF", &field).is_none());
        assert!(handle_command(b"WATER_ON:0", &field).is_none());
        assert!(handle_command(b"WATER_ON:soon", &field).is_none());
    }
}
