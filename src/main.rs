//! Console consumer: connects to the IOT32 peripheral and prints each
//! changed set of readings at a fixed poll cadence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info};

use iot32_monitor::domain::models::{MonitorEvent, PumpExit};
use iot32_monitor::domain::readings::SensorSnapshot;
use iot32_monitor::domain::sensors::{body_location_name, SensorSlot};
use iot32_monitor::domain::settings::SettingsService;
use iot32_monitor::infrastructure::bluetooth::MonitorService;
use iot32_monitor::infrastructure::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = SettingsService::new()?;
    let _log_guard = logging::init_logger(&settings.get().log_settings)?;
    let poll_interval = Duration::from_millis(settings.get().poll_interval_ms);
    let settings = Arc::new(Mutex::new(settings));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut service = MonitorService::new(settings, event_tx);
    let state = service.run_session().await?;

    let mut poll = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            Some(event) = event_rx.recv() => {
                if event == MonitorEvent::PumpTerminated(PumpExit::TransportLost) {
                    error!("connection lost; no automatic reconnect, exiting");
                    break;
                }
            }
            _ = poll.tick() => {
                let snapshot = state.read_snapshot();
                if snapshot.changed {
                    print_readings(&snapshot);
                }
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

fn print_readings(snapshot: &SensorSnapshot) {
    for slot in SensorSlot::ALL {
        let Some(value) = snapshot.get(slot) else {
            continue;
        };
        if slot == SensorSlot::BodyLocation {
            match body_location_name(value) {
                Ok(name) => println!("{slot} data {name}"),
                Err(_) => println!("{slot} data {value}"),
            }
        } else {
            println!("{slot} data {value}");
        }
    }
    println!("--------------------");
}
