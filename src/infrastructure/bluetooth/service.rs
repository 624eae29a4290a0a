//! Monitor Service Module
//!
//! Session coordinator: acquires the adapter, runs the scan, connects,
//! resolves and subscribes the sensor table, and hands the notification
//! stream to the pump. Owns the connection for the session's lifetime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use btleplug::api::{Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::models::{ConnectionStatus, MonitorEvent};
use crate::domain::readings::SensorState;
use crate::domain::sensors::CharacteristicSpec;
use crate::domain::settings::SettingsService;
use crate::error::{ConnectError, MonitorError, ScanError};
use crate::infrastructure::bluetooth::pump::{NotificationPump, PumpState};
use crate::infrastructure::bluetooth::resolver::Resolver;
use crate::infrastructure::bluetooth::scanner::BleScanner;

struct SessionConfig {
    target_name: String,
    scan_window: Duration,
    wait_timeout: Duration,
    specs: Vec<CharacteristicSpec>,
}

/// Coordinates one monitoring session against the sensor peripheral.
pub struct MonitorService {
    settings: Arc<Mutex<SettingsService>>,
    event_sender: mpsc::UnboundedSender<MonitorEvent>,
    peripheral: Option<Peripheral>,
    pump: NotificationPump,
}

impl MonitorService {
    pub fn new(
        settings: Arc<Mutex<SettingsService>>,
        event_sender: mpsc::UnboundedSender<MonitorEvent>,
    ) -> Self {
        Self {
            settings,
            event_sender,
            peripheral: None,
            pump: NotificationPump::new(Duration::from_secs(1)),
        }
    }

    /// Scan, connect, resolve, and start pumping. Returns the shared
    /// sensor state for the consumer to poll.
    ///
    /// Scan and connect failures are fatal and propagate; the retry or
    /// reconnect policy belongs to the caller, which observes
    /// [`MonitorEvent::PumpTerminated`] for losses after this returns.
    pub async fn run_session(&mut self) -> Result<Arc<SensorState>, MonitorError> {
        // The owner may call this again after a lost link. Retire any
        // prior session first: the old pump must be joined and the old
        // link dropped before their replacements exist, otherwise the
        // stale pump keeps running against an abandoned state.
        self.shutdown().await;

        let config = self.session_config()?;

        let adapter = Self::default_adapter().await?;
        let scanner = BleScanner::new(adapter, self.event_sender.clone());
        let peripheral = scanner.scan(config.scan_window, &config.target_name).await?;

        let address = peripheral.address().to_string();
        info!(%address, "connecting");
        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral
                .connect()
                .await
                .map_err(|source| ConnectError::Rejected {
                    address: address.clone(),
                    source,
                })?;
        }
        let _ = self
            .event_sender
            .send(MonitorEvent::ConnectionStatus(ConnectionStatus::Connected));

        let resolver = Resolver::new(config.specs);
        let resolution = match resolver.resolve_and_subscribe(&peripheral).await {
            Ok(resolution) => resolution,
            Err(err) => {
                // The connection is not usable; take it down cleanly
                // before surfacing the failure.
                self.drop_connection(&peripheral).await;
                return Err(err.into());
            }
        };

        let stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(source) => {
                self.drop_connection(&peripheral).await;
                return Err(ConnectError::Notifications(source).into());
            }
        };

        let state = Arc::new(SensorState::new(resolution.table, resolution.initial));
        self.pump = NotificationPump::new(config.wait_timeout);
        self.pump
            .start(stream, state.clone(), self.event_sender.clone());
        self.peripheral = Some(peripheral);
        Ok(state)
    }

    /// Stop the pump, then drop the link. Join order matters: the pump
    /// must be fully stopped before the connection goes away.
    pub async fn shutdown(&mut self) {
        if let Err(err) = self.pump.stop().await {
            warn!(%err, "pump had already terminated");
        }
        if let Some(peripheral) = self.peripheral.take() {
            self.drop_connection(&peripheral).await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        match &self.peripheral {
            Some(peripheral) => peripheral.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    pub fn pump_state(&self) -> PumpState {
        self.pump.state()
    }

    fn session_config(&self) -> Result<SessionConfig, MonitorError> {
        let settings = self
            .settings
            .lock()
            .expect("settings lock poisoned");
        let s = settings.get();
        Ok(SessionConfig {
            target_name: s.target_device_name.clone(),
            scan_window: Duration::from_secs(s.scan_seconds),
            wait_timeout: Duration::from_millis(s.wait_timeout_ms),
            specs: s.specs()?,
        })
    }

    async fn default_adapter() -> Result<Adapter, ScanError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        adapters.into_iter().next().ok_or(ScanError::RadioUnavailable)
    }

    async fn drop_connection(&self, peripheral: &Peripheral) {
        if let Err(err) = peripheral.disconnect().await {
            warn!(%err, "disconnect failed");
        }
        info!("disconnected from device");
        let _ = self.event_sender.send(MonitorEvent::ConnectionStatus(
            ConnectionStatus::Disconnected,
        ));
    }
}
