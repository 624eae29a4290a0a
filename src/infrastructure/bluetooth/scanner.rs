//! BLE Scanner Module
//!
//! Discovers nearby peripherals for a fixed window and selects the one
//! advertising the target name.

use std::future::Future;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Peripheral};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::models::{MonitorEvent, ScannedDevice};
use crate::error::ScanError;

/// BLE scanner for locating the sensor peripheral.
pub struct BleScanner {
    adapter: Adapter,
    event_sender: mpsc::UnboundedSender<MonitorEvent>,
}

impl BleScanner {
    pub fn new(adapter: Adapter, event_sender: mpsc::UnboundedSender<MonitorEvent>) -> Self {
        Self {
            adapter,
            event_sender,
        }
    }

    /// Scan for `window` and return the peripheral whose advertised name
    /// equals `target_name`.
    ///
    /// The whole window is always observed, never cut short on the first
    /// match: a device advertising late in the window is still a
    /// candidate. If nothing matches the scan fails with
    /// [`ScanError::NoMatchingDevice`] rather than falling back to an
    /// arbitrary device.
    pub async fn scan(
        &self,
        window: Duration,
        target_name: &str,
    ) -> Result<Peripheral, ScanError> {
        info!(?window, target_name, "starting advertisement scan");
        let _ = self.event_sender.send(MonitorEvent::ScanStarted);

        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        observe_scan_window(&mut events, window, |event| self.report_discovery(event)).await;

        self.adapter.stop_scan().await?;

        let peripherals = self.adapter.peripherals().await?;
        let mut names = Vec::with_capacity(peripherals.len());
        for peripheral in &peripherals {
            let properties = peripheral.properties().await.ok().flatten();
            let name = properties.as_ref().and_then(|p| p.local_name.clone());
            let rssi = properties.as_ref().and_then(|p| p.rssi);
            info!(
                address = %peripheral.address(),
                name = name.as_deref().unwrap_or("(unknown)"),
                rssi,
                "device seen during scan window"
            );
            names.push(name);
        }

        match matching_index(&names, target_name) {
            Some(index) => {
                let peripheral = peripherals[index].clone();
                info!(address = %peripheral.address(), target_name, "target device selected");
                Ok(peripheral)
            }
            None => Err(ScanError::NoMatchingDevice(target_name.to_string())),
        }
    }

    /// Forward discovery activity to the event channel. Log-only side
    /// channel; selection happens from the final peripheral list.
    async fn report_discovery(&self, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(id) => {
                let device = match self.adapter.peripheral(&id).await {
                    Ok(peripheral) => {
                        let properties = peripheral.properties().await.ok().flatten();
                        ScannedDevice {
                            address: peripheral.address().to_string(),
                            name: properties.as_ref().and_then(|p| p.local_name.clone()),
                            rssi: properties.as_ref().and_then(|p| p.rssi),
                        }
                    }
                    Err(_) => ScannedDevice {
                        address: format!("{id:?}"),
                        name: None,
                        rssi: None,
                    },
                };
                debug!(address = %device.address, "discovered device");
                let _ = self.event_sender.send(MonitorEvent::DeviceSeen(device));
            }
            CentralEvent::DeviceUpdated(id) => {
                let _ = self.event_sender.send(MonitorEvent::DeviceUpdated {
                    address: format!("{id:?}"),
                });
            }
            _ => {}
        }
    }
}

/// Drive `handle` with discovery events until the window elapses.
///
/// The window is always waited out in full. If the event stream ends early
/// the remainder is slept through instead, so late advertisers still make
/// the adapter's peripheral list before `stop_scan`.
async fn observe_scan_window<S, F, Fut>(events: &mut S, window: Duration, mut handle: F)
where
    S: Stream<Item = CentralEvent> + Unpin,
    F: FnMut(CentralEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, events.next()).await {
            Ok(Some(event)) => handle(event).await,
            // No more discovery events; the window still applies.
            Ok(None) => {
                tokio::time::sleep_until(deadline).await;
                return;
            }
            // Window elapsed mid-wait.
            Err(_) => return,
        }
    }
}

/// Index of the first advertised name equal to `target`.
pub fn matching_index(names: &[Option<String>], target: &str) -> Option<usize> {
    names
        .iter()
        .position(|name| name.as_deref() == Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<Option<String>> {
        list.iter().map(|n| Some(n.to_string())).collect()
    }

    #[test]
    fn selects_the_exactly_matching_name() {
        let advertised = names(&["IOT31", "IOT32", "IOT33"]);
        assert_eq!(matching_index(&advertised, "IOT32"), Some(1));
    }

    #[test]
    fn no_match_selects_nothing() {
        let advertised = names(&["IOT31", "IOT33"]);
        assert_eq!(matching_index(&advertised, "IOT32"), None);
        assert_eq!(matching_index(&[], "IOT32"), None);
    }

    #[test]
    fn nameless_devices_are_skipped() {
        let advertised = vec![None, Some("IOT32".to_string())];
        assert_eq!(matching_index(&advertised, "IOT32"), Some(1));
    }

    #[test]
    fn substring_is_not_a_match() {
        let advertised = names(&["IOT321", "XIOT32"]);
        assert_eq!(matching_index(&advertised, "IOT32"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_waited_out_when_the_event_stream_ends_early() {
        let (events_tx, mut events_rx) = futures::channel::mpsc::unbounded::<CentralEvent>();
        drop(events_tx);

        let started = tokio::time::Instant::now();
        observe_scan_window(&mut events_rx, Duration::from_secs(10), |_| async {}).await;
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn events_inside_the_window_reach_the_handler() {
        use btleplug::api::CentralState;
        use std::cell::Cell;

        let (events_tx, mut events_rx) = futures::channel::mpsc::unbounded();
        events_tx
            .unbounded_send(CentralEvent::StateUpdate(CentralState::PoweredOn))
            .unwrap();
        drop(events_tx);

        let seen = Cell::new(0u32);
        let started = tokio::time::Instant::now();
        observe_scan_window(&mut events_rx, Duration::from_millis(500), |_| async {
            seen.set(seen.get() + 1);
        })
        .await;

        assert_eq!(seen.get(), 1);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}
