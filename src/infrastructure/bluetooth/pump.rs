//! Notification Pump
//!
//! Background task that waits on the transport's notification stream and
//! feeds every payload to the decoder state. Runs independently of any
//! consumer; a slow snapshot reader never blocks it.
//!
//! State machine: Idle → Running → Stopping → Stopped. `stop()` is the
//! only cancellation primitive and is cooperative — the loop notices the
//! token between bounded waits, so stop latency is bounded by the wait
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::models::{ConnectionStatus, MonitorEvent, PumpExit};
use crate::domain::readings::SensorState;
use crate::error::PumpError;
use crate::infrastructure::bluetooth::transport::NotificationStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

pub struct NotificationPump {
    wait_timeout: Duration,
    token: CancellationToken,
    task: Option<JoinHandle<Result<(), PumpError>>>,
    state: PumpState,
}

impl NotificationPump {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            wait_timeout,
            token: CancellationToken::new(),
            task: None,
            state: PumpState::Idle,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Begin pumping `stream` into `sensors`. Only valid from Idle.
    pub fn start(
        &mut self,
        stream: NotificationStream,
        sensors: Arc<SensorState>,
        events: mpsc::UnboundedSender<MonitorEvent>,
    ) {
        if self.state != PumpState::Idle {
            warn!(state = ?self.state, "pump start ignored");
            return;
        }
        let token = self.token.clone();
        let wait_timeout = self.wait_timeout;
        self.task = Some(tokio::spawn(run_loop(
            stream,
            sensors,
            events,
            token,
            wait_timeout,
        )));
        self.state = PumpState::Running;
    }

    /// Request a stop and wait for the task to finish. Must complete
    /// before the connection is torn down.
    ///
    /// Returns `Err` when the loop had already terminated on a transport
    /// failure, so the caller can tell a lost link from its own stop.
    pub async fn stop(&mut self) -> Result<(), PumpError> {
        let Some(task) = self.task.take() else {
            self.state = PumpState::Stopped;
            return Ok(());
        };
        self.state = PumpState::Stopping;
        self.token.cancel();
        let result = task.await?;
        self.state = PumpState::Stopped;
        result
    }
}

async fn run_loop(
    mut stream: NotificationStream,
    sensors: Arc<SensorState>,
    events: mpsc::UnboundedSender<MonitorEvent>,
    token: CancellationToken,
    wait_timeout: Duration,
) -> Result<(), PumpError> {
    info!("notification pump running");
    let result = loop {
        if token.is_cancelled() {
            break Ok(());
        }
        match tokio::time::timeout(wait_timeout, stream.next()).await {
            // Nothing arrived within the wait bound; not an error.
            Err(_) => continue,
            Ok(Some(notification)) => {
                if sensors.on_notification(notification.uuid, &notification.value) {
                    let _ = events.send(MonitorEvent::ReadingsChanged);
                }
            }
            // The transport closed the stream underneath us.
            Ok(None) => break Err(PumpError::TransportLost),
        }
    };

    match &result {
        Ok(()) => {
            info!("notification pump stopped");
            let _ = events.send(MonitorEvent::PumpTerminated(PumpExit::Requested));
        }
        Err(err) => {
            error!(%err, "notification pump terminated");
            let _ = events.send(MonitorEvent::ConnectionStatus(ConnectionStatus::Lost));
            let _ = events.send(MonitorEvent::PumpTerminated(PumpExit::TransportLost));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::readings::ResolvedTable;
    use crate::domain::sensors::{Codec, SensorSlot};
    use btleplug::api::ValueNotification;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_millis(50);

    fn state_with_heart_rate(handle: Uuid) -> Arc<SensorState> {
        let mut table = ResolvedTable::new();
        table
            .insert(SensorSlot::HeartRate, handle, Codec::unsigned_be(2))
            .unwrap();
        Arc::new(SensorState::new(table, Vec::new()))
    }

    #[tokio::test]
    async fn pump_decodes_notifications_and_stops_cleanly() {
        let handle = Uuid::from_u128(1);
        let sensors = state_with_heart_rate(handle);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (notif_tx, notif_rx) = futures::channel::mpsc::unbounded();

        let mut pump = NotificationPump::new(WAIT);
        assert_eq!(pump.state(), PumpState::Idle);
        pump.start(Box::pin(notif_rx), sensors.clone(), events_tx);
        assert_eq!(pump.state(), PumpState::Running);

        notif_tx
            .unbounded_send(ValueNotification {
                uuid: handle,
                value: vec![72],
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let snap = sensors.read_snapshot();
        assert!(snap.changed);
        assert_eq!(snap.get(SensorSlot::HeartRate), Some(72));
        assert_eq!(events_rx.recv().await, Some(MonitorEvent::ReadingsChanged));

        pump.stop().await.unwrap();
        assert_eq!(pump.state(), PumpState::Stopped);
        assert_eq!(
            events_rx.recv().await,
            Some(MonitorEvent::PumpTerminated(PumpExit::Requested))
        );
    }

    #[tokio::test]
    async fn closed_stream_is_a_terminal_transport_loss() {
        let handle = Uuid::from_u128(1);
        let sensors = state_with_heart_rate(handle);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (notif_tx, notif_rx) = futures::channel::mpsc::unbounded::<ValueNotification>();

        let mut pump = NotificationPump::new(WAIT);
        pump.start(Box::pin(notif_rx), sensors, events_tx);
        drop(notif_tx);

        assert_eq!(
            events_rx.recv().await,
            Some(MonitorEvent::ConnectionStatus(ConnectionStatus::Lost))
        );
        assert_eq!(
            events_rx.recv().await,
            Some(MonitorEvent::PumpTerminated(PumpExit::TransportLost))
        );
        assert!(matches!(pump.stop().await, Err(PumpError::TransportLost)));
        assert_eq!(pump.state(), PumpState::Stopped);
    }

    #[tokio::test]
    async fn notification_on_unresolved_handle_changes_nothing() {
        let handle = Uuid::from_u128(1);
        let sensors = state_with_heart_rate(handle);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (notif_tx, notif_rx) = futures::channel::mpsc::unbounded();

        let mut pump = NotificationPump::new(WAIT);
        pump.start(Box::pin(notif_rx), sensors.clone(), events_tx);
        notif_tx
            .unbounded_send(ValueNotification {
                uuid: Uuid::from_u128(99),
                value: vec![1, 2],
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let snap = sensors.read_snapshot();
        assert!(!snap.changed);
        assert!(snap.values.is_empty());

        pump.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_while_running_is_ignored() {
        let handle = Uuid::from_u128(1);
        let sensors = state_with_heart_rate(handle);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let mut pump = NotificationPump::new(WAIT);
        pump.start(
            Box::pin(futures::stream::pending()),
            sensors.clone(),
            events_tx.clone(),
        );
        assert_eq!(pump.state(), PumpState::Running);

        // The second stream must not replace the first; it is dropped
        // on the spot rather than leaving the first task orphaned.
        let (second_tx, second_rx) = futures::channel::mpsc::unbounded::<ValueNotification>();
        pump.start(Box::pin(second_rx), sensors, events_tx);
        assert_eq!(pump.state(), PumpState::Running);
        assert!(second_tx.is_closed());

        pump.stop().await.unwrap();
        assert_eq!(pump.state(), PumpState::Stopped);
    }

    #[tokio::test]
    async fn quiet_periods_just_loop() {
        let handle = Uuid::from_u128(1);
        let sensors = state_with_heart_rate(handle);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let mut pump = NotificationPump::new(WAIT);
        pump.start(Box::pin(futures::stream::pending()), sensors, events_tx);

        // Let several wait timeouts elapse without data.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(pump.state(), PumpState::Running);
        pump.stop().await.unwrap();
    }
}
