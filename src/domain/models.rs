//! Shared event and status types.
//!
//! Components report what happened over an unbounded channel of
//! [`MonitorEvent`]s; the channel is observability plus the reconnect hook,
//! never a data path — decoded readings travel through the sensor state.

/// A device seen during the scan window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    /// The link dropped out from under us (as opposed to a requested
    /// disconnect).
    Lost,
}

/// Why the notification pump exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// `stop()` was called; normal teardown.
    Requested,
    /// The transport ended the notification stream; the owner may decide
    /// to reconnect.
    TransportLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    ScanStarted,
    /// First advertisement from a device during the scan window.
    DeviceSeen(ScannedDevice),
    /// Fresh advertisement data from an already-seen device.
    DeviceUpdated { address: String },
    ConnectionStatus(ConnectionStatus),
    /// At least one slot changed; push-side hint for consumers that would
    /// rather not poll.
    ReadingsChanged,
    PumpTerminated(PumpExit),
}
