//! Error taxonomy for the monitor.
//!
//! Each phase of a session has its own error type so callers can tell a
//! failed scan from a lost link without string matching. `MonitorError` is
//! the umbrella returned by the session coordinator.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::sensors::SensorSlot;

/// Failures while discovering the target device.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no bluetooth adapter available")]
    RadioUnavailable,

    /// The scan window ended without any advertisement matching the target
    /// name. Deliberately not "pick the first device instead".
    #[error("no device advertising the name {0:?} was found")]
    NoMatchingDevice(String),

    #[error("scan failed: {0}")]
    Transport(#[from] btleplug::Error),
}

/// Failures while establishing or tearing down the link.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connecting to {address} failed: {source}")]
    Rejected {
        address: String,
        #[source]
        source: btleplug::Error,
    },

    #[error("could not open the notification stream: {0}")]
    Notifications(#[source] btleplug::Error),
}

/// Failures during service/characteristic resolution.
///
/// Per-characteristic transport errors are not represented here; the
/// resolver logs them and continues with partial results. Only failures
/// that invalidate the whole connection surface as a `ResolveError`.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("service discovery failed: {0}")]
    Discovery(#[source] btleplug::Error),
}

/// Failures decoding a raw payload. Never fatal: the previous value for the
/// slot is retained and the pump keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload of {got} bytes outside the supported 1..={max} byte range")]
    BadLength { got: usize, max: usize },

    #[error("body location index {0} has no table entry")]
    UnknownBodyLocation(i64),
}

/// Terminal failure of the notification pump, distinct from a voluntary
/// `stop()`. The session owner uses this to decide on reconnection.
#[derive(Debug, Error)]
pub enum PumpError {
    #[error("notification stream closed by the transport; link lost")]
    TransportLost,

    #[error("pump task failed to join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Problems with the static sensor table. These are operator mistakes, not
/// runtime races, and are reported before any session state is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid UUID {value:?} for {field}: {source}")]
    InvalidUuid {
        field: &'static str,
        value: String,
        #[source]
        source: uuid::Error,
    },

    #[error("characteristic {handle} is already bound to {existing}, refusing to also bind {duplicate}")]
    HandleCollision {
        handle: Uuid,
        existing: SensorSlot,
        duplicate: SensorSlot,
    },
}

/// Umbrella error for a monitor session.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}
