//! BLE central client for the IOT32 sensor peripheral.
//!
//! Scans for the device by advertised name, connects, resolves the
//! configured services and characteristics, subscribes to heart-rate,
//! button, and magnetometer notifications, and keeps a lock-guarded
//! snapshot of the latest decoded readings for a consumer to poll.
//!
//! The binary in `main.rs` is the reference consumer (console output at a
//! fixed cadence); the library carries everything with protocol or state
//! logic so it can be tested without a radio.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::readings::{SensorSnapshot, SensorState};
pub use domain::sensors::SensorSlot;
pub use infrastructure::bluetooth::MonitorService;
