//! Bluetooth Module
//!
//! BLE central-role plumbing for the sensor peripheral.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     MonitorService                       │
//! │   (session coordinator - public API for the consumer)    │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │  Scanner  │  │  Resolver  │  │   Pump   │
//! │           │  │            │  │          │
//! │ - window  │  │ - GATT     │  │ - wait   │
//! │   scan    │  │   walk     │  │   loop   │
//! │ - name    │  │ - CCCD     │  │ - decode │
//! │   match   │  │   writes   │  │   feed   │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - the capability trait over the BLE stack
//! - [`scanner`] - advertisement scan and target selection
//! - [`resolver`] - characteristic resolution and subscription
//! - [`pump`] - background notification loop
//! - [`service`] - session coordinator

pub mod pump;
pub mod resolver;
pub mod scanner;
pub mod service;
pub mod transport;

// Re-export main service for convenience
pub use service::MonitorService;
