//! Transport capability boundary.
//!
//! The resolver and pump only need a handful of GATT operations, captured
//! by [`GattPeripheral`]. The production implementation delegates to
//! `btleplug`; tests substitute a mock so resolution and decoding can run
//! without a radio.

use std::pin::Pin;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Service, ValueNotification};
use btleplug::platform::Peripheral;
use futures::Stream;

/// Stream of raw characteristic notifications, as handed out by the stack.
pub type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// The GATT operations the core needs from a connected peripheral.
#[async_trait]
pub trait GattPeripheral: Send + Sync {
    async fn discover_services(&self) -> Result<(), btleplug::Error>;

    /// Services discovered so far, with their characteristics.
    fn services(&self) -> Vec<Service>;

    /// Enable notifications on a characteristic (CCCD write).
    async fn subscribe(&self, characteristic: &Characteristic) -> Result<(), btleplug::Error>;

    /// One-shot characteristic read.
    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, btleplug::Error>;

    async fn notifications(&self) -> Result<NotificationStream, btleplug::Error>;

    async fn disconnect(&self) -> Result<(), btleplug::Error>;
}

#[async_trait]
impl GattPeripheral for Peripheral {
    async fn discover_services(&self) -> Result<(), btleplug::Error> {
        btleplug::api::Peripheral::discover_services(self).await
    }

    fn services(&self) -> Vec<Service> {
        btleplug::api::Peripheral::services(self)
            .into_iter()
            .collect()
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> Result<(), btleplug::Error> {
        btleplug::api::Peripheral::subscribe(self, characteristic).await
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, btleplug::Error> {
        btleplug::api::Peripheral::read(self, characteristic).await
    }

    async fn notifications(&self) -> Result<NotificationStream, btleplug::Error> {
        btleplug::api::Peripheral::notifications(self).await
    }

    async fn disconnect(&self) -> Result<(), btleplug::Error> {
        btleplug::api::Peripheral::disconnect(self).await
    }
}
