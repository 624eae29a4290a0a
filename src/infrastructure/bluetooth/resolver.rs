//! Service/Characteristic Resolver
//!
//! Walks the configured services on a connected peripheral, matches
//! characteristics against the sensor table, enables notifications on
//! notifying slots, and performs the one-shot reads. A transport error on
//! one characteristic never aborts the rest; the result is a partial
//! table and the unresolved slots stay unavailable.

use btleplug::api::{CharPropFlags, Characteristic};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::readings::ResolvedTable;
use crate::domain::sensors::{body_location_name, CharacteristicSpec, Delivery, SensorSlot};
use crate::error::ResolveError;
use crate::infrastructure::bluetooth::transport::GattPeripheral;

/// Outcome of resolution: the handle table for the pump/decoder plus any
/// values obtained by one-shot reads.
#[derive(Debug, Default)]
pub struct Resolution {
    pub table: ResolvedTable,
    pub initial: Vec<(SensorSlot, i64)>,
}

pub struct Resolver {
    specs: Vec<CharacteristicSpec>,
}

impl Resolver {
    pub fn new(specs: Vec<CharacteristicSpec>) -> Self {
        Self { specs }
    }

    /// Resolve every configured slot on `peripheral` and enable its
    /// notifications.
    ///
    /// Only a failed service discovery is fatal (the connection is not
    /// usable); everything past that degrades per characteristic. Safe to
    /// call twice on one connection: the CCCD write is last-write-wins on
    /// the server.
    pub async fn resolve_and_subscribe<P: GattPeripheral>(
        &self,
        peripheral: &P,
    ) -> Result<Resolution, ResolveError> {
        peripheral
            .discover_services()
            .await
            .map_err(ResolveError::Discovery)?;
        let services = peripheral.services();
        debug!(count = services.len(), "services discovered");

        let mut resolution = Resolution::default();
        for service_uuid in self.service_order() {
            let Some(service) = services.iter().find(|s| s.uuid == service_uuid) else {
                warn!(%service_uuid, "service not present; its slots stay unavailable");
                continue;
            };

            for characteristic in &service.characteristics {
                let Some(spec) = self
                    .specs
                    .iter()
                    .find(|s| s.service == service_uuid && s.characteristic == characteristic.uuid)
                else {
                    continue;
                };
                if let Err(err) = self
                    .apply_spec(peripheral, characteristic, spec, &mut resolution)
                    .await
                {
                    warn!(
                        slot = %spec.slot,
                        characteristic = %characteristic.uuid,
                        %err,
                        "characteristic setup failed, continuing with the rest"
                    );
                }
            }
        }

        info!(
            resolved = resolution.table.len(),
            read_once = resolution.initial.len(),
            "resolution complete"
        );
        Ok(resolution)
    }

    /// Configured service UUIDs in first-appearance order, deduplicated.
    fn service_order(&self) -> Vec<Uuid> {
        let mut order: Vec<Uuid> = Vec::new();
        for spec in &self.specs {
            if !order.contains(&spec.service) {
                order.push(spec.service);
            }
        }
        order
    }

    async fn apply_spec<P: GattPeripheral>(
        &self,
        peripheral: &P,
        characteristic: &Characteristic,
        spec: &CharacteristicSpec,
        resolution: &mut Resolution,
    ) -> anyhow::Result<()> {
        match spec.delivery {
            Delivery::Notify => {
                if !characteristic.properties.contains(CharPropFlags::NOTIFY) {
                    warn!(
                        slot = %spec.slot,
                        characteristic = %characteristic.uuid,
                        "configured as notifying but the characteristic does not support notify"
                    );
                }
                peripheral.subscribe(characteristic).await?;
                match resolution
                    .table
                    .insert(spec.slot, characteristic.uuid, spec.codec)
                {
                    Ok(()) => {
                        debug!(slot = %spec.slot, handle = %characteristic.uuid, "subscribed")
                    }
                    // Two slots on one handle is a table mistake; keep the
                    // first binding rather than merging.
                    Err(err) => error!(%err, "sensor table misconfiguration"),
                }
            }
            Delivery::ReadOnce => {
                let raw = peripheral.read(characteristic).await?;
                let value = spec.codec.decode(&raw)?;
                if spec.slot == SensorSlot::BodyLocation {
                    let name = body_location_name(value)?;
                    info!(slot = %spec.slot, value, name, "read-once value");
                } else {
                    info!(slot = %spec.slot, value, "read-once value");
                }
                resolution.initial.push((spec.slot, value));
            }
        }
        Ok(())
    }
}
