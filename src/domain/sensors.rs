//! Sensor model for the IOT32 peripheral.
//!
//! The peripheral exposes three services: the standard heart-rate service,
//! a button service, and a magnetometer service. Each monitored value is a
//! [`SensorSlot`]; the static mapping from slot to service/characteristic
//! UUID and decode rule is a [`CharacteristicSpec`].

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DecodeError;

/// Heart Rate service (Bluetooth SIG assigned number 0x180D).
pub const HEART_RATE_SERVICE_UUID: &str = "0000180d-0000-1000-8000-00805f9b34fb";
/// Heart Rate Measurement characteristic (0x2A37), notifying.
pub const HEART_RATE_MEASUREMENT_UUID: &str = "00002a37-0000-1000-8000-00805f9b34fb";
/// Body Sensor Location characteristic (0x2A38), read once at setup.
pub const BODY_SENSOR_LOCATION_UUID: &str = "00002a38-0000-1000-8000-00805f9b34fb";

/// Custom button service (0xA000) and its state characteristic (0xA001).
pub const BUTTON_SERVICE_UUID: &str = "0000a000-0000-1000-8000-00805f9b34fb";
pub const BUTTON_STATE_UUID: &str = "0000a001-0000-1000-8000-00805f9b34fb";

/// Custom magnetometer service (0xA002); one characteristic per axis,
/// little-endian signed 16-bit.
pub const MAGNETO_SERVICE_UUID: &str = "0000a002-0000-1000-8000-00805f9b34fb";
pub const MAGNETO_X_UUID: &str = "0000a003-0000-1000-8000-00805f9b34fb";
pub const MAGNETO_Y_UUID: &str = "0000a004-0000-1000-8000-00805f9b34fb";
pub const MAGNETO_Z_UUID: &str = "0000a005-0000-1000-8000-00805f9b34fb";

/// Identity of one monitored value, independent of which characteristic
/// handle ends up carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorSlot {
    HeartRate,
    ButtonState,
    MagX,
    MagY,
    MagZ,
    BodyLocation,
}

impl SensorSlot {
    pub const ALL: [SensorSlot; 6] = [
        SensorSlot::HeartRate,
        SensorSlot::ButtonState,
        SensorSlot::MagX,
        SensorSlot::MagY,
        SensorSlot::MagZ,
        SensorSlot::BodyLocation,
    ];
}

impl fmt::Display for SensorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorSlot::HeartRate => "heart rate",
            SensorSlot::ButtonState => "button",
            SensorSlot::MagX => "mag x",
            SensorSlot::MagY => "mag y",
            SensorSlot::MagZ => "mag z",
            SensorSlot::BodyLocation => "body location",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signedness {
    Unsigned,
    Signed,
}

/// How a slot gets its values: pushed by the peripheral, or read once
/// during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Notify,
    ReadOnce,
}

/// Decode rule for a slot's raw payload: byte order, signedness, and the
/// maximum payload width in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    pub order: ByteOrder,
    pub sign: Signedness,
    pub width: u8,
}

impl Codec {
    pub const fn unsigned_be(width: u8) -> Self {
        Codec {
            order: ByteOrder::Big,
            sign: Signedness::Unsigned,
            width,
        }
    }

    pub const fn signed_le(width: u8) -> Self {
        Codec {
            order: ByteOrder::Little,
            sign: Signedness::Signed,
            width,
        }
    }

    /// Decode a raw payload into an integer reading.
    ///
    /// Shorter-than-width payloads are accepted (the peripheral sends the
    /// natural width of the value); empty or over-long ones are a
    /// [`DecodeError::BadLength`].
    pub fn decode(&self, data: &[u8]) -> Result<i64, DecodeError> {
        let max = self.width as usize;
        if data.is_empty() || data.len() > max {
            return Err(DecodeError::BadLength {
                got: data.len(),
                max,
            });
        }

        // Accumulate least-significant byte first.
        let mut value: i64 = 0;
        let le_bytes: Box<dyn Iterator<Item = &u8>> = match self.order {
            ByteOrder::Little => Box::new(data.iter()),
            ByteOrder::Big => Box::new(data.iter().rev()),
        };
        for (i, byte) in le_bytes.enumerate() {
            value |= (*byte as i64) << (8 * i);
        }

        if self.sign == Signedness::Signed {
            let bits = 8 * data.len() as u32;
            if bits < 64 {
                let shift = 64 - bits;
                value = (value << shift) >> shift;
            }
        }

        Ok(value)
    }
}

/// Static descriptor tying a slot to its service, characteristic, and
/// decode rule. The full table is supplied by configuration, grouped by
/// service during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicSpec {
    pub slot: SensorSlot,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub codec: Codec,
    pub delivery: Delivery,
}

/// Body Sensor Location lookup table (Bluetooth SIG, 0x2A38).
pub const BODY_LOCATIONS: [&str; 7] = [
    "OTHER", "CHEST", "WRIST", "FINGER", "HAND", "EAR_LOBE", "FOOT",
];

/// Map a decoded body-location index to its name. An index outside the
/// table is a decode error, not a panic.
pub fn body_location_name(index: i64) -> Result<&'static str, DecodeError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| BODY_LOCATIONS.get(i).copied())
        .ok_or(DecodeError::UnknownBodyLocation(index))
}
