//! Persistent settings.
//!
//! The whole sensor table — target name, service/characteristic UUIDs,
//! decode rules — is configuration rather than hardcoded constants, so a
//! firmware revision that moves a characteristic only needs a settings
//! edit. Defaults match the IOT32 peripheral.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::sensors::{
    CharacteristicSpec, Codec, Delivery, SensorSlot, BODY_SENSOR_LOCATION_UUID,
    BUTTON_SERVICE_UUID, BUTTON_STATE_UUID, HEART_RATE_MEASUREMENT_UUID, HEART_RATE_SERVICE_UUID,
    MAGNETO_SERVICE_UUID, MAGNETO_X_UUID, MAGNETO_Y_UUID, MAGNETO_Z_UUID,
};
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_target: default_true(),
            show_thread_ids: default_false(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "iot32_monitor".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// One row of the sensor table as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSpecConfig {
    pub slot: SensorSlot,
    pub service_uuid: String,
    pub characteristic_uuid: String,
    pub codec: Codec,
    pub delivery: Delivery,
}

impl SensorSpecConfig {
    fn parse(&self) -> Result<CharacteristicSpec, ConfigError> {
        let service = parse_uuid("service_uuid", &self.service_uuid)?;
        let characteristic = parse_uuid("characteristic_uuid", &self.characteristic_uuid)?;
        Ok(CharacteristicSpec {
            slot: self.slot,
            service,
            characteristic,
            codec: self.codec,
            delivery: self.delivery,
        })
    }
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, ConfigError> {
    Uuid::parse_str(value).map_err(|source| ConfigError::InvalidUuid {
        field,
        value: value.to_string(),
        source,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_target_name")]
    pub target_device_name: String,
    /// Advertisement scan window, seconds. The whole window is always
    /// observed so late advertisers still get considered.
    #[serde(default = "default_scan_seconds")]
    pub scan_seconds: u64,
    /// Upper bound on one pump wait; also the stop-latency bound.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Consumer poll cadence.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_sensor_table")]
    pub sensors: Vec<SensorSpecConfig>,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_device_name: default_target_name(),
            scan_seconds: default_scan_seconds(),
            wait_timeout_ms: default_wait_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            sensors: default_sensor_table(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_target_name() -> String {
    "IOT32".to_string()
}
fn default_scan_seconds() -> u64 {
    10
}
fn default_wait_timeout_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    100
}

fn default_sensor_table() -> Vec<SensorSpecConfig> {
    vec![
        SensorSpecConfig {
            slot: SensorSlot::HeartRate,
            service_uuid: HEART_RATE_SERVICE_UUID.to_string(),
            characteristic_uuid: HEART_RATE_MEASUREMENT_UUID.to_string(),
            codec: Codec::unsigned_be(4),
            delivery: Delivery::Notify,
        },
        SensorSpecConfig {
            slot: SensorSlot::BodyLocation,
            service_uuid: HEART_RATE_SERVICE_UUID.to_string(),
            characteristic_uuid: BODY_SENSOR_LOCATION_UUID.to_string(),
            codec: Codec::unsigned_be(1),
            delivery: Delivery::ReadOnce,
        },
        SensorSpecConfig {
            slot: SensorSlot::ButtonState,
            service_uuid: BUTTON_SERVICE_UUID.to_string(),
            characteristic_uuid: BUTTON_STATE_UUID.to_string(),
            codec: Codec::unsigned_be(2),
            delivery: Delivery::Notify,
        },
        SensorSpecConfig {
            slot: SensorSlot::MagX,
            service_uuid: MAGNETO_SERVICE_UUID.to_string(),
            characteristic_uuid: MAGNETO_X_UUID.to_string(),
            codec: Codec::signed_le(2),
            delivery: Delivery::Notify,
        },
        SensorSpecConfig {
            slot: SensorSlot::MagY,
            service_uuid: MAGNETO_SERVICE_UUID.to_string(),
            characteristic_uuid: MAGNETO_Y_UUID.to_string(),
            codec: Codec::signed_le(2),
            delivery: Delivery::Notify,
        },
        SensorSpecConfig {
            slot: SensorSlot::MagZ,
            service_uuid: MAGNETO_SERVICE_UUID.to_string(),
            characteristic_uuid: MAGNETO_Z_UUID.to_string(),
            codec: Codec::signed_le(2),
            delivery: Delivery::Notify,
        },
    ]
}

impl Settings {
    /// Parse the stored sensor table into resolved specs.
    pub fn specs(&self) -> Result<Vec<CharacteristicSpec>, ConfigError> {
        self.sensors.iter().map(SensorSpecConfig::parse).collect()
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        Self::at_path(Self::get_settings_path()?)
    }

    /// Load settings from `settings_path`, falling back to defaults. On a
    /// first run the defaults are written out so the UUID table is
    /// editable on disk.
    pub(crate) fn at_path(settings_path: PathBuf) -> anyhow::Result<Self> {
        let loaded = Self::load_from_file(&settings_path).ok();
        let first_run = loaded.is_none();
        let service = Self {
            settings: loaded.unwrap_or_default(),
            settings_path,
        };
        if first_run {
            service.save()?;
        }
        Ok(service)
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("iot32-monitor");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_every_slot() {
        let specs = Settings::default().specs().unwrap();
        assert_eq!(specs.len(), 6);
        for slot in SensorSlot::ALL {
            assert!(specs.iter().any(|s| s.slot == slot), "missing {slot}");
        }
    }

    #[test]
    fn default_table_has_unique_characteristics() {
        let specs = Settings::default().specs().unwrap();
        for (i, a) in specs.iter().enumerate() {
            for b in &specs[i + 1..] {
                assert_ne!(a.characteristic, b.characteristic);
            }
        }
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings = Settings::default();
        let json = serde_json::to_string_pretty(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target_device_name, "IOT32");
        assert_eq!(back.specs().unwrap(), settings.specs().unwrap());
    }

    #[test]
    fn empty_json_yields_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.scan_seconds, 10);
        assert_eq!(settings.poll_interval_ms, 100);
        assert_eq!(settings.sensors.len(), 6);
    }

    #[test]
    fn first_run_persists_defaults_and_reload_honors_edits() {
        let path = std::env::temp_dir().join(format!(
            "iot32-monitor-settings-test-{}.json",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);

        let service = SettingsService::at_path(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(service.get().target_device_name, "IOT32");

        let mut edited = service.get().clone();
        edited.scan_seconds = 3;
        fs::write(&path, serde_json::to_string_pretty(&edited).unwrap()).unwrap();

        let reloaded = SettingsService::at_path(path.clone()).unwrap();
        assert_eq!(reloaded.get().scan_seconds, 3);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn bad_uuid_is_a_config_error() {
        let mut settings = Settings::default();
        settings.sensors[0].service_uuid = "not-a-uuid".to_string();
        let err = settings.specs().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUuid { .. }));
    }
}
