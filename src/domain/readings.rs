//! Decoded-reading state shared between the notification pump and the
//! consumer.
//!
//! [`ResolvedTable`] is built once per connection by the resolver and is
//! immutable afterwards. [`SensorState`] owns the latest decoded value per
//! slot behind a mutex; the pump writes through [`SensorState::on_notification`],
//! the consumer reads through [`SensorState::read_snapshot`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::{trace, warn};
use uuid::Uuid;

use crate::domain::sensors::{Codec, SensorSlot};
use crate::error::ConfigError;

/// One resolved characteristic: which slot it feeds and how to decode it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedEntry {
    pub slot: SensorSlot,
    pub handle: Uuid,
    pub codec: Codec,
}

/// Mapping from sensor slot to its resolved characteristic handle.
///
/// A slot that never resolved is simply absent: downstream code treats it
/// as unavailable, never as a zero reading. The handle is the
/// characteristic UUID, the session-scoped identity the transport reports
/// notifications under.
#[derive(Debug, Default)]
pub struct ResolvedTable {
    entries: Vec<ResolvedEntry>,
}

impl ResolvedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handle to a slot. Two slots sharing one handle is a
    /// configuration error, not something to merge silently.
    pub fn insert(
        &mut self,
        slot: SensorSlot,
        handle: Uuid,
        codec: Codec,
    ) -> Result<(), ConfigError> {
        if let Some(existing) = self.entries.iter().find(|e| e.handle == handle) {
            return Err(ConfigError::HandleCollision {
                handle,
                existing: existing.slot,
                duplicate: slot,
            });
        }
        self.entries.push(ResolvedEntry {
            slot,
            handle,
            codec,
        });
        Ok(())
    }

    pub fn entry_for(&self, handle: Uuid) -> Option<&ResolvedEntry> {
        self.entries.iter().find(|e| e.handle == handle)
    }

    pub fn is_resolved(&self, slot: SensorSlot) -> bool {
        self.entries.iter().any(|e| e.slot == slot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Point-in-time copy of the decoded readings.
///
/// `changed` reports whether any slot changed since the previous
/// `read_snapshot` call; unavailable slots are absent from `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSnapshot {
    pub values: BTreeMap<SensorSlot, i64>,
    pub changed: bool,
}

impl SensorSnapshot {
    pub fn get(&self, slot: SensorSlot) -> Option<i64> {
        self.values.get(&slot).copied()
    }
}

struct Inner {
    values: BTreeMap<SensorSlot, i64>,
    dirty: bool,
}

/// Latest decoded value per slot plus a change flag.
///
/// Created after resolution completes, so the handle table it carries is
/// never mutated concurrently with decoding.
pub struct SensorState {
    table: ResolvedTable,
    inner: Mutex<Inner>,
}

impl SensorState {
    /// Build the state from a completed resolution. `initial` carries the
    /// read-once values (body location); seeding any makes the state dirty
    /// so the first consumer poll reports them.
    pub fn new(table: ResolvedTable, initial: Vec<(SensorSlot, i64)>) -> Self {
        let dirty = !initial.is_empty();
        let values = initial.into_iter().collect();
        SensorState {
            table,
            inner: Mutex::new(Inner { values, dirty }),
        }
    }

    /// Feed one raw notification. Returns whether any stored value changed.
    ///
    /// Notifications on handles no slot resolved to are ignored; malformed
    /// payloads are logged and the prior value is retained.
    pub fn on_notification(&self, handle: Uuid, raw: &[u8]) -> bool {
        let Some(entry) = self.table.entry_for(handle) else {
            trace!(%handle, "notification on unresolved handle, ignoring");
            return false;
        };

        let value = match entry.codec.decode(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(slot = %entry.slot, %handle, %err, "dropping malformed payload");
                return false;
            }
        };

        let mut inner = self.inner.lock().expect("sensor state lock poisoned");
        if inner.values.get(&entry.slot) == Some(&value) {
            // Same reading as before: decoded, but no change to report.
            return false;
        }
        trace!(slot = %entry.slot, value, "reading updated");
        inner.values.insert(entry.slot, value);
        inner.dirty = true;
        true
    }

    /// Copy out all current readings and atomically clear the dirty flag.
    pub fn read_snapshot(&self) -> SensorSnapshot {
        let mut inner = self.inner.lock().expect("sensor state lock poisoned");
        let snapshot = SensorSnapshot {
            values: inner.values.clone(),
            changed: inner.dirty,
        };
        inner.dirty = false;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sensors::Codec;

    fn handle(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn state_with(entries: &[(SensorSlot, Uuid, Codec)]) -> SensorState {
        let mut table = ResolvedTable::new();
        for (slot, h, codec) in entries {
            table.insert(*slot, *h, *codec).unwrap();
        }
        SensorState::new(table, Vec::new())
    }

    #[test]
    fn notification_updates_matching_slot() {
        let hr = handle(1);
        let state = state_with(&[(SensorSlot::HeartRate, hr, Codec::unsigned_be(2))]);

        assert!(state.on_notification(hr, &[72]));
        let snap = state.read_snapshot();
        assert!(snap.changed);
        assert_eq!(snap.get(SensorSlot::HeartRate), Some(72));
    }

    #[test]
    fn snapshot_read_is_idempotent_without_new_data() {
        let hr = handle(1);
        let state = state_with(&[(SensorSlot::HeartRate, hr, Codec::unsigned_be(2))]);
        state.on_notification(hr, &[72]);

        let first = state.read_snapshot();
        let second = state.read_snapshot();
        assert_eq!(first.values, second.values);
        assert!(first.changed);
        assert!(!second.changed);
    }

    #[test]
    fn repeated_value_is_suppressed() {
        let hr = handle(1);
        let state = state_with(&[(SensorSlot::HeartRate, hr, Codec::unsigned_be(2))]);

        assert!(state.on_notification(hr, &[72]));
        assert!(!state.on_notification(hr, &[72]));
        assert!(state.read_snapshot().changed);
        assert!(!state.read_snapshot().changed);
    }

    #[test]
    fn unresolved_handle_leaves_state_untouched() {
        let hr = handle(1);
        let state = state_with(&[(SensorSlot::HeartRate, hr, Codec::unsigned_be(2))]);

        assert!(!state.on_notification(handle(99), &[1, 2]));
        let snap = state.read_snapshot();
        assert!(!snap.changed);
        assert!(snap.values.is_empty());
    }

    #[test]
    fn unavailable_slot_stays_absent() {
        let hr = handle(1);
        let state = state_with(&[(SensorSlot::HeartRate, hr, Codec::unsigned_be(2))]);
        state.on_notification(hr, &[60]);
        state.on_notification(hr, &[61]);

        for _ in 0..3 {
            let snap = state.read_snapshot();
            assert_eq!(snap.get(SensorSlot::ButtonState), None);
            assert_eq!(snap.get(SensorSlot::MagX), None);
        }
    }

    #[test]
    fn malformed_payload_retains_prior_value() {
        let mag = handle(3);
        let state = state_with(&[(SensorSlot::MagX, mag, Codec::signed_le(2))]);
        state.on_notification(mag, &[0xFF, 0xFF]);
        let _ = state.read_snapshot();

        assert!(!state.on_notification(mag, &[0, 1, 2, 3]));
        let snap = state.read_snapshot();
        assert!(!snap.changed);
        assert_eq!(snap.get(SensorSlot::MagX), Some(-1));
    }

    #[test]
    fn signed_little_endian_axis_decodes_negative() {
        let mag = handle(3);
        let state = state_with(&[(SensorSlot::MagX, mag, Codec::signed_le(2))]);
        state.on_notification(mag, &[0xFF, 0xFF]);
        assert_eq!(state.read_snapshot().get(SensorSlot::MagX), Some(-1));
    }

    #[test]
    fn handle_collision_is_rejected() {
        let mut table = ResolvedTable::new();
        let shared = handle(7);
        table
            .insert(SensorSlot::HeartRate, shared, Codec::unsigned_be(2))
            .unwrap();
        let err = table
            .insert(SensorSlot::ButtonState, shared, Codec::unsigned_be(2))
            .unwrap_err();
        assert!(matches!(err, ConfigError::HandleCollision { .. }));
    }

    #[test]
    fn read_once_seed_is_dirty_on_first_read() {
        let table = ResolvedTable::new();
        let state = SensorState::new(table, vec![(SensorSlot::BodyLocation, 2)]);

        let snap = state.read_snapshot();
        assert!(snap.changed);
        assert_eq!(snap.get(SensorSlot::BodyLocation), Some(2));
        assert!(!state.read_snapshot().changed);
    }
}
