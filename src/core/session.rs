//! Calibration editing session - the record lifecycle state machine
//!
//! A session owns a private in-memory copy of one calibration record.
//! Mutations are pure record-in/record-out transformations; nothing is
//! shared until `save` upserts through the [`Store`].

use chrono::NaiveDate;

use crate::core::store::{Store, StoreError};
use crate::entities::calibration::{CalibrationError, CalibrationRecord};
use crate::entities::equipment::{one_year_after, Equipment};

/// Where the session stands. A failed save never leaves `Editing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Freshly seeded, nothing touched yet
    New,
    /// At least one mutation applied (or resumed from storage)
    Editing,
    /// Last mutation persisted
    Saved,
}

/// Editing session over one calibration record
pub struct CalibrationSession {
    state: SessionState,
    record: CalibrationRecord,
}

/// Group name used when the equipment configures none
pub const DEFAULT_GROUP_NAME: &str = "Teste Padrão";

impl CalibrationSession {
    /// Start a new record for the given equipment. Groups are seeded from
    /// the equipment's configured test-group names, or one default group.
    pub fn start(equipment: &Equipment, technician: &str, date: NaiveDate) -> Self {
        let mut record = CalibrationRecord::new(equipment.id.as_str(), technician, date);

        match equipment.default_test_groups.as_deref() {
            Some(names) if !names.is_empty() => {
                for name in names {
                    record = record.add_group_named(name.as_str());
                }
            }
            _ => record = record.add_group_named(DEFAULT_GROUP_NAME),
        }

        Self {
            state: SessionState::New,
            record,
        }
    }

    /// Re-open a stored record. Pre-group records gain their synthetic
    /// group here, so older files stay viewable and editable.
    pub fn resume(record: CalibrationRecord) -> Self {
        Self {
            state: SessionState::Editing,
            record: record.migrated(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn record(&self) -> &CalibrationRecord {
        &self.record
    }

    /// Apply a pure transformation to the held record. On `Err` the
    /// session is untouched.
    pub fn apply<F>(&mut self, mutate: F) -> Result<(), CalibrationError>
    where
        F: FnOnce(&CalibrationRecord) -> Result<CalibrationRecord, CalibrationError>,
    {
        self.record = mutate(&self.record)?;
        self.state = SessionState::Editing;
        Ok(())
    }

    /// Persist the record (upsert, idempotent on id) and roll the owning
    /// equipment's calibration dates forward. Any failure surfaces to the
    /// caller and leaves the session in `Editing`.
    pub fn save(&mut self, store: &dyn Store) -> Result<(), StoreError> {
        let result = self.save_inner(store);
        match &result {
            Ok(()) => self.state = SessionState::Saved,
            Err(_) => self.state = SessionState::Editing,
        }
        result
    }

    fn save_inner(&mut self, store: &dyn Store) -> Result<(), StoreError> {
        let to_save = self.record.clone().with_regenerated_flat_list();
        store.upsert_calibration(&to_save)?;

        let mut equipment = store.get_equipment(&to_save.equipment_id)?.ok_or_else(|| {
            StoreError::NotFound {
                collection: "equipment",
                id: to_save.equipment_id.clone(),
            }
        })?;
        equipment.last_calibration_date = Some(to_save.date);
        equipment.next_calibration_date = one_year_after(to_save.date);
        store.upsert_equipment(&equipment)?;

        self.record = to_save;
        Ok(())
    }
}
