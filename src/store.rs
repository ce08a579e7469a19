//! Storage seam between the workflow and SQLite.
//!
//! The escalation engine, planner and stock ledger talk to these traits.
//! `SqliteStore` implements them over one shared connection; the mutex
//! serializes the guarded status updates that resolve confirmation races.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError, StockLevel};
use crate::models::enums::{ConfirmationSource, VoiceCallStatus};
use crate::models::{
    Caregiver, Medicine, Occurrence, OccurrenceKey, Patient, ReminderDefinition,
};

/// Occurrence lifecycle: the audit rows and their guarded transitions.
pub trait OccurrenceStore: Send + Sync {
    fn create_occurrence(&self, occ: &Occurrence) -> Result<(), DatabaseError>;
    fn occurrence(&self, id: &Uuid) -> Result<Option<Occurrence>, DatabaseError>;
    fn latest_for_slot(&self, key: &OccurrenceKey) -> Result<Option<Occurrence>, DatabaseError>;
    fn slot_already_handled(&self, key: &OccurrenceKey) -> Result<bool, DatabaseError>;
    fn latest_for_reminder(
        &self,
        reminder_id: &Uuid,
        patient_id: &Uuid,
    ) -> Result<Option<Occurrence>, DatabaseError>;
    fn latest_open_for_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Option<Occurrence>, DatabaseError>;
    fn occurrences_for_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<Occurrence>, DatabaseError>;
    fn occurrences_for_patient_since(
        &self,
        patient_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, DatabaseError>;
    fn mark_sent(&self, id: &Uuid, sent_at: Option<DateTime<Utc>>)
        -> Result<bool, DatabaseError>;
    fn mark_confirmed(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
        source: &ConfirmationSource,
    ) -> Result<bool, DatabaseError>;
    fn mark_voice_escalated(
        &self,
        id: &Uuid,
        call_id: Option<&str>,
        call_status: &VoiceCallStatus,
    ) -> Result<bool, DatabaseError>;
    fn mark_caregiver_escalated(&self, id: &Uuid, at: DateTime<Utc>)
        -> Result<bool, DatabaseError>;
    fn mark_skipped(&self, id: &Uuid, reason: Option<&str>) -> Result<bool, DatabaseError>;
}

/// People, medicines and reminder definitions.
pub trait RegistryStore: Send + Sync {
    fn add_patient(&self, patient: &Patient) -> Result<(), DatabaseError>;
    fn patient(&self, id: &Uuid) -> Result<Option<Patient>, DatabaseError>;
    fn add_medicine(&self, medicine: &Medicine) -> Result<(), DatabaseError>;
    fn medicine(&self, id: &Uuid) -> Result<Option<Medicine>, DatabaseError>;
    fn medicines_for_patient(&self, patient_id: &Uuid) -> Result<Vec<Medicine>, DatabaseError>;
    fn add_caregiver(&self, caregiver: &Caregiver) -> Result<(), DatabaseError>;
    fn caregivers_for_patient(&self, patient_id: &Uuid) -> Result<Vec<Caregiver>, DatabaseError>;
    fn caregivers_to_notify(&self, patient_id: &Uuid) -> Result<Vec<Caregiver>, DatabaseError>;
    fn add_reminder(&self, def: &ReminderDefinition) -> Result<(), DatabaseError>;
    fn reminder(&self, id: &Uuid) -> Result<Option<ReminderDefinition>, DatabaseError>;
    fn active_reminders(&self) -> Result<Vec<ReminderDefinition>, DatabaseError>;
    fn reminders_for_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<ReminderDefinition>, DatabaseError>;
    fn set_reminder_active(&self, id: &Uuid, active: bool) -> Result<bool, DatabaseError>;
    fn stamp_last_fired(&self, id: &Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError>;
}

/// Shelf counts for the confirmation-driven stock ledger.
pub trait StockStore: Send + Sync {
    fn decrement_stock(&self, medicine_id: &Uuid) -> Result<Option<StockLevel>, DatabaseError>;
    fn mark_low_stock_notified(
        &self,
        medicine_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
    fn restock(&self, medicine_id: &Uuid, quantity: i64) -> Result<bool, DatabaseError>;
}

/// Everything the workflow needs from storage, behind one object.
pub trait WorkflowStore: OccurrenceStore + RegistryStore + StockStore {}

impl<T: OccurrenceStore + RegistryStore + StockStore> WorkflowStore for T {}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(db::open_database(path)?),
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Mutex::new(db::open_memory_database()?),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // a poisoned guard still holds a valid connection
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OccurrenceStore for SqliteStore {
    fn create_occurrence(&self, occ: &Occurrence) -> Result<(), DatabaseError> {
        db::insert_occurrence(&self.conn(), occ)
    }

    fn occurrence(&self, id: &Uuid) -> Result<Option<Occurrence>, DatabaseError> {
        db::get_occurrence(&self.conn(), id)
    }

    fn latest_for_slot(&self, key: &OccurrenceKey) -> Result<Option<Occurrence>, DatabaseError> {
        db::latest_for_slot(&self.conn(), key)
    }

    fn slot_already_handled(&self, key: &OccurrenceKey) -> Result<bool, DatabaseError> {
        db::slot_already_handled(&self.conn(), key)
    }

    fn latest_for_reminder(
        &self,
        reminder_id: &Uuid,
        patient_id: &Uuid,
    ) -> Result<Option<Occurrence>, DatabaseError> {
        db::latest_for_reminder(&self.conn(), reminder_id, patient_id)
    }

    fn latest_open_for_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Option<Occurrence>, DatabaseError> {
        db::latest_open_for_patient(&self.conn(), patient_id)
    }

    fn occurrences_for_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<Occurrence>, DatabaseError> {
        db::list_occurrences_for_patient(&self.conn(), patient_id)
    }

    fn occurrences_for_patient_since(
        &self,
        patient_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, DatabaseError> {
        db::list_occurrences_for_patient_since(&self.conn(), patient_id, since)
    }

    fn mark_sent(
        &self,
        id: &Uuid,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        db::mark_sent(&self.conn(), id, sent_at)
    }

    fn mark_confirmed(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
        source: &ConfirmationSource,
    ) -> Result<bool, DatabaseError> {
        db::mark_confirmed(&self.conn(), id, at, source)
    }

    fn mark_voice_escalated(
        &self,
        id: &Uuid,
        call_id: Option<&str>,
        call_status: &VoiceCallStatus,
    ) -> Result<bool, DatabaseError> {
        db::mark_voice_escalated(&self.conn(), id, call_id, call_status)
    }

    fn mark_caregiver_escalated(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        db::mark_caregiver_escalated(&self.conn(), id, at)
    }

    fn mark_skipped(&self, id: &Uuid, reason: Option<&str>) -> Result<bool, DatabaseError> {
        db::mark_skipped(&self.conn(), id, reason)
    }
}

impl RegistryStore for SqliteStore {
    fn add_patient(&self, patient: &Patient) -> Result<(), DatabaseError> {
        db::insert_patient(&self.conn(), patient)
    }

    fn patient(&self, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
        db::get_patient(&self.conn(), id)
    }

    fn add_medicine(&self, medicine: &Medicine) -> Result<(), DatabaseError> {
        db::insert_medicine(&self.conn(), medicine)
    }

    fn medicine(&self, id: &Uuid) -> Result<Option<Medicine>, DatabaseError> {
        db::get_medicine(&self.conn(), id)
    }

    fn medicines_for_patient(&self, patient_id: &Uuid) -> Result<Vec<Medicine>, DatabaseError> {
        db::list_medicines_for_patient(&self.conn(), patient_id)
    }

    fn add_caregiver(&self, caregiver: &Caregiver) -> Result<(), DatabaseError> {
        db::insert_caregiver(&self.conn(), caregiver)
    }

    fn caregivers_for_patient(&self, patient_id: &Uuid) -> Result<Vec<Caregiver>, DatabaseError> {
        db::list_caregivers(&self.conn(), patient_id)
    }

    fn caregivers_to_notify(&self, patient_id: &Uuid) -> Result<Vec<Caregiver>, DatabaseError> {
        db::caregivers_to_notify(&self.conn(), patient_id)
    }

    fn add_reminder(&self, def: &ReminderDefinition) -> Result<(), DatabaseError> {
        db::insert_reminder(&self.conn(), def)
    }

    fn reminder(&self, id: &Uuid) -> Result<Option<ReminderDefinition>, DatabaseError> {
        db::get_reminder(&self.conn(), id)
    }

    fn active_reminders(&self) -> Result<Vec<ReminderDefinition>, DatabaseError> {
        db::list_active_reminders(&self.conn())
    }

    fn reminders_for_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<ReminderDefinition>, DatabaseError> {
        db::list_reminders_for_patient(&self.conn(), patient_id)
    }

    fn set_reminder_active(&self, id: &Uuid, active: bool) -> Result<bool, DatabaseError> {
        db::set_reminder_active(&self.conn(), id, active)
    }

    fn stamp_last_fired(&self, id: &Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        db::set_last_fired(&self.conn(), id, at)
    }
}

impl StockStore for SqliteStore {
    fn decrement_stock(&self, medicine_id: &Uuid) -> Result<Option<StockLevel>, DatabaseError> {
        db::decrement_stock(&self.conn(), medicine_id)
    }

    fn mark_low_stock_notified(
        &self,
        medicine_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        db::mark_low_stock_notified(&self.conn(), medicine_id, at)
    }

    fn restock(&self, medicine_id: &Uuid, quantity: i64) -> Result<bool, DatabaseError> {
        db::restock(&self.conn(), medicine_id, quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn store_works_as_trait_object() {
        let store: Arc<dyn WorkflowStore> = Arc::new(SqliteStore::open_in_memory().unwrap());

        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Test".into(),
            phone_number: "+15550001111".into(),
            created_at: Utc::now(),
        };
        store.add_patient(&patient).unwrap();

        let fetched = store.patient(&patient.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Test");
        assert!(store.patient(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.db");
        let store = SqliteStore::open(&path).unwrap();
        drop(store);
        assert!(path.exists());
    }
}
