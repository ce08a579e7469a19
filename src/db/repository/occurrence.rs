use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::{ConfirmationSource, OccurrenceStatus, VoiceCallStatus};
use crate::models::{Occurrence, OccurrenceKey};

pub fn insert_occurrence(conn: &Connection, occ: &Occurrence) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO occurrences (id, reminder_id, patient_id, medicine_id, scheduled_for,
         status, sent_at, confirmed_at, confirmation_source, voice_call_id, voice_call_status,
         escalated_at, skipped_reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            occ.id.to_string(),
            occ.reminder_id.to_string(),
            occ.patient_id.to_string(),
            occ.medicine_id.to_string(),
            occ.scheduled_for,
            occ.status.as_str(),
            occ.sent_at,
            occ.confirmed_at,
            occ.confirmation_source.as_ref().map(|s| s.as_str()),
            occ.voice_call_id,
            occ.voice_call_status.as_ref().map(|s| s.as_str()),
            occ.escalated_at,
            occ.skipped_reason,
            occ.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_occurrence(conn: &Connection, id: &Uuid) -> Result<Option<Occurrence>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, reminder_id, patient_id, medicine_id, scheduled_for, status, sent_at,
             confirmed_at, confirmation_source, voice_call_id, voice_call_status, escalated_at,
             skipped_reason, created_at
             FROM occurrences WHERE id = ?1",
            params![id.to_string()],
            occurrence_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(r) => Ok(Some(occurrence_from_row(r)?)),
        None => Ok(None),
    }
}

/// Newest row for a dose slot. A slot can accrue siblings when a skipped
/// occurrence is re-planned, so recency decides which row is live.
pub fn latest_for_slot(
    conn: &Connection,
    key: &OccurrenceKey,
) -> Result<Option<Occurrence>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, reminder_id, patient_id, medicine_id, scheduled_for, status, sent_at,
             confirmed_at, confirmation_source, voice_call_id, voice_call_status, escalated_at,
             skipped_reason, created_at
             FROM occurrences WHERE reminder_id = ?1 AND scheduled_for = ?2
             ORDER BY created_at DESC LIMIT 1",
            params![key.reminder_id.to_string(), key.scheduled_for],
            occurrence_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(r) => Ok(Some(occurrence_from_row(r)?)),
        None => Ok(None),
    }
}

/// True when the slot already holds a sent, confirmed or escalated row.
/// Pending and skipped rows do not count; the planner may try those again.
pub fn slot_already_handled(
    conn: &Connection,
    key: &OccurrenceKey,
) -> Result<bool, DatabaseError> {
    let handled: i64 = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM occurrences
             WHERE reminder_id = ?1 AND scheduled_for = ?2
               AND status IN ('sent', 'confirmed', 'voice_escalated', 'caregiver_escalated'))",
        params![key.reminder_id.to_string(), key.scheduled_for],
        |row| row.get(0),
    )?;
    Ok(handled != 0)
}

/// Newest occurrence for a reminder, any status. Confirmations and skips
/// land on this row.
pub fn latest_for_reminder(
    conn: &Connection,
    reminder_id: &Uuid,
    patient_id: &Uuid,
) -> Result<Option<Occurrence>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, reminder_id, patient_id, medicine_id, scheduled_for, status, sent_at,
             confirmed_at, confirmation_source, voice_call_id, voice_call_status, escalated_at,
             skipped_reason, created_at
             FROM occurrences WHERE reminder_id = ?1 AND patient_id = ?2
             ORDER BY created_at DESC LIMIT 1",
            params![reminder_id.to_string(), patient_id.to_string()],
            occurrence_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(r) => Ok(Some(occurrence_from_row(r)?)),
        None => Ok(None),
    }
}

/// Newest occurrence still awaiting the patient, used to resolve which
/// reminder a bare inbound reply refers to.
pub fn latest_open_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<Occurrence>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, reminder_id, patient_id, medicine_id, scheduled_for, status, sent_at,
             confirmed_at, confirmation_source, voice_call_id, voice_call_status, escalated_at,
             skipped_reason, created_at
             FROM occurrences WHERE patient_id = ?1 AND status IN ('sent', 'voice_escalated')
             ORDER BY created_at DESC LIMIT 1",
            params![patient_id.to_string()],
            occurrence_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(r) => Ok(Some(occurrence_from_row(r)?)),
        None => Ok(None),
    }
}

pub fn list_occurrences_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Occurrence>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, reminder_id, patient_id, medicine_id, scheduled_for, status, sent_at,
         confirmed_at, confirmation_source, voice_call_id, voice_call_status, escalated_at,
         skipped_reason, created_at
         FROM occurrences WHERE patient_id = ?1
         ORDER BY created_at DESC",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok(occurrence_row_from_rusqlite(row))
    })?;

    let mut occurrences = Vec::new();
    for row in rows {
        occurrences.push(occurrence_from_row(row??)?);
    }
    Ok(occurrences)
}

pub fn list_occurrences_for_patient_since(
    conn: &Connection,
    patient_id: &Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<Occurrence>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, reminder_id, patient_id, medicine_id, scheduled_for, status, sent_at,
         confirmed_at, confirmation_source, voice_call_id, voice_call_status, escalated_at,
         skipped_reason, created_at
         FROM occurrences WHERE patient_id = ?1 AND created_at >= ?2
         ORDER BY created_at DESC",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string(), since], |row| {
        Ok(occurrence_row_from_rusqlite(row))
    })?;

    let mut occurrences = Vec::new();
    for row in rows {
        occurrences.push(occurrence_from_row(row??)?);
    }
    Ok(occurrences)
}

// ═══════════════════════════════════════════════════════════
// Guarded transitions
// ═══════════════════════════════════════════════════════════
//
// Every status write re-checks the current status inside the UPDATE
// itself. The returned bool says whether this caller won the write;
// a false means another actor settled the row first and the caller
// must not take the step's side effects.

pub fn mark_sent(
    conn: &Connection,
    id: &Uuid,
    sent_at: Option<DateTime<Utc>>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE occurrences SET status = 'sent', sent_at = ?2
         WHERE id = ?1 AND status = 'pending'",
        params![id.to_string(), sent_at],
    )?;
    Ok(updated > 0)
}

pub fn mark_confirmed(
    conn: &Connection,
    id: &Uuid,
    at: DateTime<Utc>,
    source: &ConfirmationSource,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE occurrences SET status = 'confirmed', confirmed_at = ?2, confirmation_source = ?3
         WHERE id = ?1 AND status IN ('sent', 'voice_escalated')",
        params![id.to_string(), at, source.as_str()],
    )?;
    Ok(updated > 0)
}

pub fn mark_voice_escalated(
    conn: &Connection,
    id: &Uuid,
    call_id: Option<&str>,
    call_status: &VoiceCallStatus,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE occurrences SET status = 'voice_escalated', voice_call_id = ?2,
         voice_call_status = ?3
         WHERE id = ?1 AND status = 'sent'",
        params![id.to_string(), call_id, call_status.as_str()],
    )?;
    Ok(updated > 0)
}

pub fn mark_caregiver_escalated(
    conn: &Connection,
    id: &Uuid,
    at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE occurrences SET status = 'caregiver_escalated', escalated_at = ?2
         WHERE id = ?1 AND status IN ('sent', 'voice_escalated')",
        params![id.to_string(), at],
    )?;
    Ok(updated > 0)
}

pub fn mark_skipped(
    conn: &Connection,
    id: &Uuid,
    reason: Option<&str>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE occurrences SET status = 'skipped', skipped_reason = ?2
         WHERE id = ?1 AND status IN ('pending', 'sent', 'voice_escalated')",
        params![id.to_string(), reason],
    )?;
    Ok(updated > 0)
}

// Internal row type for Occurrence mapping
struct OccurrenceRow {
    id: String,
    reminder_id: String,
    patient_id: String,
    medicine_id: String,
    scheduled_for: DateTime<Utc>,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    confirmation_source: Option<String>,
    voice_call_id: Option<String>,
    voice_call_status: Option<String>,
    escalated_at: Option<DateTime<Utc>>,
    skipped_reason: Option<String>,
    created_at: DateTime<Utc>,
}

fn occurrence_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<OccurrenceRow, rusqlite::Error> {
    Ok(OccurrenceRow {
        id: row.get(0)?,
        reminder_id: row.get(1)?,
        patient_id: row.get(2)?,
        medicine_id: row.get(3)?,
        scheduled_for: row.get(4)?,
        status: row.get(5)?,
        sent_at: row.get(6)?,
        confirmed_at: row.get(7)?,
        confirmation_source: row.get(8)?,
        voice_call_id: row.get(9)?,
        voice_call_status: row.get(10)?,
        escalated_at: row.get(11)?,
        skipped_reason: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn occurrence_from_row(row: OccurrenceRow) -> Result<Occurrence, DatabaseError> {
    Ok(Occurrence {
        id: parse_uuid(&row.id)?,
        reminder_id: parse_uuid(&row.reminder_id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        medicine_id: parse_uuid(&row.medicine_id)?,
        scheduled_for: row.scheduled_for,
        status: OccurrenceStatus::from_str(&row.status)?,
        sent_at: row.sent_at,
        confirmed_at: row.confirmed_at,
        confirmation_source: row
            .confirmation_source
            .map(|s| ConfirmationSource::from_str(&s))
            .transpose()?,
        voice_call_id: row.voice_call_id,
        voice_call_status: row
            .voice_call_status
            .map(|s| VoiceCallStatus::from_str(&s))
            .transpose()?,
        escalated_at: row.escalated_at,
        skipped_reason: row.skipped_reason,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_medicine, insert_patient, insert_reminder};
    use crate::db::sqlite::open_memory_database;
    use crate::models::{Medicine, Patient, ReminderDefinition, WeekdaySet};
    use chrono::{NaiveTime, TimeZone};

    fn seed(conn: &Connection) -> (Uuid, Uuid, Uuid) {
        let patient_id = Uuid::new_v4();
        insert_patient(
            conn,
            &Patient {
                id: patient_id,
                name: "Test".into(),
                phone_number: "+15550001111".into(),
                created_at: Utc::now(),
            },
        )
        .unwrap();

        let medicine_id = Uuid::new_v4();
        insert_medicine(
            conn,
            &Medicine {
                id: medicine_id,
                patient_id,
                name: "Metformin".into(),
                dosage: "500mg".into(),
                stock_quantity: 30,
                low_stock_threshold: 5,
                low_stock_notified_at: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();

        let reminder_id = Uuid::new_v4();
        insert_reminder(
            conn,
            &ReminderDefinition {
                id: reminder_id,
                patient_id,
                medicine_id,
                time_of_day: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
                days_of_week: WeekdaySet::EVERY_DAY,
                is_active: true,
                last_fired_at: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();

        (patient_id, medicine_id, reminder_id)
    }

    fn slot() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 8, 30, 0).unwrap()
    }

    #[test]
    fn insert_and_fetch_by_slot() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let occ = Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now());
        insert_occurrence(&conn, &occ).unwrap();

        let fetched = latest_for_slot(&conn, &occ.key()).unwrap().unwrap();
        assert_eq!(fetched.id, occ.id);
        assert_eq!(fetched.status, OccurrenceStatus::Pending);
        assert_eq!(fetched.scheduled_for, slot());
    }

    #[test]
    fn pending_slot_does_not_count_as_handled() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let occ = Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now());
        insert_occurrence(&conn, &occ).unwrap();
        assert!(!slot_already_handled(&conn, &occ.key()).unwrap());

        mark_sent(&conn, &occ.id, Some(Utc::now())).unwrap();
        assert!(slot_already_handled(&conn, &occ.key()).unwrap());
    }

    #[test]
    fn skipped_slot_can_be_planned_again() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let occ = Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now());
        insert_occurrence(&conn, &occ).unwrap();
        mark_sent(&conn, &occ.id, Some(Utc::now())).unwrap();
        mark_skipped(&conn, &occ.id, Some("travelling")).unwrap();

        assert!(!slot_already_handled(&conn, &occ.key()).unwrap());
    }

    #[test]
    fn mark_sent_only_from_pending() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let occ = Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now());
        insert_occurrence(&conn, &occ).unwrap();

        assert!(mark_sent(&conn, &occ.id, Some(Utc::now())).unwrap());
        // second delivery of the same task loses the guard
        assert!(!mark_sent(&conn, &occ.id, Some(Utc::now())).unwrap());
    }

    #[test]
    fn confirm_loses_after_terminal_status() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let occ = Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now());
        insert_occurrence(&conn, &occ).unwrap();
        mark_sent(&conn, &occ.id, Some(Utc::now())).unwrap();
        assert!(mark_skipped(&conn, &occ.id, None).unwrap());

        assert!(!mark_confirmed(&conn, &occ.id, Utc::now(), &ConfirmationSource::Message).unwrap());
        let row = get_occurrence(&conn, &occ.id).unwrap().unwrap();
        assert_eq!(row.status, OccurrenceStatus::Skipped);
        assert!(row.confirmed_at.is_none());
    }

    #[test]
    fn confirm_wins_from_sent_and_voice_escalated() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let first = Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now());
        insert_occurrence(&conn, &first).unwrap();
        mark_sent(&conn, &first.id, Some(Utc::now())).unwrap();
        assert!(mark_confirmed(&conn, &first.id, Utc::now(), &ConfirmationSource::Message).unwrap());

        let later = slot() + chrono::Duration::days(1);
        let second = Occurrence::pending(reminder_id, patient_id, medicine_id, later, Utc::now());
        insert_occurrence(&conn, &second).unwrap();
        mark_sent(&conn, &second.id, Some(Utc::now())).unwrap();
        mark_voice_escalated(&conn, &second.id, Some("CA9"), &VoiceCallStatus::Initiated).unwrap();
        assert!(mark_confirmed(&conn, &second.id, Utc::now(), &ConfirmationSource::Voice).unwrap());

        let row = get_occurrence(&conn, &second.id).unwrap().unwrap();
        assert_eq!(row.confirmation_source, Some(ConfirmationSource::Voice));
    }

    #[test]
    fn caregiver_escalation_blocked_after_confirm() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let occ = Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now());
        insert_occurrence(&conn, &occ).unwrap();
        mark_sent(&conn, &occ.id, Some(Utc::now())).unwrap();
        mark_confirmed(&conn, &occ.id, Utc::now(), &ConfirmationSource::Message).unwrap();

        assert!(!mark_caregiver_escalated(&conn, &occ.id, Utc::now()).unwrap());
    }

    #[test]
    fn latest_for_reminder_returns_newest() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let old = Occurrence {
            created_at: Utc.with_ymd_and_hms(2026, 3, 13, 8, 30, 0).unwrap(),
            ..Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now())
        };
        insert_occurrence(&conn, &old).unwrap();

        let new = Occurrence {
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 8, 30, 0).unwrap(),
            ..Occurrence::pending(
                reminder_id,
                patient_id,
                medicine_id,
                slot() + chrono::Duration::days(1),
                Utc::now(),
            )
        };
        insert_occurrence(&conn, &new).unwrap();

        let latest = latest_for_reminder(&conn, &reminder_id, &patient_id)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, new.id);
    }

    #[test]
    fn latest_open_skips_settled_rows() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        let settled = Occurrence {
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap(),
            ..Occurrence::pending(reminder_id, patient_id, medicine_id, slot(), Utc::now())
        };
        insert_occurrence(&conn, &settled).unwrap();
        mark_sent(&conn, &settled.id, Some(Utc::now())).unwrap();
        mark_confirmed(&conn, &settled.id, Utc::now(), &ConfirmationSource::Message).unwrap();

        let open = Occurrence {
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap(),
            ..Occurrence::pending(
                reminder_id,
                patient_id,
                medicine_id,
                slot() + chrono::Duration::days(1),
                Utc::now(),
            )
        };
        insert_occurrence(&conn, &open).unwrap();
        mark_sent(&conn, &open.id, Some(Utc::now())).unwrap();

        let found = latest_open_for_patient(&conn, &patient_id).unwrap().unwrap();
        assert_eq!(found.id, open.id);
    }

    #[test]
    fn listing_is_newest_first() {
        let conn = open_memory_database().unwrap();
        let (patient_id, medicine_id, reminder_id) = seed(&conn);

        for day in 1..=3 {
            let occ = Occurrence {
                created_at: Utc.with_ymd_and_hms(2026, 3, day, 8, 30, 0).unwrap(),
                ..Occurrence::pending(
                    reminder_id,
                    patient_id,
                    medicine_id,
                    slot() + chrono::Duration::days(day as i64),
                    Utc::now(),
                )
            };
            insert_occurrence(&conn, &occ).unwrap();
        }

        let listed = list_occurrences_for_patient(&conn, &patient_id).unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed[0].created_at > listed[1].created_at);
        assert!(listed[1].created_at > listed[2].created_at);

        let since = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let recent = list_occurrences_for_patient_since(&conn, &patient_id, since).unwrap();
        assert_eq!(recent.len(), 2);
    }
}
