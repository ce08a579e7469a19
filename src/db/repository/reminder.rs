use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::{ReminderDefinition, WeekdaySet};

pub fn insert_reminder(conn: &Connection, def: &ReminderDefinition) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO reminders (id, patient_id, medicine_id, time_of_day, days_of_week,
         is_active, last_fired_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            def.id.to_string(),
            def.patient_id.to_string(),
            def.medicine_id.to_string(),
            def.time_of_day,
            def.days_of_week.as_csv(),
            def.is_active as i32,
            def.last_fired_at,
            def.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_reminder(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<ReminderDefinition>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, medicine_id, time_of_day, days_of_week,
             is_active, last_fired_at, created_at
             FROM reminders WHERE id = ?1",
            params![id.to_string()],
            reminder_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(r) => Ok(Some(reminder_from_row(r)?)),
        None => Ok(None),
    }
}

/// All active definitions, regardless of weekday. The planner filters by day.
pub fn list_active_reminders(conn: &Connection) -> Result<Vec<ReminderDefinition>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, medicine_id, time_of_day, days_of_week,
         is_active, last_fired_at, created_at
         FROM reminders WHERE is_active = 1",
    )?;

    let rows = stmt.query_map([], |row| Ok(reminder_row_from_rusqlite(row)))?;

    let mut defs = Vec::new();
    for row in rows {
        defs.push(reminder_from_row(row??)?);
    }
    Ok(defs)
}

pub fn list_reminders_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<ReminderDefinition>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, medicine_id, time_of_day, days_of_week,
         is_active, last_fired_at, created_at
         FROM reminders WHERE patient_id = ?1 AND is_active = 1
         ORDER BY time_of_day",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok(reminder_row_from_rusqlite(row))
    })?;

    let mut defs = Vec::new();
    for row in rows {
        defs.push(reminder_from_row(row??)?);
    }
    Ok(defs)
}

/// Soft-deactivate (or reactivate). History stays on file.
pub fn set_reminder_active(
    conn: &Connection,
    id: &Uuid,
    active: bool,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE reminders SET is_active = ?2 WHERE id = ?1",
        params![id.to_string(), active as i32],
    )?;
    Ok(updated > 0)
}

pub fn set_last_fired(conn: &Connection, id: &Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE reminders SET last_fired_at = ?2 WHERE id = ?1",
        params![id.to_string(), at],
    )?;
    Ok(())
}

// Internal row type for ReminderDefinition mapping
struct ReminderRow {
    id: String,
    patient_id: String,
    medicine_id: String,
    time_of_day: NaiveTime,
    days_of_week: String,
    is_active: i32,
    last_fired_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

fn reminder_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ReminderRow, rusqlite::Error> {
    Ok(ReminderRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        medicine_id: row.get(2)?,
        time_of_day: row.get(3)?,
        days_of_week: row.get(4)?,
        is_active: row.get(5)?,
        last_fired_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn reminder_from_row(row: ReminderRow) -> Result<ReminderDefinition, DatabaseError> {
    Ok(ReminderDefinition {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        medicine_id: parse_uuid(&row.medicine_id)?,
        time_of_day: row.time_of_day,
        days_of_week: WeekdaySet::from_csv(&row.days_of_week)?,
        is_active: row.is_active != 0,
        last_fired_at: row.last_fired_at,
        created_at: row.created_at,
    })
}
