use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::Patient;

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, phone_number, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            patient.id.to_string(),
            patient.name,
            patient.phone_number,
            patient.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, phone_number, created_at FROM patients WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, name, phone_number, created_at)) => Ok(Some(Patient {
            id: parse_uuid(&id)?,
            name,
            phone_number,
            created_at,
        })),
        None => Ok(None),
    }
}
