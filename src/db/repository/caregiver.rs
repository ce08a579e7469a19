use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::Caregiver;

pub fn insert_caregiver(conn: &Connection, caregiver: &Caregiver) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO caregivers (id, patient_id, name, phone_number, relationship,
         should_notify, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            caregiver.id.to_string(),
            caregiver.patient_id.to_string(),
            caregiver.name,
            caregiver.phone_number,
            caregiver.relationship,
            caregiver.should_notify as i32,
            caregiver.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_caregivers(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Caregiver>, DatabaseError> {
    fetch_caregivers(
        conn,
        "SELECT id, patient_id, name, phone_number, relationship, should_notify, created_at
         FROM caregivers WHERE patient_id = ?1 ORDER BY created_at",
        patient_id,
    )
}

/// Only the caregivers who opted into escalation alerts.
pub fn caregivers_to_notify(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Caregiver>, DatabaseError> {
    fetch_caregivers(
        conn,
        "SELECT id, patient_id, name, phone_number, relationship, should_notify, created_at
         FROM caregivers WHERE patient_id = ?1 AND should_notify = 1 ORDER BY created_at",
        patient_id,
    )
}

fn fetch_caregivers(
    conn: &Connection,
    sql: &str,
    patient_id: &Uuid,
) -> Result<Vec<Caregiver>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, i32>(5)?,
            row.get::<_, DateTime<Utc>>(6)?,
        ))
    })?;

    let mut caregivers = Vec::new();
    for row in rows {
        let (id, patient_id, name, phone_number, relationship, should_notify, created_at) = row?;
        caregivers.push(Caregiver {
            id: parse_uuid(&id)?,
            patient_id: parse_uuid(&patient_id)?,
            name,
            phone_number,
            relationship,
            should_notify: should_notify != 0,
            created_at,
        });
    }
    Ok(caregivers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_patient;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Patient;

    fn seed_patient(conn: &Connection) -> Uuid {
        let id = Uuid::new_v4();
        insert_patient(
            conn,
            &Patient {
                id,
                name: "Test".into(),
                phone_number: "+15550001111".into(),
                created_at: Utc::now(),
            },
        )
        .unwrap();
        id
    }

    fn sample_caregiver(patient_id: Uuid, name: &str, notify: bool) -> Caregiver {
        Caregiver {
            id: Uuid::new_v4(),
            patient_id,
            name: name.into(),
            phone_number: "+15550002222".into(),
            relationship: Some("daughter".into()),
            should_notify: notify,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn notify_list_excludes_opted_out() {
        let conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);

        insert_caregiver(&conn, &sample_caregiver(patient_id, "Ada", true)).unwrap();
        insert_caregiver(&conn, &sample_caregiver(patient_id, "Ben", false)).unwrap();

        let all = list_caregivers(&conn, &patient_id).unwrap();
        assert_eq!(all.len(), 2);

        let notify = caregivers_to_notify(&conn, &patient_id).unwrap();
        assert_eq!(notify.len(), 1);
        assert_eq!(notify[0].name, "Ada");
    }

    #[test]
    fn empty_when_no_caregivers() {
        let conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);
        assert!(caregivers_to_notify(&conn, &patient_id).unwrap().is_empty());
    }
}
