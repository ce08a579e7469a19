use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::Medicine;

/// Snapshot returned by the stock decrement, enough to decide on the alert.
#[derive(Debug, Clone)]
pub struct StockLevel {
    pub name: String,
    pub stock_quantity: i64,
    pub low_stock_threshold: i64,
    pub low_stock_notified_at: Option<DateTime<Utc>>,
}

pub fn insert_medicine(conn: &Connection, medicine: &Medicine) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medicines (id, patient_id, name, dosage, stock_quantity,
         low_stock_threshold, low_stock_notified_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            medicine.id.to_string(),
            medicine.patient_id.to_string(),
            medicine.name,
            medicine.dosage,
            medicine.stock_quantity,
            medicine.low_stock_threshold,
            medicine.low_stock_notified_at,
            medicine.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_medicine(conn: &Connection, id: &Uuid) -> Result<Option<Medicine>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, name, dosage, stock_quantity, low_stock_threshold,
             low_stock_notified_at, created_at
             FROM medicines WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<DateTime<Utc>>>(6)?,
                    row.get::<_, DateTime<Utc>>(7)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, patient_id, name, dosage, stock, threshold, notified_at, created_at)) => {
            Ok(Some(Medicine {
                id: parse_uuid(&id)?,
                patient_id: parse_uuid(&patient_id)?,
                name,
                dosage,
                stock_quantity: stock,
                low_stock_threshold: threshold,
                low_stock_notified_at: notified_at,
                created_at,
            }))
        }
        None => Ok(None),
    }
}

pub fn list_medicines_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Medicine>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, name, dosage, stock_quantity, low_stock_threshold,
         low_stock_notified_at, created_at
         FROM medicines WHERE patient_id = ?1 ORDER BY name",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, Option<DateTime<Utc>>>(6)?,
            row.get::<_, DateTime<Utc>>(7)?,
        ))
    })?;

    let mut medicines = Vec::new();
    for row in rows {
        let (id, patient_id, name, dosage, stock, threshold, notified_at, created_at) = row?;
        medicines.push(Medicine {
            id: parse_uuid(&id)?,
            patient_id: parse_uuid(&patient_id)?,
            name,
            dosage,
            stock_quantity: stock,
            low_stock_threshold: threshold,
            low_stock_notified_at: notified_at,
            created_at,
        });
    }
    Ok(medicines)
}

/// Take one dose off the shelf. A single-statement update that floors at
/// zero, so concurrent confirmations can never drive the count negative.
pub fn decrement_stock(conn: &Connection, id: &Uuid) -> Result<Option<StockLevel>, DatabaseError> {
    let level = conn
        .query_row(
            "UPDATE medicines SET stock_quantity = MAX(stock_quantity - 1, 0)
             WHERE id = ?1
             RETURNING name, stock_quantity, low_stock_threshold, low_stock_notified_at",
            params![id.to_string()],
            |row| {
                Ok(StockLevel {
                    name: row.get(0)?,
                    stock_quantity: row.get(1)?,
                    low_stock_threshold: row.get(2)?,
                    low_stock_notified_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(level)
}

pub fn mark_low_stock_notified(
    conn: &Connection,
    id: &Uuid,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE medicines SET low_stock_notified_at = ?2 WHERE id = ?1",
        params![id.to_string(), at],
    )?;
    Ok(())
}

/// Reset the shelf count and re-arm the low stock alert.
pub fn restock(conn: &Connection, id: &Uuid, quantity: i64) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE medicines SET stock_quantity = ?2, low_stock_notified_at = NULL WHERE id = ?1",
        params![id.to_string(), quantity],
    )?;
    Ok(updated > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_patient;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Patient;

    fn seed(conn: &Connection, stock: i64) -> Uuid {
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

        let id = Uuid::new_v4();
        insert_medicine(
            conn,
            &Medicine {
                id,
                patient_id,
                name: "Lisinopril".into(),
                dosage: "10mg".into(),
                stock_quantity: stock,
                low_stock_threshold: 5,
                low_stock_notified_at: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();
        id
    }

    #[test]
    fn insert_and_get_medicine() {
        let conn = open_memory_database().unwrap();
        let id = seed(&conn, 30);
        let med = get_medicine(&conn, &id).unwrap().unwrap();
        assert_eq!(med.name, "Lisinopril");
        assert_eq!(med.stock_quantity, 30);
        assert!(med.low_stock_notified_at.is_none());
    }

    #[test]
    fn list_is_sorted_by_name() {
        let conn = open_memory_database().unwrap();
        let first = seed(&conn, 30);
        let med = get_medicine(&conn, &first).unwrap().unwrap();

        insert_medicine(
            &conn,
            &Medicine {
                id: Uuid::new_v4(),
                patient_id: med.patient_id,
                name: "Amlodipine".into(),
                dosage: "5mg".into(),
                stock_quantity: 14,
                low_stock_threshold: 3,
                low_stock_notified_at: None,
                created_at: Utc::now(),
            },
        )
        .unwrap();

        let all = list_medicines_for_patient(&conn, &med.patient_id).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Amlodipine");
        assert_eq!(all[1].name, "Lisinopril");
    }

    #[test]
    fn decrement_reduces_by_one() {
        let conn = open_memory_database().unwrap();
        let id = seed(&conn, 10);
        let level = decrement_stock(&conn, &id).unwrap().unwrap();
        assert_eq!(level.stock_quantity, 9);
    }

    #[test]
    fn decrement_floors_at_zero() {
        let conn = open_memory_database().unwrap();
        let id = seed(&conn, 0);
        let level = decrement_stock(&conn, &id).unwrap().unwrap();
        assert_eq!(level.stock_quantity, 0);

        let again = decrement_stock(&conn, &id).unwrap().unwrap();
        assert_eq!(again.stock_quantity, 0);
    }

    #[test]
    fn decrement_unknown_medicine_returns_none() {
        let conn = open_memory_database().unwrap();
        let level = decrement_stock(&conn, &Uuid::new_v4()).unwrap();
        assert!(level.is_none());
    }

    #[test]
    fn restock_clears_notification_marker() {
        let conn = open_memory_database().unwrap();
        let id = seed(&conn, 2);
        mark_low_stock_notified(&conn, &id, Utc::now()).unwrap();
        assert!(get_medicine(&conn, &id)
            .unwrap()
            .unwrap()
            .low_stock_notified_at
            .is_some());

        assert!(restock(&conn, &id, 60).unwrap());
        let med = get_medicine(&conn, &id).unwrap().unwrap();
        assert_eq!(med.stock_quantity, 60);
        assert!(med.low_stock_notified_at.is_none());
    }
}
