//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed connection. All public functions are
//! re-exported here so callers can use `db::insert_patient` style paths.

mod caregiver;
mod medicine;
mod occurrence;
mod patient;
mod reminder;

use uuid::Uuid;

use super::DatabaseError;

pub use caregiver::*;
pub use medicine::*;
pub use occurrence::*;
pub use patient::*;
pub use reminder::*;

/// Parse a uuid column, mapping bad data to ConstraintViolation.
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
