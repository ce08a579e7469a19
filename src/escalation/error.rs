//! Escalation-specific error types.
//!
//! Transport failures are deliberately absent: a failed send or call is
//! workflow data (it accelerates the next step), never an error value.

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum EscalationError {
    #[error("Database error: {0}")]
    Store(#[from] DatabaseError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("No caregivers opted in for patient {patient_id}")]
    NoRecipients { patient_id: Uuid },
}
