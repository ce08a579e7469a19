use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caregiver {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub relationship: Option<String>,
    /// Caregivers can be on file without receiving escalation alerts.
    pub should_notify: bool,
    pub created_at: DateTime<Utc>,
}
