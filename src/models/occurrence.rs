use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ConfirmationSource, OccurrenceStatus, VoiceCallStatus};

/// One delivery attempt of one reminder for one dose slot.
///
/// Rows are append-only. Status moves forward through the escalation
/// ladder and stops at the first terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: Uuid,
    pub reminder_id: Uuid,
    pub patient_id: Uuid,
    pub medicine_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub status: OccurrenceStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmation_source: Option<ConfirmationSource>,
    pub voice_call_id: Option<String>,
    pub voice_call_status: Option<VoiceCallStatus>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub skipped_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Occurrence {
    /// Fresh pending row for the given dose slot.
    pub fn pending(
        reminder_id: Uuid,
        patient_id: Uuid,
        medicine_id: Uuid,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reminder_id,
            patient_id,
            medicine_id,
            scheduled_for: scheduled_for.trunc_subsecs(0),
            status: OccurrenceStatus::Pending,
            sent_at: None,
            confirmed_at: None,
            confirmation_source: None,
            voice_call_id: None,
            voice_call_status: None,
            escalated_at: None,
            skipped_reason: None,
            created_at: now,
        }
    }

    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey::new(self.reminder_id, self.scheduled_for)
    }
}

/// Identity of a dose slot: which reminder, fired for which wall-clock time.
///
/// Sub-second precision is dropped so a key recomputed from any source
/// compares equal to the one stored with the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OccurrenceKey {
    pub reminder_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
}

impl OccurrenceKey {
    pub fn new(reminder_id: Uuid, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            reminder_id,
            scheduled_for: scheduled_for.trunc_subsecs(0),
        }
    }
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.reminder_id, self.scheduled_for.to_rfc3339())
    }
}
