//! Task naming and payloads.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::enums::TaskKind;
use crate::models::OccurrenceKey;

/// Name of a scheduled task.
///
/// Ids are derived from the reminder slot, so planning the same step for
/// the same slot twice collides instead of double-firing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn for_send(key: &OccurrenceKey) -> Self {
        Self(key.to_string())
    }

    pub fn for_voice(key: &OccurrenceKey) -> Self {
        Self(format!("voice-{key}"))
    }

    pub fn for_caregiver(key: &OccurrenceKey) -> Self {
        Self(format!("caregiver-{key}"))
    }

    /// Snooze ids carry a timestamp: the same dose may be snoozed more
    /// than once, and each snooze is its own timer.
    pub fn for_snooze(reminder_id: &Uuid, now: DateTime<Utc>) -> Self {
        Self(format!("snooze-{reminder_id}-{}", now.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a due timer hands to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPayload {
    pub kind: TaskKind,
    pub reminder_id: Uuid,
    pub patient_id: Uuid,
    pub medicine_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
}

impl TaskPayload {
    /// The slot this task belongs to.
    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey::new(self.reminder_id, self.scheduled_for)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot() -> OccurrenceKey {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 8, 30, 0).unwrap();
        OccurrenceKey::new(Uuid::nil(), at)
    }

    #[test]
    fn step_ids_are_deterministic_per_slot() {
        let key = slot();
        let base = "00000000-0000-0000-0000-000000000000-2026-03-14T08:30:00+00:00";

        assert_eq!(TaskId::for_send(&key).as_str(), base);
        assert_eq!(TaskId::for_voice(&key).as_str(), format!("voice-{base}"));
        assert_eq!(
            TaskId::for_caregiver(&key).as_str(),
            format!("caregiver-{base}")
        );

        // same slot, same ids
        assert_eq!(TaskId::for_send(&slot()), TaskId::for_send(&key));
    }

    #[test]
    fn snooze_ids_differ_by_request_time() {
        let reminder_id = Uuid::nil();
        let first = Utc.with_ymd_and_hms(2026, 3, 14, 8, 45, 0).unwrap();
        let second = first + chrono::Duration::minutes(10);

        let a = TaskId::for_snooze(&reminder_id, first);
        let b = TaskId::for_snooze(&reminder_id, second);

        assert!(a.as_str().starts_with("snooze-00000000-"));
        assert_ne!(a, b);
    }

    #[test]
    fn payload_key_round_trips_the_slot() {
        let key = slot();
        let payload = TaskPayload {
            kind: TaskKind::SendMessage,
            reminder_id: key.reminder_id,
            patient_id: Uuid::new_v4(),
            medicine_id: Uuid::new_v4(),
            scheduled_for: key.scheduled_for,
        };
        assert_eq!(payload.key(), key);
    }
}
