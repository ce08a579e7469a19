use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DatabaseError;

/// A standing order: which medicine, at what time of day, on which weekdays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderDefinition {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub medicine_id: Uuid,
    pub time_of_day: NaiveTime,
    pub days_of_week: WeekdaySet,
    pub is_active: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Days of week a reminder fires on, packed into a bitmask. 0 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EVERY_DAY: WeekdaySet = WeekdaySet(0b0111_1111);

    pub fn from_days(days: &[u8]) -> Result<Self, DatabaseError> {
        let mut mask = 0u8;
        for &day in days {
            if day > 6 {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "day of week out of range: {day}"
                )));
            }
            mask |= 1 << day;
        }
        if mask == 0 {
            return Err(DatabaseError::ConstraintViolation(
                "reminder needs at least one weekday".into(),
            ));
        }
        Ok(Self(mask))
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.0 & (1u8 << weekday.num_days_from_sunday()) != 0
    }

    /// Day numbers in ascending order, 0 = Sunday.
    pub fn days(&self) -> Vec<u8> {
        (0u8..7).filter(|d| self.0 & (1 << d) != 0).collect()
    }

    /// Comma-joined day numbers for storage, e.g. "1,3,5".
    pub fn as_csv(&self) -> String {
        self.days()
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_csv(s: &str) -> Result<Self, DatabaseError> {
        let days = s
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                DatabaseError::ConstraintViolation(format!("bad days_of_week column: {s}"))
            })?;
        Self::from_days(&days)
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = DatabaseError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_days(&days)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.days()
    }
}
