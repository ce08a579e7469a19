use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub stock_quantity: i64,
    pub low_stock_threshold: i64,
    /// Set once the low stock alert has gone out; cleared on restock.
    pub low_stock_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Medicine {
    pub fn is_low_on_stock(&self) -> bool {
        self.stock_quantity <= self.low_stock_threshold
    }
}
