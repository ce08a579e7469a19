//! Stock side effects of a confirmed dose.
//!
//! Confirmation means the dose left the shelf: decrement the count and,
//! when the supply crosses the low-stock threshold, nudge the patient to
//! refill. The nudge is one-shot per depletion episode; restocking above
//! the threshold re-arms it.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::escalation::messages;
use crate::store::WorkflowStore;
use crate::transport::Messenger;

pub struct StockLedger {
    store: Arc<dyn WorkflowStore>,
    messenger: Arc<dyn Messenger>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn WorkflowStore>, messenger: Arc<dyn Messenger>) -> Self {
        Self { store, messenger }
    }

    /// Apply the stock effects of one won confirmation.
    ///
    /// The decrement is a single guarded UPDATE floored at zero, so
    /// concurrent confirmations serialize in the store. The alert send
    /// is best-effort with no retries; the one-shot marker is set even
    /// when the send fails.
    pub async fn record_confirmation(
        &self,
        medicine_id: &Uuid,
        patient_id: &Uuid,
    ) -> Result<(), DatabaseError> {
        let Some(level) = self.store.decrement_stock(medicine_id)? else {
            tracing::warn!(%medicine_id, "confirmed dose references an unknown medicine");
            return Ok(());
        };

        tracing::info!(
            medicine = %level.name,
            remaining = level.stock_quantity,
            "stock decremented"
        );

        let depleted = level.stock_quantity <= level.low_stock_threshold;
        if !depleted || level.low_stock_notified_at.is_some() {
            return Ok(());
        }

        let Some(patient) = self.store.patient(patient_id)? else {
            tracing::warn!(%patient_id, "low stock alert has no patient to go to");
            return Ok(());
        };

        let text = messages::low_stock_alert(&level.name, level.stock_quantity);
        if !self
            .messenger
            .send_message(&patient.phone_number, &text)
            .await
        {
            tracing::warn!(medicine = %level.name, "low stock alert send failed");
        }
        self.store.mark_low_stock_notified(medicine_id, Utc::now())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Medicine, Patient};
    use crate::store::SqliteStore;
    use crate::transport::MockMessenger;

    fn seed(store: &dyn WorkflowStore, stock: i64, threshold: i64) -> (Uuid, Uuid) {
        let patient = Patient {
            id: Uuid::new_v4(),
            name: "Rosa".into(),
            phone_number: "+15550001111".into(),
            created_at: Utc::now(),
        };
        store.add_patient(&patient).unwrap();

        let medicine = Medicine {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            name: "Metformin".into(),
            dosage: "500mg".into(),
            stock_quantity: stock,
            low_stock_threshold: threshold,
            low_stock_notified_at: None,
            created_at: Utc::now(),
        };
        store.add_medicine(&medicine).unwrap();

        (patient.id, medicine.id)
    }

    fn ledger_with_mock() -> (StockLedger, Arc<dyn WorkflowStore>, Arc<MockMessenger>) {
        let store: Arc<dyn WorkflowStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let messenger = Arc::new(MockMessenger::new());
        let ledger = StockLedger::new(Arc::clone(&store), messenger.clone());
        (ledger, store, messenger)
    }

    #[tokio::test]
    async fn decrement_without_crossing_threshold_stays_quiet() {
        let (ledger, store, messenger) = ledger_with_mock();
        let (patient_id, medicine_id) = seed(store.as_ref(), 7, 5);

        ledger
            .record_confirmation(&medicine_id, &patient_id)
            .await
            .unwrap();

        let medicine = store.medicine(&medicine_id).unwrap().unwrap();
        assert_eq!(medicine.stock_quantity, 6);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn crossing_the_threshold_alerts_exactly_once() {
        let (ledger, store, messenger) = ledger_with_mock();
        let (patient_id, medicine_id) = seed(store.as_ref(), 6, 5);

        ledger
            .record_confirmation(&medicine_id, &patient_id)
            .await
            .unwrap();
        ledger
            .record_confirmation(&medicine_id, &patient_id)
            .await
            .unwrap();

        let medicine = store.medicine(&medicine_id).unwrap().unwrap();
        assert_eq!(medicine.stock_quantity, 4);
        assert!(medicine.low_stock_notified_at.is_some());

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Low Stock"));
        assert!(sent[0].1.contains("(5 remaining)"));
    }

    #[tokio::test]
    async fn stock_floors_at_zero_and_still_evaluates_the_alert() {
        let (ledger, store, messenger) = ledger_with_mock();
        let (patient_id, medicine_id) = seed(store.as_ref(), 0, 5);

        ledger
            .record_confirmation(&medicine_id, &patient_id)
            .await
            .unwrap();

        let medicine = store.medicine(&medicine_id).unwrap().unwrap();
        assert_eq!(medicine.stock_quantity, 0);
        assert_eq!(messenger.sent().len(), 1);
    }

    #[tokio::test]
    async fn restocking_rearms_the_alert() {
        let (ledger, store, messenger) = ledger_with_mock();
        let (patient_id, medicine_id) = seed(store.as_ref(), 5, 5);

        ledger
            .record_confirmation(&medicine_id, &patient_id)
            .await
            .unwrap();
        assert_eq!(messenger.sent().len(), 1);

        assert!(store.restock(&medicine_id, 6).unwrap());

        ledger
            .record_confirmation(&medicine_id, &patient_id)
            .await
            .unwrap();
        assert_eq!(messenger.sent().len(), 2);
    }

    #[tokio::test]
    async fn failed_alert_send_still_sets_the_marker() {
        let (ledger, store, messenger) = ledger_with_mock();
        let (patient_id, medicine_id) = seed(store.as_ref(), 5, 5);
        messenger.set_failing(true);

        ledger
            .record_confirmation(&medicine_id, &patient_id)
            .await
            .unwrap();

        let medicine = store.medicine(&medicine_id).unwrap().unwrap();
        assert!(medicine.low_stock_notified_at.is_some());
        assert!(messenger.sent().is_empty());
    }
}
