//! Application facade.
//!
//! Owns the wiring: one store, one timer queue, the escalation engine,
//! the daily planner, and the dispatcher task that drains due timers
//! onto engine workers. Everything a caller (HTTP layer, CLI, tests)
//! does goes through [`ReminderService`].

use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::db::DatabaseError;
use crate::escalation::{messages, EscalationEngine, EscalationError};
use crate::inbound::{self, ReplyAction};
use crate::models::enums::ConfirmationSource;
use crate::models::{
    Caregiver, Medicine, Occurrence, Patient, ReminderDefinition, WeekdaySet,
};
use crate::queue::DelayedTaskQueue;
use crate::scheduler::{DailyScheduler, SchedulerLoop, ScheduleSummary};
use crate::store::WorkflowStore;
use crate::transport::{Dialer, Messenger};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Store(#[from] DatabaseError),
    #[error("{0}")]
    Escalation(#[from] EscalationError),
}

pub struct ReminderService {
    store: Arc<dyn WorkflowStore>,
    engine: Arc<EscalationEngine>,
    scheduler: DailyScheduler,
    messenger: Arc<dyn Messenger>,
    config: EngineConfig,
}

impl ReminderService {
    /// Wire the workflow together and start the dispatcher. Needs a
    /// running tokio runtime.
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        messenger: Arc<dyn Messenger>,
        dialer: Arc<dyn Dialer>,
        config: EngineConfig,
    ) -> Self {
        let (queue, mut due_rx) = DelayedTaskQueue::new();
        let engine = Arc::new(EscalationEngine::new(
            Arc::clone(&store),
            queue.clone(),
            Arc::clone(&messenger),
            dialer,
            config.clone(),
        ));
        let scheduler = DailyScheduler::new(Arc::clone(&store), queue);

        // Every due payload gets its own worker, so a slow transport
        // call never delays the next timer. Step failures end here.
        let dispatch_engine = Arc::clone(&engine);
        tokio::spawn(async move {
            while let Some(payload) = due_rx.recv().await {
                let engine = Arc::clone(&dispatch_engine);
                tokio::spawn(async move {
                    let key = payload.key();
                    let kind = payload.kind.clone();
                    if let Err(e) = engine.execute(payload).await {
                        tracing::warn!(key = %key, kind = kind.as_str(), "step failed: {e}");
                    }
                });
            }
            tracing::debug!("timer queue closed, dispatcher exiting");
        });

        Self {
            store,
            engine,
            scheduler,
            messenger,
            config,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registries
    // ═══════════════════════════════════════════════════════════════════

    pub fn register_patient(
        &self,
        name: &str,
        phone_number: &str,
    ) -> Result<Patient, ServiceError> {
        let patient = Patient {
            id: Uuid::new_v4(),
            name: name.into(),
            phone_number: phone_number.into(),
            created_at: Utc::now(),
        };
        self.store.add_patient(&patient)?;
        tracing::info!(patient_id = %patient.id, "patient registered");
        Ok(patient)
    }

    pub fn add_medicine(
        &self,
        patient_id: &Uuid,
        name: &str,
        dosage: &str,
        stock_quantity: i64,
        low_stock_threshold: i64,
    ) -> Result<Medicine, ServiceError> {
        let medicine = Medicine {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            name: name.into(),
            dosage: dosage.into(),
            stock_quantity,
            low_stock_threshold,
            low_stock_notified_at: None,
            created_at: Utc::now(),
        };
        self.store.add_medicine(&medicine)?;
        tracing::info!(medicine_id = %medicine.id, name, "medicine added");
        Ok(medicine)
    }

    pub fn add_caregiver(
        &self,
        patient_id: &Uuid,
        name: &str,
        phone_number: &str,
        relationship: Option<&str>,
        should_notify: bool,
    ) -> Result<Caregiver, ServiceError> {
        let caregiver = Caregiver {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            name: name.into(),
            phone_number: phone_number.into(),
            relationship: relationship.map(Into::into),
            should_notify,
            created_at: Utc::now(),
        };
        self.store.add_caregiver(&caregiver)?;
        tracing::info!(caregiver_id = %caregiver.id, should_notify, "caregiver added");
        Ok(caregiver)
    }

    pub fn list_medicines(&self, patient_id: &Uuid) -> Result<Vec<Medicine>, ServiceError> {
        Ok(self.store.medicines_for_patient(patient_id)?)
    }

    pub fn list_caregivers(&self, patient_id: &Uuid) -> Result<Vec<Caregiver>, ServiceError> {
        Ok(self.store.caregivers_for_patient(patient_id)?)
    }

    /// Top up a medicine's stock. Rearms the low-stock alert when the
    /// new level clears the threshold.
    pub fn restock(&self, medicine_id: &Uuid, quantity: i64) -> Result<bool, ServiceError> {
        let found = self.store.restock(medicine_id, quantity)?;
        if found {
            tracing::info!(%medicine_id, quantity, "medicine restocked");
        }
        Ok(found)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reminder definitions
    // ═══════════════════════════════════════════════════════════════════

    /// Create a standing reminder. When today's slot is still ahead,
    /// its send task is armed immediately; otherwise the midnight
    /// planner picks it up on the next matching day.
    pub fn create_reminder(
        &self,
        patient_id: &Uuid,
        medicine_id: &Uuid,
        time_of_day: NaiveTime,
        days_of_week: &[u8],
    ) -> Result<ReminderDefinition, ServiceError> {
        let definition = ReminderDefinition {
            id: Uuid::new_v4(),
            patient_id: *patient_id,
            medicine_id: *medicine_id,
            time_of_day,
            days_of_week: WeekdaySet::from_days(days_of_week)?,
            is_active: true,
            last_fired_at: None,
            created_at: Utc::now(),
        };
        self.store.add_reminder(&definition)?;

        let armed = self.scheduler.schedule_definition(&definition, Utc::now())?;
        tracing::info!(reminder_id = %definition.id, armed_today = armed, "reminder created");
        Ok(definition)
    }

    /// Soft-delete: the definition stays for the audit trail but stops
    /// firing. An already-armed timer is disarmed by the engine's
    /// active check when it comes due.
    pub fn deactivate_reminder(&self, reminder_id: &Uuid) -> Result<bool, ServiceError> {
        let found = self.store.set_reminder_active(reminder_id, false)?;
        if found {
            tracing::info!(%reminder_id, "reminder deactivated");
        }
        Ok(found)
    }

    pub fn list_reminders(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<ReminderDefinition>, ServiceError> {
        Ok(self.store.reminders_for_patient(patient_id)?)
    }

    /// Dose history, newest first.
    pub fn list_logs(&self, patient_id: &Uuid) -> Result<Vec<Occurrence>, ServiceError> {
        Ok(self.store.occurrences_for_patient(patient_id)?)
    }

    pub fn list_logs_since(
        &self,
        patient_id: &Uuid,
        since: chrono::DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, ServiceError> {
        Ok(self.store.occurrences_for_patient_since(patient_id, since)?)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Workflow
    // ═══════════════════════════════════════════════════════════════════

    /// Plan today's send tasks for every active definition.
    pub fn schedule_today(&self) -> Result<ScheduleSummary, ServiceError> {
        Ok(self.scheduler.run(Utc::now())?)
    }

    /// Spawn the midnight re-planner at the configured time of day.
    pub fn start_daily_loop(&self) -> SchedulerLoop {
        self.scheduler.spawn_daily_loop(self.config.daily_run_at)
    }

    pub async fn confirm(
        &self,
        reminder_id: &Uuid,
        patient_id: &Uuid,
        source: ConfirmationSource,
    ) -> Result<bool, ServiceError> {
        Ok(self.engine.confirm(reminder_id, patient_id, source).await?)
    }

    pub fn skip(
        &self,
        reminder_id: &Uuid,
        patient_id: &Uuid,
        reason: Option<&str>,
    ) -> Result<bool, ServiceError> {
        Ok(self.engine.skip(reminder_id, patient_id, reason)?)
    }

    pub fn snooze(&self, reminder_id: &Uuid, minutes: u32) -> Result<(), ServiceError> {
        Ok(self.engine.snooze(reminder_id, minutes)?)
    }

    /// Fire a reminder immediately, ignoring its weekday schedule.
    pub fn trigger_now(&self, reminder_id: &Uuid) -> Result<(), ServiceError> {
        Ok(self.engine.trigger_now(reminder_id)?)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Inbound replies
    // ═══════════════════════════════════════════════════════════════════

    /// Apply a patient's free-text reply to their latest open dose and
    /// send the matching acknowledgment. Returns the applied action;
    /// `None` when the text is not a menu digit, nothing is awaiting a
    /// response, or a terminal status got there first.
    pub async fn handle_message_reply(
        &self,
        patient_id: &Uuid,
        text: &str,
    ) -> Result<Option<ReplyAction>, ServiceError> {
        let Some(action) = inbound::parse_message_reply(text) else {
            tracing::debug!(%patient_id, "unrecognized reply text");
            return Ok(None);
        };
        let Some(occurrence) = self.store.latest_open_for_patient(patient_id)? else {
            tracing::debug!(%patient_id, "reply arrived with no open dose");
            return Ok(None);
        };

        let applied = match action {
            ReplyAction::Confirm => {
                self.engine
                    .confirm(
                        &occurrence.reminder_id,
                        patient_id,
                        ConfirmationSource::Message,
                    )
                    .await?
            }
            ReplyAction::Snooze => {
                self.engine
                    .snooze(&occurrence.reminder_id, self.config.message_snooze_minutes)?;
                true
            }
            ReplyAction::Skip => {
                self.engine
                    .skip(&occurrence.reminder_id, patient_id, None)?
            }
        };
        if !applied {
            return Ok(None);
        }

        self.acknowledge(patient_id, action, self.config.message_snooze_minutes)
            .await?;
        Ok(Some(action))
    }

    /// Apply an IVR keypress for the reminder the call was placed for.
    /// The spoken response is the telephony layer's concern, so no
    /// acknowledgment message is sent here.
    pub async fn handle_voice_keypress(
        &self,
        reminder_id: &Uuid,
        patient_id: &Uuid,
        digit: char,
    ) -> Result<Option<ReplyAction>, ServiceError> {
        let Some(action) = inbound::parse_voice_keypress(digit) else {
            tracing::warn!(%reminder_id, %digit, "invalid keypress");
            return Ok(None);
        };

        let applied = match action {
            ReplyAction::Confirm => {
                self.engine
                    .confirm(reminder_id, patient_id, ConfirmationSource::Voice)
                    .await?
            }
            ReplyAction::Snooze => {
                self.engine
                    .snooze(reminder_id, self.config.voice_snooze_minutes)?;
                true
            }
            ReplyAction::Skip => self.engine.skip(reminder_id, patient_id, None)?,
        };
        Ok(applied.then_some(action))
    }

    async fn acknowledge(
        &self,
        patient_id: &Uuid,
        action: ReplyAction,
        snooze_minutes: u32,
    ) -> Result<(), ServiceError> {
        let Some(patient) = self.store.patient(patient_id)? else {
            return Ok(());
        };
        let text = match action {
            ReplyAction::Confirm => messages::taken_ack().to_string(),
            ReplyAction::Snooze => messages::snoozed_ack(snooze_minutes),
            ReplyAction::Skip => messages::skipped_ack().to_string(),
        };
        if !self.messenger.send_message(&patient.phone_number, &text).await {
            tracing::warn!(%patient_id, "acknowledgment send failed");
        }
        Ok(())
    }
}
