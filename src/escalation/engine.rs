//! Effectful execution of escalation steps.
//!
//! Each handler reads the occurrence, consults the pure transition
//! table, performs the transport call, then commits the status through
//! a guarded store write. Losing the guarded write means a confirmation
//! or skip got there first, and the handler stops without scheduling
//! anything further.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::enums::{ConfirmationSource, TaskKind, VoiceCallStatus};
use crate::models::Occurrence;
use crate::queue::{DelayedTaskQueue, TaskId, TaskPayload};
use crate::stock::StockLedger;
use crate::store::WorkflowStore;
use crate::transport::{CallScript, Dialer, Messenger};

use super::decision::{next_step, FollowUp, StepDecision};
use super::error::EscalationError;
use super::messages;

pub struct EscalationEngine {
    store: Arc<dyn WorkflowStore>,
    queue: DelayedTaskQueue,
    messenger: Arc<dyn Messenger>,
    dialer: Arc<dyn Dialer>,
    ledger: StockLedger,
    config: EngineConfig,
}

impl EscalationEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        queue: DelayedTaskQueue,
        messenger: Arc<dyn Messenger>,
        dialer: Arc<dyn Dialer>,
        config: EngineConfig,
    ) -> Self {
        let ledger = StockLedger::new(Arc::clone(&store), Arc::clone(&messenger));
        Self {
            store,
            queue,
            messenger,
            dialer,
            ledger,
            config,
        }
    }

    /// Run one due task. Errors are per-step; the dispatcher logs them
    /// and later timers still fire.
    pub async fn execute(&self, payload: TaskPayload) -> Result<(), EscalationError> {
        match payload.kind {
            TaskKind::SendMessage => self.run_send(&payload).await,
            TaskKind::VoiceEscalation => self.run_voice(&payload).await,
            TaskKind::CaregiverAlert => self.run_caregiver(&payload).await,
        }
    }

    /// Step 1: create the occurrence and send the reminder message.
    async fn run_send(&self, payload: &TaskPayload) -> Result<(), EscalationError> {
        let key = payload.key();
        if self.store.slot_already_handled(&key)? {
            tracing::debug!(key = %key, "slot already handled, send suppressed");
            return Ok(());
        }

        let definition = self.store.reminder(&payload.reminder_id)?.ok_or(
            EscalationError::NotFound {
                entity: "reminder",
                id: payload.reminder_id,
            },
        )?;
        if !definition.is_active {
            tracing::info!(reminder_id = %payload.reminder_id, "reminder deactivated, send suppressed");
            return Ok(());
        }
        let patient =
            self.store
                .patient(&payload.patient_id)?
                .ok_or(EscalationError::NotFound {
                    entity: "patient",
                    id: payload.patient_id,
                })?;
        let medicine =
            self.store
                .medicine(&payload.medicine_id)?
                .ok_or(EscalationError::NotFound {
                    entity: "medicine",
                    id: payload.medicine_id,
                })?;

        let occurrence = Occurrence::pending(
            payload.reminder_id,
            payload.patient_id,
            payload.medicine_id,
            payload.scheduled_for,
            Utc::now(),
        );
        self.store.create_occurrence(&occurrence)?;

        let plan = match next_step(&occurrence.status, &TaskKind::SendMessage, &self.config) {
            StepDecision::Proceed(plan) => plan,
            StepDecision::Suppress(reason) => {
                tracing::debug!(key = %key, ?reason, "send suppressed");
                return Ok(());
            }
        };

        let text = messages::reminder_prompt(
            &medicine.name,
            &medicine.dosage,
            self.config.message_snooze_minutes,
        );
        let delivered = self
            .messenger
            .send_message(&patient.phone_number, &text)
            .await;

        let now = Utc::now();
        if !self.store.mark_sent(&occurrence.id, delivered.then_some(now))? {
            tracing::debug!(key = %key, "lost the send transition, stopping");
            return Ok(());
        }

        if delivered {
            self.store.stamp_last_fired(&payload.reminder_id, now)?;
            tracing::info!(key = %key, patient = %patient.name, "reminder message sent");
        } else {
            tracing::warn!(key = %key, "message send failed, voice step brought forward");
        }

        let follow_up = if delivered {
            plan.follow_up
        } else {
            plan.follow_up_on_failure
        };
        if let Some(follow_up) = &follow_up {
            self.schedule_follow_up(payload, follow_up);
        }
        Ok(())
    }

    /// Step 2: place the automated call.
    async fn run_voice(&self, payload: &TaskPayload) -> Result<(), EscalationError> {
        let key = payload.key();
        let Some(occurrence) = self.store.latest_for_slot(&key)? else {
            tracing::warn!(key = %key, "voice step fired for a slot with no occurrence");
            return Ok(());
        };

        let plan = match next_step(&occurrence.status, &TaskKind::VoiceEscalation, &self.config)
        {
            StepDecision::Proceed(plan) => plan,
            StepDecision::Suppress(reason) => {
                tracing::debug!(key = %key, ?reason, "voice step suppressed");
                return Ok(());
            }
        };

        let patient =
            self.store
                .patient(&payload.patient_id)?
                .ok_or(EscalationError::NotFound {
                    entity: "patient",
                    id: payload.patient_id,
                })?;
        let medicine =
            self.store
                .medicine(&payload.medicine_id)?
                .ok_or(EscalationError::NotFound {
                    entity: "medicine",
                    id: payload.medicine_id,
                })?;

        let script = CallScript {
            reminder_id: payload.reminder_id,
            patient_name: patient.name.clone(),
            medicine_name: medicine.name,
            dosage: medicine.dosage,
        };
        let call_id = self.dialer.place_call(&patient.phone_number, &script).await;
        let delivered = call_id.is_some();
        let call_status = if delivered {
            VoiceCallStatus::Initiated
        } else {
            VoiceCallStatus::Failed
        };

        let won = self.store.mark_voice_escalated(
            &occurrence.id,
            call_id.as_ref().map(|c| c.as_str()),
            &call_status,
        )?;
        if !won {
            tracing::debug!(key = %key, "lost the voice transition, stopping");
            return Ok(());
        }

        match &call_id {
            Some(id) => tracing::info!(key = %key, call_id = %id, "voice call placed"),
            None => {
                tracing::warn!(key = %key, "voice call failed, caregiver step brought forward")
            }
        }

        let follow_up = if delivered {
            plan.follow_up
        } else {
            plan.follow_up_on_failure
        };
        if let Some(follow_up) = &follow_up {
            self.schedule_follow_up(payload, follow_up);
        }
        Ok(())
    }

    /// Step 3: alert every opted-in caregiver.
    async fn run_caregiver(&self, payload: &TaskPayload) -> Result<(), EscalationError> {
        let key = payload.key();
        let Some(occurrence) = self.store.latest_for_slot(&key)? else {
            tracing::warn!(key = %key, "caregiver step fired for a slot with no occurrence");
            return Ok(());
        };

        if let StepDecision::Suppress(reason) =
            next_step(&occurrence.status, &TaskKind::CaregiverAlert, &self.config)
        {
            tracing::debug!(key = %key, ?reason, "caregiver step suppressed");
            return Ok(());
        }

        let caregivers = self.store.caregivers_to_notify(&payload.patient_id)?;
        if caregivers.is_empty() {
            // occurrence stays non-terminal; nobody was told
            return Err(EscalationError::NoRecipients {
                patient_id: payload.patient_id,
            });
        }

        let patient =
            self.store
                .patient(&payload.patient_id)?
                .ok_or(EscalationError::NotFound {
                    entity: "patient",
                    id: payload.patient_id,
                })?;
        let medicine =
            self.store
                .medicine(&payload.medicine_id)?
                .ok_or(EscalationError::NotFound {
                    entity: "medicine",
                    id: payload.medicine_id,
                })?;

        let text = messages::caregiver_alert(
            &patient.name,
            &medicine.name,
            &medicine.dosage,
            &occurrence.scheduled_for,
        );

        let mut notified = 0usize;
        for caregiver in &caregivers {
            if self
                .messenger
                .send_message(&caregiver.phone_number, &text)
                .await
            {
                notified += 1;
            } else {
                tracing::warn!(caregiver = %caregiver.name, "caregiver alert send failed");
            }
        }

        if self.store.mark_caregiver_escalated(&occurrence.id, Utc::now())? {
            tracing::info!(
                key = %key,
                notified,
                total = caregivers.len(),
                "escalated to caregivers"
            );
        } else {
            tracing::debug!(key = %key, "lost the caregiver transition");
        }
        Ok(())
    }

    /// Record the patient's acknowledgment for their latest occurrence
    /// of this reminder. Returns false when there was nothing open to
    /// confirm or a terminal status got there first.
    pub async fn confirm(
        &self,
        reminder_id: &Uuid,
        patient_id: &Uuid,
        source: ConfirmationSource,
    ) -> Result<bool, EscalationError> {
        let Some(occurrence) = self.store.latest_for_reminder(reminder_id, patient_id)? else {
            tracing::debug!(%reminder_id, "nothing to confirm");
            return Ok(false);
        };

        if !self
            .store
            .mark_confirmed(&occurrence.id, Utc::now(), &source)?
        {
            tracing::debug!(
                %reminder_id,
                status = occurrence.status.as_str(),
                "confirmation lost to an earlier terminal status"
            );
            return Ok(false);
        }

        let cancelled = self.queue.cancel_for_key(&occurrence.key());
        tracing::info!(
            key = %occurrence.key(),
            source = source.as_str(),
            cancelled,
            "dose confirmed"
        );

        self.ledger
            .record_confirmation(&occurrence.medicine_id, &occurrence.patient_id)
            .await?;
        Ok(true)
    }

    /// Mark the latest occurrence skipped and drop its pending timers.
    pub fn skip(
        &self,
        reminder_id: &Uuid,
        patient_id: &Uuid,
        reason: Option<&str>,
    ) -> Result<bool, EscalationError> {
        let Some(occurrence) = self.store.latest_for_reminder(reminder_id, patient_id)? else {
            tracing::debug!(%reminder_id, "nothing to skip");
            return Ok(false);
        };

        if !self.store.mark_skipped(&occurrence.id, reason)? {
            return Ok(false);
        }

        let cancelled = self.queue.cancel_for_key(&occurrence.key());
        tracing::info!(key = %occurrence.key(), cancelled, "dose skipped");
        Ok(true)
    }

    /// Schedule a fresh send for this reminder `minutes` from now.
    ///
    /// The new task gets its own timestamped id and a fresh
    /// `scheduled_for`, so it is outside the original occurrence's
    /// cancellation scope.
    pub fn snooze(&self, reminder_id: &Uuid, minutes: u32) -> Result<(), EscalationError> {
        let definition =
            self.store
                .reminder(reminder_id)?
                .ok_or(EscalationError::NotFound {
                    entity: "reminder",
                    id: *reminder_id,
                })?;

        let now = Utc::now();
        let payload = TaskPayload {
            kind: TaskKind::SendMessage,
            reminder_id: definition.id,
            patient_id: definition.patient_id,
            medicine_id: definition.medicine_id,
            scheduled_for: now + chrono::Duration::minutes(i64::from(minutes)),
        };
        let outcome = self.queue.enqueue(
            TaskId::for_snooze(reminder_id, now),
            payload,
            Duration::from_secs(u64::from(minutes) * 60),
        );
        tracing::info!(%reminder_id, minutes, ?outcome, "reminder snoozed");
        Ok(())
    }

    /// Fire a reminder right now with a fresh slot, ignoring its
    /// weekday schedule.
    pub fn trigger_now(&self, reminder_id: &Uuid) -> Result<(), EscalationError> {
        let definition =
            self.store
                .reminder(reminder_id)?
                .ok_or(EscalationError::NotFound {
                    entity: "reminder",
                    id: *reminder_id,
                })?;

        let payload = TaskPayload {
            kind: TaskKind::SendMessage,
            reminder_id: definition.id,
            patient_id: definition.patient_id,
            medicine_id: definition.medicine_id,
            scheduled_for: Utc::now(),
        };
        let outcome = self.queue.enqueue(
            TaskId::for_send(&payload.key()),
            payload,
            Duration::ZERO,
        );
        tracing::info!(%reminder_id, ?outcome, "immediate trigger enqueued");
        Ok(())
    }

    fn schedule_follow_up(&self, payload: &TaskPayload, follow_up: &FollowUp) {
        let key = payload.key();
        let id = match follow_up.kind {
            TaskKind::SendMessage => TaskId::for_send(&key),
            TaskKind::VoiceEscalation => TaskId::for_voice(&key),
            TaskKind::CaregiverAlert => TaskId::for_caregiver(&key),
        };
        let next = TaskPayload {
            kind: follow_up.kind.clone(),
            ..payload.clone()
        };
        let outcome = self.queue.enqueue(id, next, follow_up.delay);
        tracing::debug!(key = %key, kind = follow_up.kind.as_str(), ?outcome, "follow-up scheduled");
    }
}
