//! Daily planning of reminder send tasks.
//!
//! Once a day (and once at startup) every active definition is checked
//! against today's weekday and its send task is armed for the slot's
//! wall-clock time. Planning is idempotent: a slot that already has an
//! occurrence row or a pending timer is left alone, so restarts and
//! repeated runs never double-fire.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::db::DatabaseError;
use crate::models::enums::TaskKind;
use crate::models::{OccurrenceKey, ReminderDefinition};
use crate::queue::{DelayedTaskQueue, EnqueueOutcome, TaskId, TaskPayload};
use crate::store::WorkflowStore;

/// What the planner decided for one definition on one day.
enum Planned {
    Enqueued,
    OffDay,
    Past,
    AlreadyHandled,
    Duplicate,
}

/// Counts from one planning run, for the startup log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Definitions whose weekday set includes today.
    pub due_today: usize,
    pub enqueued: usize,
    /// Slot time already behind `now`.
    pub skipped_past: usize,
    /// Slot already has an occurrence row.
    pub skipped_existing: usize,
    /// Timer was already pending for the slot.
    pub duplicates: usize,
}

#[derive(Clone)]
pub struct DailyScheduler {
    store: Arc<dyn WorkflowStore>,
    queue: DelayedTaskQueue,
}

impl DailyScheduler {
    pub fn new(store: Arc<dyn WorkflowStore>, queue: DelayedTaskQueue) -> Self {
        Self { store, queue }
    }

    /// Plan send tasks for every active definition due today.
    pub fn run(&self, now: DateTime<Utc>) -> Result<ScheduleSummary, DatabaseError> {
        let mut summary = ScheduleSummary::default();
        for definition in self.store.active_reminders()? {
            match self.plan_slot(&definition, now)? {
                Planned::OffDay => continue,
                Planned::Enqueued => {
                    summary.due_today += 1;
                    summary.enqueued += 1;
                }
                Planned::Past => {
                    summary.due_today += 1;
                    summary.skipped_past += 1;
                }
                Planned::AlreadyHandled => {
                    summary.due_today += 1;
                    summary.skipped_existing += 1;
                }
                Planned::Duplicate => {
                    summary.due_today += 1;
                    summary.duplicates += 1;
                }
            }
        }
        tracing::info!(
            due = summary.due_today,
            enqueued = summary.enqueued,
            skipped_past = summary.skipped_past,
            skipped_existing = summary.skipped_existing,
            duplicates = summary.duplicates,
            "daily schedule planned"
        );
        Ok(summary)
    }

    /// Arm today's slot for a single definition. Returns true when a
    /// timer was registered, false when today's slot is off-day, past,
    /// or already covered.
    pub fn schedule_definition(
        &self,
        definition: &ReminderDefinition,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        Ok(matches!(
            self.plan_slot(definition, now)?,
            Planned::Enqueued
        ))
    }

    fn plan_slot(
        &self,
        definition: &ReminderDefinition,
        now: DateTime<Utc>,
    ) -> Result<Planned, DatabaseError> {
        if !definition.is_active || !definition.days_of_week.contains(now.weekday()) {
            return Ok(Planned::OffDay);
        }

        let scheduled_for = now.date_naive().and_time(definition.time_of_day).and_utc();
        if scheduled_for <= now {
            tracing::debug!(reminder_id = %definition.id, %scheduled_for, "slot already past");
            return Ok(Planned::Past);
        }

        let key = OccurrenceKey::new(definition.id, scheduled_for);
        if self.store.slot_already_handled(&key)? {
            tracing::debug!(key = %key, "slot already has an occurrence");
            return Ok(Planned::AlreadyHandled);
        }

        let payload = TaskPayload {
            kind: TaskKind::SendMessage,
            reminder_id: definition.id,
            patient_id: definition.patient_id,
            medicine_id: definition.medicine_id,
            scheduled_for,
        };
        match self
            .queue
            .enqueue_at(TaskId::for_send(&key), payload, scheduled_for, now)
        {
            EnqueueOutcome::Accepted => Ok(Planned::Enqueued),
            EnqueueOutcome::Duplicate => Ok(Planned::Duplicate),
        }
    }

    /// Spawn the midnight re-planner. It sleeps until the next `at`
    /// (UTC), runs the planner, and re-arms for the following day.
    pub fn spawn_daily_loop(&self, at: NaiveTime) -> SchedulerLoop {
        let scheduler = self.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_run_after(now, at);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    // shutdown wins over a timer that is also ready
                    biased;
                    _ = &mut shutdown_rx => {
                        tracing::info!("daily scheduler stopped");
                        break;
                    }
                    () = tokio::time::sleep(wait) => {
                        match scheduler.run(Utc::now()) {
                            Ok(summary) => {
                                tracing::info!(enqueued = summary.enqueued, "midnight re-plan done")
                            }
                            Err(e) => tracing::error!("Daily scheduling failed: {e}"),
                        }
                    }
                }
            }
        });
        SchedulerLoop {
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }
}

/// Next wall-clock instant of `at` strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Handle to the spawned midnight re-planner.
pub struct SchedulerLoop {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SchedulerLoop {
    /// Signal the loop to stop. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("daily scheduler shutdown signal sent");
        }
    }

    /// Wait for the loop task to finish.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
