//! Timer registry backing the queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::task::{TaskId, TaskPayload};

/// Result of handing a task to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Timer registered.
    Accepted,
    /// A task with this id is already pending; the new one was dropped.
    Duplicate,
}

struct ScheduledTask {
    generation: u64,
    payload: TaskPayload,
    handle: JoinHandle<()>,
}

/// One-shot timers keyed by [`TaskId`].
///
/// Due payloads are pushed into the channel returned by [`new`](Self::new).
/// A task may still come due in the window between a cancel decision and
/// the abort landing; consumers re-check occurrence status before acting,
/// so a late delivery is harmless.
///
/// All methods must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct DelayedTaskQueue {
    tasks: Arc<Mutex<TaskMap>>,
    due_tx: mpsc::UnboundedSender<TaskPayload>,
    next_gen: Arc<AtomicU64>,
}

type TaskMap = HashMap<TaskId, ScheduledTask>;

impl DelayedTaskQueue {
    /// Create a queue and the channel its due payloads drain into.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskPayload>) {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        let queue = Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            due_tx,
            next_gen: Arc::new(AtomicU64::new(0)),
        };
        (queue, due_rx)
    }

    /// Schedule `payload` to come due after `delay`.
    ///
    /// If a task with the same id is still pending the call is a no-op
    /// and returns [`EnqueueOutcome::Duplicate`].
    pub fn enqueue(&self, id: TaskId, payload: TaskPayload, delay: Duration) -> EnqueueOutcome {
        let mut tasks = lock(&self.tasks);
        if tasks.contains_key(&id) {
            tracing::debug!(task_id = %id, "task already scheduled, skipping");
            return EnqueueOutcome::Duplicate;
        }

        let generation = self.next_gen.fetch_add(1, Ordering::SeqCst);
        let registry = Arc::clone(&self.tasks);
        let due_tx = self.due_tx.clone();
        let task_id = id.clone();
        let task_payload = payload.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Deregister first; a missing or replaced entry means this
            // timer was cancelled while waking.
            let fire = {
                let mut tasks = lock(&registry);
                match tasks.get(&task_id) {
                    Some(entry) if entry.generation == generation => {
                        tasks.remove(&task_id);
                        true
                    }
                    _ => false,
                }
            };

            if fire && due_tx.send(task_payload).is_err() {
                tracing::warn!(task_id = %task_id, "task came due but the dispatcher is gone");
            }
        });

        tracing::debug!(task_id = %id, delay_secs = delay.as_secs(), "task scheduled");
        tasks.insert(
            id,
            ScheduledTask {
                generation,
                payload,
                handle,
            },
        );
        EnqueueOutcome::Accepted
    }

    /// Schedule `payload` for a wall-clock instant. Instants at or before
    /// `now` fire immediately.
    pub fn enqueue_at(
        &self,
        id: TaskId,
        payload: TaskPayload,
        when: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EnqueueOutcome {
        let delay = (when - now).to_std().unwrap_or(Duration::ZERO);
        self.enqueue(id, payload, delay)
    }

    /// Abort every pending task the predicate matches. Returns how many
    /// were cancelled.
    pub fn cancel_matching<F>(&self, pred: F) -> usize
    where
        F: Fn(&TaskId, &TaskPayload) -> bool,
    {
        let mut tasks = lock(&self.tasks);
        let matched: Vec<TaskId> = tasks
            .iter()
            .filter(|(id, task)| pred(id, &task.payload))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &matched {
            if let Some(task) = tasks.remove(id) {
                task.handle.abort();
                tracing::debug!(task_id = %id, "task cancelled");
            }
        }
        matched.len()
    }

    /// Abort every pending task for one reminder slot.
    pub fn cancel_for_key(&self, key: &crate::models::OccurrenceKey) -> usize {
        self.cancel_matching(|_, payload| payload.key() == *key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.tasks).len()
    }
}

fn lock(tasks: &Mutex<TaskMap>) -> MutexGuard<'_, TaskMap> {
    // a poisoned registry is still usable
    tasks.lock().unwrap_or_else(|e| e.into_inner())
}
