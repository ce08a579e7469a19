//! In-process delayed task queue.
//!
//! Escalation steps are scheduled as named one-shot timers. Each task
//! carries a [`TaskPayload`] and a deterministic [`TaskId`] derived from
//! the reminder slot, so re-planning the same slot deduplicates instead
//! of double-firing. Due payloads drain through an unbounded channel to
//! the dispatcher.
//!
//! Tasks live in memory only. A restart drops them; the next planner run
//! rebuilds the day's timers from the database.

pub mod delayed;
pub mod task;

pub use delayed::{DelayedTaskQueue, EnqueueOutcome};
pub use task::{TaskId, TaskPayload};
