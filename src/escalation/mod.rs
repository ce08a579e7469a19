//! The escalation state machine.
//!
//! A reminder moves through three increasingly urgent channels until the
//! patient responds:
//!
//! ```text
//! PENDING ──send──► SENT ──voice──► VOICE_ESCALATED ──alert──► CAREGIVER_ESCALATED
//!                    │                    │
//!                    └──────confirm───────┴──► CONFIRMED
//!
//! SKIPPED is reachable from any non-terminal status.
//! ```
//!
//! Split in two: [`decision`] is the pure transition table (status +
//! step → proceed or suppress, plus follow-up delays); [`engine`] reads
//! the occurrence, consults the table, performs the transport call and
//! the guarded store write, and schedules the follow-up timer. Every
//! handler re-checks status right before acting, so a task that fires
//! after a confirmation does nothing even when its cancellation lost
//! the race.

pub mod decision;
pub mod engine;
pub mod error;
pub mod messages;

pub use decision::{next_step, FollowUp, StepDecision, StepPlan, SuppressReason};
pub use engine::EscalationEngine;
pub use error::EscalationError;
