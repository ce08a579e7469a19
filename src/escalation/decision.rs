//! Pure transition table for the escalation ladder.
//!
//! No storage, no transports, no clock: given the occurrence's current
//! status and the step that just came due, decide whether to act and
//! what to schedule next. The engine owns all side effects.

use std::time::Duration;

use crate::config::EngineConfig;
use crate::models::enums::{OccurrenceStatus, TaskKind};

/// Next timer to arm after a step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub kind: TaskKind,
    pub delay: Duration,
}

/// How to carry out a step that is allowed to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    /// Status the guarded write moves the occurrence to.
    pub next_status: OccurrenceStatus,
    /// Scheduled when the transport delivered.
    pub follow_up: Option<FollowUp>,
    /// Scheduled when the transport failed. Failure accelerates the
    /// ladder instead of aborting it.
    pub follow_up_on_failure: Option<FollowUp>,
}

/// Why a step must not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressReason {
    /// The occurrence already reached a terminal status.
    Terminal(OccurrenceStatus),
    /// The step does not apply to the current status (stale or
    /// double-fired timer).
    OutOfOrder {
        status: OccurrenceStatus,
        step: TaskKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDecision {
    Proceed(StepPlan),
    Suppress(SuppressReason),
}

/// The transition table.
///
/// | status | step | outcome |
/// |---|---|---|
/// | pending | send-message | → sent, voice follow-up |
/// | sent | voice-escalation | → voice_escalated, caregiver follow-up |
/// | sent, voice_escalated | caregiver-alert | → caregiver_escalated, done |
/// | terminal | any | suppressed |
/// | anything else | any | suppressed (out of order) |
pub fn next_step(
    status: &OccurrenceStatus,
    step: &TaskKind,
    config: &EngineConfig,
) -> StepDecision {
    if status.is_terminal() {
        return StepDecision::Suppress(SuppressReason::Terminal(status.clone()));
    }

    match (status, step) {
        (OccurrenceStatus::Pending, TaskKind::SendMessage) => StepDecision::Proceed(StepPlan {
            next_status: OccurrenceStatus::Sent,
            follow_up: Some(FollowUp {
                kind: TaskKind::VoiceEscalation,
                delay: config.voice_escalation_delay,
            }),
            follow_up_on_failure: Some(FollowUp {
                kind: TaskKind::VoiceEscalation,
                delay: Duration::ZERO,
            }),
        }),

        (OccurrenceStatus::Sent, TaskKind::VoiceEscalation) => StepDecision::Proceed(StepPlan {
            next_status: OccurrenceStatus::VoiceEscalated,
            follow_up: Some(FollowUp {
                kind: TaskKind::CaregiverAlert,
                delay: config.caregiver_escalation_delay,
            }),
            follow_up_on_failure: Some(FollowUp {
                kind: TaskKind::CaregiverAlert,
                delay: Duration::ZERO,
            }),
        }),

        (
            OccurrenceStatus::Sent | OccurrenceStatus::VoiceEscalated,
            TaskKind::CaregiverAlert,
        ) => StepDecision::Proceed(StepPlan {
            next_status: OccurrenceStatus::CaregiverEscalated,
            follow_up: None,
            follow_up_on_failure: None,
        }),

        (status, step) => StepDecision::Suppress(SuppressReason::OutOfOrder {
            status: status.clone(),
            step: step.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            voice_escalation_delay: Duration::from_secs(900),
            caregiver_escalation_delay: Duration::from_secs(600),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn send_from_pending_schedules_voice() {
        let decision = next_step(
            &OccurrenceStatus::Pending,
            &TaskKind::SendMessage,
            &config(),
        );

        let StepDecision::Proceed(plan) = decision else {
            panic!("send from pending must proceed");
        };
        assert_eq!(plan.next_status, OccurrenceStatus::Sent);
        assert_eq!(
            plan.follow_up,
            Some(FollowUp {
                kind: TaskKind::VoiceEscalation,
                delay: Duration::from_secs(900),
            })
        );
    }

    #[test]
    fn failed_send_brings_voice_forward() {
        let StepDecision::Proceed(plan) = next_step(
            &OccurrenceStatus::Pending,
            &TaskKind::SendMessage,
            &config(),
        ) else {
            panic!("send from pending must proceed");
        };

        assert_eq!(
            plan.follow_up_on_failure,
            Some(FollowUp {
                kind: TaskKind::VoiceEscalation,
                delay: Duration::ZERO,
            })
        );
    }

    #[test]
    fn voice_from_sent_schedules_caregiver_alert() {
        let StepDecision::Proceed(plan) = next_step(
            &OccurrenceStatus::Sent,
            &TaskKind::VoiceEscalation,
            &config(),
        ) else {
            panic!("voice from sent must proceed");
        };

        assert_eq!(plan.next_status, OccurrenceStatus::VoiceEscalated);
        assert_eq!(
            plan.follow_up,
            Some(FollowUp {
                kind: TaskKind::CaregiverAlert,
                delay: Duration::from_secs(600),
            })
        );
        assert_eq!(
            plan.follow_up_on_failure.map(|f| f.delay),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn caregiver_alert_is_the_last_step() {
        for status in [OccurrenceStatus::Sent, OccurrenceStatus::VoiceEscalated] {
            let StepDecision::Proceed(plan) =
                next_step(&status, &TaskKind::CaregiverAlert, &config())
            else {
                panic!("caregiver alert from {status:?} must proceed");
            };
            assert_eq!(plan.next_status, OccurrenceStatus::CaregiverEscalated);
            assert!(plan.follow_up.is_none());
            assert!(plan.follow_up_on_failure.is_none());
        }
    }

    #[test]
    fn terminal_statuses_suppress_every_step() {
        let terminal = [
            OccurrenceStatus::Confirmed,
            OccurrenceStatus::CaregiverEscalated,
            OccurrenceStatus::Skipped,
        ];
        let steps = [
            TaskKind::SendMessage,
            TaskKind::VoiceEscalation,
            TaskKind::CaregiverAlert,
        ];

        for status in &terminal {
            for step in &steps {
                assert_eq!(
                    next_step(status, step, &config()),
                    StepDecision::Suppress(SuppressReason::Terminal(status.clone())),
                    "{status:?} must suppress {step:?}"
                );
            }
        }
    }

    #[test]
    fn out_of_order_steps_are_suppressed() {
        let stale = [
            (OccurrenceStatus::Pending, TaskKind::VoiceEscalation),
            (OccurrenceStatus::Pending, TaskKind::CaregiverAlert),
            (OccurrenceStatus::Sent, TaskKind::SendMessage),
            (OccurrenceStatus::VoiceEscalated, TaskKind::SendMessage),
            (OccurrenceStatus::VoiceEscalated, TaskKind::VoiceEscalation),
        ];

        for (status, step) in stale {
            let decision = next_step(&status, &step, &config());
            assert_eq!(
                decision,
                StepDecision::Suppress(SuppressReason::OutOfOrder {
                    status: status.clone(),
                    step: step.clone(),
                }),
                "{status:?} + {step:?} must be suppressed"
            );
        }
    }
}
