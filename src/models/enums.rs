use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(OccurrenceStatus {
    Pending => "pending",
    Sent => "sent",
    Confirmed => "confirmed",
    VoiceEscalated => "voice_escalated",
    CaregiverEscalated => "caregiver_escalated",
    Skipped => "skipped",
});

impl OccurrenceStatus {
    /// Terminal statuses accept no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::CaregiverEscalated | Self::Skipped
        )
    }
}

str_enum!(ConfirmationSource {
    Message => "message",
    Voice => "voice",
});

str_enum!(VoiceCallStatus {
    Initiated => "initiated",
    Completed => "completed",
    Failed => "failed",
    NoAnswer => "no_answer",
});

str_enum!(TaskKind {
    SendMessage => "send_message",
    VoiceEscalation => "voice_escalation",
    CaregiverAlert => "caregiver_alert",
});
