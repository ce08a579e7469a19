use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

/// Application-level constants
pub const APP_NAME: &str = "Dosecall";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is not set
pub fn default_log_filter() -> String {
    "dosecall=info".to_string()
}

/// Get the application data directory
/// ~/Dosecall/ on all platforms (user-visible)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Dosecall")
}

/// Default location of the engine database
pub fn database_path() -> PathBuf {
    app_data_dir().join("dosecall.db")
}

/// Timing knobs for the escalation workflow.
///
/// Delays are wall-clock waits between escalation steps; snooze lengths
/// differ per channel because the voice menu promises a 15 minute
/// callback while the message menu promises 10.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wait after the reminder message before placing the voice call.
    pub voice_escalation_delay: Duration,
    /// Wait after the voice call before alerting caregivers.
    pub caregiver_escalation_delay: Duration,
    /// Snooze length when the patient replies "remind me later" by message.
    pub message_snooze_minutes: u32,
    /// Snooze length when the patient asks for a repeat on the call.
    pub voice_snooze_minutes: u32,
    /// Time of day (UTC) the daily planner re-runs.
    pub daily_run_at: NaiveTime,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            voice_escalation_delay: Duration::from_secs(15 * 60),
            caregiver_escalation_delay: Duration::from_secs(15 * 60),
            message_snooze_minutes: 10,
            voice_snooze_minutes: 15,
            // one minute past midnight, clear of the date rollover
            daily_run_at: NaiveTime::from_hms_opt(0, 1, 0).expect("valid time"),
        }
    }
}
