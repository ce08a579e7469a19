//! Outbound message bodies.
//!
//! English-only, channel-agnostic plain text. The digit menu here must
//! stay in step with the parsing in [`crate::inbound`].

use chrono::{DateTime, Utc};

use crate::config::APP_NAME;

/// The reminder prompt with the 1/2/3 reply menu.
pub fn reminder_prompt(medicine_name: &str, dosage: &str, snooze_minutes: u32) -> String {
    format!(
        "⏰ Medicine Reminder\n\n\
         💊 {medicine_name}\n\
         📋 Dosage: {dosage}\n\n\
         Have you taken your medicine?\n\n\
         Reply with:\n\
         1 - Yes, taken\n\
         2 - Remind me in {snooze_minutes} min\n\
         3 - Skip this dose\n\n\
         Just type the number (1, 2, or 3)"
    )
}

/// Alert sent to each opted-in caregiver after the ladder is exhausted.
pub fn caregiver_alert(
    patient_name: &str,
    medicine_name: &str,
    dosage: &str,
    scheduled_for: &DateTime<Utc>,
) -> String {
    format!(
        "🚨 Medicine Alert\n\n\
         {patient_name} has NOT confirmed taking:\n\n\
         💊 {medicine_name}\n\
         📋 Dosage: {dosage}\n\
         ⏰ Scheduled: {} UTC\n\n\
         Please check on them!\n\n\
         - {APP_NAME}",
        scheduled_for.format("%H:%M")
    )
}

/// One-shot refill nudge when stock crosses the threshold.
pub fn low_stock_alert(medicine_name: &str, remaining: i64) -> String {
    format!(
        "⚠️ Low Stock Alert\n\n\
         Your supply of {medicine_name} is running low ({remaining} remaining).\n\
         Please refill your prescription soon to avoid missing doses.\n\n\
         - {APP_NAME}"
    )
}

pub fn taken_ack() -> &'static str {
    "✅ Great job!\n\nMedicine marked as taken.\nStay healthy!"
}

pub fn snoozed_ack(minutes: u32) -> String {
    format!("⏰ Reminder snoozed.\n\nI'll remind you again in {minutes} minutes.")
}

pub fn skipped_ack() -> &'static str {
    "❌ Dose skipped.\n\nMarked as skipped.\nPlease try to take it when you can."
}
