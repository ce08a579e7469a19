//! Mapping of patient replies onto workflow actions.
//!
//! Both menus are numeric, but they are not the same menu: the message
//! prompt offers snooze on 2 and skip on 3, while the voice call offers
//! skip on 2 and a later retry on 3. Keep these tables in step with the
//! texts in [`crate::escalation::messages`].

/// What the patient asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAction {
    Confirm,
    Snooze,
    Skip,
}

/// Parse a free-text message reply. The menu asks for a bare digit, so
/// whitespace is forgiven and anything else means "not understood".
pub fn parse_message_reply(text: &str) -> Option<ReplyAction> {
    match text.trim() {
        "1" => Some(ReplyAction::Confirm),
        "2" => Some(ReplyAction::Snooze),
        "3" => Some(ReplyAction::Skip),
        _ => None,
    }
}

/// Parse a single IVR keypress.
pub fn parse_voice_keypress(digit: char) -> Option<ReplyAction> {
    match digit {
        '1' => Some(ReplyAction::Confirm),
        '2' => Some(ReplyAction::Skip),
        '3' => Some(ReplyAction::Snooze),
        _ => None,
    }
}
