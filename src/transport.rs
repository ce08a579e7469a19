//! Outbound transports: text messages and automated voice calls.
//!
//! The escalation engine only sees these traits. Production wires real
//! providers behind them; tests use the recording mocks below.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

/// Provider-side identifier of a placed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an automated call reads out before collecting a keypress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallScript {
    pub reminder_id: Uuid,
    pub patient_name: String,
    pub medicine_name: String,
    pub dosage: String,
}

/// Sends text messages. Returns whether the provider accepted the message.
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, recipient: &str, text: &str) -> bool;
}

/// Places automated voice calls. `None` means the call never went out.
#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    async fn place_call(&self, recipient: &str, script: &CallScript) -> Option<CallId>;
}

/// Recording messenger for tests; no provider account required.
#[derive(Default)]
pub struct MockMessenger {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send report failure.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every (recipient, text) pair handed to this messenger, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Messenger for MockMessenger {
    async fn send_message(&self, recipient: &str, text: &str) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((recipient.to_string(), text.to_string()));
        true
    }
}

/// Recording dialer for tests; hands out sequential call ids.
#[derive(Default)]
pub struct MockDialer {
    calls: Mutex<Vec<(String, CallScript)>>,
    failing: AtomicBool,
    counter: AtomicU64,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail to go out.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every (recipient, script) pair this dialer was asked to call.
    pub fn calls(&self) -> Vec<(String, CallScript)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Dialer for MockDialer {
    async fn place_call(&self, recipient: &str, script: &CallScript) -> Option<CallId> {
        if self.failing.load(Ordering::SeqCst) {
            return None;
        }
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((recipient.to_string(), script.clone()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Some(CallId::new(format!("mock-call-{n}")))
    }
}
