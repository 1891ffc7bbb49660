use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Counters maintained by the polling loop, for debugging capture sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureDiagnostics {
    pub session_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub wake_cycles: u64,
    pub packets: u64,
    pub silent_packets: u64,
    pub bytes_captured: u64,
    /// Unread bytes discarded because the consumer fell behind.
    pub bytes_overrun: u64,
}

impl CaptureDiagnostics {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: None,
            wake_cycles: 0,
            packets: 0,
            silent_packets: 0,
            bytes_captured: 0,
            bytes_overrun: 0,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for CaptureDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}
