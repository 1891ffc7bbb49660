use super::error::CaptureError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// created → running → stopped
///    ↓                   ↑
///    └───────────────────┘
/// ```
/// `Stopped` is terminal. It carries the error that ended the session when
/// the stream failed to open or failed mid-run.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Created,
    Running,
    Stopped { error: Option<CaptureError> },
}

impl SessionState {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// The failure that stopped the session, if any.
    pub fn error(&self) -> Option<&CaptureError> {
        match self {
            Self::Stopped { error } => error.as_ref(),
            _ => None,
        }
    }
}
