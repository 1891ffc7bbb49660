use thiserror::Error;

/// Errors that can occur while setting up or running a capture session.
///
/// The ring buffer itself never fails; every variant here originates from
/// the device collaborator or from misuse of the session state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Format negotiation or stream open failed. Fatal to session construction.
    #[error("device failure: {0}")]
    DeviceFailure(String),

    /// The device reported an error while the polling loop was running.
    #[error("stream failure: {0}")]
    StreamFailure(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("no device at catalog index {0}")]
    DeviceNotFound(usize),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),
}

impl CaptureError {
    /// Whether this error came from the steady-state polling loop.
    pub fn is_stream_failure(&self) -> bool {
        matches!(self, Self::StreamFailure(_))
    }
}
