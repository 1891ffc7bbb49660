use thiserror::Error;

use audio_ring_core::models::error::CaptureError;

/// A failed WASAPI/COM call, with the call that produced it.
#[derive(Debug, Error)]
#[error("{call} failed: {source}")]
pub struct WasapiError {
    pub call: &'static str,
    pub source: windows::core::Error,
}

/// Attach the failing call name and classify the failure for the core.
pub(crate) trait WasapiResultExt<T> {
    /// Failure while negotiating or opening: fatal to the session.
    fn device_call(self, call: &'static str) -> Result<T, CaptureError>;

    /// Failure while the polling loop is running.
    fn stream_call(self, call: &'static str) -> Result<T, CaptureError>;
}

impl<T> WasapiResultExt<T> for windows::core::Result<T> {
    fn device_call(self, call: &'static str) -> Result<T, CaptureError> {
        self.map_err(|source| CaptureError::DeviceFailure(WasapiError { call, source }.to_string()))
    }

    fn stream_call(self, call: &'static str) -> Result<T, CaptureError> {
        self.map_err(|source| CaptureError::StreamFailure(WasapiError { call, source }.to_string()))
    }
}
