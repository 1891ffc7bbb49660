use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// Event delegate for capture session notifications.
///
/// State changes caused by the consumer are reported on the consumer's
/// thread; stream failures are reported from the polling thread.
/// Implementations must not call back into the session.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &SessionState);

    /// Called when the device fails while the polling loop is running.
    fn on_error(&self, error: &CaptureError);
}
