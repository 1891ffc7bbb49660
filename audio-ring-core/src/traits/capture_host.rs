use crate::models::config::CaptureConfiguration;
use crate::models::device::{AudioDevice, DeviceCatalog};
use crate::models::error::CaptureError;

use super::capture_backend::CaptureBackend;

/// Entry point of a platform backend: lists endpoints and opens one of them.
pub trait CaptureHost {
    type Backend: CaptureBackend + 'static;

    /// Enumerate the endpoints available right now.
    fn enumerate_devices(&self) -> Result<DeviceCatalog, CaptureError>;

    /// Create a backend bound to `device`. No stream is started yet.
    fn open_device(
        &self,
        device: &AudioDevice,
        config: &CaptureConfiguration,
    ) -> Result<Self::Backend, CaptureError>;
}
