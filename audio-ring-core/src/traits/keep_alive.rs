use crate::models::error::CaptureError;

/// Keeps a render endpoint running while it is captured through loopback.
///
/// Some platforms deliver no loopback packets while nothing is playing. A
/// keep-alive stream plays silence on the same endpoint for the lifetime of
/// the capture. Backends open it before their capture stream and close it
/// after.
pub trait KeepAliveStream: Send {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop playback. Safe to call repeatedly.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}
