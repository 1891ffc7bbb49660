use crate::models::audio_info::AudioInfo;
use crate::processing::ring_buffer::BufferRead;

/// Consumer-facing view of a running capture.
///
/// Lets readers hold a `Box<dyn AudioCapture>` without naming the platform
/// backend. None of these calls block beyond a short lock.
pub trait AudioCapture: Send + Sync {
    /// Negotiated stream format.
    fn info(&self) -> AudioInfo;

    /// Copy up to `dest.len()` buffered bytes, returning the count and the
    /// capture time of the first byte.
    fn read(&self, dest: &mut [u8]) -> BufferRead;

    /// Reposition the reader to the buffered byte closest to `time`.
    fn jump_to_time(&self, time: f64);

    /// Discard everything buffered and not yet read.
    fn flush(&self);
}
