use std::time::Duration;

use crate::models::audio_info::AudioInfo;
use crate::models::error::CaptureError;

/// One batch of interleaved frames pulled from the device.
#[derive(Debug, Clone, Copy)]
pub struct AudioPacket<'a> {
    /// Interleaved samples in the negotiated format. For silent packets the
    /// contents are unspecified; only the length matters.
    pub data: &'a [u8],
    pub frames: u32,
    /// Device time of the first frame, in seconds.
    pub capture_time: f64,
    /// The device flagged this packet as silence.
    pub silent: bool,
}

/// Platform-specific audio stream driven by a [`CaptureSession`](crate::session::capture::CaptureSession).
///
/// Implemented by:
/// - `WasapiBackend` (Windows)
///
/// The session calls `negotiate_format` once on the constructing thread,
/// then moves the backend onto its polling thread, which calls
/// `poll_packets` once per wake cycle. `open_stream` and `close_stream`
/// are called with the polling thread running and after it has been
/// joined, respectively.
pub trait CaptureBackend: Send {
    /// Negotiate the stream format. Must yield interleaved `f32`.
    fn negotiate_format(&mut self) -> Result<AudioInfo, CaptureError>;

    /// Start producing packets. `is_loopback` selects recording what a
    /// render endpoint plays rather than a microphone.
    fn open_stream(&mut self, is_loopback: bool) -> Result<(), CaptureError>;

    /// Hand every currently available packet to `sink`, in capture order.
    ///
    /// Must not block. Returns the number of packets delivered, possibly zero.
    fn poll_packets(&mut self, sink: &mut dyn FnMut(AudioPacket<'_>)) -> Result<usize, CaptureError>;

    /// Stop the stream and release device resources. Safe to call repeatedly,
    /// including when `open_stream` was never called or failed.
    fn close_stream(&mut self);

    /// Hardware buffer length granted during negotiation.
    fn buffer_duration(&self) -> Duration;
}
