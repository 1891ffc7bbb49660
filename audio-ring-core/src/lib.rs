//! # audio-ring-core
//!
//! Platform-agnostic audio capture core library.
//!
//! Captures one device into a bounded, timestamped ring buffer that a
//! consumer drains at its own pace. Any buffered byte maps back to the device
//! time it was captured at, which allows seeking the reader by time.
//! Platform-specific backends (Windows WASAPI) implement the `CaptureHost` and
//! `CaptureBackend` traits and plug into the generic `CaptureSession`.
//!
//! ## Architecture
//!
//! ```text
//! audio-ring-core (this crate)
//! ├── traits/       ← CaptureBackend, CaptureHost, KeepAliveStream, CaptureDelegate, AudioCapture
//! ├── models/       ← AudioInfo, DeviceCatalog, CaptureError, SessionState, CaptureConfiguration
//! ├── processing/   ← TimestampedRingBuffer
//! └── session/      ← CaptureSession (polling loop + consumer API)
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_info::{AudioInfo, SampleFormat};
pub use models::config::{CaptureConfiguration, StreamFailurePolicy};
pub use models::device::{AudioDevice, DeviceCatalog, DeviceFlow};
pub use models::diagnostics::CaptureDiagnostics;
pub use models::error::CaptureError;
pub use models::state::SessionState;
pub use processing::ring_buffer::{BufferRead, RingCursors, TimestampedRingBuffer};
pub use session::capture::CaptureSession;
pub use traits::audio_capture::AudioCapture;
pub use traits::capture_backend::{AudioPacket, CaptureBackend};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_host::CaptureHost;
pub use traits::keep_alive::KeepAliveStream;
