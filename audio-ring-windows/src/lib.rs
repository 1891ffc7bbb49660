//! # audio-ring-windows
//!
//! Windows WASAPI backend for audio-ring.
//!
//! Provides:
//! - `WasapiHost`: endpoint enumeration via the MMDevice API, implements `CaptureHost`
//! - `WasapiCapture`: shared-mode capture of a microphone, or loopback capture
//!   of an output endpoint, implements `CaptureBackend`
//! - `SilentRenderStream`: silent playback that keeps a loopback endpoint running
//! - `format`: mix-format checks and `REFERENCE_TIME` conversions (all platforms)
//!
//! ## Platform Requirements
//! - Windows 8+ for `CoIncrementMTAUsage`
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use audio_ring_core::{CaptureConfiguration, CaptureHost, CaptureSession};
//! use audio_ring_windows::WasapiHost;
//!
//! let host = WasapiHost::new()?;
//! let catalog = host.enumerate_devices()?;
//! for (i, name) in catalog.display_names().iter().enumerate() {
//!     println!("{i}: {name}");
//! }
//!
//! let mut session = CaptureSession::from_catalog(&host, &catalog, CaptureConfiguration::default())?;
//! session.start()?;
//!
//! let mut chunk = vec![0u8; 4096];
//! let read = session.read(&mut chunk);
//! println!("{} bytes captured at {:.3}s", read.bytes, read.time);
//! ```

pub mod format;

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod error;
#[cfg(target_os = "windows")]
pub mod host;
#[cfg(target_os = "windows")]
pub mod keep_alive;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;

#[cfg(target_os = "windows")]
pub use error::WasapiError;
#[cfg(target_os = "windows")]
pub use host::WasapiHost;
#[cfg(target_os = "windows")]
pub use keep_alive::SilentRenderStream;
#[cfg(target_os = "windows")]
pub use wasapi_capture::WasapiCapture;
