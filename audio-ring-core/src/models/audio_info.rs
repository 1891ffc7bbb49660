use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Sample encoding delivered by the device collaborator.
///
/// Only interleaved 32-bit float is supported; anything else is rejected
/// during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    F32,
}

impl SampleFormat {
    /// Size of one sample of one channel, in bytes.
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            Self::F32 => 4,
        }
    }
}

/// Negotiated stream format, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    /// `channels * format.bytes_per_sample()`.
    pub bytes_per_frame: u32,
}

impl AudioInfo {
    pub fn new(format: SampleFormat, channels: u16, sample_rate: u32) -> Self {
        Self {
            format,
            channels,
            sample_rate,
            bytes_per_frame: channels as u32 * format.bytes_per_sample(),
        }
    }

    /// Shorthand for the only format the core accepts.
    pub fn f32(channels: u16, sample_rate: u32) -> Self {
        Self::new(SampleFormat::F32, channels, sample_rate)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.bytes_per_frame as u64
    }

    pub fn frames_to_secs(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.channels == 0 {
            return Err(CaptureError::UnsupportedFormat("zero channels".into()));
        }
        if self.sample_rate == 0 {
            return Err(CaptureError::UnsupportedFormat("zero sample rate".into()));
        }
        if self.bytes_per_frame != self.channels as u32 * self.format.bytes_per_sample() {
            return Err(CaptureError::UnsupportedFormat(format!(
                "frame size {} does not match {} x {:?}",
                self.bytes_per_frame, self.channels, self.format
            )));
        }
        Ok(())
    }
}
