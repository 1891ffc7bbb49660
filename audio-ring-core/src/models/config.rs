use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// What the polling loop does when the device fails mid-stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFailurePolicy {
    /// Record the error, move the session to `Stopped` and end the loop.
    /// Data already buffered stays readable.
    #[default]
    Stop,
    /// Log the error and abort the process.
    Abort,
}

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Index into the [`DeviceCatalog`](crate::models::device::DeviceCatalog)
    /// (default: 0, the default output).
    pub device_index: usize,

    /// Requested device buffer duration in seconds (default: 0.02).
    /// The polling loop wakes every half of the buffer the device grants.
    pub buffer_duration_secs: f64,

    /// Ring buffer length in seconds of audio (default: 1.0).
    pub ring_duration_secs: f64,

    /// Behavior on mid-stream device errors (default: stop).
    pub failure_policy: StreamFailurePolicy,
}

/// Longest buffer or ring duration a configuration may ask for.
pub const MAX_DURATION_SECS: f64 = 3600.0;

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        check_duration("buffer", self.buffer_duration_secs)?;
        check_duration("ring", self.ring_duration_secs)?;
        if self.ring_duration_secs < self.buffer_duration_secs {
            return Err(format!(
                "ring duration {}s is shorter than the device buffer {}s",
                self.ring_duration_secs, self.buffer_duration_secs
            ));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("invalid configuration: {}", e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    /// Requested device buffer. Zero if the configuration does not validate.
    pub fn buffer_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.buffer_duration_secs).unwrap_or_default()
    }

    /// Ring capacity in whole frames for the given sample rate, at least one.
    pub fn ring_frames(&self, sample_rate: u32) -> u64 {
        ((self.ring_duration_secs * sample_rate as f64).round() as u64).max(1)
    }
}

fn check_duration(what: &str, secs: f64) -> Result<(), String> {
    if !(secs > 0.0) {
        return Err(format!("{} duration must be positive", what));
    }
    if !secs.is_finite() || secs > MAX_DURATION_SECS {
        return Err(format!(
            "{} duration {}s exceeds the {}s limit",
            what, secs, MAX_DURATION_SECS
        ));
    }
    Ok(())
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            device_index: 0,
            buffer_duration_secs: 0.02,
            ring_duration_secs: 1.0,
            failure_policy: StreamFailurePolicy::Stop,
        }
    }
}
