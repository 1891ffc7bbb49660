//! Platform-independent pieces of WASAPI format negotiation.
//!
//! WASAPI measures durations in `REFERENCE_TIME` (100 ns units) and reports
//! the shared-mode mix format as a `WAVEFORMATEX`/`WAVEFORMATEXTENSIBLE`.
//! The FFI side copies the relevant fields into [`MixFormatDesc`]; the checks
//! here decide whether the core can consume the stream.

use std::time::Duration;

use audio_ring_core::models::audio_info::AudioInfo;
use audio_ring_core::models::error::CaptureError;

/// `REFERENCE_TIME` units per second.
pub const REFTIMES_PER_SEC: i64 = 10_000_000;

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// `SubFormat` GUID of an extensible format, reduced to what matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubFormat {
    IeeeFloat,
    Pcm,
    Other,
}

/// Fields copied out of a device mix format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixFormatDesc {
    pub tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub block_align: u16,
    /// Present only for `WAVE_FORMAT_EXTENSIBLE`.
    pub sub_format: Option<SubFormat>,
}

impl MixFormatDesc {
    fn is_float(&self) -> bool {
        match self.tag {
            WAVE_FORMAT_EXTENSIBLE => self.sub_format == Some(SubFormat::IeeeFloat),
            WAVE_FORMAT_IEEE_FLOAT => true,
            _ => false,
        }
    }
}

/// Accept the mix format if it is interleaved 32-bit float.
pub fn negotiated_info(desc: &MixFormatDesc) -> Result<AudioInfo, CaptureError> {
    if !desc.is_float() || desc.bits_per_sample != 32 {
        return Err(CaptureError::UnsupportedFormat(format!(
            "mix format tag {:#06x} ({:?}) with {} bits per sample is not 32-bit float",
            desc.tag, desc.sub_format, desc.bits_per_sample
        )));
    }

    let info = AudioInfo::f32(desc.channels, desc.sample_rate);
    info.validate()?;
    if info.bytes_per_frame != desc.block_align as u32 {
        return Err(CaptureError::UnsupportedFormat(format!(
            "block align {} does not match {} channels of f32",
            desc.block_align, desc.channels
        )));
    }
    Ok(info)
}

pub fn to_reference_time(duration: Duration) -> i64 {
    (duration.as_secs_f64() * REFTIMES_PER_SEC as f64).round() as i64
}

/// Convert a QPC position reported by `IAudioCaptureClient::GetBuffer`
/// (already scaled to 100 ns units) to seconds.
pub fn qpc_position_secs(position: u64) -> f64 {
    position as f64 / REFTIMES_PER_SEC as f64
}

/// Duration of a device buffer of `frames` frames.
pub fn buffer_duration(frames: u32, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensible_float(channels: u16, sample_rate: u32) -> MixFormatDesc {
        MixFormatDesc {
            tag: WAVE_FORMAT_EXTENSIBLE,
            channels,
            sample_rate,
            bits_per_sample: 32,
            block_align: channels * 4,
            sub_format: Some(SubFormat::IeeeFloat),
        }
    }

    #[test]
    fn accepts_extensible_float() {
        let info = negotiated_info(&extensible_float(2, 48000)).unwrap();

        assert_eq!(info, AudioInfo::f32(2, 48000));
        assert_eq!(info.bytes_per_frame, 8);
    }

    #[test]
    fn accepts_plain_float_tag() {
        let desc = MixFormatDesc {
            tag: WAVE_FORMAT_IEEE_FLOAT,
            sub_format: None,
            ..extensible_float(1, 44100)
        };

        assert_eq!(negotiated_info(&desc).unwrap().channels, 1);
    }

    #[test]
    fn rejects_integer_formats() {
        let pcm = MixFormatDesc {
            sub_format: Some(SubFormat::Pcm),
            ..extensible_float(2, 48000)
        };
        assert!(matches!(negotiated_info(&pcm), Err(CaptureError::UnsupportedFormat(_))));

        let plain_pcm = MixFormatDesc {
            tag: WAVE_FORMAT_PCM,
            bits_per_sample: 16,
            block_align: 4,
            sub_format: None,
            ..extensible_float(2, 48000)
        };
        assert!(negotiated_info(&plain_pcm).is_err());
    }

    #[test]
    fn rejects_float64_and_bad_alignment() {
        let double = MixFormatDesc {
            bits_per_sample: 64,
            block_align: 16,
            ..extensible_float(2, 48000)
        };
        assert!(negotiated_info(&double).is_err());

        let misaligned = MixFormatDesc {
            block_align: 6,
            ..extensible_float(2, 48000)
        };
        assert!(negotiated_info(&misaligned).is_err());
    }

    #[test]
    fn reference_time_conversions() {
        assert_eq!(to_reference_time(Duration::from_millis(20)), 200_000);
        assert_eq!(qpc_position_secs(15_000_000), 1.5);
        assert_eq!(buffer_duration(960, 48000), Duration::from_millis(20));
        assert_eq!(buffer_duration(960, 0), Duration::ZERO);
    }
}
