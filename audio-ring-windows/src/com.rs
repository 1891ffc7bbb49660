//! COM apartment and memory helpers shared by the WASAPI types.

use std::ffi::c_void;
use std::sync::Arc;

use windows::core::PWSTR;
use windows::Win32::Media::Audio::{IAudioClient, WAVEFORMATEX, WAVEFORMATEXTENSIBLE};
use windows::Win32::Media::KernelStreaming::KSDATAFORMAT_SUBTYPE_PCM;
use windows::Win32::Media::Multimedia::KSDATAFORMAT_SUBTYPE_IEEE_FLOAT;
use windows::Win32::System::Com::{CoDecrementMTAUsage, CoIncrementMTAUsage, CoTaskMemFree, CO_MTA_USAGE_COOKIE};

use audio_ring_core::models::error::CaptureError;

use crate::error::WasapiResultExt;
use crate::format::{MixFormatDesc, SubFormat, WAVE_FORMAT_EXTENSIBLE};

/// Keeps the process-wide multithreaded apartment alive while held.
///
/// Threads that never initialized COM run in the implicit MTA as long as
/// the MTA exists, so WASAPI objects created on the consumer's thread can be
/// used from the polling thread. Unlike `CoUninitialize`, the matching
/// decrement may run on any thread.
pub(crate) struct MtaUsage {
    cookie: CO_MTA_USAGE_COOKIE,
}

// SAFETY: the cookie is an opaque token that CoDecrementMTAUsage accepts from any thread.
unsafe impl Send for MtaUsage {}
unsafe impl Sync for MtaUsage {}

impl MtaUsage {
    pub(crate) fn acquire() -> Result<Arc<Self>, CaptureError> {
        let cookie = unsafe { CoIncrementMTAUsage() }.device_call("CoIncrementMTAUsage")?;
        Ok(Arc::new(Self { cookie }))
    }
}

impl Drop for MtaUsage {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = CoDecrementMTAUsage(self.cookie) {
                log::warn!("CoDecrementMTAUsage failed: {}", e);
            }
        }
    }
}

/// A `WAVEFORMATEX` allocated by `IAudioClient::GetMixFormat`, freed on drop.
pub(crate) struct MixFormat(*mut WAVEFORMATEX);

impl MixFormat {
    pub(crate) fn of(client: &IAudioClient) -> Result<Self, CaptureError> {
        let ptr = unsafe { client.GetMixFormat() }.device_call("IAudioClient::GetMixFormat")?;
        Ok(Self(ptr))
    }

    pub(crate) fn as_ptr(&self) -> *const WAVEFORMATEX {
        self.0
    }

    /// Copy out the fields format negotiation looks at.
    pub(crate) fn desc(&self) -> MixFormatDesc {
        // SAFETY: GetMixFormat returned a valid, byte-aligned WAVEFORMATEX.
        let format = unsafe { std::ptr::read_unaligned(self.0) };
        let tag = format.wFormatTag;

        let sub_format = if tag == WAVE_FORMAT_EXTENSIBLE && format.cbSize >= 22 {
            // SAFETY: cbSize covers the extensible tail.
            let ext = unsafe { std::ptr::read_unaligned(self.0 as *const WAVEFORMATEXTENSIBLE) };
            let guid = ext.SubFormat;
            Some(if guid == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT {
                SubFormat::IeeeFloat
            } else if guid == KSDATAFORMAT_SUBTYPE_PCM {
                SubFormat::Pcm
            } else {
                SubFormat::Other
            })
        } else {
            None
        };

        MixFormatDesc {
            tag,
            channels: format.nChannels,
            sample_rate: format.nSamplesPerSec,
            bits_per_sample: format.wBitsPerSample,
            block_align: format.nBlockAlign,
            sub_format,
        }
    }
}

impl Drop for MixFormat {
    fn drop(&mut self) {
        unsafe { CoTaskMemFree(Some(self.0 as *const c_void)) };
    }
}

/// Take ownership of a COM-allocated wide string.
pub(crate) fn take_pwstr(raw: PWSTR) -> String {
    if raw.is_null() {
        return String::new();
    }
    unsafe {
        let value = raw.to_string().unwrap_or_default();
        CoTaskMemFree(Some(raw.0 as *const c_void));
        value
    }
}
