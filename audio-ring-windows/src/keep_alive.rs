//! Silent playback that keeps a render endpoint producing loopback packets.
//!
//! A shared-mode loopback client receives nothing while no application is
//! playing to the endpoint. Playing one buffer of silence on the same
//! endpoint keeps the engine running for the lifetime of the capture.

use std::time::Duration;

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::CLSCTX_ALL;

use audio_ring_core::models::error::CaptureError;
use audio_ring_core::traits::keep_alive::KeepAliveStream;

use crate::com::MixFormat;
use crate::error::WasapiResultExt;
use crate::format;

/// Shared-mode render client primed with one buffer of silence.
pub struct SilentRenderStream {
    client: IAudioClient,
    running: bool,
}

// SAFETY: WASAPI clients are free-threaded; the MTA is kept alive by the owning backend.
unsafe impl Send for SilentRenderStream {}

impl SilentRenderStream {
    /// Initialize a render client on `endpoint` and fill its buffer with
    /// silence. Playback starts with [`KeepAliveStream::start`].
    pub fn new(endpoint: &IMMDevice, buffer_duration: Duration) -> Result<Self, CaptureError> {
        unsafe {
            let client: IAudioClient = endpoint
                .Activate(CLSCTX_ALL, None)
                .device_call("IMMDevice::Activate (keep-alive)")?;

            let mix_format = MixFormat::of(&client)?;
            client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    0,
                    format::to_reference_time(buffer_duration),
                    0,
                    mix_format.as_ptr(),
                    None,
                )
                .device_call("IAudioClient::Initialize (keep-alive)")?;

            let frames = client
                .GetBufferSize()
                .device_call("IAudioClient::GetBufferSize (keep-alive)")?;
            let render: IAudioRenderClient = client
                .GetService()
                .device_call("GetService(IAudioRenderClient)")?;

            // The silent flag makes the engine ignore the buffer contents
            render
                .GetBuffer(frames)
                .device_call("IAudioRenderClient::GetBuffer")?;
            render
                .ReleaseBuffer(frames, AUDCLNT_BUFFERFLAGS_SILENT.0 as u32)
                .device_call("IAudioRenderClient::ReleaseBuffer")?;

            Ok(Self { client, running: false })
        }
    }
}

impl KeepAliveStream for SilentRenderStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.running {
            return Ok(());
        }
        unsafe { self.client.Start() }.device_call("IAudioClient::Start (keep-alive)")?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Err(e) = unsafe { self.client.Stop() } {
            log::warn!("Keep-alive stream did not stop cleanly: {}", e);
        }
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for SilentRenderStream {
    fn drop(&mut self) {
        self.stop();
    }
}
