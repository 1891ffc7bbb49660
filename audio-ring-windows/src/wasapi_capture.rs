//! WASAPI capture backend for microphones and system-output loopback.
//!
//! Capture endpoints are opened directly. Render endpoints are opened with
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`, which records the mix the endpoint is
//! playing, together with a [`SilentRenderStream`] that keeps the endpoint
//! running while nothing else plays.
//!
//! ## Sequence
//! 1. `negotiate_format`: activate `IAudioClient`, read and check the mix
//!    format, initialize in shared mode, get `IAudioCaptureClient`
//! 2. `open_stream`: start the keep-alive stream (loopback only), then the client
//! 3. `poll_packets`: drain `GetNextPacketSize` / `GetBuffer` / `ReleaseBuffer`
//! 4. `close_stream`: stop the client, stop the keep-alive stream, free the format

use std::sync::Arc;
use std::time::Duration;

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::CLSCTX_ALL;

use audio_ring_core::models::audio_info::AudioInfo;
use audio_ring_core::models::device::DeviceFlow;
use audio_ring_core::models::error::CaptureError;
use audio_ring_core::traits::capture_backend::{AudioPacket, CaptureBackend};
use audio_ring_core::traits::keep_alive::KeepAliveStream;

use crate::com::{MixFormat, MtaUsage};
use crate::error::WasapiResultExt;
use crate::format;
use crate::keep_alive::SilentRenderStream;

/// Stream objects that exist between negotiation and close.
struct ActiveStream {
    client: IAudioClient,
    capture: IAudioCaptureClient,
    _mix_format: MixFormat,
    started: bool,
}

/// WASAPI shared-mode capture on one endpoint.
pub struct WasapiCapture {
    endpoint: IMMDevice,
    flow: DeviceFlow,
    requested_buffer: Duration,
    granted_buffer: Duration,
    bytes_per_frame: usize,
    stream: Option<ActiveStream>,
    keep_alive: Option<SilentRenderStream>,
    silence: Vec<u8>,
    _mta: Arc<MtaUsage>,
}

// SAFETY: WASAPI interfaces are free-threaded and the MTA is held alive by
// `_mta`, so the backend may move to the polling thread.
unsafe impl Send for WasapiCapture {}

impl WasapiCapture {
    pub(crate) fn new(endpoint: IMMDevice, flow: DeviceFlow, requested_buffer: Duration, mta: Arc<MtaUsage>) -> Self {
        Self {
            endpoint,
            flow,
            requested_buffer,
            granted_buffer: requested_buffer,
            bytes_per_frame: 0,
            stream: None,
            keep_alive: None,
            silence: Vec::new(),
            _mta: mta,
        }
    }

    fn is_loopback(&self) -> bool {
        self.flow == DeviceFlow::Render
    }
}

impl CaptureBackend for WasapiCapture {
    fn negotiate_format(&mut self) -> Result<AudioInfo, CaptureError> {
        if self.is_loopback() {
            // The silent playback client must exist before the loopback client
            self.keep_alive = Some(SilentRenderStream::new(&self.endpoint, self.requested_buffer)?);
        }

        unsafe {
            let client: IAudioClient = self
                .endpoint
                .Activate(CLSCTX_ALL, None)
                .device_call("IMMDevice::Activate")?;

            let mix_format = MixFormat::of(&client)?;
            let info = format::negotiated_info(&mix_format.desc())?;

            let flags = if self.is_loopback() {
                AUDCLNT_STREAMFLAGS_LOOPBACK
            } else {
                0
            };

            client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    flags,
                    format::to_reference_time(self.requested_buffer),
                    0,
                    mix_format.as_ptr(),
                    None,
                )
                .device_call("IAudioClient::Initialize")?;

            let buffer_frames = client
                .GetBufferSize()
                .device_call("IAudioClient::GetBufferSize")?;

            let capture: IAudioCaptureClient = client
                .GetService()
                .device_call("GetService(IAudioCaptureClient)")?;

            self.granted_buffer = format::buffer_duration(buffer_frames, info.sample_rate);
            self.bytes_per_frame = info.bytes_per_frame as usize;
            self.stream = Some(ActiveStream {
                client,
                capture,
                _mix_format: mix_format,
                started: false,
            });

            log::debug!(
                "WASAPI {} client: {} ch @ {} Hz, buffer {} frames ({:?})",
                if self.is_loopback() { "loopback" } else { "capture" },
                info.channels,
                info.sample_rate,
                buffer_frames,
                self.granted_buffer
            );

            Ok(info)
        }
    }

    fn open_stream(&mut self, is_loopback: bool) -> Result<(), CaptureError> {
        if is_loopback != self.is_loopback() {
            return Err(CaptureError::DeviceFailure(format!(
                "{:?} endpoint cannot be opened with loopback = {}",
                self.flow, is_loopback
            )));
        }

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceFailure("format not negotiated".into()))?;

        if let Some(keep_alive) = self.keep_alive.as_mut() {
            if !keep_alive.is_running() {
                keep_alive.start()?;
            }
        }

        unsafe { stream.client.Start() }.device_call("IAudioClient::Start")?;
        stream.started = true;
        log::info!("WASAPI stream started (loopback: {})", is_loopback);
        Ok(())
    }

    fn poll_packets(&mut self, sink: &mut dyn FnMut(AudioPacket<'_>)) -> Result<usize, CaptureError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| CaptureError::StreamFailure("stream is not open".into()))?;
        let capture = &stream.capture;
        let mut delivered = 0;

        unsafe {
            let mut packet_frames = capture
                .GetNextPacketSize()
                .stream_call("GetNextPacketSize")?;

            while packet_frames > 0 {
                let mut data: *mut u8 = std::ptr::null_mut();
                let mut frames: u32 = 0;
                let mut flags: u32 = 0;
                let mut qpc_position: u64 = 0;

                capture
                    .GetBuffer(
                        &mut data,
                        &mut frames,
                        &mut flags,
                        None,
                        Some(&mut qpc_position as *mut u64),
                    )
                    .stream_call("GetBuffer")?;

                let len = frames as usize * self.bytes_per_frame;
                let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;

                let bytes: &[u8] = if silent || data.is_null() {
                    if self.silence.len() < len {
                        self.silence.resize(len, 0);
                    }
                    &self.silence[..len]
                } else {
                    std::slice::from_raw_parts(data, len)
                };

                sink(AudioPacket {
                    data: bytes,
                    frames,
                    capture_time: format::qpc_position_secs(qpc_position),
                    silent: silent || data.is_null(),
                });
                delivered += 1;

                capture.ReleaseBuffer(frames).stream_call("ReleaseBuffer")?;

                packet_frames = capture
                    .GetNextPacketSize()
                    .stream_call("GetNextPacketSize")?;
            }
        }

        Ok(delivered)
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            if stream.started {
                if let Err(e) = unsafe { stream.client.Stop() } {
                    log::warn!("IAudioClient::Stop failed: {}", e);
                }
            }
            // Dropping releases the capture client, the audio client and the mix format
        }

        if let Some(mut keep_alive) = self.keep_alive.take() {
            if keep_alive.is_running() {
                log::debug!("Stopping keep-alive stream");
            }
            keep_alive.stop();
        }
    }

    fn buffer_duration(&self) -> Duration {
        self.granted_buffer
    }
}

impl Drop for WasapiCapture {
    fn drop(&mut self) {
        self.close_stream();
    }
}
