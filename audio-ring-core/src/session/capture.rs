use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_info::AudioInfo;
use crate::models::config::{CaptureConfiguration, StreamFailurePolicy};
use crate::models::device::{AudioDevice, DeviceCatalog};
use crate::models::diagnostics::CaptureDiagnostics;
use crate::models::error::CaptureError;
use crate::models::state::SessionState;
use crate::processing::ring_buffer::{BufferRead, TimestampedRingBuffer};
use crate::traits::audio_capture::AudioCapture;
use crate::traits::capture_backend::{AudioPacket, CaptureBackend};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_host::CaptureHost;

/// Shortest wake period of the polling loop.
const MIN_WAKE_PERIOD: Duration = Duration::from_millis(1);

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SharedState {
    state: SessionState,
    diagnostics: CaptureDiagnostics,
}

/// Per-wake tallies, folded into the diagnostics once per cycle.
#[derive(Default)]
struct CycleStats {
    packets: u64,
    silent_packets: u64,
    bytes: u64,
    overrun: u64,
}

/// Everything the polling thread needs besides the backend.
struct PollContext {
    ring: Arc<TimestampedRingBuffer>,
    shared: Arc<Mutex<SharedState>>,
    running: Arc<AtomicBool>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    policy: StreamFailurePolicy,
    wake_period: Duration,
    bytes_per_frame: usize,
}

/// Captures one device into a [`TimestampedRingBuffer`].
///
/// ```text
/// [CaptureBackend] → poll_packets → [polling thread] → write → [TimestampedRingBuffer]
///                                                                   ↑
///                                        consumer: read / jump_to_time / flush
/// ```
///
/// Lifecycle is `Created → Running → Stopped`. While running, the backend
/// lives on the polling thread and comes back through the join handle, so
/// the stream is only ever closed once the loop has finished.
pub struct CaptureSession<B: CaptureBackend + 'static> {
    device: AudioDevice,
    config: CaptureConfiguration,
    info: AudioInfo,
    ring: Arc<TimestampedRingBuffer>,
    shared: Arc<Mutex<SharedState>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,

    // Backend is here while not running, inside the polling thread otherwise
    backend: Mutex<Option<B>>,

    // Polling thread control
    running: Arc<AtomicBool>,
    polling_handle: Mutex<Option<thread::JoinHandle<B>>>,
}

impl<B: CaptureBackend + 'static> CaptureSession<B> {
    /// Negotiate the format and allocate the ring buffer. State: `Created`.
    ///
    /// On failure the backend's stream is closed before the error is
    /// returned.
    pub fn new(mut backend: B, device: AudioDevice, config: CaptureConfiguration) -> Result<Self, CaptureError> {
        let (info, ring) = match Self::negotiate(&mut backend, &config) {
            Ok(negotiated) => negotiated,
            Err(e) => {
                backend.close_stream();
                return Err(e);
            }
        };
        let ring = Arc::new(ring);

        log::debug!(
            "Negotiated {:?} {} ch @ {} Hz on '{}', ring {} bytes",
            info.format,
            info.channels,
            info.sample_rate,
            device.display_name(),
            ring.capacity()
        );

        Ok(Self {
            device,
            config,
            info,
            ring,
            shared: Arc::new(Mutex::new(SharedState {
                state: SessionState::Created,
                diagnostics: CaptureDiagnostics::new(),
            })),
            delegate: None,
            backend: Mutex::new(Some(backend)),
            running: Arc::new(AtomicBool::new(false)),
            polling_handle: Mutex::new(None),
        })
    }

    /// Open the device at `config.device_index` of `catalog` through `host`.
    pub fn from_catalog<H>(host: &H, catalog: &DeviceCatalog, config: CaptureConfiguration) -> Result<Self, CaptureError>
    where
        H: CaptureHost<Backend = B>,
    {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let device = catalog
            .get(config.device_index)
            .ok_or(CaptureError::DeviceNotFound(config.device_index))?
            .clone();
        let backend = host.open_device(&device, &config)?;
        Self::new(backend, device, config)
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    pub fn info(&self) -> AudioInfo {
        self.info
    }

    pub fn device(&self) -> &AudioDevice {
        &self.device
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.shared.lock().diagnostics.clone()
    }

    /// Shared handle to the ring buffer, for consumers on other threads.
    pub fn ring_buffer(&self) -> Arc<TimestampedRingBuffer> {
        Arc::clone(&self.ring)
    }

    /// Seconds of audio buffered and not yet read.
    pub fn buffered_secs(&self) -> f64 {
        let frames = self.ring.buffered_bytes() as u64 / self.info.bytes_per_frame as u64;
        self.info.frames_to_secs(frames)
    }

    /// Start the device stream and the polling loop. Transitions: created → running.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if !self.shared.lock().state.is_created() {
            return Err(CaptureError::InvalidState("can only start from created state".into()));
        }

        let mut backend = self
            .backend
            .get_mut()
            .take()
            .ok_or_else(|| CaptureError::InvalidState("backend not available".into()))?;

        let wake_period = (backend.buffer_duration() / 2).max(MIN_WAKE_PERIOD);

        if let Err(e) = backend.open_stream(self.device.is_loopback()) {
            log::error!("Failed to open stream on '{}': {}", self.device.display_name(), e);
            backend.close_stream();
            *self.backend.get_mut() = Some(backend);
            self.set_state(SessionState::Stopped { error: Some(e.clone()) });
            return Err(e);
        }

        self.shared.lock().diagnostics.started_at = Some(chrono::Utc::now());
        self.running.store(true, Ordering::SeqCst);

        let ctx = PollContext {
            ring: Arc::clone(&self.ring),
            shared: Arc::clone(&self.shared),
            running: Arc::clone(&self.running),
            delegate: self.delegate.clone(),
            policy: self.config.failure_policy,
            wake_period,
            bytes_per_frame: self.info.bytes_per_frame as usize,
        };

        // Running must be visible before the loop can report a failure
        self.set_state(SessionState::Running);

        let spawned = thread::Builder::new()
            .name("audio-ring-polling".into())
            .spawn(move || polling_loop(backend, ctx));

        match spawned {
            Ok(handle) => {
                *self.polling_handle.get_mut() = Some(handle);
                log::info!(
                    "Capture started on '{}' (loopback: {}, wake every {:?})",
                    self.device.display_name(),
                    self.device.is_loopback(),
                    wake_period
                );
                Ok(())
            }
            Err(e) => {
                // The backend was dropped with the closure, which releases it.
                self.running.store(false, Ordering::SeqCst);
                let error = CaptureError::DeviceFailure(format!("failed to spawn polling thread: {}", e));
                self.set_state(SessionState::Stopped { error: Some(error.clone()) });
                Err(error)
            }
        }
    }

    /// Stop the polling loop, then close the device stream.
    /// Transitions: created/running → stopped. Calling it again does nothing.
    ///
    /// Buffered data stays readable until the session is dropped.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.polling_handle.get_mut().take() {
            match handle.join() {
                Ok(backend) => *self.backend.get_mut() = Some(backend),
                Err(_) => {
                    log::error!("Polling thread panicked on '{}'", self.device.display_name());
                    let error = CaptureError::StreamFailure("polling thread panicked".into());
                    self.set_state(SessionState::Stopped { error: Some(error) });
                }
            }
        }

        if let Some(backend) = self.backend.get_mut().as_mut() {
            backend.close_stream();
        }

        if !self.shared.lock().state.is_stopped() {
            self.set_state(SessionState::Stopped { error: None });
            log::info!("Capture stopped on '{}'", self.device.display_name());
        }
    }

    pub fn read(&self, dest: &mut [u8]) -> BufferRead {
        self.ring.read(dest)
    }

    pub fn jump_to_time(&self, time: f64) {
        self.ring.jump_to_time(time)
    }

    pub fn flush(&self) {
        self.ring.flush()
    }

    // --- Internal helpers ---

    fn negotiate(
        backend: &mut B,
        config: &CaptureConfiguration,
    ) -> Result<(AudioInfo, TimestampedRingBuffer), CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let info = backend.negotiate_format()?;
        info.validate()?;
        let ring = TimestampedRingBuffer::try_new(info, config.ring_frames(info.sample_rate))?;
        Ok((info, ring))
    }

    fn set_state(&self, new_state: SessionState) {
        {
            let mut s = self.shared.lock();
            s.state = new_state.clone();
        }
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&new_state);
        }
    }
}

impl<B: CaptureBackend + 'static> AudioCapture for CaptureSession<B> {
    fn info(&self) -> AudioInfo {
        self.info
    }

    fn read(&self, dest: &mut [u8]) -> BufferRead {
        self.ring.read(dest)
    }

    fn jump_to_time(&self, time: f64) {
        self.ring.jump_to_time(time)
    }

    fn flush(&self) {
        self.ring.flush()
    }
}

impl<B: CaptureBackend + 'static> Drop for CaptureSession<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the polling thread. Returns the backend when the loop ends.
fn polling_loop<B: CaptureBackend>(mut backend: B, ctx: PollContext) -> B {
    while ctx.running.load(Ordering::SeqCst) {
        thread::sleep(ctx.wake_period);

        let mut cycle = CycleStats::default();
        let result = backend.poll_packets(&mut |packet: AudioPacket<'_>| {
            // Only whole frames the packet reports are stored, keeping the ring frame aligned
            let expected = packet.frames as usize * ctx.bytes_per_frame;
            let len = expected.min(packet.data.len() / ctx.bytes_per_frame * ctx.bytes_per_frame);
            if len != packet.data.len() || len != expected {
                log::warn!(
                    "Packet reports {} frames but carries {} bytes, storing {}",
                    packet.frames,
                    packet.data.len(),
                    len
                );
            }
            let data = &packet.data[..len];

            cycle.overrun += ctx.ring.write(data, packet.capture_time, packet.silent) as u64;
            cycle.packets += 1;
            cycle.bytes += len as u64;
            if packet.silent {
                cycle.silent_packets += 1;
            }
        });

        {
            let mut s = ctx.shared.lock();
            let d = &mut s.diagnostics;
            d.wake_cycles += 1;
            d.packets += cycle.packets;
            d.silent_packets += cycle.silent_packets;
            d.bytes_captured += cycle.bytes;
            d.bytes_overrun += cycle.overrun;
        }

        if cycle.overrun > 0 {
            log::warn!("Reader fell behind, dropped {} buffered bytes", cycle.overrun);
        }

        if let Err(e) = result {
            handle_stream_failure(e, &ctx);
            break;
        }
    }

    backend
}

fn handle_stream_failure(error: CaptureError, ctx: &PollContext) {
    let error = match error {
        CaptureError::StreamFailure(_) => error,
        other => CaptureError::StreamFailure(other.to_string()),
    };
    log::error!("Capture stream failed: {}", error);

    if ctx.policy == StreamFailurePolicy::Abort {
        std::process::abort();
    }

    ctx.running.store(false, Ordering::SeqCst);
    let state = SessionState::Stopped {
        error: Some(error.clone()),
    };
    ctx.shared.lock().state = state.clone();

    if let Some(ref delegate) = ctx.delegate {
        delegate.on_error(&error);
        delegate.on_state_changed(&state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Instant;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::models::device::DeviceFlow;

    /// 1 kHz mono f32: 4 bytes per frame, 1 ms per frame.
    fn info() -> AudioInfo {
        AudioInfo::f32(1, 1000)
    }

    enum Step {
        Packet { data: Vec<u8>, frames: u32, time: f64, silent: bool },
        Fail(CaptureError),
        Panic,
    }

    #[derive(Default)]
    struct ScriptState {
        queue: VecDeque<Step>,
        opened_loopback: Option<bool>,
        close_calls: usize,
        polled_after_close: bool,
    }

    #[derive(Clone, Default)]
    struct Script(Arc<Mutex<ScriptState>>);

    impl Script {
        fn packet(&self, frames: usize, fill: u8, time: f64) {
            self.0.lock().queue.push_back(Step::Packet {
                data: vec![fill; frames * 4],
                frames: frames as u32,
                time,
                silent: false,
            });
        }

        /// A packet whose frame count disagrees with its byte length.
        fn mislabeled(&self, data_bytes: usize, frames: u32, time: f64) {
            self.0.lock().queue.push_back(Step::Packet {
                data: vec![5; data_bytes],
                frames,
                time,
                silent: false,
            });
        }

        fn panic(&self) {
            self.0.lock().queue.push_back(Step::Panic);
        }

        fn silent(&self, frames: usize, time: f64) {
            self.0.lock().queue.push_back(Step::Packet {
                data: vec![0xEE; frames * 4],
                frames: frames as u32,
                time,
                silent: true,
            });
        }

        fn fail(&self, error: CaptureError) {
            self.0.lock().queue.push_back(Step::Fail(error));
        }

        fn close_calls(&self) -> usize {
            self.0.lock().close_calls
        }

        fn queue_empty(&self) -> bool {
            self.0.lock().queue.is_empty()
        }
    }

    struct ScriptedBackend {
        script: Script,
        format: Result<AudioInfo, CaptureError>,
        open_error: Option<CaptureError>,
    }

    impl ScriptedBackend {
        fn new(script: &Script) -> Self {
            Self {
                script: script.clone(),
                format: Ok(info()),
                open_error: None,
            }
        }
    }

    impl CaptureBackend for ScriptedBackend {
        fn negotiate_format(&mut self) -> Result<AudioInfo, CaptureError> {
            self.format.clone()
        }

        fn open_stream(&mut self, is_loopback: bool) -> Result<(), CaptureError> {
            self.script.0.lock().opened_loopback = Some(is_loopback);
            match self.open_error.clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn poll_packets(&mut self, sink: &mut dyn FnMut(AudioPacket<'_>)) -> Result<usize, CaptureError> {
            let mut s = self.script.0.lock();
            if s.close_calls > 0 {
                s.polled_after_close = true;
            }
            let mut delivered = 0;
            while let Some(step) = s.queue.pop_front() {
                match step {
                    Step::Packet { data, frames, time, silent } => {
                        sink(AudioPacket {
                            data: &data,
                            frames,
                            capture_time: time,
                            silent,
                        });
                        delivered += 1;
                    }
                    Step::Fail(e) => return Err(e),
                    Step::Panic => panic!("backend bug"),
                }
            }
            Ok(delivered)
        }

        fn close_stream(&mut self) {
            self.script.0.lock().close_calls += 1;
        }

        fn buffer_duration(&self) -> Duration {
            Duration::from_millis(2)
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<SessionState>>,
        errors: Mutex<Vec<CaptureError>>,
    }

    impl CaptureDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: &SessionState) {
            self.states.lock().push(state.clone());
        }

        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }
    }

    struct ScriptedHost {
        script: Script,
        catalog: DeviceCatalog,
    }

    impl CaptureHost for ScriptedHost {
        type Backend = ScriptedBackend;

        fn enumerate_devices(&self) -> Result<DeviceCatalog, CaptureError> {
            Ok(self.catalog.clone())
        }

        fn open_device(&self, _device: &AudioDevice, _config: &CaptureConfiguration) -> Result<ScriptedBackend, CaptureError> {
            Ok(ScriptedBackend::new(&self.script))
        }
    }

    fn mic() -> AudioDevice {
        AudioDevice {
            id: "mic-1".into(),
            name: "Test Mic".into(),
            flow: DeviceFlow::Capture,
            is_default: true,
        }
    }

    fn speakers() -> AudioDevice {
        AudioDevice {
            id: "out-1".into(),
            name: "Test Speakers".into(),
            flow: DeviceFlow::Render,
            is_default: true,
        }
    }

    fn session(script: &Script) -> CaptureSession<ScriptedBackend> {
        CaptureSession::new(ScriptedBackend::new(script), mic(), CaptureConfiguration::default()).unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn new_session_is_created_with_one_second_ring() {
        let script = Script::default();
        let session = session(&script);

        assert!(session.state().is_created());
        assert_eq!(session.info(), info());
        assert_eq!(session.ring_buffer().capacity(), 4000);
        assert_eq!(script.close_calls(), 0);
    }

    #[test]
    fn negotiation_failure_closes_backend() {
        let script = Script::default();
        let mut backend = ScriptedBackend::new(&script);
        backend.format = Err(CaptureError::DeviceFailure("GetMixFormat failed".into()));

        let result = CaptureSession::new(backend, mic(), CaptureConfiguration::default());

        assert!(matches!(result, Err(CaptureError::DeviceFailure(_))));
        assert_eq!(script.close_calls(), 1);
    }

    #[test]
    fn unusable_format_is_rejected() {
        let script = Script::default();
        let mut backend = ScriptedBackend::new(&script);
        backend.format = Ok(AudioInfo::f32(0, 48000));

        let result = CaptureSession::new(backend, mic(), CaptureConfiguration::default());

        assert!(matches!(result, Err(CaptureError::UnsupportedFormat(_))));
        assert_eq!(script.close_calls(), 1);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let script = Script::default();
        let config = CaptureConfiguration {
            ring_duration_secs: 0.0,
            ..Default::default()
        };

        let result = CaptureSession::new(ScriptedBackend::new(&script), mic(), config);

        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }

    #[test]
    fn from_catalog_opens_indexed_device_as_loopback() {
        let script = Script::default();
        let host = ScriptedHost {
            script: script.clone(),
            catalog: [speakers(), mic()].into_iter().collect(),
        };
        let catalog = host.enumerate_devices().unwrap();

        let mut session = CaptureSession::from_catalog(&host, &catalog, CaptureConfiguration::default()).unwrap();
        assert_eq!(session.device(), &speakers());

        session.start().unwrap();
        assert_eq!(script.0.lock().opened_loopback, Some(true));
        session.stop();
    }

    #[test]
    fn from_catalog_rejects_missing_index() {
        let host = ScriptedHost {
            script: Script::default(),
            catalog: [mic()].into_iter().collect(),
        };
        let config = CaptureConfiguration {
            device_index: 4,
            ..Default::default()
        };

        let result = CaptureSession::from_catalog(&host, &host.catalog, config);

        assert!(matches!(result, Err(CaptureError::DeviceNotFound(4))));
    }

    #[test]
    fn polling_loop_feeds_ring_buffer() {
        let script = Script::default();
        let mut session = session(&script);
        session.start().unwrap();
        assert!(session.state().is_running());
        assert_eq!(script.0.lock().opened_loopback, Some(false));

        script.packet(10, 1, 3.000);
        script.packet(10, 2, 3.010);
        assert!(wait_until(|| session.ring_buffer().buffered_bytes() == 80));

        let mut dest = [0u8; 40];
        let r = session.read(&mut dest);
        assert_eq!(r.bytes, 40);
        assert_abs_diff_eq!(r.time, 3.000, epsilon = 1e-9);
        assert!(dest.iter().all(|&b| b == 1));

        let r = session.read(&mut dest);
        assert_eq!(r.bytes, 40);
        assert_abs_diff_eq!(r.time, 3.010, epsilon = 1e-9);
        assert!(dest.iter().all(|&b| b == 2));

        session.stop();
        let diagnostics = session.diagnostics();
        assert_eq!(diagnostics.packets, 2);
        assert_eq!(diagnostics.bytes_captured, 80);
        assert_eq!(diagnostics.bytes_overrun, 0);
        assert!(diagnostics.wake_cycles >= 1);
        assert!(diagnostics.started_at.is_some());
    }

    #[test]
    fn silent_packets_are_zeroed() {
        let script = Script::default();
        let mut session = session(&script);
        session.start().unwrap();

        script.silent(5, 0.5);
        assert!(wait_until(|| session.ring_buffer().buffered_bytes() == 20));

        let mut dest = [0xFFu8; 20];
        assert_eq!(session.read(&mut dest).bytes, 20);
        assert!(dest.iter().all(|&b| b == 0));

        session.stop();
        assert_eq!(session.diagnostics().silent_packets, 1);
    }

    #[test]
    fn slow_reader_overrun_is_counted() {
        let script = Script::default();
        let config = CaptureConfiguration {
            buffer_duration_secs: 0.002,
            ring_duration_secs: 0.01, // 10 frames
            ..Default::default()
        };
        let mut session = CaptureSession::new(ScriptedBackend::new(&script), mic(), config).unwrap();
        session.start().unwrap();

        script.packet(8, 1, 0.000);
        script.packet(8, 2, 0.008);
        assert!(wait_until(|| script.queue_empty() && session.diagnostics().packets == 2));

        assert_eq!(session.diagnostics().bytes_overrun, 24);
        assert_abs_diff_eq!(session.buffered_secs(), 0.010, epsilon = 1e-9);

        let mut dest = [0u8; 40];
        let r = session.read(&mut dest);
        assert_eq!(r.bytes, 40);
        assert_abs_diff_eq!(r.time, 0.006, epsilon = 1e-9);
        session.stop();
    }

    #[test]
    fn start_twice_is_invalid() {
        let script = Script::default();
        let mut session = session(&script);
        session.start().unwrap();

        assert!(matches!(session.start(), Err(CaptureError::InvalidState(_))));
        session.stop();
    }

    #[test]
    fn open_failure_stops_session() {
        let script = Script::default();
        let mut backend = ScriptedBackend::new(&script);
        backend.open_error = Some(CaptureError::DeviceFailure("IAudioClient::Start failed".into()));
        let mut session = CaptureSession::new(backend, mic(), CaptureConfiguration::default()).unwrap();

        let err = session.start().unwrap_err();

        assert!(matches!(err, CaptureError::DeviceFailure(_)));
        assert_eq!(session.state().error(), Some(&err));
        assert_eq!(script.close_calls(), 1);
    }

    #[test]
    fn stop_joins_loop_before_closing_stream() {
        let script = Script::default();
        let mut session = session(&script);
        session.start().unwrap();
        script.packet(4, 9, 1.0);
        assert!(wait_until(|| session.diagnostics().packets == 1));

        session.stop();
        session.stop();
        thread::sleep(Duration::from_millis(10));

        assert_eq!(session.state(), SessionState::Stopped { error: None });
        assert!(script.close_calls() >= 1);
        assert!(!script.0.lock().polled_after_close);

        // still readable after stop
        let mut dest = [0u8; 16];
        assert_eq!(session.read(&mut dest).bytes, 16);
    }

    #[test]
    fn stop_from_created_closes_backend() {
        let script = Script::default();
        let mut session = session(&script);

        session.stop();

        assert!(session.state().is_stopped());
        assert_eq!(script.close_calls(), 1);
        assert!(matches!(session.start(), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn drop_closes_stream() {
        let script = Script::default();
        {
            let mut session = session(&script);
            session.start().unwrap();
        }
        assert_eq!(script.close_calls(), 1);
    }

    #[test]
    fn stream_failure_stops_session_and_keeps_data() {
        let script = Script::default();
        let delegate = Arc::new(RecordingDelegate::default());
        let mut session = session(&script);
        session.set_delegate(delegate.clone());
        session.start().unwrap();

        script.packet(4, 7, 2.0);
        script.fail(CaptureError::DeviceFailure("device invalidated".into()));
        assert!(wait_until(|| session.state().is_stopped()));

        let state = session.state();
        assert!(state.error().is_some_and(CaptureError::is_stream_failure));
        assert_eq!(delegate.errors.lock().len(), 1);

        let mut dest = [0u8; 16];
        assert_eq!(session.read(&mut dest).bytes, 16);
        assert!(dest.iter().all(|&b| b == 7));

        session.stop();
        assert_eq!(session.state(), state);
        assert_eq!(script.close_calls(), 1);

        let states = delegate.states.lock();
        assert_eq!(states.first(), Some(&SessionState::Running));
        assert!(states.last().is_some_and(SessionState::is_stopped));
    }

    #[test]
    fn consumer_operations_through_trait_object() {
        let script = Script::default();
        let mut session = session(&script);
        session.start().unwrap();
        script.packet(10, 3, 7.0);
        assert!(wait_until(|| session.ring_buffer().buffered_bytes() == 40));

        let capture: &dyn AudioCapture = &session;
        assert_eq!(capture.info().sample_rate, 1000);

        capture.jump_to_time(7.005);
        let mut dest = [0u8; 40];
        let r = capture.read(&mut dest);
        assert_eq!(r.bytes, 20);
        assert_abs_diff_eq!(r.time, 7.005, epsilon = 1e-9);

        capture.jump_to_time(0.0);
        capture.flush();
        assert_eq!(capture.read(&mut dest).bytes, 0);

        session.stop();
    }

    #[test]
    fn from_catalog_validates_before_opening() {
        struct PanickingHost(DeviceCatalog);

        impl CaptureHost for PanickingHost {
            type Backend = ScriptedBackend;

            fn enumerate_devices(&self) -> Result<DeviceCatalog, CaptureError> {
                Ok(self.0.clone())
            }

            fn open_device(&self, _device: &AudioDevice, config: &CaptureConfiguration) -> Result<ScriptedBackend, CaptureError> {
                panic!("opened with unchecked buffer {:?}", config.buffer_duration_secs);
            }
        }

        let host = PanickingHost([mic()].into_iter().collect());
        let config = CaptureConfiguration {
            buffer_duration_secs: -1.0,
            ..Default::default()
        };

        let result = CaptureSession::from_catalog(&host, &host.0, config);

        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }

    #[test]
    fn packets_are_trimmed_to_reported_frames() {
        let script = Script::default();
        let mut session = session(&script);
        session.start().unwrap();

        // 3 frames reported, 18 bytes delivered: 12 bytes kept
        script.mislabeled(18, 3, 1.0);
        // 5 frames reported, 10 bytes delivered: the 2 whole frames kept
        script.mislabeled(10, 5, 1.003);
        assert!(wait_until(|| session.diagnostics().packets == 2));

        assert_eq!(session.ring_buffer().buffered_bytes(), 20);
        assert_eq!(session.diagnostics().bytes_captured, 20);
        session.stop();
    }

    #[test]
    fn polling_thread_panic_is_reported_on_stop() {
        let script = Script::default();
        let delegate = Arc::new(RecordingDelegate::default());
        let mut session = session(&script);
        session.set_delegate(delegate.clone());
        session.start().unwrap();

        script.panic();
        assert!(wait_until(|| script.queue_empty()));
        session.stop();

        let state = session.state();
        assert!(state.error().is_some_and(CaptureError::is_stream_failure));
        assert_eq!(delegate.states.lock().last(), Some(&state));
    }
}
