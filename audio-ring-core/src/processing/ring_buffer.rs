use parking_lot::Mutex;

use crate::models::audio_info::AudioInfo;
use crate::models::error::CaptureError;

/// Result of a [`TimestampedRingBuffer::read`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferRead {
    /// Bytes copied into the destination. Less than requested means the
    /// buffer ran dry, not an error.
    pub bytes: usize,
    /// Capture time of the first returned byte, in device seconds.
    pub time: f64,
}

/// Consistent snapshot of the cursor and anchor fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingCursors {
    pub write: u64,
    pub read: u64,
    /// Write cursor at the start of the most recent packet. Can be negative
    /// after the cursor correction following a write larger than capacity.
    pub anchor_pos: i64,
    pub anchor_time: f64,
}

#[derive(Debug)]
struct RingState {
    storage: Vec<u8>,
    write: u64,
    read: u64,
    anchor_pos: i64,
    anchor_time: f64,
}

impl RingState {
    fn capacity(&self) -> u64 {
        self.storage.len() as u64
    }

    fn cursors(&self) -> RingCursors {
        RingCursors {
            write: self.write,
            read: self.read,
            anchor_pos: self.anchor_pos,
            anchor_time: self.anchor_time,
        }
    }

    /// Copy `data` into storage starting at logical position `pos`, wrapping
    /// once at the end. `data` must not exceed capacity.
    fn store(&mut self, pos: u64, data: Option<&[u8]>, len: usize) {
        let start = (pos % self.capacity()) as usize;
        let first = len.min(self.storage.len() - start);
        match data {
            Some(data) => {
                self.storage[start..start + first].copy_from_slice(&data[..first]);
                self.storage[..len - first].copy_from_slice(&data[first..]);
            }
            None => {
                self.storage[start..start + first].fill(0);
                self.storage[..len - first].fill(0);
            }
        }
    }

    fn load(&self, pos: u64, dest: &mut [u8]) {
        let len = dest.len();
        let start = (pos % self.capacity()) as usize;
        let first = len.min(self.storage.len() - start);
        dest[..first].copy_from_slice(&self.storage[start..start + first]);
        dest[first..].copy_from_slice(&self.storage[..len - first]);
    }
}

/// Fixed-capacity byte ring with a position ↔ time anchor.
///
/// Cursors are unbounded logical byte offsets; storage is indexed by
/// `cursor % capacity`. Every accepted write moves the anchor to the start
/// of the written chunk, which gives the linear mapping
///
/// ```text
/// time(pos) = anchor_time + (pos - anchor_pos) / bytes_per_second
/// ```
///
/// for any byte still retained. One writer (the polling thread) and one
/// reader (the consumer) share the buffer; all state lives behind a single
/// `parking_lot::Mutex` that is held across the byte copies.
///
/// Overflow behavior: drops the oldest unread bytes.
#[derive(Debug)]
pub struct TimestampedRingBuffer {
    info: AudioInfo,
    state: Mutex<RingState>,
}

impl TimestampedRingBuffer {
    /// Allocate a ring holding `capacity_frames` whole frames of `info`.
    ///
    /// # Panics
    ///
    /// If the capacity in bytes does not fit in `usize`. Use
    /// [`try_new`](Self::try_new) for sizes derived from user input.
    pub fn new(info: AudioInfo, capacity_frames: u64) -> Self {
        match Self::try_new(info, capacity_frames) {
            Ok(buffer) => buffer,
            Err(e) => panic!("{}", e),
        }
    }

    /// Like [`new`](Self::new), but reports an oversized capacity as
    /// `CaptureError::ConfigurationFailed`.
    pub fn try_new(info: AudioInfo, capacity_frames: u64) -> Result<Self, CaptureError> {
        let capacity = usize::try_from(capacity_frames.max(1))
            .ok()
            .and_then(|frames| frames.checked_mul(info.bytes_per_frame.max(1) as usize))
            .filter(|&bytes| bytes <= i64::MAX as usize)
            .ok_or_else(|| {
                CaptureError::ConfigurationFailed(format!(
                    "ring of {} frames x {} bytes does not fit in memory",
                    capacity_frames, info.bytes_per_frame
                ))
            })?;

        Ok(Self {
            info,
            state: Mutex::new(RingState {
                storage: vec![0; capacity],
                write: 0,
                read: 0,
                anchor_pos: 0,
                anchor_time: 0.0,
            }),
        })
    }

    /// Allocate one second of audio.
    pub fn one_second(info: AudioInfo) -> Self {
        Self::new(info, info.sample_rate as u64)
    }

    pub fn info(&self) -> &AudioInfo {
        &self.info
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.state.lock().storage.len()
    }

    /// Bytes written but not yet read.
    pub fn buffered_bytes(&self) -> usize {
        let s = self.state.lock();
        (s.write - s.read) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.buffered_bytes() == 0
    }

    pub fn cursors(&self) -> RingCursors {
        self.state.lock().cursors()
    }

    /// Device time of logical position `pos` under the current anchor.
    pub fn time_at(&self, pos: u64) -> f64 {
        let s = self.state.lock();
        self.map_time(&s, pos)
    }

    /// Append one packet captured at `capture_time` (device seconds).
    ///
    /// With `silent` set, `data.len()` zero bytes are stored instead of
    /// `data`. If the consumer has fallen behind, the oldest unread bytes are
    /// dropped to make room. Returns how many unread bytes were dropped.
    pub fn write(&self, data: &[u8], capture_time: f64, silent: bool) -> usize {
        let len = data.len();
        let mut s = self.state.lock();
        let capacity = s.capacity();

        let available = capacity - (s.write - s.read);
        let overrun = (len as u64).saturating_sub(available);
        s.read += overrun;

        s.anchor_pos = s.write as i64;
        s.anchor_time = capture_time;

        // Only the trailing `capacity` bytes of an oversized chunk survive.
        let skipped = len.saturating_sub(capacity as usize);
        let pos = s.write + skipped as u64;
        let tail = if silent { None } else { Some(&data[skipped..]) };
        s.store(pos, tail, len - skipped);

        s.write += len as u64;

        if s.read > capacity {
            s.write -= capacity;
            s.read -= capacity;
            s.anchor_pos -= capacity as i64;
        }

        overrun as usize
    }

    /// Copy up to `dest.len()` unread bytes into `dest`.
    pub fn read(&self, dest: &mut [u8]) -> BufferRead {
        let mut s = self.state.lock();
        let time = self.map_time(&s, s.read);

        let size = dest.len().min((s.write - s.read) as usize);
        s.load(s.read, &mut dest[..size]);
        s.read += size as u64;

        BufferRead { bytes: size, time }
    }

    /// Move the read cursor to the retained byte closest to `time`.
    ///
    /// Targets older than the oldest retained frame land on that frame;
    /// targets past the newest written byte land on the write cursor.
    pub fn jump_to_time(&self, time: f64) {
        if time.is_nan() {
            return;
        }
        let mut s = self.state.lock();
        let delta_frames = ((time - s.anchor_time) * self.info.sample_rate as f64).round();
        let target = s.anchor_pos as f64 + delta_frames * self.info.bytes_per_frame as f64;

        let floor = s.write.saturating_sub(s.capacity());
        s.read = target.clamp(floor as f64, s.write as f64) as u64;
    }

    /// Drop everything not yet read.
    pub fn flush(&self) {
        let mut s = self.state.lock();
        s.read = s.write;
    }

    fn map_time(&self, s: &RingState, pos: u64) -> f64 {
        let delta = pos as i64 - s.anchor_pos;
        s.anchor_time + delta as f64 / self.info.bytes_per_second() as f64
    }
}
