//! EOS-style vendor state engine.
//!
//! Canon bodies report property changes through a polled event stream
//! rather than PTP events. The engine keeps:
//!
//! - a bounded queue of `(code, value)` changes, filled by set-property
//!   commands and drained by the next event poll
//! - a first-poll flag: the first poll after event mode is enabled returns
//!   the full state snapshot instead of the queue
//! - a call counter gating the viewfinder, which answers "not ready" while
//!   the sensor warms up
//!
//! Every record in the event stream is `[size, type, ...]` as little-endian
//! `u32`s. A property change is `[16, 0xC189, code, value]`.
//!
//! The state belongs to one session and is mutated only by the command loop
//! that owns it.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use super::dataset::DatasetWriter;
use crate::error::{Result, VcamError};
use crate::protocol::codes::{datatype, ec, prop};

/// Maximum number of queued property changes.
pub const EVENT_QUEUE_CAPACITY: usize = 10;

/// Size of one property-changed record.
pub const EVENT_RECORD_SIZE: u32 = 16;

/// Viewfinder calls answered "not ready" before frames flow.
pub const LIVEVIEW_WARMUP_CALLS: u32 = 14;

/// Sensor readout time per viewfinder call.
pub const VIEWFINDER_DELAY: Duration = Duration::from_millis(10);

/// Shutter travel for a half press.
pub const HALF_PRESS_DELAY: Duration = Duration::from_millis(2000);

/// Shutter travel for a full press.
pub const FULL_PRESS_DELAY: Duration = Duration::from_millis(200);

/// Release levels accepted by RemoteReleaseOn.
pub mod release {
    pub const HALF_PRESS: u32 = 1;
    pub const FULL_PRESS: u32 = 2;
}

/// Baseline JPEG shown once the viewfinder has warmed up (8x8 mid-grey).
pub const LIVEVIEW_FRAME: &[u8] = &[
    0xFF, 0xD8, // SOI
    0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00,
    0x01, 0x00, 0x00, // APP0
    0xFF, 0xDB, 0x00, 0x43, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, // DQT
    0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00, // SOF0
    0xFF, 0xC4, 0x00, 0x14, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // DHT (DC)
    0xFF, 0xC4, 0x00, 0x14, 0x10, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // DHT (AC)
    0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, // SOS
    0x3F, // scan
    0xFF, 0xD9, // EOI
];

/// Properties reported in the initial snapshot.
const SNAPSHOT_PROPERTIES: &[(u32, u32)] = &[
    (prop::EOS_APERTURE, 0x30),
    (prop::EOS_SHUTTER_SPEED, 0x6D),
    (prop::EOS_ISO_SPEED, 0x48),
    (prop::EOS_BATTERY_POWER, 0x02),
    (prop::EOS_CAPTURE_DESTINATION, 0x01),
];

/// ISO choices advertised in the snapshot's availability record.
const SNAPSHOT_ISO_CHOICES: &[u32] = &[0x00, 0x48, 0x50, 0x58, 0x60, 0x68, 0x70];

/// One queued property change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyChange {
    pub code: u32,
    pub value: u32,
}

/// Result of one viewfinder poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewfinderFrame {
    /// Sensor still warming up; answered with `Canon_NotReady`.
    NotReady,
    /// A frame is available.
    Ready(Bytes),
}

/// Per-session vendor state.
#[derive(Debug, Clone, Default)]
pub struct VendorState {
    first_poll_done: bool,
    queue: VecDeque<PropertyChange>,
    capture_ready: bool,
    liveview_calls: u32,
}

impl VendorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event mode (re)enabled: the next poll returns the snapshot again.
    pub fn set_event_mode(&mut self) {
        self.first_poll_done = false;
    }

    /// Record a property change for the next poll.
    ///
    /// Setting the capture destination marks the body ready to capture.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the queue is at capacity. The change is
    /// dropped and the queue keeps its first [`EVENT_QUEUE_CAPACITY`] entries.
    pub fn set_property(&mut self, code: u32, value: u32) -> Result<()> {
        if code == prop::EOS_CAPTURE_DESTINATION {
            self.capture_ready = true;
        }

        if self.queue.len() >= EVENT_QUEUE_CAPACITY {
            return Err(VcamError::QueueFull {
                capacity: EVENT_QUEUE_CAPACITY,
            });
        }
        self.queue.push_back(PropertyChange { code, value });
        Ok(())
    }

    /// Build the event-poll payload and drain the queue.
    pub fn get_event(&mut self) -> Bytes {
        if !self.first_poll_done {
            self.first_poll_done = true;
            return initial_snapshot();
        }

        let mut w = DatasetWriter::new();
        if self.queue.is_empty() {
            w.u32(0).u32(0);
        }
        for change in self.queue.drain(..) {
            w.u32(EVENT_RECORD_SIZE)
                .u32(ec::EOS_PROP_VALUE_CHANGED)
                .u32(change.code)
                .u32(change.value);
        }
        w.finish()
    }

    /// Count one viewfinder call and report whether a frame is available.
    pub fn viewfinder_frame(&mut self) -> ViewfinderFrame {
        self.liveview_calls = self.liveview_calls.saturating_add(1);
        if self.liveview_calls <= LIVEVIEW_WARMUP_CALLS {
            ViewfinderFrame::NotReady
        } else {
            ViewfinderFrame::Ready(Bytes::from_static(LIVEVIEW_FRAME))
        }
    }

    /// Shutter delay for a RemoteReleaseOn level. Unknown levels release at once.
    pub fn remote_release(&self, level: u32) -> Duration {
        match level {
            release::HALF_PRESS => HALF_PRESS_DELAY,
            release::FULL_PRESS => FULL_PRESS_DELAY,
            _ => Duration::ZERO,
        }
    }

    pub fn first_poll_done(&self) -> bool {
        self.first_poll_done
    }

    pub fn capture_ready(&self) -> bool {
        self.capture_ready
    }

    pub fn liveview_calls(&self) -> u32 {
        self.liveview_calls
    }

    /// Changes waiting for the next poll, oldest first.
    pub fn pending_changes(&self) -> impl Iterator<Item = &PropertyChange> {
        self.queue.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }
}

/// The full-state event blob returned by the first poll.
fn initial_snapshot() -> Bytes {
    let mut w = DatasetWriter::new();

    for (code, value) in SNAPSHOT_PROPERTIES {
        w.u32(EVENT_RECORD_SIZE)
            .u32(ec::EOS_PROP_VALUE_CHANGED)
            .u32(*code)
            .u32(*value);
    }

    // [size, type, code, datatype, count, values...]
    let size = 20 + 4 * SNAPSHOT_ISO_CHOICES.len() as u32;
    w.u32(size)
        .u32(ec::EOS_AVAIL_LIST_CHANGED)
        .u32(prop::EOS_ISO_SPEED)
        .u32(u32::from(datatype::UINT32))
        .u32(SNAPSHOT_ISO_CHOICES.len() as u32);
    for choice in SNAPSHOT_ISO_CHOICES {
        w.u32(*choice);
    }

    // Terminator record.
    w.u32(8).u32(0);
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_event_queue_scenario() {
        let mut state = VendorState::new();

        let first = state.get_event();
        assert_eq!(first, initial_snapshot());
        assert!(state.first_poll_done());

        state.set_property(0x5007, 42).unwrap();
        state.set_property(0x500d, 7).unwrap();

        let events = state.get_event();
        assert_eq!(events.len(), 2 * EVENT_RECORD_SIZE as usize);
        assert_eq!(
            words(&events),
            vec![16, 0xC189, 0x5007, 42, 16, 0xC189, 0x500d, 7]
        );
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn test_empty_poll_is_two_zero_words() {
        let mut state = VendorState::new();
        state.get_event();
        assert_eq!(state.get_event().as_ref(), &[0u8; 8]);
    }

    #[test]
    fn test_set_event_mode_rearms_snapshot() {
        let mut state = VendorState::new();
        state.get_event();
        state.set_event_mode();
        assert!(!state.first_poll_done());
        assert_eq!(state.get_event(), initial_snapshot());
    }

    #[test]
    fn test_snapshot_records_are_well_formed() {
        let blob = initial_snapshot();
        let mut offset = 0;
        let mut records = 0;
        while offset < blob.len() {
            let size = words(&blob[offset..offset + 4])[0] as usize;
            assert!(size >= 8 && offset + size <= blob.len());
            offset += size;
            records += 1;
        }
        assert_eq!(offset, blob.len());
        assert_eq!(records, SNAPSHOT_PROPERTIES.len() + 2);
    }

    #[test]
    fn test_queue_overflow_keeps_first_ten() {
        let mut state = VendorState::new();
        state.get_event();

        for i in 0..EVENT_QUEUE_CAPACITY as u32 {
            state.set_property(0xD100 + i, i).unwrap();
        }
        let err = state.set_property(0xD1FF, 99).unwrap_err();
        assert!(matches!(err, VcamError::QueueFull { capacity: 10 }));
        assert_eq!(state.pending_len(), EVENT_QUEUE_CAPACITY);
        assert_eq!(state.pending_changes().last().unwrap().code, 0xD109);

        let events = words(&state.get_event());
        assert_eq!(events.len(), 4 * EVENT_QUEUE_CAPACITY);
        assert!(!events.contains(&0xD1FF));

        // Queue drained, accepting again.
        state.set_property(0xD1FF, 99).unwrap();
    }

    #[test]
    fn test_capture_destination_sets_ready() {
        let mut state = VendorState::new();
        assert!(!state.capture_ready());
        state.set_property(prop::EOS_CAPTURE_DESTINATION, 4).unwrap();
        assert!(state.capture_ready());
    }

    #[test]
    fn test_capture_destination_sets_ready_when_full() {
        let mut state = VendorState::new();
        for i in 0..EVENT_QUEUE_CAPACITY as u32 {
            state.set_property(0xD100 + i, i).unwrap();
        }
        assert!(state.set_property(prop::EOS_CAPTURE_DESTINATION, 4).is_err());
        assert!(state.capture_ready());
    }

    #[test]
    fn test_liveview_warmup() {
        let mut state = VendorState::new();
        for _ in 0..14 {
            assert_eq!(state.viewfinder_frame(), ViewfinderFrame::NotReady);
        }
        let fifteenth = state.viewfinder_frame();
        let sixteenth = state.viewfinder_frame();

        assert_eq!(fifteenth, ViewfinderFrame::Ready(Bytes::from_static(LIVEVIEW_FRAME)));
        assert_eq!(sixteenth, fifteenth);
        assert_eq!(state.liveview_calls(), 16);
    }

    #[test]
    fn test_release_delays() {
        let state = VendorState::new();
        assert_eq!(state.remote_release(release::HALF_PRESS), Duration::from_millis(2000));
        assert_eq!(state.remote_release(release::FULL_PRESS), Duration::from_millis(200));
        assert_eq!(state.remote_release(7), Duration::ZERO);
    }

    #[test]
    fn test_liveview_frame_is_jpeg() {
        assert_eq!(&LIVEVIEW_FRAME[..2], &[0xFF, 0xD8]);
        assert_eq!(&LIVEVIEW_FRAME[LIVEVIEW_FRAME.len() - 2..], &[0xFF, 0xD9]);
    }
}
