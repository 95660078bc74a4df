//! Depth-one, latest-wins hand-off between frame producers and the render
//! thread. Producers never block on the GPU; an unconsumed frame is simply
//! replaced and counted as superseded.
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::FrameError;
use crate::types::Frame;

#[derive(Debug)]
pub(crate) enum Pending {
    Frame(Frame),
    Clear,
}

#[derive(Debug, Default)]
struct SlotState {
    pending: Option<Pending>,
    last_timestamp: Option<Duration>,
    /// True from an accepted frame until the next clear, whether or not the
    /// render thread has taken it yet.
    has_content: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FrameSlot {
    state: Mutex<SlotState>,
    superseded: AtomicU64,
    /// Largest texture side the backend accepts; zero until the render
    /// thread reports it.
    max_dimension: AtomicU32,
}

impl FrameSlot {
    pub(crate) fn submit(&self, frame: Option<Frame>) -> Result<(), FrameError> {
        let Some(frame) = frame else {
            let mut state = self.lock();
            if matches!(state.pending, Some(Pending::Frame(_))) {
                self.superseded.fetch_add(1, Ordering::Relaxed);
            }
            state.pending = Some(Pending::Clear);
            state.last_timestamp = None;
            state.has_content = false;
            return Ok(());
        };

        frame.validate()?;
        let max = self.max_dimension.load(Ordering::Relaxed);
        if max != 0 && (frame.width > max || frame.height > max) {
            return Err(FrameError::TooLarge {
                width: frame.width,
                height: frame.height,
                max,
            });
        }
        let mut state = self.lock();
        if let Some(previous) = state.last_timestamp {
            if frame.timestamp < previous {
                return Err(FrameError::OutOfOrder {
                    previous,
                    received: frame.timestamp,
                });
            }
        }
        state.last_timestamp = Some(frame.timestamp);
        if matches!(state.pending, Some(Pending::Frame(_))) {
            self.superseded.fetch_add(1, Ordering::Relaxed);
        }
        state.pending = Some(Pending::Frame(frame));
        state.has_content = true;
        Ok(())
    }

    pub(crate) fn take(&self) -> Option<Pending> {
        self.lock().pending.take()
    }

    #[cfg(test)]
    pub(crate) fn has_pending_frame(&self) -> bool {
        matches!(self.lock().pending, Some(Pending::Frame(_)))
    }

    /// Whether a frame has been accepted since start-up or the last clear.
    pub(crate) fn has_content(&self) -> bool {
        self.lock().has_content
    }

    pub(crate) fn set_max_dimension(&self, max: u32) {
        self.max_dimension.store(max, Ordering::Relaxed);
    }

    pub(crate) fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // State is only ever replaced whole, so a poisoned lock is still usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable producer handle for feeding frames from any thread.
#[derive(Debug, Clone)]
pub struct FrameSink {
    slot: Arc<FrameSlot>,
}

impl FrameSink {
    pub(crate) fn new(slot: Arc<FrameSlot>) -> Self {
        Self { slot }
    }

    /// Offers the newest frame, or `None` to clear the picture.
    pub fn submit(&self, frame: Option<Frame>) -> Result<(), FrameError> {
        self.slot.submit(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelLayout;

    fn frame(millis: u64) -> Frame {
        Frame::new(
            1,
            1,
            PixelLayout::Rgba8,
            vec![0, 0, 0, 255],
            Duration::from_millis(millis),
        )
    }

    #[test]
    fn newer_frame_replaces_unconsumed_one() {
        let slot = FrameSlot::default();
        slot.submit(Some(frame(1))).unwrap();
        slot.submit(Some(frame(2))).unwrap();

        match slot.take() {
            Some(Pending::Frame(frame)) => assert_eq!(frame.timestamp, Duration::from_millis(2)),
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(slot.take().is_none());
        assert_eq!(slot.superseded(), 1);
    }

    #[test]
    fn out_of_order_frames_are_rejected() {
        let slot = FrameSlot::default();
        slot.submit(Some(frame(10))).unwrap();
        let err = slot.submit(Some(frame(5))).unwrap_err();
        assert!(matches!(err, FrameError::OutOfOrder { .. }));
        assert!(slot.has_pending_frame());
    }

    #[test]
    fn clearing_resets_timestamp_baseline() {
        let slot = FrameSlot::default();
        slot.submit(Some(frame(10))).unwrap();
        slot.submit(None).unwrap();
        assert!(matches!(slot.take(), Some(Pending::Clear)));
        slot.submit(Some(frame(1))).expect("new epoch after clear");
    }

    #[test]
    fn content_follows_submissions_not_consumption() {
        let slot = FrameSlot::default();
        assert!(!slot.has_content());
        slot.submit(Some(frame(1))).unwrap();
        assert!(slot.take().is_some());
        assert!(slot.has_content(), "taken frames still count as content");
        slot.submit(None).unwrap();
        assert!(!slot.has_content());
    }

    #[test]
    fn frames_beyond_the_texture_limit_are_rejected() {
        let slot = FrameSlot::default();
        slot.set_max_dimension(4);
        let wide = Frame::new(5, 1, PixelLayout::Rgba8, vec![0; 20], Duration::ZERO);
        assert_eq!(
            slot.submit(Some(wide)),
            Err(FrameError::TooLarge {
                width: 5,
                height: 1,
                max: 4
            })
        );
        assert!(!slot.has_content());
        slot.submit(Some(frame(1))).expect("within the limit");
    }

    #[test]
    fn invalid_frames_never_reach_the_slot() {
        let slot = FrameSlot::default();
        let sink = FrameSink::new(Arc::new(slot));
        let bad = Frame::new(2, 2, PixelLayout::Rgba8, vec![0; 3], Duration::ZERO);
        assert!(matches!(
            sink.submit(Some(bad)),
            Err(FrameError::BufferSize { .. })
        ));
        assert!(!sink.slot.has_pending_frame());
    }
}
