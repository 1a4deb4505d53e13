//! Frame pacing for multiple frames in flight.
//!
//! With `N` frames in flight the CPU may record frame `f + 1` while the GPU
//! still executes frame `f`. Every frame is assigned a ring slot
//! (`frame_number % N`); per-slot memory such as the
//! [`TransientArena`](crate::memory::TransientArena) is only safe to rewrite
//! once the GPU finished the frame that last used the same slot.
//!
//! [`FramePacer`] enforces exactly that: [`FramePacer::begin_frame`] blocks on
//! the execution point recorded for the slot `N` frames ago and only then
//! hands out the [`FrameIndex`] that unlocks the slot.
//!
//! ```text
//! frames_in_flight = 2
//!
//! Slot 0: [Frame 0] ──► [Frame 2] ──► [Frame 4] ──►
//! Slot 1: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
//! ```

use std::time::Duration;

use crate::sync::ExecutionPoint;

/// Default number of frames in flight.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Ring slot of a frame being recorded.
///
/// Only a [`FramePacer`] can create one, so `slot()` is always in `[0, N)`
/// and the slot's previous GPU work has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameIndex<const N: usize> {
    slot: usize,
    number: u64,
}

impl<const N: usize> FrameIndex<N> {
    fn new(number: u64) -> Self {
        Self {
            slot: (number % N as u64) as usize,
            number,
        }
    }

    /// Ring slot in `[0, N)`.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Monotonically increasing frame number.
    pub fn number(&self) -> u64 {
        self.number
    }
}

/// Gates reuse of ring slots on GPU completion.
///
/// # Thread Safety
///
/// `FramePacer` is owned by the thread building frames; it is not meant to be
/// shared.
#[derive(Debug)]
pub struct FramePacer<const N: usize> {
    in_flight: [Option<ExecutionPoint>; N],
    frame_count: u64,
    open: Option<FrameIndex<N>>,
}

impl<const N: usize> FramePacer<N> {
    const NON_EMPTY: () = assert!(N > 0, "frames in flight must be at least 1");

    /// Create a pacer with no frames in flight.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            in_flight: std::array::from_fn(|_| None),
            frame_count: 0,
            open: None,
        }
    }

    /// Number of frames that may be in flight.
    pub const fn frames_in_flight(&self) -> usize {
        N
    }

    /// Number of frames started so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The frame currently being recorded, if any.
    pub fn current_frame(&self) -> Option<FrameIndex<N>> {
        self.open
    }

    /// Begin a new frame.
    ///
    /// Blocks until the GPU finished the frame that last used the same slot.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not ended.
    pub fn begin_frame(&mut self) -> FrameIndex<N> {
        assert!(
            self.open.is_none(),
            "begin_frame called before end_frame of frame {:?}",
            self.open
        );

        let frame = FrameIndex::new(self.frame_count);
        if let Some(point) = &self.in_flight[frame.slot()] {
            if !point.is_complete() {
                log::trace!(
                    "Frame {} waiting for slot {} ({:?})",
                    frame.number(),
                    frame.slot(),
                    point
                );
            }
            point.wait();
        }

        self.open = Some(frame);
        self.frame_count += 1;
        log::trace!("Begin frame {} (slot {})", frame.number(), frame.slot());
        frame
    }

    /// Begin a new frame, giving up after `timeout`.
    ///
    /// Returns `None` if the slot did not become available in time.
    pub fn try_begin_frame(&mut self, timeout: Duration) -> Option<FrameIndex<N>> {
        let slot = (self.frame_count % N as u64) as usize;
        if let Some(point) = &self.in_flight[slot]
            && !point.wait_timeout(timeout)
        {
            return None;
        }
        Some(self.begin_frame())
    }

    /// Record the execution point of the frame's final submission.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is not the frame returned by the last `begin_frame`.
    pub fn end_frame(&mut self, frame: FrameIndex<N>, point: ExecutionPoint) {
        assert_eq!(
            self.open,
            Some(frame),
            "end_frame called with a frame that is not being recorded"
        );
        self.in_flight[frame.slot()] = Some(point);
        self.open = None;
    }

    /// Block until every frame in flight completed.
    pub fn wait_idle(&self) {
        for point in self.in_flight.iter().flatten() {
            point.wait();
        }
    }

    /// Check whether every frame in flight completed, without blocking.
    pub fn is_idle(&self) -> bool {
        self.in_flight.iter().flatten().all(ExecutionPoint::is_complete)
    }
}

impl<const N: usize> Default for FramePacer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{QueueId, QueueTimeline};

    #[test]
    fn test_slots_rotate() {
        let timeline = QueueTimeline::new(QueueId::GRAPHICS);
        let mut pacer = FramePacer::<3>::new();

        let mut slots = Vec::new();
        for _ in 0..6 {
            let frame = pacer.begin_frame();
            slots.push(frame.slot());
            let point = timeline.next_point();
            timeline.signal(point.value());
            pacer.end_frame(frame, point);
        }

        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(pacer.frame_count(), 6);
    }

    #[test]
    fn test_begin_frame_waits_for_slot() {
        let timeline = QueueTimeline::new(QueueId::GRAPHICS);
        let mut pacer = FramePacer::<2>::new();

        let f0 = pacer.begin_frame();
        let p0 = timeline.next_point();
        pacer.end_frame(f0, p0.clone());

        let f1 = pacer.begin_frame();
        let p1 = timeline.next_point();
        pacer.end_frame(f1, p1);

        // Slot 0 is still busy: a timed attempt fails.
        assert!(pacer.try_begin_frame(Duration::from_millis(5)).is_none());

        let signaller = timeline.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            signaller.signal(1);
        });

        let f2 = pacer.begin_frame();
        assert!(p0.is_complete());
        assert_eq!(f2.slot(), 0);
        assert_eq!(f2.number(), 2);
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_idle() {
        let timeline = QueueTimeline::new(QueueId::GRAPHICS);
        let mut pacer = FramePacer::<2>::new();
        let frame = pacer.begin_frame();
        pacer.end_frame(frame, timeline.next_point());
        assert!(!pacer.is_idle());

        timeline.signal(1);
        pacer.wait_idle();
        assert!(pacer.is_idle());
    }

    #[test]
    #[should_panic(expected = "begin_frame called before end_frame")]
    fn test_double_begin_panics() {
        let mut pacer = FramePacer::<2>::new();
        pacer.begin_frame();
        pacer.begin_frame();
    }
}
