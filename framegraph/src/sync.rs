//! GPU progress tracking.
//!
//! Every queue owns a [`QueueTimeline`]: a monotonically increasing counter
//! the backend advances as submitted work finishes. Each submission reserves
//! the next counter value and hands back an [`ExecutionPoint`] for it.
//!
//! An execution point is complete once the timeline's completed value has
//! reached the point's value. Callers can poll ([`ExecutionPoint::is_complete`]),
//! block ([`ExecutionPoint::wait`]) or await ([`ExecutionPoint::completion`]).
//! Blocking parks the thread on a condition variable; nothing spins.

use std::cmp::Ordering as CmpOrdering;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Identity of a GPU queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub u32);

impl QueueId {
    /// The single graphics/present queue.
    pub const GRAPHICS: Self = Self(0);
}

struct Progress {
    completed: u64,
    wakers: Vec<(u64, Waker)>,
}

struct TimelineState {
    progress: Mutex<Progress>,
    condvar: Condvar,
}

impl TimelineState {
    fn new(completed: u64) -> Self {
        Self {
            progress: Mutex::new(Progress {
                completed,
                wakers: Vec::new(),
            }),
            condvar: Condvar::new(),
        }
    }
}

/// Completion counter of one GPU queue.
///
/// Cloning shares the same underlying counter.
#[derive(Clone)]
pub struct QueueTimeline {
    queue: QueueId,
    submitted: Arc<AtomicU64>,
    state: Arc<TimelineState>,
}

impl QueueTimeline {
    /// Create a timeline with nothing submitted and nothing completed.
    pub fn new(queue: QueueId) -> Self {
        Self {
            queue,
            submitted: Arc::new(AtomicU64::new(0)),
            state: Arc::new(TimelineState::new(0)),
        }
    }

    /// The queue this timeline belongs to.
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    /// Reserve the execution point of the next submission.
    pub fn next_point(&self) -> ExecutionPoint {
        let value = self.submitted.fetch_add(1, Ordering::AcqRel) + 1;
        ExecutionPoint {
            queue: self.queue,
            value,
            state: Arc::clone(&self.state),
        }
    }

    /// Last counter value handed out by [`next_point`](Self::next_point).
    pub fn submitted_value(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    /// Last counter value the GPU finished.
    pub fn completed_value(&self) -> u64 {
        self.state.progress.lock().completed
    }

    /// Point that completes once everything submitted so far has finished.
    pub fn last_submitted(&self) -> ExecutionPoint {
        ExecutionPoint {
            queue: self.queue,
            value: self.submitted_value(),
            state: Arc::clone(&self.state),
        }
    }

    /// Mark all work up to and including `value` as finished.
    ///
    /// Called by backends when the GPU retires a submission.
    ///
    /// # Panics
    ///
    /// Panics if `value` is lower than the already completed value.
    pub fn signal(&self, value: u64) {
        let ready: Vec<Waker> = {
            let mut progress = self.state.progress.lock();
            assert!(
                value >= progress.completed,
                "queue {:?} timeline moved backwards ({} -> {})",
                self.queue,
                progress.completed,
                value
            );
            progress.completed = value;

            let mut ready = Vec::new();
            progress.wakers.retain(|(target, waker)| {
                if *target <= value {
                    ready.push(waker.clone());
                    false
                } else {
                    true
                }
            });
            ready
        };

        self.state.condvar.notify_all();
        for waker in ready {
            waker.wake();
        }

        log::trace!("Queue {:?} completed up to {}", self.queue, value);
    }
}

impl std::fmt::Debug for QueueTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTimeline")
            .field("queue", &self.queue)
            .field("submitted", &self.submitted_value())
            .field("completed", &self.completed_value())
            .finish()
    }
}

/// "GPU progress has reached `value` on `queue`."
///
/// # Example
///
/// ```ignore
/// let point = device.submit(commands)?;
///
/// // Non-blocking check
/// if !point.is_complete() {
///     point.wait();
/// }
/// ```
#[derive(Clone)]
pub struct ExecutionPoint {
    queue: QueueId,
    value: u64,
    state: Arc<TimelineState>,
}

impl ExecutionPoint {
    /// A point that is already complete.
    pub fn completed(queue: QueueId) -> Self {
        Self {
            queue,
            value: 0,
            state: Arc::new(TimelineState::new(0)),
        }
    }

    /// The queue this point belongs to.
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    /// The counter value this point waits for.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Check completion without blocking.
    pub fn is_complete(&self) -> bool {
        self.state.progress.lock().completed >= self.value
    }

    /// Block until the point completes. Returns immediately if it already has.
    pub fn wait(&self) {
        let mut progress = self.state.progress.lock();
        while progress.completed < self.value {
            self.state.condvar.wait(&mut progress);
        }
    }

    /// Block until the point completes or the timeout elapses.
    ///
    /// Returns `true` if the point completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.state.progress.lock();
        while progress.completed < self.value {
            if self
                .state
                .condvar
                .wait_until(&mut progress, deadline)
                .timed_out()
            {
                return progress.completed >= self.value;
            }
        }
        true
    }

    /// A future resolving once the point completes.
    pub fn completion(&self) -> Completion {
        Completion {
            point: self.clone(),
        }
    }
}

impl PartialEq for ExecutionPoint {
    fn eq(&self, other: &Self) -> bool {
        self.queue == other.queue && self.value == other.value
    }
}

impl Eq for ExecutionPoint {}

impl PartialOrd for ExecutionPoint {
    /// Points on different queues are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        if self.queue == other.queue {
            Some(self.value.cmp(&other.value))
        } else {
            None
        }
    }
}

impl std::fmt::Debug for ExecutionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPoint")
            .field("queue", &self.queue)
            .field("value", &self.value)
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Future returned by [`ExecutionPoint::completion`].
#[derive(Debug)]
pub struct Completion {
    point: ExecutionPoint,
}

impl Future for Completion {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let point = &self.point;
        let mut progress = point.state.progress.lock();
        if progress.completed >= point.value {
            return Poll::Ready(());
        }

        let waker = cx.waker();
        let value = point.value;
        if !progress
            .wakers
            .iter()
            .any(|(target, existing)| *target == value && existing.will_wake(waker))
        {
            progress.wakers.push((value, waker.clone()));
        }
        Poll::Pending
    }
}
