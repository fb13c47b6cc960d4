use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::engine::config::QueuePolicy;
use crate::engine::input::InputEvent;
use crate::engine::surface::SurfaceId;

/// Result of offering an event to an [`InputQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Event was queued
    Accepted,
    /// Pointer motion was dropped because the backlog reached the soft cap
    RejectedMotion,
    /// Event was dropped because the backlog reached the hard cap
    RejectedFull { backlog: usize },
    /// Queue (or its surface) has been closed
    Closed,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Bounded, class-aware input queue of a single surface.
///
/// Any number of producers may enqueue concurrently. Draining happens on the pump thread only.
/// Relative order is preserved within every event class.
pub struct InputQueue {
    owner: SurfaceId,
    policy: QueuePolicy,
    events: Mutex<VecDeque<InputEvent>>,
    closed: AtomicBool,
}

impl InputQueue {
    pub fn new(owner: SurfaceId, policy: QueuePolicy) -> Self {
        Self {
            owner,
            policy,
            events: Mutex::new(VecDeque::with_capacity(policy.motion_soft_cap)),
            closed: AtomicBool::new(false),
        }
    }

    /// Offers an event to the queue.
    ///
    /// Pointer motion is dropped silently once the backlog reaches the soft cap. Any event is
    /// dropped once the backlog reaches the hard cap, which is logged since it means the engine
    /// is not keeping up at all.
    pub fn enqueue(&self, mut event: InputEvent) -> Admission {
        if self.is_closed() {
            return Admission::Closed;
        }

        let mut events = self.lock();
        if self.is_closed() {
            return Admission::Closed;
        }

        let backlog = events.len();
        if event.is_motion() && backlog >= self.policy.motion_soft_cap {
            return Admission::RejectedMotion;
        }
        if backlog >= self.policy.hard_cap {
            log::error!(
                "Surface[{}]: input queue full, dropping {} (backlog: {})",
                self.owner,
                event.name(),
                backlog
            );
            return Admission::RejectedFull { backlog };
        }

        event.mark_enqueued(Instant::now());
        events.push_back(event);
        Admission::Accepted
    }

    /// Removes up to `max_total` events in FIFO order, taking at most `max_motion` pointer-motion
    /// events.
    ///
    /// Motion events beyond `max_motion` stay in the queue, in their original order and ahead of
    /// everything that was not looked at, so the next drain continues where this one stopped.
    pub fn drain_up_to(&self, max_total: usize, max_motion: usize) -> Vec<InputEvent> {
        let mut events = self.lock();
        if events.is_empty() || self.is_closed() {
            return Vec::new();
        }

        let mut drained = Vec::with_capacity(max_total.min(events.len()));
        let mut deferred = VecDeque::new();
        let mut motion = 0;

        while drained.len() < max_total {
            let Some(event) = events.pop_front() else {
                break;
            };
            if event.is_motion() {
                if motion >= max_motion {
                    deferred.push_back(event);
                    continue;
                }
                motion += 1;
            }
            drained.push(event);
        }

        if !deferred.is_empty() {
            deferred.append(&mut *events);
            *events = deferred;
        }

        drained
    }

    /// Drains using the limits of the queue's own policy.
    pub fn drain(&self) -> Vec<InputEvent> {
        self.drain_up_to(self.policy.drain_total, self.policy.drain_motion)
    }

    /// Closes the queue. Pending events are discarded and later offers are refused.
    ///
    /// Returns the number of discarded events.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let mut events = self.lock();
        let discarded = events.len();
        events.clear();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<InputEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
