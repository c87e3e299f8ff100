//! Bounded FIFO between the delivery thread and consumers.
//!
//! One mutex guards the queue; `not_empty` wakes consumers and `not_full`
//! wakes a producer stalled under [`OverflowPolicy::Block`]. Every
//! [`interrupt`](FrameBuffer::interrupt) bumps an epoch so that all current
//! waiters, on either side, return empty-handed.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use windowcast_core::{Frame, OverflowPolicy};

/// Result of handing a frame to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The frame was stored; `evicted` older frames were dropped to make room.
    Stored { depth: usize, evicted: usize },
    /// The buffer was interrupted while the producer waited for space.
    Interrupted,
}

struct BufferState {
    frames: VecDeque<Frame>,
    /// `0` = unbounded.
    capacity: usize,
    epoch: u64,
}

impl BufferState {
    fn is_full(&self) -> bool {
        self.capacity > 0 && self.frames.len() >= self.capacity
    }
}

pub struct FrameBuffer {
    state: Mutex<BufferState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState { frames: VecDeque::new(), capacity, epoch: 0 }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Change the bound. Takes effect on the next push.
    pub fn set_capacity(&self, capacity: usize) {
        self.lock().capacity = capacity;
        self.not_full.notify_all();
    }

    pub fn push(&self, frame: Frame, policy: OverflowPolicy) -> PushOutcome {
        let mut state = self.lock();
        let mut evicted = 0;

        if state.is_full() {
            match policy {
                OverflowPolicy::DropOldest => {
                    while state.is_full() {
                        state.frames.pop_front();
                        evicted += 1;
                    }
                }
                OverflowPolicy::Block => {
                    let epoch = state.epoch;
                    state = self
                        .not_full
                        .wait_while(state, |s| s.epoch == epoch && s.is_full())
                        .unwrap_or_else(PoisonError::into_inner);
                    if state.epoch != epoch {
                        return PushOutcome::Interrupted;
                    }
                }
            }
        }

        state.frames.push_back(frame);
        let depth = state.frames.len();
        drop(state);
        self.not_empty.notify_one();
        PushOutcome::Stored { depth, evicted }
    }

    /// Pop the oldest frame, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let state = self.lock();
        let epoch = state.epoch;
        let (mut state, _) = self
            .not_empty
            .wait_timeout_while(state, timeout, |s| s.frames.is_empty() && s.epoch == epoch)
            .unwrap_or_else(PoisonError::into_inner);
        let frame = state.frames.pop_front();
        drop(state);
        if frame.is_some() {
            self.not_full.notify_one();
        }
        frame
    }

    pub fn try_pop(&self) -> Option<Frame> {
        let frame = self.lock().frames.pop_front();
        if frame.is_some() {
            self.not_full.notify_one();
        }
        frame
    }

    /// Most recently inserted frame, left in place.
    pub fn peek_latest(&self) -> Option<Frame> {
        self.lock().frames.back().cloned()
    }

    /// Remove every buffered frame, oldest first.
    pub fn drain(&self) -> Vec<Frame> {
        let frames: Vec<Frame> = self.lock().frames.drain(..).collect();
        if !frames.is_empty() {
            self.not_full.notify_all();
        }
        frames
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload bytes currently held.
    pub fn buffered_bytes(&self) -> usize {
        self.lock().frames.iter().map(Frame::memory_footprint_bytes).sum()
    }

    /// Discard all frames and release every waiter. Returns the number of
    /// frames discarded.
    pub fn interrupt(&self) -> usize {
        let mut state = self.lock();
        state.epoch = state.epoch.wrapping_add(1);
        let discarded = state.frames.len();
        state.frames.clear();
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        discarded
    }
}
