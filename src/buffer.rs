//! Bounded hand-off queue between the stream producer and its consumer.
//!
//! The producer (network read + normalization) must never stall on a slow
//! consumer, so the default [`OverflowPolicy::DropOldest`] evicts the oldest
//! buffered element to admit a new one: the consumer sees the freshest state and
//! memory stays bounded, at the cost of skipped chunks. [`OverflowPolicy::Block`]
//! trades that for completeness by making [`StreamBuffer::push`] wait for space.
//!
//! All operations are safe to call concurrently from the producer and consumer
//! tasks. State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`; wake-ups go through two `tokio::sync::Notify`s.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Behavior when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest element to admit the new one
    DropOldest,
    /// Make the producer wait until the consumer frees a slot
    Block,
}

impl OverflowPolicy {
    /// Parse a policy from a string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" | "dropoldest" | "drop" => {
                Some(OverflowPolicy::DropOldest)
            }
            "block" | "blocking" | "backpressure" => Some(OverflowPolicy::Block),
            _ => None,
        }
    }
}

struct BufferState<T> {
    queue: VecDeque<T>,
    finished: bool,
    dropped: u64,
}

/// Fixed-capacity queue with an explicit overflow policy.
pub struct StreamBuffer<T> {
    state: Mutex<BufferState<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    readable: Notify,
    writable: Notify,
}

impl<T> StreamBuffer<T> {
    /// Creates a buffer. A capacity of zero is treated as one.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(BufferState {
                queue: VecDeque::with_capacity(capacity),
                finished: false,
                dropped: 0,
            }),
            capacity,
            policy,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Non-blocking append.
    ///
    /// When full, the oldest element is evicted regardless of policy; callers
    /// that want to wait for space use [`StreamBuffer::push`]. Returns `false`
    /// once the buffer is finished.
    pub fn append(&self, element: T) -> bool {
        {
            let mut state = self.lock();
            if state.finished {
                return false;
            }
            if state.queue.len() >= self.capacity {
                state.queue.pop_front();
                state.dropped += 1;
                log::trace!(
                    "stream buffer full ({}), evicted oldest element",
                    self.capacity
                );
            }
            state.queue.push_back(element);
        }
        self.readable.notify_one();
        true
    }

    /// Appends according to the configured policy.
    ///
    /// Under `DropOldest` this never waits. Under `Block` it waits for a free
    /// slot. Returns `false` if the buffer was finished before the element
    /// could be admitted.
    pub async fn push(&self, element: T) -> bool {
        if self.policy == OverflowPolicy::DropOldest {
            return self.append(element);
        }

        loop {
            let notified = self.writable.notified();
            {
                let mut state = self.lock();
                if state.finished {
                    return false;
                }
                if state.queue.len() < self.capacity {
                    state.queue.push_back(element);
                    drop(state);
                    self.readable.notify_one();
                    return true;
                }
            }
            notified.await;
        }
    }

    pub fn remove_first(&self) -> Option<T> {
        let element = self.lock().queue.pop_front();
        if element.is_some() {
            self.writable.notify_one();
        }
        element
    }

    /// Waits for the next element. Returns `None` once finished and drained.
    pub async fn next(&self) -> Option<T> {
        loop {
            let notified = self.readable.notified();
            {
                let mut state = self.lock();
                if let Some(element) = state.queue.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Some(element);
                }
                if state.finished {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Marks that no further appends will occur. Buffered elements stay readable.
    pub fn finish(&self) {
        self.lock().finished = true;
        self.readable.notify_one();
        self.writable.notify_one();
    }

    /// Finishes the buffer and discards anything still queued.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.finished = true;
            state.queue.clear();
        }
        self.readable.notify_one();
        self.writable.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().queue.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of elements evicted by drop-oldest so far
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

impl<T> std::fmt::Debug for StreamBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("StreamBuffer")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("len", &state.queue.len())
            .field("finished", &state.finished)
            .field("dropped", &state.dropped)
            .finish()
    }
}
