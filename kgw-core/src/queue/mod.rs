//! Deduplicating, rate-limited work queue.
//!
//! The queue is a set of keys ordered by readiness, not a FIFO of every
//! notification:
//!
//! - a key added while it is already pending is merged with the pending entry
//! - a key handed out by [`get`](RateLimitingQueue::get) is *processing* and
//!   is never handed to a second caller until [`done`](RateLimitingQueue::done)
//! - a key added while processing is parked and becomes ready on `done`
//! - delayed keys wait in a timer heap; re-adding a waiting key keeps the
//!   earlier ready time
//!
//! Workers only ever interact with the queue through its methods; all state
//! sits behind one mutex.

mod rate_limiter;

pub use rate_limiter::{
    ExponentialBackoff, MaxOf, RateLimiter, TokenBucket, default_controller_rate_limiter,
};

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A rate-limited, deduplicating work queue.
pub struct RateLimitingQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    limiter: Box<dyn RateLimiter<K>>,
}

struct QueueState<K> {
    /// Ready keys in the order they became ready.
    ready: VecDeque<K>,
    /// Keys that need processing (ready, or re-added while processing).
    dirty: HashSet<K>,
    /// Keys currently owned by a worker.
    processing: HashSet<K>,
    /// Earliest ready time of each delayed key.
    waiting: HashMap<K, Instant>,
    /// Timer heap over `waiting`; entries no longer matching `waiting` are stale.
    timers: BinaryHeap<Timer<K>>,
    seq: u64,
    shutting_down: bool,
}

struct Timer<K> {
    ready_at: Instant,
    seq: u64,
    key: K,
}

impl<K> PartialEq for Timer<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<K> Eq for Timer<K> {}

impl<K> PartialOrd for Timer<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Timer<K> {
    // Reversed so the max-heap pops the earliest timer first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<K: Clone + Eq + Hash> QueueState<K> {
    fn insert(&mut self, key: K) {
        if self.dirty.contains(&key) {
            return;
        }
        self.waiting.remove(&key);
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return;
        }
        self.ready.push_back(key);
    }

    /// Move every timer that has fired into the ready set.
    fn promote_expired(&mut self, now: Instant) {
        while let Some(timer) = self.timers.peek() {
            if timer.ready_at > now {
                break;
            }
            let Some(timer) = self.timers.pop() else {
                break;
            };
            if self.waiting.get(&timer.key) == Some(&timer.ready_at) {
                self.waiting.remove(&timer.key);
                self.insert(timer.key);
            }
        }
    }

    /// Ready time of the earliest live timer, discarding stale ones.
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(timer) = self.timers.peek() {
            if self.waiting.get(&timer.key) == Some(&timer.ready_at) {
                return Some(timer.ready_at);
            }
            self.timers.pop();
        }
        None
    }
}

impl<K> RateLimitingQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    /// Create a queue that delays retries according to `limiter`.
    pub fn new(limiter: impl RateLimiter<K> + 'static) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                waiting: HashMap::new(),
                timers: BinaryHeap::new(),
                seq: 0,
                shutting_down: false,
            }),
            notify: Notify::new(),
            limiter: Box::new(limiter),
        }
    }

    /// Create a queue with [`default_controller_rate_limiter`].
    pub fn with_default_limiter() -> Self {
        Self::new(default_controller_rate_limiter())
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing processing. Idempotent while the key is pending.
    pub fn add(&self, key: K) {
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            state.insert(key);
        }
        self.notify.notify_waiters();
    }

    /// Add `key` once `delay` has elapsed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        {
            let mut state = self.lock();
            if state.shutting_down || state.dirty.contains(&key) {
                return;
            }
            let ready_at = Instant::now() + delay;
            if state
                .waiting
                .get(&key)
                .is_some_and(|existing| *existing <= ready_at)
            {
                return;
            }
            state.waiting.insert(key.clone(), ready_at);
            state.seq += 1;
            let seq = state.seq;
            state.timers.push(Timer { ready_at, seq, key });
        }
        self.notify.notify_waiters();
    }

    /// Add `key` after the delay the rate limiter assigns to it.
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.limiter.when(&key);
        self.add_after(key, delay);
    }

    /// Reset the failure history of `key`.
    pub fn forget(&self, key: &K) {
        self.limiter.forget(key);
    }

    /// Number of times `key` has been rate-limited since it was last forgotten.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.limiter.num_requeues(key)
    }

    /// Wait for the next ready key and mark it as processing.
    ///
    /// Returns `None` once the queue is shut down, even if keys are pending.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a concurrent add cannot be missed.
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                state.promote_expired(Instant::now());
                if let Some(key) = state.ready.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.next_deadline()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release `key`. If it was re-added while processing it becomes ready again.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.ready.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_waiters();
        }
    }

    /// Stop handing out work. Every blocked and future [`get`](Self::get)
    /// returns `None`.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys ready to be handed out.
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
