//! Bounded swap-queues.
//!
//! A [`SwapQueue<T>`] is the single primitive behind all three queue
//! shapes the pipeline needs (SPSC reader→parser, MPSC hasher→writer, and
//! the per-bin multiplexed splitter→binwriter sink in [`BinQueues`]) — the
//! shape is a property of how many threads call `push`/`pop`, not of the
//! queue's internals.
//!
//! `push` blocks while the queue is at capacity; `pop` blocks while it is
//! empty. `finalize` lets any blocked or future `pop` drain what remains
//! and then observe end-of-stream instead of blocking forever. Producers
//! exchange a filled bundle for a recycled empty one from a free pool, so
//! steady-state operation never allocates.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    free: VecDeque<T>,
    finalized: bool,
}

pub struct SwapQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> SwapQueue<T> {
    /// `capacity` bounds the number of filled bundles in flight. `free`
    /// seeds the recycled-empty-bundle pool the planner pre-allocated.
    pub fn new(capacity: usize, free: Vec<T>) -> Self {
        assert!(capacity >= 1, "queue capacity must be at least 1 bundle");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                free: VecDeque::from(free),
                finalized: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Pushes a filled bundle, blocking while the queue is full, then
    /// returns a recycled empty bundle from the free pool (blocking if
    /// none is immediately available — the pool is sized by the planner
    /// so this should be rare in steady state).
    ///
    /// # Panics
    /// Panics if called after [`Self::finalize`] — pushing into a
    /// finalized queue is a logic error, not a runtime condition.
    pub fn swap_push(&self, filled: T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        assert!(!guard.finalized, "push into a finalized queue");
        while guard.items.len() >= self.capacity {
            guard = self.not_full.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        guard.items.push_back(filled);
        self.not_empty.notify_one();
        while guard.free.is_empty() {
            guard = self.not_full.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        guard.free.pop_front().expect("checked non-empty above")
    }

    /// Pops a filled bundle, blocking while the queue is empty and not
    /// finalized. Returns `None` once the queue is both empty and
    /// finalized (end-of-stream). `empty` is returned to the free pool
    /// for a producer's next [`Self::swap_push`].
    pub fn swap_pop(&self, empty: T) -> Option<T> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.free.push_back(empty);
        self.not_full.notify_one();
        loop {
            if let Some(item) = guard.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if guard.finalized {
                return None;
            }
            guard = self.not_empty.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Marks the queue finalized: no further `swap_push` is permitted,
    /// and blocked/future `swap_pop` calls drain remaining items, then
    /// return `None`.
    pub fn finalize(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.finalized = true;
        self.not_empty.notify_all();
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).finalized
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A splitter→binwriter sink multiplexed by bin id: one [`SwapQueue`] per
/// bin so a slow bin never blocks delivery to others.
///
/// A single-threaded drain over every bin (as [`crate::bin_writer::run`]
/// does) can't block on any one [`SwapQueue`] without risking blocking
/// past data that arrived on a different bin. `activity`/`cv` give it
/// something to block on instead of spinning: every [`Self::push`] and
/// [`Self::finalize_all`] bumps the generation counter and wakes waiters,
/// so a drain loop that finds nothing to do can wait for the generation
/// to move instead of re-polling every bin in a hot loop.
pub struct BinQueues<T> {
    queues: Vec<SwapQueue<T>>,
    activity: Mutex<u64>,
    cv: Condvar,
}

impl<T> BinQueues<T> {
    pub fn new(num_bins: u32, per_bin_capacity: usize, make_free: impl Fn(u32) -> Vec<T>) -> Self {
        let queues = (0..num_bins)
            .map(|bin| SwapQueue::new(per_bin_capacity, make_free(bin)))
            .collect();
        Self {
            queues,
            activity: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    pub fn queue(&self, bin: u32) -> &SwapQueue<T> {
        &self.queues[bin as usize]
    }

    /// Pushes a filled bundle into `bin`'s queue and wakes any drain
    /// blocked in [`Self::wait_for_activity`].
    pub fn push(&self, bin: u32, filled: T) -> T {
        let recycled = self.queues[bin as usize].swap_push(filled);
        self.bump_activity();
        recycled
    }

    pub fn finalize_all(&self) {
        for q in &self.queues {
            q.finalize();
        }
        self.bump_activity();
    }

    fn bump_activity(&self) {
        let mut generation = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        *generation = generation.wrapping_add(1);
        self.cv.notify_all();
    }

    /// The current activity generation, to pass back into
    /// [`Self::wait_for_activity`] after a drain pass that found nothing
    /// to do.
    pub fn generation(&self) -> u64 {
        *self.activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks until the activity generation has advanced past `since` —
    /// i.e. some bin was pushed to or finalized after the caller last
    /// captured a generation. Never busy-waits: if the generation already
    /// moved, returns immediately.
    pub fn wait_for_activity(&self, since: u64) {
        let guard = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = self
            .cv
            .wait_while(guard, |generation| *generation == since)
            .unwrap_or_else(|e| e.into_inner());
    }

    pub fn num_bins(&self) -> u32 {
        self.queues.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_then_pop_round_trips_value() {
        let q: SwapQueue<Vec<u8>> = SwapQueue::new(2, vec![Vec::new(), Vec::new()]);
        let empty = q.swap_push(vec![1, 2, 3]);
        assert!(empty.is_empty());
        let filled = q.swap_pop(Vec::new()).unwrap();
        assert_eq!(filled, vec![1, 2, 3]);
    }

    #[test]
    fn finalize_drains_then_returns_none() {
        let q: SwapQueue<u32> = SwapQueue::new(4, vec![0, 0]);
        q.swap_push(7);
        q.finalize();
        assert_eq!(q.swap_pop(0), Some(7));
        assert_eq!(q.swap_pop(0), None);
    }

    #[test]
    #[should_panic(expected = "finalized")]
    fn push_after_finalize_panics() {
        let q: SwapQueue<u32> = SwapQueue::new(1, vec![0]);
        q.finalize();
        q.swap_push(1);
    }

    #[test]
    fn producer_consumer_threads_transfer_all_items() {
        let q = Arc::new(SwapQueue::<u32>::new(2, vec![0, 0]));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..50 {
                    q.swap_push(i);
                }
                q.finalize();
            })
        };
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut sum = 0u32;
                let mut empty = 0u32;
                while let Some(v) = q.swap_pop(empty) {
                    sum += v;
                    empty = 0;
                }
                sum
            })
        };
        producer.join().unwrap();
        let sum = consumer.join().unwrap();
        assert_eq!(sum, (0..50).sum::<u32>());
    }

    #[test]
    fn bin_queues_route_independently() {
        let bq: BinQueues<u32> = BinQueues::new(4, 2, |_| vec![0, 0]);
        bq.queue(1).swap_push(99);
        assert_eq!(bq.queue(1).len(), 1);
        assert_eq!(bq.queue(0).len(), 0);
        bq.finalize_all();
        assert!(bq.queue(0).is_finalized());
    }

    #[test]
    fn bin_queues_push_advances_activity_generation() {
        let bq: BinQueues<u32> = BinQueues::new(2, 2, |_| vec![0, 0]);
        let before = bq.generation();
        bq.push(0, 7);
        assert_ne!(bq.generation(), before);
    }

    #[test]
    fn wait_for_activity_returns_immediately_if_already_stale() {
        let bq: BinQueues<u32> = BinQueues::new(2, 2, |_| vec![0, 0]);
        let since = bq.generation();
        bq.push(0, 7);
        // generation already moved past `since`, so this must not block.
        bq.wait_for_activity(since);
    }
}
