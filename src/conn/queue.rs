//! The priority send queue: a `BTreeMap<i16, VecDeque<T>>` with a dynamic
//! "limit" barrier, grounded on `grabbit.common.ChunkedPriorityQueue` (see
//! `examples/original_source/grabbit/protocol/connection.py`'s
//! `send_queue.limit_to(0)`/`set_limit(-1)` usage and
//! `examples/original_source/grabbit/tests/test_common.py`'s
//! `ChunkedPriorityQueueTests`, which is the authority for the exact
//! dequeue rule: `test_limit` puts `(0, 'foo')` and `(1, 'bar')`, sets
//! `limit=0`, and gets `foo` (priority 0) before blocking on `bar` (priority
//! 1), so an item is eligible iff `priority <= limit`, not `<` as an
//! earlier reading of the prose alone would suggest.
//!
//! Lower priority is served first; FIFO within a priority. A nested
//! `limit_to` restores the previous limit when the returned guard drops, on
//! every exit path (including panics unwinding through it).

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;

/// Sentinel meaning "every priority currently in use is eligible", the
/// queue's initial state, matching the source's `set_limit(None)`.
pub const UNBOUNDED: i16 = i16::MAX;

struct Inner<T> {
    items: BTreeMap<i16, VecDeque<T>>,
    limit: i16,
}

/// A priority-ordered queue of pending sends, gated by a mutable limit.
///
/// Locking is a plain blocking `std::sync::Mutex`: every critical section
/// here is a handful of `BTreeMap`/`VecDeque` operations with no `.await`
/// inside it, so there is nothing to gain from an async mutex and a
/// synchronous `Drop` is what lets `limit_to`'s guard restore the previous
/// limit without needing async drop.
pub struct PriorityQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> PriorityQueue<T> {
        PriorityQueue {
            inner: Mutex::new(Inner {
                items: BTreeMap::new(),
                limit: UNBOUNDED,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueues `item` at `priority`, FIFO among items already at that
    /// priority.
    pub fn put(&self, priority: i16, item: T) {
        let mut inner = self.inner.lock().expect("priority queue mutex poisoned");
        inner.items.entry(priority).or_default().push_back(item);
        drop(inner);
        self.notify.notify_one();
    }

    /// Returns the lowest-priority eligible item without blocking, or
    /// `None` if nothing is currently eligible.
    pub fn try_get(&self) -> Option<T> {
        let mut inner = self.inner.lock().expect("priority queue mutex poisoned");
        let limit = inner.limit;
        let eligible = inner
            .items
            .range(..=limit)
            .next()
            .map(|(&priority, _)| priority)?;
        let queue = inner
            .items
            .get_mut(&eligible)
            .expect("key just observed in range()");
        let item = queue.pop_front().expect("non-empty queues only ever live in the map");
        if queue.is_empty() {
            inner.items.remove(&eligible);
        }
        Some(item)
    }

    /// Returns the lowest-priority eligible item, waiting for one to
    /// become available (either by `put` or by the limit being raised).
    pub async fn get(&self) -> T {
        loop {
            // Register interest before checking state, not after: a
            // `notify_waiters()` fired between a failed check and an
            // `.await` on a *freshly constructed* `Notified` would
            // otherwise be missed.
            let notified = self.notify.notified();
            if let Some(item) = self.try_get() {
                return item;
            }
            notified.await;
        }
    }

    pub fn set_limit(&self, limit: i16) {
        {
            let mut inner = self.inner.lock().expect("priority queue mutex poisoned");
            inner.limit = limit;
        }
        self.notify.notify_waiters();
    }

    /// Temporarily narrows the limit, restoring the previous value when the
    /// returned guard is dropped.
    pub fn limit_to(&self, limit: i16) -> LimitGuard<'_, T> {
        let previous = {
            let mut inner = self.inner.lock().expect("priority queue mutex poisoned");
            let previous = inner.limit;
            inner.limit = limit;
            previous
        };
        self.notify.notify_waiters();
        LimitGuard {
            queue: self,
            previous,
        }
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        PriorityQueue::new()
    }
}

/// RAII restoration of a `limit_to` scope's previous limit.
pub struct LimitGuard<'a, T> {
    queue: &'a PriorityQueue<T>,
    previous: i16,
}

impl<T> Drop for LimitGuard<'_, T> {
    fn drop(&mut self) {
        self.queue.set_limit(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_priority_and_strict_across() {
        let q: PriorityQueue<&'static str> = PriorityQueue::new();
        q.put(1, "a");
        q.put(0, "b");
        q.put(1, "c");
        assert_eq!(q.try_get(), Some("b"));
        assert_eq!(q.try_get(), Some("a"));
        assert_eq!(q.try_get(), Some("c"));
        assert_eq!(q.try_get(), None);
    }

    #[test]
    fn limit_gates_dequeue_by_priority() {
        let q: PriorityQueue<&'static str> = PriorityQueue::new();
        q.put(0, "foo");
        q.put(1, "bar");
        q.set_limit(0);
        assert_eq!(q.try_get(), Some("foo"));
        assert_eq!(q.try_get(), None);
        q.set_limit(UNBOUNDED);
        assert_eq!(q.try_get(), Some("bar"));
    }

    #[test]
    fn nested_limit_to_restores_on_every_exit() {
        let q: PriorityQueue<&'static str> = PriorityQueue::new();
        q.put(0, "foo");
        q.put(1, "bar");
        {
            let _outer = q.limit_to(0);
            {
                let _inner = q.limit_to(-1);
                assert_eq!(q.try_get(), None);
            }
            assert_eq!(q.try_get(), Some("foo"));
            assert_eq!(q.try_get(), None);
        }
        assert_eq!(q.try_get(), Some("bar"));
    }

    #[tokio::test]
    async fn get_wakes_on_put() {
        let q: std::sync::Arc<PriorityQueue<i32>> = std::sync::Arc::new(PriorityQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.get().await });
        tokio::task::yield_now().await;
        q.put(16, 42);
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn get_wakes_on_limit_change() {
        let q: std::sync::Arc<PriorityQueue<i32>> = std::sync::Arc::new(PriorityQueue::new());
        q.set_limit(-1);
        q.put(16, 7);
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.get().await });
        tokio::task::yield_now().await;
        q.set_limit(UNBOUNDED);
        assert_eq!(handle.await.unwrap(), 7);
    }
}
