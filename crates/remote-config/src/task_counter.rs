//! An integer counter of outstanding background tasks with a bounded
//! wait for drain-to-zero (spec.md §4.G helper, consumed by
//! `bundle-assembler`'s attribute-extraction guard).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct TaskCounter {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: AtomicI64,
    notify: Notify,
}

impl TaskCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_task(&self) {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the counter. Panics if it was already zero, matching
    /// spec.md's "throws if zero" contract.
    pub fn finish_task(&self) {
        let previous = self.inner.count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "finish_task called with no outstanding tasks");
        if previous == 1 {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn active_task_count(&self) -> i64 {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Resolves when the counter reaches zero, or after `timeout` elapses
    /// with whatever state is current (spec.md: "resolving with what has
    /// been collected").
    pub async fn wait_for_zero(&self, timeout: Option<Duration>) -> bool {
        let wait = self.inner.notify.notified();
        if self.active_task_count() == 0 {
            return true;
        }
        match timeout {
            Some(duration) => tokio::time::timeout(duration, wait).await.is_ok() || self.active_task_count() == 0,
            None => {
                wait.await;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "no outstanding tasks")]
    fn finish_without_start_panics() {
        let counter = TaskCounter::new();
        counter.finish_task();
    }

    #[tokio::test]
    async fn wait_for_zero_resolves_immediately_when_already_zero() {
        let counter = TaskCounter::new();
        assert!(counter.wait_for_zero(Some(Duration::from_millis(10))).await);
    }

    #[tokio::test]
    async fn wait_for_zero_resolves_once_all_tasks_finish() {
        let counter = TaskCounter::new();
        counter.start_task();
        counter.start_task();
        let waiter = counter.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_zero(Some(Duration::from_secs(5))).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        counter.finish_task();
        counter.finish_task();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn wait_for_zero_times_out_with_partial_progress() {
        let counter = TaskCounter::new();
        counter.start_task();
        let resolved = counter.wait_for_zero(Some(Duration::from_millis(20))).await;
        assert!(!resolved);
        assert_eq!(counter.active_task_count(), 1);
    }
}
