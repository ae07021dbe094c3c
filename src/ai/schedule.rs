//! Cancellable scheduled tasks
//!
//! Timer-driven work (debounced estimates, periodic provider refresh) runs on
//! tokio tasks owned by a `ScheduledTask` handle. Cancelling or dropping the
//! handle aborts the task, so nothing outlives its owner. Everything uses the
//! tokio clock, which tests pause with `start_paused`.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};

/// Handle to a spawned timer task; aborts the task on cancel or drop
#[derive(Debug)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Run `work` once after `delay`
    pub fn after<F>(delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            work.await;
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Run `tick` every `period`, starting immediately
    pub fn periodic<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tick().await;
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// True once the task has run to completion or been cancelled
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs only the most recent submission once input has been quiet for `delay`
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<ScheduledTask>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `work`, cancelling any earlier submission still waiting
    pub fn call<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Debouncer lock poisoned, recovering");
            poisoned.into_inner()
        });
        // Replacing drops the previous handle, which aborts it
        *pending = Some(ScheduledTask::after(self.delay, work));
    }

    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Debouncer lock poisoned, recovering");
            poisoned.into_inner()
        });
        pending.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_after_runs_once() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = ScheduledTask::after(Duration::from_millis(50), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let mut task = ScheduledTask::after(Duration::from_millis(50), async move {
            c.fetch_add(1, Ordering::SeqCst);
        });
        task.cancel();

        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_keeps_last_call() {
        let count = Arc::new(AtomicU32::new(0));
        let last = Arc::new(AtomicU32::new(0));
        let debouncer = Debouncer::new(Duration::from_millis(300));

        for i in 1..=3 {
            let c = count.clone();
            let l = last.clone();
            debouncer.call(async move {
                c.fetch_add(1, Ordering::SeqCst);
                l.store(i, Ordering::SeqCst);
            });
            sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks_until_dropped() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = ScheduledTask::periodic(Duration::from_secs(30), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_secs(65)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(task);
        sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
