use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing_futures::Instrument;

#[derive(Debug, Default)]
struct Tracked {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Owns detached, best-effort background tasks such as cache write-backs.
///
/// Spawning never blocks and nothing is reported back to the spawner. The supervisor only counts
/// what is still running so that shutdown can [`drain`](TaskSupervisor::drain) it.
#[derive(Debug, Clone, Default)]
pub struct TaskSupervisor {
    tracked: Arc<Tracked>,
}

/// Decrements the in-flight count when the task completes, panics or is aborted.
struct Done(Arc<Tracked>);

impl Drop for Done {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` onto the runtime, attached to the current tracing span.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracked.in_flight.fetch_add(1, Ordering::AcqRel);
        let done = Done(self.tracked.clone());
        tokio::spawn(
            async move {
                let _done = done;
                task.await;
            }
            .in_current_span(),
        );
    }

    pub fn in_flight(&self) -> usize {
        self.tracked.in_flight.load(Ordering::Acquire)
    }

    /// Waits until every task spawned so far (and any they spawn meanwhile) has finished.
    pub async fn drain(&self) {
        loop {
            let idle = self.tracked.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn drain_waits_for_detached_tasks() {
        let supervisor = TaskSupervisor::new();
        let (tx, rx) = oneshot::channel();
        supervisor.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(());
        });
        assert_eq!(supervisor.in_flight(), 1);

        supervisor.drain().await;
        assert_eq!(supervisor.in_flight(), 0);
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn panicking_task_is_still_accounted_for() {
        let supervisor = TaskSupervisor::new();
        supervisor.spawn(async { panic!("write-back blew up") });
        supervisor.drain().await;
        assert_eq!(supervisor.in_flight(), 0);
    }

    #[tokio::test]
    async fn drain_on_idle_supervisor_returns() {
        TaskSupervisor::new().drain().await;
    }
}
