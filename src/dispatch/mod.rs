//! Dispatch worker pool.
//!
//! Workers drain the fair scheduler: select a customer, take one job, call
//! the provider, emit the terminal status, unlock. The per-customer lock
//! held across the provider call is what guarantees in-order, one-at-a-time
//! processing per customer.

mod provider;

pub use provider::{ProviderError, SmsProvider, StubProvider};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DispatchConfig;
use crate::domain::StatusEvent;
use crate::scheduler::FairScheduler;
use crate::status::StatusSink;

/// Fixed-size pool of dispatch workers.
pub struct WorkerPool {
    scheduler: Arc<FairScheduler>,
    provider: Arc<dyn SmsProvider>,
    status: Arc<dyn StatusSink>,
    cfg: DispatchConfig,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        scheduler: Arc<FairScheduler>,
        provider: Arc<dyn SmsProvider>,
        status: Arc<dyn StatusSink>,
        cfg: DispatchConfig,
    ) -> Self {
        Self {
            scheduler,
            provider,
            status,
            cfg,
            handles: Vec::new(),
        }
    }

    /// Spawn the workers. On cancellation each worker finishes its current
    /// job before exiting.
    pub fn start(&mut self, cancel: CancellationToken) {
        for worker in 0..self.cfg.workers {
            let scheduler = self.scheduler.clone();
            let provider = self.provider.clone();
            let status = self.status.clone();
            let cfg = self.cfg.clone();
            let cancel = cancel.clone();

            self.handles.push(tokio::spawn(async move {
                worker_loop(worker, scheduler, provider, status, cfg, cancel).await;
            }));
        }

        info!(workers = self.cfg.workers, "dispatch worker pool started");
    }

    /// Block until every worker has exited.
    pub async fn stop(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatch worker panicked");
            }
        }
        info!("dispatch worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    scheduler: Arc<FairScheduler>,
    provider: Arc<dyn SmsProvider>,
    status: Arc<dyn StatusSink>,
    cfg: DispatchConfig,
    cancel: CancellationToken,
) {
    let idle_wait = Duration::from_millis(cfg.idle_wait_ms);

    info!(worker, provider = provider.name(), "dispatch worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let Some(customer_id) = scheduler.select_next() else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = scheduler.notified() => {}
                _ = tokio::time::sleep(idle_wait) => {}
            }
            continue;
        };

        // The customer is locked from here until the unlock below.
        let Some(mut job) = scheduler.dequeue(customer_id) else {
            scheduler.unlock(customer_id);
            continue;
        };

        match provider.send(&job).await {
            Ok(()) => {
                publish_status(&status, &StatusEvent::success(&job)).await;
            }
            Err(ProviderError::Transient(reason)) => {
                job.attempts += 1;
                if job.attempts < cfg.max_attempts {
                    warn!(
                        worker,
                        job_id = %job.id,
                        customer_id,
                        attempts = job.attempts,
                        reason = %reason,
                        "transient send failure, re-enqueueing job"
                    );
                    scheduler.enqueue(customer_id, job);
                } else {
                    warn!(
                        worker,
                        job_id = %job.id,
                        customer_id,
                        attempts = job.attempts,
                        reason = %reason,
                        "send attempts exhausted, job failed"
                    );
                    publish_status(&status, &StatusEvent::failed(&job)).await;
                }
            }
            Err(ProviderError::Permanent(reason)) => {
                warn!(
                    worker,
                    job_id = %job.id,
                    customer_id,
                    reason = %reason,
                    "permanent send failure, job failed"
                );
                publish_status(&status, &StatusEvent::failed(&job)).await;
            }
        }

        scheduler.unlock(customer_id);
    }

    info!(worker, "dispatch worker stopped");
}

/// Status publication is audit, not the critical path: failures are logged
/// and not retried here (the producer-side DLQ covers durability).
async fn publish_status(status: &Arc<dyn StatusSink>, event: &StatusEvent) {
    if let Err(e) = status.publish(event).await {
        warn!(
            job_id = %event.id,
            status = %event.status,
            error = %e,
            "status publish failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, StatusKind};
    use crate::status::MemoryStatusSink;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Records every job it sees; fails the first `fail_first` sends of each
    /// job transiently.
    struct ScriptedProvider {
        calls: Mutex<Vec<Uuid>>,
        fail_first: u32,
    }

    impl ScriptedProvider {
        fn new(fail_first: u32) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_first,
            }
        }

        fn calls(&self) -> Vec<Uuid> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SmsProvider for ScriptedProvider {
        async fn send(&self, job: &Job) -> Result<(), ProviderError> {
            self.calls.lock().unwrap().push(job.id);
            if job.attempts < self.fail_first {
                Err(ProviderError::Transient("scripted".to_string()))
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn job_for(customer_id: i64, message: &str) -> Job {
        Job {
            id: Uuid::new_v4(),
            customer_id,
            phone: "+12025550100".to_string(),
            message: message.to_string(),
            priority: 0,
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    async fn run_pool_until_drained(
        scheduler: Arc<FairScheduler>,
        provider: Arc<dyn SmsProvider>,
        sink: Arc<MemoryStatusSink>,
        workers: usize,
        max_attempts: u32,
    ) {
        let cfg = DispatchConfig {
            workers,
            max_attempts,
            idle_wait_ms: 5,
        };
        let status: Arc<dyn StatusSink> = sink;
        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::new(scheduler.clone(), provider, status, cfg);
        pool.start(cancel.clone());

        // Wait until every queue has drained and stays drained (a retried
        // job briefly leaves the active set mid-dispatch), then stop.
        let mut stable = 0;
        for _ in 0..200 {
            if scheduler.active_count() == 0 {
                stable += 1;
                if stable >= 5 {
                    break;
                }
            } else {
                stable = 0;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let scheduler = Arc::new(FairScheduler::new());
        let provider = Arc::new(ScriptedProvider::new(0));
        let sink = Arc::new(MemoryStatusSink::new());

        let job_a = job_for(7, "a");
        let job_b = job_for(7, "b");
        let (id_a, id_b) = (job_a.id, job_b.id);
        scheduler.enqueue(7, job_a);
        scheduler.enqueue(7, job_b);

        run_pool_until_drained(scheduler, provider.clone(), sink.clone(), 1, 3).await;

        assert_eq!(provider.calls(), vec![id_a, id_b]);

        let statuses: Vec<_> = sink
            .events()
            .iter()
            .map(|e| (e.id.clone(), e.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (id_a.to_string(), StatusKind::Success),
                (id_b.to_string(), StatusKind::Success),
            ]
        );
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let scheduler = Arc::new(FairScheduler::new());
        let provider = Arc::new(ScriptedProvider::new(1));
        let sink = Arc::new(MemoryStatusSink::new());

        let job = job_for(1, "retry-me");
        let job_id = job.id;
        scheduler.enqueue(1, job);

        run_pool_until_drained(scheduler, provider.clone(), sink.clone(), 1, 3).await;

        // First dispatch fails transiently, second succeeds.
        assert_eq!(provider.calls(), vec![job_id, job_id]);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, StatusKind::Success);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_emit_failed() {
        let scheduler = Arc::new(FairScheduler::new());
        let provider = Arc::new(ScriptedProvider::new(u32::MAX));
        let sink = Arc::new(MemoryStatusSink::new());

        let job = job_for(1, "doomed");
        let job_id = job.id;
        scheduler.enqueue(1, job);

        run_pool_until_drained(scheduler, provider.clone(), sink.clone(), 1, 3).await;

        assert_eq!(provider.calls().len(), 3);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, job_id.to_string());
        assert_eq!(events[0].status, StatusKind::Failed);
    }

    #[tokio::test]
    async fn test_two_workers_never_interleave_one_customer() {
        let scheduler = Arc::new(FairScheduler::new());
        let provider = Arc::new(ScriptedProvider::new(0));
        let sink = Arc::new(MemoryStatusSink::new());

        let mut expected = Vec::new();
        for i in 0..20 {
            let job = job_for(3, &format!("m{i}"));
            expected.push(job.id);
            scheduler.enqueue(3, job);
        }

        run_pool_until_drained(scheduler, provider.clone(), sink.clone(), 2, 3).await;

        // Per-customer exclusion keeps the dispatch order identical to the
        // enqueue order even with two workers competing.
        assert_eq!(provider.calls(), expected);
    }
}
