//! Scheduler core
//!
//! Keeps a time-ordered queue of pending jobs and fires each one at or
//! after its due time: mark it `Running` in the ledger, fetch
//! credentials, hand the post to the [`Publisher`] under a timeout,
//! then record the outcome. Transient publish errors may re-queue the
//! job with a backoff while attempts remain; everything else fails it.
//!
//! The queue holds only `(due_at, seq, id)` entries; the ledger stays
//! the source of truth, so entries whose job was cancelled or
//! rescheduled are dropped when they surface.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::{LedgerError, PublishError, Result, TwinkleError};
use crate::ledger::JobLedger;
use crate::publisher::Publisher;
use crate::tokens::TokenManager;
use crate::types::{ComposedPost, JobStatus, ScheduledJob};

/// Retry and timeout policy for job execution.
#[derive(Debug, Clone)]
pub struct SchedulerPolicy {
    /// Total executions allowed per job, including the first.
    pub max_attempts: u32,

    /// Delay before a transiently failed job runs again.
    pub retry_backoff_secs: i64,

    /// Time allowed for one publish call before it counts as failed.
    pub publish_timeout_secs: u64,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_backoff_secs: 300,
            publish_timeout_secs: 60,
        }
    }
}

impl SchedulerPolicy {
    pub fn from_config(config: &crate::config::SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_backoff_secs: config.retry_backoff_secs as i64,
            publish_timeout_secs: config.publish_timeout_secs,
        }
    }
}

pub struct SchedulerCore {
    ledger: JobLedger,
    publisher: Arc<dyn Publisher>,
    tokens: Arc<Mutex<TokenManager>>,
    policy: SchedulerPolicy,
    // Min-heap on (due_at, seq); seq breaks ties in insertion order.
    queue: Mutex<BinaryHeap<Reverse<(i64, u64, String)>>>,
    seq: AtomicU64,
    notify: Notify,
}

impl SchedulerCore {
    /// Build a scheduler over an opened ledger. Pending jobs already
    /// in the ledger (including ones recovered from a crash) are
    /// queued immediately.
    pub fn new(
        ledger: JobLedger,
        publisher: Arc<dyn Publisher>,
        tokens: Arc<Mutex<TokenManager>>,
        policy: SchedulerPolicy,
    ) -> Self {
        let core = Self {
            ledger,
            publisher,
            tokens,
            policy,
            queue: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            notify: Notify::new(),
        };
        let pending = core.ledger.list(Some(JobStatus::Pending));
        if !pending.is_empty() {
            info!("Queueing {} pending job(s) from the ledger", pending.len());
        }
        for job in pending {
            core.push(job.due_at, &job.id);
        }
        core
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    /// Record a new job due at `due_at` and queue it.
    pub fn schedule(&self, post: ComposedPost, due_at: i64) -> Result<ScheduledJob> {
        let job = ScheduledJob::new(post, due_at);
        self.ledger.record(&job)?;
        info!("Scheduled job {} for {}", job.id, due_at);
        self.push(due_at, &job.id);
        self.notify.notify_one();
        Ok(job)
    }

    /// Cancel a pending job. Running and finished jobs are refused.
    pub fn cancel(&self, id: &str) -> Result<ScheduledJob> {
        let job = self.ledger.remove(id)?;
        info!("Cancelled job {}", id);
        // The stale queue entry is dropped when it surfaces.
        Ok(job)
    }

    /// Move a pending job to a new due time.
    pub fn reschedule(&self, id: &str, due_at: i64) -> Result<ScheduledJob> {
        let job = self.ledger.set_due(id, due_at)?;
        self.push(due_at, id);
        self.notify.notify_one();
        Ok(job)
    }

    /// Execute every job currently due. Returns how many ran.
    pub async fn run_due_once(&self) -> Result<usize> {
        let mut executed = 0;
        loop {
            let now = chrono::Utc::now().timestamp();
            let entry = {
                let mut queue = self.queue.lock().unwrap();
                match queue.peek() {
                    Some(Reverse((due, _, _))) if *due <= now => queue.pop(),
                    _ => None,
                }
            };
            let Some(Reverse((_, _, id))) = entry else {
                break;
            };

            // Cancelled or already-handled jobs leave stale entries.
            let job = match self.ledger.get(&id) {
                Ok(job) => job,
                Err(_) => {
                    debug!("Dropping queue entry for removed job {}", id);
                    continue;
                }
            };
            if job.status != JobStatus::Pending {
                continue;
            }
            if job.due_at > now {
                // Rescheduled into the future since this entry was queued
                self.push(job.due_at, &id);
                continue;
            }

            if self.execute(job).await? {
                executed += 1;
            }
        }
        Ok(executed)
    }

    /// Execute one pending job immediately, ignoring its due time and
    /// anything else in the queue. Returns the job's final state.
    pub async fn run_job(&self, id: &str) -> Result<ScheduledJob> {
        let job = self.ledger.get(id)?;
        self.execute(job).await?;
        self.ledger.get(id)
    }

    /// Run until `shutdown` is set, waking for due jobs and for
    /// newly scheduled earlier ones. Sleeps at most a second at a
    /// time so shutdown stays responsive.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        info!("Scheduler running, publishing via {}", self.publisher.name());
        while !shutdown.load(Ordering::SeqCst) {
            let executed = self.run_due_once().await?;
            if executed > 0 {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.next_wake()) => {}
                _ = self.notify.notified() => {}
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }

    fn next_wake(&self) -> Duration {
        let queue = self.queue.lock().unwrap();
        let until_due = queue
            .peek()
            .map(|Reverse((due, _, _))| (due - chrono::Utc::now().timestamp()).max(0) as u64)
            .unwrap_or(1);
        Duration::from_secs(until_due.min(1))
    }

    fn push(&self, due_at: i64, id: &str) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .unwrap()
            .push(Reverse((due_at, seq, id.to_string())));
    }

    async fn execute(&self, job: ScheduledJob) -> Result<bool> {
        // The transition replays the shared log; a job cancelled or
        // claimed by another process since we looked is skipped here.
        let running = match self.ledger.transition(&job.id, JobStatus::Running, None) {
            Ok(running) => running,
            Err(TwinkleError::Ledger(LedgerError::UnknownJob(_)))
            | Err(TwinkleError::Ledger(LedgerError::InvalidTransition { .. })) => {
                debug!("Job {} is no longer runnable, skipping", job.id);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        debug!("Executing job {} (attempt {})", job.id, running.attempts);

        // Credentials problems are not solved by waiting, so a missing
        // or expired token fails the job outright.
        let credentials = {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.credentials() {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!("Job {} failed: {}", job.id, e);
                    self.ledger
                        .transition(&job.id, JobStatus::Failed, Some(e.to_string()))?;
                    return Ok(true);
                }
            }
        };

        let timeout = Duration::from_secs(self.policy.publish_timeout_secs);
        let outcome = match tokio::time::timeout(
            timeout,
            self.publisher.publish(&job.post, &credentials),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(self.policy.publish_timeout_secs)),
        };

        match outcome {
            Ok(published_id) => {
                info!("Job {} published as {}", job.id, published_id);
                self.ledger.complete(&job.id, published_id)?;
            }
            Err(e) if e.is_transient() && running.attempts < self.policy.max_attempts => {
                let due_at = chrono::Utc::now().timestamp() + self.policy.retry_backoff_secs;
                warn!(
                    "Job {} failed transiently ({}), retrying at {}",
                    job.id, e, due_at
                );
                self.ledger
                    .transition(&job.id, JobStatus::Pending, Some(e.to_string()))?;
                self.ledger.set_due(&job.id, due_at)?;
                self.push(due_at, &job.id);
                self.notify.notify_one();
            }
            Err(e) => {
                error!("Job {} failed: {}", job.id, e);
                self.ledger
                    .transition(&job.id, JobStatus::Failed, Some(e.to_string()))?;
            }
        }
        Ok(true)
    }
}
