//! Job ledger: durable record of scheduled publishing work
//!
//! The ledger is an append-oriented JSON-lines file of tagged records;
//! the last record per job id wins on load, so every state change is a
//! single appended line and a crash can at worst lose the line being
//! The file is shared between processes (the posting CLI, the queue
//! CLI, and the daemon), so every mutating operation replays the log
//! first. A cancellation tombstone appended by one process is seen by
//! another before it can move the job to `Running`.
//!
//! A job found `Running` when an executor starts is from a process
//! that died mid-execution; its outcome is unknown, so
//! [`JobLedger::recover_interrupted`] re-queues it as `Pending` with
//! `attempts` incremented. Only executors call it; a job that is
//! `Running` on disk while inspection tools run is usually just a job
//! the daemon is publishing right now.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LedgerError, PersistenceError, Result};
use crate::types::{JobStatus, ScheduledJob};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LedgerRecord {
    Put { job: ScheduledJob },
    Delete { id: String },
}

/// Counts by status, for queue inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Shared handle to the on-disk ledger.
#[derive(Clone)]
pub struct JobLedger {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    path: PathBuf,
    // Insertion order is preserved; it breaks due-time ties.
    jobs: Vec<ScheduledJob>,
}

impl JobLedger {
    /// Open the ledger, replaying the log. Missing or malformed files
    /// load as an empty ledger; malformed lines are skipped.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let jobs = replay(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { path, jobs })),
        })
    }

    /// Re-queue jobs left `Running` by a dead executor as `Pending`,
    /// counting the interrupted attempt. Executors call this once at
    /// startup, before running anything. Returns how many jobs were
    /// recovered.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.refresh()?;
        let stale: Vec<usize> = inner
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == JobStatus::Running)
            .map(|(i, _)| i)
            .collect();

        let recovered = stale.len();
        for idx in stale {
            let job = &mut inner.jobs[idx];
            info!(
                "Recovering job {} left running by a previous process (attempt {})",
                job.id, job.attempts
            );
            job.status = JobStatus::Pending;
            job.attempts += 1;
            job.last_error = Some("previous execution interrupted".to_string());
            let record = LedgerRecord::Put { job: job.clone() };
            Inner::append(&inner.path, &record)?;
        }
        Ok(recovered)
    }

    /// Record a newly scheduled job. The job must not already exist.
    pub fn record(&self, job: &ScheduledJob) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.refresh()?;
        if inner.jobs.iter().any(|j| j.id == job.id) {
            return Err(LedgerError::DuplicateJob(job.id.clone()).into());
        }
        Inner::append(&inner.path, &LedgerRecord::Put { job: job.clone() })?;
        inner.jobs.push(job.clone());
        Ok(())
    }

    /// Drive a job through the status machine.
    ///
    /// Legal transitions: Pending->Running (increments `attempts`),
    /// Running->Succeeded, Running->Pending (retry), Running->Failed.
    /// Anything else is `InvalidTransition`.
    pub fn transition(
        &self,
        id: &str,
        new_status: JobStatus,
        error: Option<String>,
    ) -> Result<ScheduledJob> {
        self.update(id, |job| {
            check_transition(job.status, new_status)?;
            if new_status == JobStatus::Running {
                job.attempts += 1;
            }
            job.status = new_status;
            if let Some(message) = error {
                job.last_error = Some(message);
            }
            Ok(())
        })
    }

    /// Mark a running job succeeded, recording the collaborator's
    /// post id.
    pub fn complete(&self, id: &str, published_id: String) -> Result<ScheduledJob> {
        self.update(id, |job| {
            check_transition(job.status, JobStatus::Succeeded)?;
            job.status = JobStatus::Succeeded;
            job.published_id = Some(published_id);
            job.last_error = None;
            Ok(())
        })
    }

    /// Move a pending job's due time (retry backoff, reschedule).
    pub fn set_due(&self, id: &str, due_at: i64) -> Result<ScheduledJob> {
        self.update(id, |job| {
            if job.status != JobStatus::Pending {
                return Err(LedgerError::InvalidTransition {
                    from: job.status.to_string(),
                    to: "pending (reschedule)".to_string(),
                }
                .into());
            }
            job.due_at = due_at;
            Ok(())
        })
    }

    /// Cancel a pending job by removing it from the ledger.
    pub fn remove(&self, id: &str) -> Result<ScheduledJob> {
        let mut inner = self.inner.lock().unwrap();
        inner.refresh()?;
        let idx = inner
            .jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| LedgerError::UnknownJob(id.to_string()))?;

        if inner.jobs[idx].status != JobStatus::Pending {
            return Err(LedgerError::NotCancellable {
                id: id.to_string(),
                status: inner.jobs[idx].status.to_string(),
            }
            .into());
        }

        Inner::append(&inner.path, &LedgerRecord::Delete { id: id.to_string() })?;
        Ok(inner.jobs.remove(idx))
    }

    pub fn get(&self, id: &str) -> Result<ScheduledJob> {
        let inner = self.inner.lock().unwrap();
        inner
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownJob(id.to_string()).into())
    }

    /// Jobs in insertion order, optionally filtered by status.
    pub fn list(&self, filter: Option<JobStatus>) -> Vec<ScheduledJob> {
        let inner = self.inner.lock().unwrap();
        inner
            .jobs
            .iter()
            .filter(|j| filter.map_or(true, |s| j.status == s))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> LedgerStats {
        let inner = self.inner.lock().unwrap();
        let mut stats = LedgerStats::default();
        for job in &inner.jobs {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Succeeded => stats.succeeded += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    fn update(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut ScheduledJob) -> Result<()>,
    ) -> Result<ScheduledJob> {
        let mut inner = self.inner.lock().unwrap();
        inner.refresh()?;
        let idx = inner
            .jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| LedgerError::UnknownJob(id.to_string()))?;

        let mut updated = inner.jobs[idx].clone();
        mutate(&mut updated)?;
        Inner::append(&inner.path, &LedgerRecord::Put { job: updated.clone() })?;
        inner.jobs[idx] = updated.clone();
        Ok(updated)
    }
}

/// Fold the log into its current job set, last record per id winning.
fn replay(path: &PathBuf) -> Result<Vec<ScheduledJob>> {
    let mut jobs: Vec<ScheduledJob> = Vec::new();
    match fs::File::open(path) {
        Ok(file) => {
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(PersistenceError::Io)?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LedgerRecord>(&line) {
                    Ok(LedgerRecord::Put { job }) => {
                        match jobs.iter_mut().find(|j| j.id == job.id) {
                            Some(existing) => *existing = job,
                            None => jobs.push(job),
                        }
                    }
                    Ok(LedgerRecord::Delete { id }) => {
                        jobs.retain(|j| j.id != id);
                    }
                    Err(e) => {
                        warn!(
                            "Skipping malformed ledger line {} in {}: {}",
                            lineno + 1,
                            path.display(),
                            e
                        );
                    }
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!("Could not read {}: {}. Starting empty.", path.display(), e);
        }
    }
    Ok(jobs)
}

impl Inner {
    // Re-read the log so changes appended by other processes (cancel
    // tombstones in particular) are seen before this one mutates.
    fn refresh(&mut self) -> Result<()> {
        self.jobs = replay(&self.path)?;
        Ok(())
    }

    fn append(path: &PathBuf, record: &LedgerRecord) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(PersistenceError::Io)?;
            }
        }
        let line = serde_json::to_string(record).map_err(PersistenceError::Json)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(PersistenceError::Io)?;
        writeln!(file, "{}", line).map_err(PersistenceError::Io)?;
        file.flush().map_err(PersistenceError::Io)?;
        Ok(())
    }
}

fn check_transition(from: JobStatus, to: JobStatus) -> Result<()> {
    let legal = matches!(
        (from, to),
        (JobStatus::Pending, JobStatus::Running)
            | (JobStatus::Running, JobStatus::Succeeded)
            | (JobStatus::Running, JobStatus::Pending)
            | (JobStatus::Running, JobStatus::Failed)
    );
    if legal {
        Ok(())
    } else {
        Err(LedgerError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TwinkleError;
    use crate::types::ComposedPost;

    fn sample_post() -> ComposedPost {
        ComposedPost {
            body: "Shine on".to_string(),
            deal: None,
            picture: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    fn open(dir: &tempfile::TempDir) -> JobLedger {
        JobLedger::open(dir.path().join("jobs.jsonl")).unwrap()
    }

    #[test]
    fn test_record_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let job = ScheduledJob::new(sample_post(), 100);
        ledger.record(&job).unwrap();

        let loaded = ledger.get(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.due_at, 100);
    }

    #[test]
    fn test_record_duplicate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let job = ScheduledJob::new(sample_post(), 100);
        ledger.record(&job).unwrap();

        let result = ledger.record(&job);
        assert!(matches!(
            result,
            Err(TwinkleError::Ledger(LedgerError::DuplicateJob(_)))
        ));
    }

    #[test]
    fn test_forward_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let job = ScheduledJob::new(sample_post(), 100);
        ledger.record(&job).unwrap();

        let running = ledger.transition(&job.id, JobStatus::Running, None).unwrap();
        assert_eq!(running.attempts, 1);

        let done = ledger.complete(&job.id, "post-123".to_string()).unwrap();
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.published_id.as_deref(), Some("post-123"));
    }

    #[test]
    fn test_retry_transition_keeps_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let job = ScheduledJob::new(sample_post(), 100);
        ledger.record(&job).unwrap();

        ledger.transition(&job.id, JobStatus::Running, None).unwrap();
        let retried = ledger
            .transition(&job.id, JobStatus::Pending, Some("network down".into()))
            .unwrap();
        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.last_error.as_deref(), Some("network down"));

        // Second attempt
        let running = ledger.transition(&job.id, JobStatus::Running, None).unwrap();
        assert_eq!(running.attempts, 2);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let job = ScheduledJob::new(sample_post(), 100);
        ledger.record(&job).unwrap();

        // Pending cannot jump straight to a terminal state
        for target in [JobStatus::Succeeded, JobStatus::Failed, JobStatus::Pending] {
            let result = ledger.transition(&job.id, target, None);
            assert!(matches!(
                result,
                Err(TwinkleError::Ledger(LedgerError::InvalidTransition { .. }))
            ));
        }

        // Terminal states never move backward
        ledger.transition(&job.id, JobStatus::Running, None).unwrap();
        ledger
            .transition(&job.id, JobStatus::Failed, Some("gone".into()))
            .unwrap();
        let result = ledger.transition(&job.id, JobStatus::Running, None);
        assert!(matches!(
            result,
            Err(TwinkleError::Ledger(LedgerError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn test_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let result = ledger.transition("nope", JobStatus::Running, None);
        assert!(matches!(
            result,
            Err(TwinkleError::Ledger(LedgerError::UnknownJob(_)))
        ));
    }

    #[test]
    fn test_reload_last_record_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let job = ScheduledJob::new(sample_post(), 100);
        {
            let ledger = JobLedger::open(&path).unwrap();
            ledger.record(&job).unwrap();
            ledger.transition(&job.id, JobStatus::Running, None).unwrap();
            ledger.complete(&job.id, "post-1".to_string()).unwrap();
        }

        let reloaded = JobLedger::open(&path).unwrap();
        let loaded = reloaded.get(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Succeeded);
        assert_eq!(loaded.attempts, 1);
        assert_eq!(loaded.published_id.as_deref(), Some("post-1"));
    }

    #[test]
    fn test_recovery_requeues_running_job_with_extra_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let job = ScheduledJob::new(sample_post(), 100);
        {
            let ledger = JobLedger::open(&path).unwrap();
            ledger.record(&job).unwrap();
            ledger.transition(&job.id, JobStatus::Running, None).unwrap();
            // Process dies here, job stuck in Running
        }

        let ledger = JobLedger::open(&path).unwrap();
        assert_eq!(ledger.recover_interrupted().unwrap(), 1);
        let loaded = ledger.get(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.attempts, 2);
        assert!(loaded.last_error.is_some());

        // Recovery is itself persisted
        let again = JobLedger::open(&path).unwrap();
        assert_eq!(again.get(&job.id).unwrap().attempts, 2);
    }

    #[test]
    fn test_open_alone_does_not_touch_running_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let job = ScheduledJob::new(sample_post(), 100);
        {
            let ledger = JobLedger::open(&path).unwrap();
            ledger.record(&job).unwrap();
            ledger.transition(&job.id, JobStatus::Running, None).unwrap();
        }

        // An inspection tool opening the file must not requeue a job
        // another process is publishing right now
        let reader = JobLedger::open(&path).unwrap();
        let seen = reader.get(&job.id).unwrap();
        assert_eq!(seen.status, JobStatus::Running);
        assert_eq!(seen.attempts, 1);
    }

    #[test]
    fn test_remove_pending_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let job = ScheduledJob::new(sample_post(), 100);
        {
            let ledger = JobLedger::open(&path).unwrap();
            ledger.record(&job).unwrap();
            ledger.remove(&job.id).unwrap();
            assert!(ledger.get(&job.id).is_err());
        }

        // Tombstone survives reload
        let reloaded = JobLedger::open(&path).unwrap();
        assert!(reloaded.get(&job.id).is_err());
    }

    #[test]
    fn test_cancel_through_second_handle_blocks_execution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let job = ScheduledJob::new(sample_post(), 100);

        // Daemon and queue CLI each hold their own handle on the file
        let daemon = JobLedger::open(&path).unwrap();
        daemon.record(&job).unwrap();
        let cli = JobLedger::open(&path).unwrap();
        cli.remove(&job.id).unwrap();

        // The daemon's handle has not seen the tombstone yet, but the
        // transition replays the log and refuses to run the job
        let result = daemon.transition(&job.id, JobStatus::Running, None);
        assert!(matches!(
            result,
            Err(TwinkleError::Ledger(LedgerError::UnknownJob(_)))
        ));

        // No put record resurrected the job over the tombstone
        let reloaded = JobLedger::open(&path).unwrap();
        assert!(reloaded.get(&job.id).is_err());
    }

    #[test]
    fn test_remove_running_job_not_cancellable() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let job = ScheduledJob::new(sample_post(), 100);
        ledger.record(&job).unwrap();
        ledger.transition(&job.id, JobStatus::Running, None).unwrap();

        let result = ledger.remove(&job.id);
        assert!(matches!(
            result,
            Err(TwinkleError::Ledger(LedgerError::NotCancellable { .. }))
        ));
    }

    #[test]
    fn test_list_preserves_insertion_order_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let a = ScheduledJob::new(sample_post(), 300);
        let b = ScheduledJob::new(sample_post(), 100);
        let c = ScheduledJob::new(sample_post(), 200);
        for job in [&a, &b, &c] {
            ledger.record(job).unwrap();
        }
        ledger.transition(&b.id, JobStatus::Running, None).unwrap();

        let all = ledger.list(None);
        let ids: Vec<_> = all.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str(), c.id.as_str()]);

        let pending = ledger.list(Some(JobStatus::Pending));
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let job = ScheduledJob::new(sample_post(), 100);
        {
            let ledger = JobLedger::open(&path).unwrap();
            ledger.record(&job).unwrap();
        }
        // Corrupt trailing line, as a crash mid-append would leave
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"op\":\"put\",\"jo").unwrap();

        let reloaded = JobLedger::open(&path).unwrap();
        assert!(reloaded.get(&job.id).is_ok());
        assert_eq!(reloaded.list(None).len(), 1);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JobLedger::open(dir.path().join("absent.jsonl")).unwrap();
        assert!(ledger.list(None).is_empty());
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let a = ScheduledJob::new(sample_post(), 100);
        let b = ScheduledJob::new(sample_post(), 100);
        ledger.record(&a).unwrap();
        ledger.record(&b).unwrap();
        ledger.transition(&a.id, JobStatus::Running, None).unwrap();
        ledger.complete(&a.id, "p1".to_string()).unwrap();

        assert_eq!(
            ledger.stats(),
            LedgerStats {
                pending: 1,
                running: 0,
                succeeded: 1,
                failed: 0,
            }
        );
    }

    #[test]
    fn test_set_due_only_while_pending() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open(&dir);
        let job = ScheduledJob::new(sample_post(), 100);
        ledger.record(&job).unwrap();

        let moved = ledger.set_due(&job.id, 500).unwrap();
        assert_eq!(moved.due_at, 500);

        ledger.transition(&job.id, JobStatus::Running, None).unwrap();
        assert!(ledger.set_due(&job.id, 900).is_err());
    }
}
