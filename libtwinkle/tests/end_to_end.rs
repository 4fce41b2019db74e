//! End-to-end workflow tests
//!
//! These tests drive the full pipeline on real temporary files:
//! fragment storage, selection, composition, scheduling, execution
//! through a mock publisher, and crash recovery of the job ledger.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use secrecy::SecretString;
use tempfile::TempDir;

use libtwinkle::catalog::CatalogStore;
use libtwinkle::composer::compose;
use libtwinkle::error::PublishError;
use libtwinkle::fragments::FragmentStore;
use libtwinkle::ledger::JobLedger;
use libtwinkle::publisher::MockPublisher;
use libtwinkle::scheduler::{SchedulerCore, SchedulerPolicy};
use libtwinkle::selector::{select_by_index, IndexPicks};
use libtwinkle::tokens::TokenManager;
use libtwinkle::types::{CatalogEntry, Deal, JobStatus};

fn tokens() -> Arc<Mutex<TokenManager>> {
    Arc::new(Mutex::new(TokenManager::with_token(
        SecretString::from("long-lived-token".to_string()),
        3600,
    )))
}

fn seeded_fragments(dir: &TempDir) -> Result<FragmentStore> {
    let store = FragmentStore::open(dir.path().join("fragments"));
    store.add_quote("Shine on")?;
    store.add_text("New arrival")?;
    store.add_symbol("✨")?;
    store.add_deal(Deal {
        product: "Gold Ring".to_string(),
        price: "120€".to_string(),
        discount: "20%".to_string(),
        link: "https://example.com/gold-ring".to_string(),
    })?;
    Ok(store)
}

#[tokio::test]
async fn test_compose_schedule_and_publish() -> Result<()> {
    let dir = TempDir::new()?;
    let store = seeded_fragments(&dir)?;

    let picks = IndexPicks {
        quote: Some(1),
        text: Some(1),
        symbol: Some(1),
        deal: Some(1),
        ..Default::default()
    };
    let selection = select_by_index(&store.snapshot(), &picks)?;
    let post = compose(&selection);
    assert!(post.body.starts_with("Shine on New arrival ✨"));
    assert!(post.body.ends_with("#GoldRing"));

    let publisher = Arc::new(MockPublisher::success("feed"));
    let core = SchedulerCore::new(
        JobLedger::open(dir.path().join("jobs.jsonl"))?,
        publisher.clone(),
        tokens(),
        SchedulerPolicy::default(),
    );

    let due = chrono::Utc::now().timestamp() - 1;
    let job = core.schedule(post, due)?;
    assert_eq!(core.run_due_once().await?, 1);

    let done = core.ledger().get(&job.id)?;
    assert_eq!(done.status, JobStatus::Succeeded);
    assert!(done.published_id.is_some());

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    assert!(published[0].body.contains("🔥 Deal: Gold Ring for 120€ (20% off)"));
    Ok(())
}

#[tokio::test]
async fn test_scheduled_jobs_survive_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let store = seeded_fragments(&dir)?;
    let ledger_path = dir.path().join("jobs.jsonl");
    let due = chrono::Utc::now().timestamp() - 1;

    let selection = select_by_index(
        &store.snapshot(),
        &IndexPicks {
            quote: Some(1),
            ..Default::default()
        },
    )?;

    // First process schedules and dies before the job runs
    let job_id = {
        let core = SchedulerCore::new(
            JobLedger::open(&ledger_path)?,
            Arc::new(MockPublisher::success("feed")),
            tokens(),
            SchedulerPolicy::default(),
        );
        core.schedule(compose(&selection), due)?.id
    };

    // Second process picks the job up from the ledger
    let publisher = Arc::new(MockPublisher::success("feed"));
    let core = SchedulerCore::new(
        JobLedger::open(&ledger_path)?,
        publisher.clone(),
        tokens(),
        SchedulerPolicy::default(),
    );
    assert_eq!(core.run_due_once().await?, 1);
    assert_eq!(core.ledger().get(&job_id)?.status, JobStatus::Succeeded);
    assert_eq!(publisher.publish_call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_interrupted_execution_is_requeued_on_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let ledger_path = dir.path().join("jobs.jsonl");
    let due = chrono::Utc::now().timestamp() - 1;

    let post = compose(&libtwinkle::selector::Selection {
        quote: Some("Shine on".to_string()),
        ..Default::default()
    });

    // Simulate a crash mid-publish: the job is left Running on disk
    let job_id = {
        let ledger = JobLedger::open(&ledger_path)?;
        let job = libtwinkle::types::ScheduledJob::new(post, due);
        ledger.record(&job)?;
        ledger.transition(&job.id, JobStatus::Running, None)?;
        job.id
    };

    let publisher = Arc::new(MockPublisher::success("feed"));
    let ledger = JobLedger::open(&ledger_path)?;
    assert_eq!(ledger.recover_interrupted()?, 1);
    let core = SchedulerCore::new(
        ledger,
        publisher.clone(),
        tokens(),
        SchedulerPolicy {
            max_attempts: 3,
            ..Default::default()
        },
    );

    // Recovery re-queued it as pending with the attempt counted
    let recovered = core.ledger().get(&job_id)?;
    assert_eq!(recovered.status, JobStatus::Pending);
    assert_eq!(recovered.attempts, 2);

    assert_eq!(core.run_due_once().await?, 1);
    assert_eq!(core.ledger().get(&job_id)?.status, JobStatus::Succeeded);
    Ok(())
}

#[tokio::test]
async fn test_failed_publish_keeps_error_across_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let ledger_path = dir.path().join("jobs.jsonl");
    let due = chrono::Utc::now().timestamp() - 1;

    let post = compose(&libtwinkle::selector::Selection {
        quote: Some("Shine on".to_string()),
        ..Default::default()
    });

    let job_id = {
        let core = SchedulerCore::new(
            JobLedger::open(&ledger_path)?,
            Arc::new(MockPublisher::failure(
                "feed",
                PublishError::ElementNotFound("post button".to_string()),
            )),
            tokens(),
            SchedulerPolicy::default(),
        );
        let job = core.schedule(post, due)?;
        core.run_due_once().await?;
        job.id
    };

    let reloaded = JobLedger::open(&ledger_path)?;
    let job = reloaded.get(&job_id)?;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("post button"));
    Ok(())
}

#[tokio::test]
async fn test_daemon_run_publishes_newly_scheduled_job() -> Result<()> {
    let dir = TempDir::new()?;
    let publisher = Arc::new(MockPublisher::success("feed"));
    let core = Arc::new(SchedulerCore::new(
        JobLedger::open(dir.path().join("jobs.jsonl"))?,
        publisher.clone(),
        tokens(),
        SchedulerPolicy::default(),
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    let handle = {
        let core = core.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { core.run(shutdown).await })
    };

    let post = compose(&libtwinkle::selector::Selection {
        quote: Some("Shine on".to_string()),
        ..Default::default()
    });
    let job = core.schedule(post, chrono::Utc::now().timestamp())?;

    // Give the daemon a moment to pick the job up
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if core.ledger().get(&job.id)?.status == JobStatus::Succeeded {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "job never ran");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(3), handle).await???;
    Ok(())
}

#[tokio::test]
async fn test_catalog_lock_and_export_workflow() -> Result<()> {
    let dir = TempDir::new()?;
    let catalog = CatalogStore::open(dir.path().join("catalog.json"));

    let image = dir.path().join("luna.jpg");
    std::fs::write(&image, b"jpeg bytes")?;

    let mut entry = CatalogEntry::new("R-001", "Luna Ring", image.to_string_lossy());
    entry
        .attributes
        .insert("material".to_string(), "silver".to_string());
    catalog.add(entry)?;

    // Export requires the entry to be locked first
    let export_dir = dir.path().join("exports");
    assert!(catalog.export("R-001", &export_dir).is_err());

    catalog.lock("R-001")?;
    let exported = catalog.export("R-001", &export_dir)?;
    assert!(exported.join("Luna_Ring.json").exists());
    assert!(exported.join("luna.jpg").exists());

    // Identical re-export is idempotent
    catalog.export("R-001", &export_dir)?;

    // Locked entries reject edits
    let mut changes = std::collections::BTreeMap::new();
    changes.insert("ring_name".to_string(), "Sol Ring".to_string());
    assert!(catalog.edit("R-001", &changes).is_err());
    Ok(())
}
