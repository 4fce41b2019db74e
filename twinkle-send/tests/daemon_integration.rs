//! Integration tests for the twinkle-send daemon, using --once runs
//! against a seeded ledger file.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let config_path = dir.path().join("config.toml");
    let contents = format!(
        r#"
[storage]
catalog_path = "{}"
fragments_dir = "{}"
ledger_path = "{}"
"#,
        dir.path().join("catalog.json").display(),
        dir.path().join("fragments").display(),
        dir.path().join("jobs.jsonl").display(),
    );
    std::fs::write(&config_path, contents).unwrap();
    config_path
}

fn send_cmd(config: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("twinkle-send").unwrap();
    cmd.env("TWINKLE_CONFIG", config);
    cmd.env_remove("TWINKLE_ACCESS_TOKEN");
    cmd
}

fn seed_job(dir: &TempDir, id: &str, status: &str, due_at: i64) {
    let record = serde_json::json!({
        "op": "put",
        "job": {
            "id": id,
            "post": {
                "body": format!("post body for {}", id),
                "deal": null,
                "picture": null,
                "created_at": 0,
            },
            "due_at": due_at,
            "status": status,
            "attempts": 0,
            "last_error": null,
            "published_id": null,
        }
    });
    let path = dir.path().join("jobs.jsonl");
    let mut contents = std::fs::read_to_string(&path).unwrap_or_default();
    contents.push_str(&record.to_string());
    contents.push('\n');
    std::fs::write(&path, contents).unwrap();
}

fn final_job_state(dir: &TempDir, id: &str) -> serde_json::Value {
    let ledger = std::fs::read_to_string(dir.path().join("jobs.jsonl")).unwrap();
    ledger
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter(|record| record["job"]["id"] == id)
        .last()
        .unwrap()["job"]
        .clone()
}

#[test]
fn test_once_publishes_due_job() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    seed_job(&dir, "job-1", "pending", 100);

    send_cmd(&config)
        .env("TWINKLE_ACCESS_TOKEN", "token-abc")
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("post body for job-1"));

    let job = final_job_state(&dir, "job-1");
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["attempts"], 1);
    assert!(job["published_id"].as_str().unwrap().starts_with("stdout-"));
}

#[test]
fn test_once_leaves_future_job_pending() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    seed_job(&dir, "job-1", "pending", 4102444800);

    send_cmd(&config)
        .env("TWINKLE_ACCESS_TOKEN", "token-abc")
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("post body").not());

    assert_eq!(final_job_state(&dir, "job-1")["status"], "pending");
}

#[test]
fn test_once_recovers_interrupted_job() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    // A crashed process left this job mid-execution
    seed_job(&dir, "job-1", "running", 100);

    send_cmd(&config)
        .env("TWINKLE_ACCESS_TOKEN", "token-abc")
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("post body for job-1"));

    let job = final_job_state(&dir, "job-1");
    assert_eq!(job["status"], "succeeded");
    // Interrupted attempt plus the successful one
    assert_eq!(job["attempts"], 2);
}

#[test]
fn test_once_without_token_fails_job() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    seed_job(&dir, "job-1", "pending", 100);

    send_cmd(&config).arg("--once").assert().success();

    let job = final_job_state(&dir, "job-1");
    assert_eq!(job["status"], "failed");
    assert!(job["last_error"]
        .as_str()
        .unwrap()
        .contains("Credentials required"));
}
