#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use hrmerge_lib::SqliteStore;
use serde_json::{json, Value};
use tempfile::tempdir;
use util::documents;

fn hrmerge(db: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("hrmerge")?;
    cmd.env_remove("HRMERGE_DB")
        .env_remove("HRMERGE_CREDENTIALS")
        .env_remove("HRMERGE_LOG_DIR")
        .env("HRMERGE_LOG", "hrmerge=warn")
        .arg("--db")
        .arg(db);
    Ok(cmd)
}

fn write_export(dir: &Path, export: Value) -> Result<std::path::PathBuf> {
    let path = dir.join("export.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&export)?)?;
    Ok(path)
}

#[test]
fn plan_lists_steps_in_order() -> Result<()> {
    let dir = tempdir()?;
    let output = hrmerge(&dir.path().join("unused.sqlite3"))?.arg("plan").output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("1. users"));
    assert!(lines[1].contains("leaveRequests, leave_requests -> leaveRequests"));
    assert!(lines[3].starts_with("4. verify"));
    assert!(!dir.path().join("unused.sqlite3").exists());
    Ok(())
}

#[tokio::test]
async fn load_then_run_migrates_and_writes_report() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("hr.sqlite3");
    let export = write_export(
        dir.path(),
        json!({
            "users": { "u1": { "email": "ada@example.com", "firstName": "Ada" } },
            "employees": [
                { "id": "e1", "userId": "u1", "department": "Ops" },
                { "id": "e2", "firstName": "Grace" }
            ],
            "leave_requests": { "r1": { "userId": "u1", "days": 2 } }
        }),
    )?;

    let output = hrmerge(&db)?.arg("load").arg(&export).output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let reports = dir.path().join("reports");
    let output = hrmerge(&db)?
        .args(["run", "--report-dir"])
        .arg(&reports)
        .output()?;
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Total documents written: 4"), "{stdout}");

    let report_path = std::fs::read_dir(&reports)?.next().unwrap()?.path();
    let report: Value = serde_json::from_slice(&std::fs::read(report_path)?)?;
    assert_eq!(report["outcome"], "completed");
    assert_eq!(report["summary"]["totalWritten"], 4);

    let store = SqliteStore::open(&db).await?;
    let users = documents(&store, "users").await;
    assert_eq!(users["u1"]["profile"]["department"], "Ops");
    assert_eq!(users["e2"]["email"], "e2@migrated.invalid");
    assert_eq!(documents(&store, "leaveRequests").await.len(), 1);
    store.close().await;
    Ok(())
}

#[tokio::test]
async fn dry_run_leaves_database_unchanged() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("hr.sqlite3");
    let export = write_export(dir.path(), json!({ "users": { "u1": { "email": "a@x.com" } } }))?;
    hrmerge(&db)?.arg("load").arg(&export).assert().success();

    let output = hrmerge(&db)?.args(["run", "--dry-run"]).output()?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Dry run"));

    let store = SqliteStore::open(&db).await?;
    assert!(documents(&store, "users").await["u1"].get("migratedAt").is_none());
    assert!(documents(&store, "settings").await.is_empty());
    store.close().await;
    Ok(())
}

#[test]
fn failed_step_exits_nonzero_with_guidance() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("hr.sqlite3");
    let export = write_export(
        dir.path(),
        json!({ "users": { "u1": { "email": "a@x.com", "isActive": "yes" } } }),
    )?;
    hrmerge(&db)?.arg("load").arg(&export).assert().success();

    let output = hrmerge(&db)?.arg("run").output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("step users failed"), "{stderr}");
    assert!(stderr.contains("users/u1"), "{stderr}");
    assert!(stderr.contains("re-run the migration from the beginning"), "{stderr}");
    Ok(())
}

#[test]
fn db_path_can_come_from_environment() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("from-env.sqlite3");
    let export = write_export(dir.path(), json!({ "users": { "u1": {} } }))?;

    let output = Command::cargo_bin("hrmerge")?
        .env("HRMERGE_DB", &db)
        .env_remove("HRMERGE_CREDENTIALS")
        .env_remove("HRMERGE_LOG_DIR")
        .arg("load")
        .arg(&export)
        .output()?;
    assert!(output.status.success());
    assert!(db.exists());
    Ok(())
}
