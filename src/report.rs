use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::orchestrator::MigrationSummary;
use crate::steps::StepSummary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    Completed {
        summary: MigrationSummary,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        step: String,
        error: String,
        guidance: String,
        completed_steps: Vec<StepSummary>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MigrationReportFile<'a> {
    generated_at: String,
    database_path: String,
    dry_run: bool,
    #[serde(flatten)]
    outcome: &'a RunOutcome,
}

pub fn write_migration_report(
    reports_dir: &Path,
    database_path: &Path,
    dry_run: bool,
    outcome: &RunOutcome,
) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports directory {}", reports_dir.display()))?;

    let now = Utc::now();
    let path = reports_dir.join(now.format("migration-%Y%m%d-%H%M%S.json").to_string());
    let payload = MigrationReportFile {
        generated_at: now.to_rfc3339(),
        database_path: database_path.display().to_string(),
        dry_run,
        outcome,
    };
    let json = serde_json::to_string_pretty(&payload).context("serialize migration report")?;
    fs::write(&path, json).with_context(|| format!("write migration report {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn report_is_written_with_outcome_fields() {
        let dir = tempdir().unwrap();
        let outcome = RunOutcome::Failed {
            step: "users".into(),
            error: "boom".into(),
            guidance: "restore".into(),
            completed_steps: Vec::new(),
        };
        let path =
            write_migration_report(&dir.path().join("reports"), Path::new("/tmp/hr.sqlite3"), true, &outcome)
                .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("migration-") && name.ends_with(".json"));

        let parsed: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["outcome"], "failed");
        assert_eq!(parsed["step"], "users");
        assert_eq!(parsed["dryRun"], true);
        assert_eq!(parsed["databasePath"], "/tmp/hr.sqlite3");
        assert!(parsed["completedSteps"].as_array().unwrap().is_empty());
    }
}
