use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::batch::LEAVE_REQUEST_BATCH_OPS;
use crate::store::MAX_BATCH_OPS;

pub const DB_ENV: &str = "HRMERGE_DB";
pub const CREDENTIALS_ENV: &str = "HRMERGE_CREDENTIALS";
pub const DEFAULT_SYNTHETIC_EMAIL_DOMAIN: &str = "migrated.invalid";

const APP_DIR: &str = "hrmerge";
const DEFAULT_PROJECT: &str = "default";

/// Service credentials file. Only the fields the migration needs are read;
/// anything else in the file is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(alias = "project_id")]
    pub project_id: Option<String>,
    #[serde(alias = "database_path")]
    pub database_path: Option<PathBuf>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read credentials {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse credentials {}", path.display()))
    }
}

/// Where the database path came from, for the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DbPathSource {
    Flag,
    Env,
    Credentials,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub source: DbPathSource,
}

impl StoreConfig {
    /// Resolve from the flag and the process environment.
    pub fn resolve(flag: Option<PathBuf>) -> Result<Self> {
        Self::resolve_with(
            flag,
            std::env::var_os(DB_ENV).map(PathBuf::from),
            std::env::var_os(CREDENTIALS_ENV).map(PathBuf::from),
            dirs::data_dir(),
        )
    }

    /// `--db` wins, then `HRMERGE_DB`, then the credentials file's
    /// `databasePath`, then a per-project file under the data directory.
    pub fn resolve_with(
        flag: Option<PathBuf>,
        env_db: Option<PathBuf>,
        credentials: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(db_path) = flag {
            return Ok(Self {
                db_path,
                source: DbPathSource::Flag,
            });
        }
        if let Some(db_path) = env_db.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(Self {
                db_path,
                source: DbPathSource::Env,
            });
        }

        let credentials = match credentials.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => Credentials::load(&path)?,
            None => Credentials::default(),
        };
        if let Some(db_path) = credentials.database_path {
            return Ok(Self {
                db_path,
                source: DbPathSource::Credentials,
            });
        }

        let base = match data_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("resolve current directory")?,
        };
        let project = credentials
            .project_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string());
        Ok(Self {
            db_path: base.join(APP_DIR).join(format!("{project}.sqlite3")),
            source: DbPathSource::Default,
        })
    }
}

/// Knobs for one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOptions {
    pub dry_run: bool,
    pub users_batch_ops: usize,
    pub leave_request_batch_ops: usize,
    pub synthetic_email_domain: String,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            users_batch_ops: MAX_BATCH_OPS,
            leave_request_batch_ops: LEAVE_REQUEST_BATCH_OPS,
            synthetic_email_domain: DEFAULT_SYNTHETIC_EMAIL_DOMAIN.to_string(),
        }
    }
}

impl MigrationOptions {
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
