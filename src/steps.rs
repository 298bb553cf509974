//! The individual consolidation steps.
//!
//! Each step reads its sources, resolves and merges them with the pure
//! functions below, then hands the canonical documents to the batch writer.
//! The pure halves (`consolidate_*`) never touch the store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::batch::{BatchCommitError, BatchWriter, CommitReport};
use crate::canonical::{
    CanonicalDocument, CanonicalLeaveRequest, CanonicalSettings, CanonicalUser, DepartmentEntry,
};
use crate::config::MigrationOptions;
use crate::error::AppError;
use crate::identity::{self, SecondarySet};
use crate::merge;
use crate::reader::{CollectionReader, ReadError, ReadOutcome};
use crate::source::{SettingsSource, SourceBody, SourceKind, SourceRecord};
use crate::specs;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Users,
    LeaveRequests,
    Settings,
    Verify,
}

impl StepKind {
    pub fn name(self) -> &'static str {
        match self {
            StepKind::Users => "users",
            StepKind::LeaveRequests => "leave-requests",
            StepKind::Settings => "settings",
            StepKind::Verify => "verify",
        }
    }

    /// Collections the step reads, in read order.
    pub fn sources(self) -> Vec<&'static str> {
        match self {
            StepKind::Users => vec![
                specs::USERS,
                specs::EMPLOYEES,
                specs::EMPLOYEE_PROFILES,
                specs::LEAVE_BALANCES,
            ],
            StepKind::LeaveRequests => specs::LEGACY_LEAVE_REQUESTS.to_vec(),
            StepKind::Settings => vec![specs::SETTINGS, specs::DEPARTMENTS],
            StepKind::Verify => verify_collections(),
        }
    }

    /// Collection the step writes, if any.
    pub fn target(self) -> Option<&'static str> {
        match self {
            StepKind::Users => Some(specs::USERS),
            StepKind::LeaveRequests => Some(specs::LEAVE_REQUESTS),
            StepKind::Settings => Some(specs::SETTINGS),
            StepKind::Verify => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn verify_collections() -> Vec<&'static str> {
    let mut collections = specs::VERIFY_ONLY.to_vec();
    collections.extend([specs::USERS, specs::LEAVE_REQUESTS, specs::SETTINGS]);
    collections
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("merged document {collection}/{id} is not a valid canonical document: {source}")]
    Shape {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Commit(#[from] BatchCommitError),
    #[error("failed to write {collection}/{id}: {source}")]
    Upsert {
        collection: String,
        id: String,
        #[source]
        source: AppError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub name: String,
    /// Documents read per source collection.
    pub sources: BTreeMap<String, usize>,
    /// Source collections that did not exist.
    pub missing: Vec<String>,
    pub written: usize,
    pub batches: Vec<usize>,
    /// Canonical documents built from a secondary record with no primary.
    pub source_only: usize,
    /// Records dropped because their id was already seen.
    pub duplicates: usize,
}

impl StepSummary {
    fn new(kind: StepKind) -> Self {
        Self {
            name: kind.name().to_string(),
            ..Self::default()
        }
    }

    fn record_read(&mut self, collection: &str, outcome: &ReadOutcome) {
        self.sources.insert(collection.to_string(), outcome.len());
        if !outcome.is_found() {
            self.missing.push(collection.to_string());
        }
    }

    fn record_commit(&mut self, report: &CommitReport) {
        self.written += report.committed;
        self.batches.extend(report.batches.iter().copied());
    }
}

#[derive(Debug)]
pub struct StepContext<'a, S> {
    pub store: &'a S,
    pub options: &'a MigrationOptions,
}

impl<'a, S: DocumentStore> StepContext<'a, S> {
    pub fn new(store: &'a S, options: &'a MigrationOptions) -> Self {
        Self { store, options }
    }

    async fn read(
        &self,
        summary: &mut StepSummary,
        collection: &str,
        kind: SourceKind,
    ) -> Result<Vec<SourceRecord>, StepError> {
        let outcome = CollectionReader::new(self.store).read(collection, kind).await?;
        summary.record_read(collection, &outcome);
        Ok(outcome.into_records())
    }

    fn writer(&self, max_ops: usize) -> BatchWriter<'a, S> {
        BatchWriter::new(self.store, max_ops).dry_run(self.options.dry_run)
    }
}

pub async fn run_step<S: DocumentStore>(
    kind: StepKind,
    ctx: &StepContext<'_, S>,
) -> Result<StepSummary, StepError> {
    match kind {
        StepKind::Users => run_users(ctx).await,
        StepKind::LeaveRequests => run_leave_requests(ctx).await,
        StepKind::Settings => run_settings(ctx).await,
        StepKind::Verify => run_verify(ctx).await,
    }
}

fn normalize<T>(document: CanonicalDocument, collection: &str) -> Result<CanonicalDocument, StepError>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let shape_error = |id: &str, source| StepError::Shape {
        collection: collection.to_string(),
        id: id.to_string(),
        source,
    };
    let typed: T = document
        .decode()
        .map_err(|source| shape_error(&document.id, source))?;
    let id = document.id.clone();
    document
        .normalized(&typed)
        .map_err(|source| shape_error(&id, source))
}

// ---------------------------------------------------------------------------
// users

#[derive(Debug, Clone, PartialEq)]
pub struct UserConsolidation {
    pub documents: Vec<CanonicalDocument>,
    pub source_only: usize,
}

/// Merge user accounts with their employee, profile and balance records,
/// then emit employees that no user claimed.
pub fn consolidate_users(
    users: &[SourceRecord],
    employees: &[SourceRecord],
    profiles: &[SourceRecord],
    balances: &[SourceRecord],
    synthetic_email_domain: &str,
) -> Result<UserConsolidation, StepError> {
    let employee_keys = specs::employee_keys_for_user();
    let detail_keys = specs::detail_keys_for_user();
    let priority = specs::user_key_priority();
    let spec = specs::user_spec();
    let migrated_spec = specs::migrated_employee_spec();

    let sets = [
        SecondarySet::new(employees, &employee_keys),
        SecondarySet::new(profiles, &detail_keys),
        SecondarySet::new(balances, &detail_keys),
    ];

    let mut documents = Vec::with_capacity(users.len() + employees.len());
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for user in users {
        let matches = identity::resolve(user, &sets, &priority);
        if let Some(employee) = matches[specs::user_slots::EMPLOYEE] {
            claimed.insert(employee.id());
        }
        let user_spec = if is_migrated_employee(user) {
            &migrated_spec
        } else {
            &spec
        };
        let merged = merge::merge(user, &matches, user_spec);
        documents.push(normalize::<CanonicalUser>(merged, specs::USERS)?);
        seen.insert(user.id());
    }

    let orphan_keys = specs::detail_keys_for_employee();
    let orphan_priority = specs::employee_key_priority();
    let orphan_spec = specs::employee_only_spec(synthetic_email_domain);
    let orphan_sets = [
        SecondarySet::new(profiles, &orphan_keys),
        SecondarySet::new(balances, &orphan_keys),
    ];

    let mut source_only = 0;
    for employee in employees {
        if claimed.contains(employee.id()) || seen.contains(employee.id()) {
            continue;
        }
        let matches = identity::resolve(employee, &orphan_sets, &orphan_priority);
        let merged = merge::merge(employee, &matches, &orphan_spec);
        documents.push(normalize::<CanonicalUser>(merged, specs::USERS)?);
        seen.insert(employee.id());
        source_only += 1;
    }

    Ok(UserConsolidation {
        documents,
        source_only,
    })
}

/// A user document an earlier run built from an unclaimed employee.
fn is_migrated_employee(user: &SourceRecord) -> bool {
    user.get("source").as_ref().and_then(Value::as_str) == Some(specs::EMPLOYEE_SOURCE)
}

async fn run_users<S: DocumentStore>(ctx: &StepContext<'_, S>) -> Result<StepSummary, StepError> {
    let mut summary = StepSummary::new(StepKind::Users);
    let users = ctx.read(&mut summary, specs::USERS, SourceKind::User).await?;
    let employees = ctx.read(&mut summary, specs::EMPLOYEES, SourceKind::Employee).await?;
    let profiles = ctx
        .read(&mut summary, specs::EMPLOYEE_PROFILES, SourceKind::Profile)
        .await?;
    let balances = ctx
        .read(&mut summary, specs::LEAVE_BALANCES, SourceKind::Balance)
        .await?;

    let consolidated = consolidate_users(
        &users,
        &employees,
        &profiles,
        &balances,
        &ctx.options.synthetic_email_domain,
    )?;
    summary.source_only = consolidated.source_only;
    info!(
        target: "hrmerge",
        event = "users_merged",
        users = users.len(),
        source_only = consolidated.source_only,
        documents = consolidated.documents.len()
    );

    let report = ctx
        .writer(ctx.options.users_batch_ops)
        .write(&consolidated.documents, specs::USERS)
        .await?;
    summary.record_commit(&report);
    Ok(summary)
}

// ---------------------------------------------------------------------------
// leave requests

#[derive(Debug, Clone, PartialEq)]
pub struct LeaveRequestConsolidation {
    pub documents: Vec<CanonicalDocument>,
    pub duplicates: usize,
}

/// Deduplicate requests by id across legacy collections. The first
/// occurrence (collection order, then reader order) is the primary; later
/// occurrences only fill fields it lacks.
pub fn consolidate_leave_requests(
    collections: &[Vec<SourceRecord>],
) -> Result<LeaveRequestConsolidation, StepError> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&SourceRecord>> = HashMap::new();
    for records in collections {
        for record in records {
            groups
                .entry(record.id())
                .or_insert_with(|| {
                    order.push(record.id());
                    Vec::new()
                })
                .push(record);
        }
    }

    let spec = specs::leave_request_spec(collections.len().saturating_sub(1));
    let mut documents = Vec::with_capacity(order.len());
    let mut duplicates = 0;
    for id in order {
        let Some((primary, rest)) = groups.get(id).and_then(|group| group.split_first()) else {
            continue;
        };
        duplicates += rest.len();
        let secondaries: Vec<Option<&SourceRecord>> = rest.iter().copied().map(Some).collect();
        let merged = merge::merge(primary, &secondaries, &spec);
        documents.push(normalize::<CanonicalLeaveRequest>(merged, specs::LEAVE_REQUESTS)?);
    }

    Ok(LeaveRequestConsolidation {
        documents,
        duplicates,
    })
}

async fn run_leave_requests<S: DocumentStore>(
    ctx: &StepContext<'_, S>,
) -> Result<StepSummary, StepError> {
    let mut summary = StepSummary::new(StepKind::LeaveRequests);
    let mut collections = Vec::with_capacity(specs::LEGACY_LEAVE_REQUESTS.len());
    for collection in specs::LEGACY_LEAVE_REQUESTS {
        collections.push(
            ctx.read(&mut summary, collection, SourceKind::LeaveRequest)
                .await?,
        );
    }

    let consolidated = consolidate_leave_requests(&collections)?;
    summary.duplicates = consolidated.duplicates;
    info!(
        target: "hrmerge",
        event = "leave_requests_merged",
        documents = consolidated.documents.len(),
        duplicates = consolidated.duplicates
    );

    let report = ctx
        .writer(ctx.options.leave_request_batch_ops)
        .write(&consolidated.documents, specs::LEAVE_REQUESTS)
        .await?;
    summary.record_commit(&report);
    Ok(summary)
}

// ---------------------------------------------------------------------------
// settings

fn first_with_id<'r>(records: &'r [SourceRecord], ids: &[&str]) -> Option<&'r SourceRecord> {
    ids.iter()
        .find_map(|wanted| records.iter().find(|record| record.id() == *wanted))
}

fn department_entry(record: &SourceRecord) -> Option<DepartmentEntry> {
    let SourceBody::Department(department) = record.body() else {
        return None;
    };
    let manager = department
        .manager
        .clone()
        .filter(|m| !m.is_empty())
        .or_else(|| department.manager_id.clone().filter(|m| !m.is_empty()))
        .map(Value::String)
        .unwrap_or(Value::Null);
    Some(DepartmentEntry {
        id: record.id().to_string(),
        name: department
            .name
            .clone()
            .unwrap_or_else(|| record.id().to_string()),
        description: department.description.clone().unwrap_or_default(),
        manager,
        is_active: department.is_active.unwrap_or(true),
    })
}

/// Build the settings singleton from section documents and the
/// departments collection.
pub fn consolidate_settings(
    settings: &[SourceRecord],
    departments: &[SourceRecord],
) -> Result<CanonicalDocument, StepError> {
    let shape_error = |source| StepError::Shape {
        collection: specs::SETTINGS.to_string(),
        id: specs::SETTINGS_DOCUMENT_ID.to_string(),
        source,
    };

    let empty_primary;
    let primary = match settings
        .iter()
        .find(|record| record.id() == specs::SETTINGS_DOCUMENT_ID)
    {
        Some(existing) => existing,
        None => {
            empty_primary = SourceRecord::from_body(
                specs::SETTINGS,
                specs::SETTINGS_DOCUMENT_ID,
                SourceBody::Settings(SettingsSource::default()),
            )
            .map_err(shape_error)?;
            &empty_primary
        }
    };

    let secondaries = [
        first_with_id(settings, specs::GENERAL_SECTION_IDS),
        first_with_id(settings, specs::LEAVE_SECTION_IDS),
        first_with_id(settings, specs::DEPARTMENT_SECTION_IDS),
        first_with_id(settings, specs::SYSTEM_SECTION_IDS),
    ];
    let mut document = merge::merge(primary, &secondaries, &specs::settings_spec());

    let entries: Vec<DepartmentEntry> = departments.iter().filter_map(department_entry).collect();
    let list = if entries.is_empty() {
        // No departments collection left; keep what an earlier run wrote.
        primary.get("departments").unwrap_or_else(|| json!([]))
    } else {
        serde_json::to_value(&entries).map_err(shape_error)?
    };
    document.body.insert("departments".to_string(), list);

    normalize::<CanonicalSettings>(document, specs::SETTINGS)
}

async fn run_settings<S: DocumentStore>(
    ctx: &StepContext<'_, S>,
) -> Result<StepSummary, StepError> {
    let mut summary = StepSummary::new(StepKind::Settings);
    let settings = ctx
        .read(&mut summary, specs::SETTINGS, SourceKind::Settings)
        .await?;
    let departments = ctx
        .read(&mut summary, specs::DEPARTMENTS, SourceKind::Department)
        .await?;

    let document = consolidate_settings(&settings, &departments)?;

    // A singleton gains nothing from batching; it goes through a plain upsert.
    if !ctx.options.dry_run {
        ctx.store
            .upsert(specs::SETTINGS, &document)
            .await
            .map_err(|source| StepError::Upsert {
                collection: specs::SETTINGS.to_string(),
                id: document.id.clone(),
                source,
            })?;
    }
    summary.written = 1;
    info!(
        target: "hrmerge",
        event = "settings_written",
        departments = departments.len(),
        dry_run = ctx.options.dry_run
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// verify

async fn run_verify<S: DocumentStore>(ctx: &StepContext<'_, S>) -> Result<StepSummary, StepError> {
    let mut summary = StepSummary::new(StepKind::Verify);
    for collection in verify_collections() {
        let records = ctx.read(&mut summary, collection, SourceKind::Other).await?;
        info!(
            target: "hrmerge",
            event = "collection_verified",
            collection = %collection,
            count = records.len()
        );
    }
    Ok(summary)
}
