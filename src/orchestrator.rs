//! Runs the consolidation steps in a fixed order and stops at the first
//! failure.
//!
//! There is no rollback. Documents committed by earlier steps (and earlier
//! chunks of the failing step) stay in the store, so a failed run has to be
//! recovered by restoring the backup and starting over.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::config::MigrationOptions;
use crate::steps::{run_step, StepContext, StepError, StepKind, StepSummary};
use crate::store::DocumentStore;

pub const RECOVERY_GUIDANCE: &str =
    "restore the store from the pre-migration backup and re-run the migration from the beginning";

pub fn default_plan() -> Vec<StepKind> {
    vec![
        StepKind::Users,
        StepKind::LeaveRequests,
        StepKind::Settings,
        StepKind::Verify,
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RunState {
    NotStarted,
    Running { step: StepKind },
    Completed,
    Failed { step: StepKind },
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed { .. })
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("step {step} failed: {source}")]
    StepFailed {
        step: StepKind,
        /// Summaries of the steps that finished before the failure.
        completed: Vec<StepSummary>,
        #[source]
        source: StepError,
    },
    #[error("migration run already finished in state {state:?}")]
    AlreadyFinished { state: RunState },
}

impl MigrationError {
    /// What the operator should do next.
    pub fn guidance(&self) -> &'static str {
        match self {
            MigrationError::StepFailed { .. } => RECOVERY_GUIDANCE,
            MigrationError::AlreadyFinished { .. } => "start a new run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub dry_run: bool,
    pub steps: Vec<StepSummary>,
    pub total_written: usize,
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Dry run: nothing was written.")?;
        }
        for step in &self.steps {
            write!(f, "{:<16}", step.name)?;
            let read: Vec<String> = step
                .sources
                .iter()
                .map(|(collection, count)| format!("{collection}={count}"))
                .collect();
            write!(f, " read [{}]", read.join(", "))?;
            if !step.missing.is_empty() {
                write!(f, " missing [{}]", step.missing.join(", "))?;
            }
            if step.written > 0 {
                write!(f, " written {}", step.written)?;
            }
            if !step.batches.is_empty() {
                let batches: Vec<String> = step.batches.iter().map(usize::to_string).collect();
                write!(f, " batches [{}]", batches.join(", "))?;
            }
            if step.source_only > 0 {
                write!(f, " source-only {}", step.source_only)?;
            }
            if step.duplicates > 0 {
                write!(f, " duplicates {}", step.duplicates)?;
            }
            writeln!(f)?;
        }
        write!(f, "Total documents written: {}", self.total_written)
    }
}

pub struct Orchestrator<'a, S> {
    store: &'a S,
    options: MigrationOptions,
    plan: Vec<StepKind>,
    state: RunState,
}

impl<'a, S: DocumentStore> Orchestrator<'a, S> {
    pub fn new(store: &'a S, options: MigrationOptions) -> Self {
        Self::with_plan(store, options, default_plan())
    }

    pub fn with_plan(store: &'a S, options: MigrationOptions, plan: Vec<StepKind>) -> Self {
        Self {
            store,
            options,
            plan,
            state: RunState::NotStarted,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn plan(&self) -> &[StepKind] {
        &self.plan
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Execute every step in order. Terminal states refuse a second run.
    pub async fn run(&mut self) -> Result<MigrationSummary, MigrationError> {
        if self.state != RunState::NotStarted {
            return Err(MigrationError::AlreadyFinished { state: self.state });
        }

        let ctx = StepContext::new(self.store, &self.options);
        let mut steps = Vec::with_capacity(self.plan.len());
        for (index, step) in self.plan.iter().copied().enumerate() {
            self.state = RunState::Running { step };
            info!(
                target: "hrmerge",
                event = "step_start",
                step = %step,
                index = index + 1,
                of = self.plan.len(),
                dry_run = self.options.dry_run
            );
            match run_step(step, &ctx).await {
                Ok(summary) => {
                    info!(
                        target: "hrmerge",
                        event = "step_complete",
                        step = %step,
                        written = summary.written,
                        missing = summary.missing.len()
                    );
                    steps.push(summary);
                }
                Err(source) => {
                    error!(
                        target: "hrmerge",
                        event = "step_failed",
                        step = %step,
                        error = %source,
                        guidance = RECOVERY_GUIDANCE
                    );
                    self.state = RunState::Failed { step };
                    return Err(MigrationError::StepFailed {
                        step,
                        completed: steps,
                        source,
                    });
                }
            }
        }

        self.state = RunState::Completed;
        let total_written = steps.iter().map(|s| s.written).sum();
        info!(
            target: "hrmerge",
            event = "run_complete",
            steps = steps.len(),
            total_written,
            dry_run = self.options.dry_run
        );
        Ok(MigrationSummary {
            dry_run: self.options.dry_run,
            steps,
            total_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_order_is_fixed() {
        let names: Vec<&str> = default_plan().into_iter().map(StepKind::name).collect();
        assert_eq!(names, vec!["users", "leave-requests", "settings", "verify"]);
    }

    #[test]
    fn terminal_states() {
        assert!(!RunState::NotStarted.is_terminal());
        assert!(!RunState::Running { step: StepKind::Users }.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed { step: StepKind::Settings }.is_terminal());
    }

    #[test]
    fn summary_renders_counts() {
        let mut users = StepSummary {
            name: "users".into(),
            written: 3,
            batches: vec![3],
            source_only: 1,
            ..StepSummary::default()
        };
        users.sources.insert("users".into(), 2);
        let summary = MigrationSummary {
            dry_run: false,
            steps: vec![users],
            total_written: 3,
        };
        let text = summary.to_string();
        assert!(text.contains("read [users=2]"));
        assert!(text.contains("batches [3]"));
        assert!(text.contains("source-only 1"));
        assert!(text.ends_with("Total documents written: 3"));
    }
}
