use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use hrmerge_lib::config::StoreConfig;
use hrmerge_lib::orchestrator::{default_plan, MigrationError, Orchestrator};
use hrmerge_lib::report::{write_migration_report, RunOutcome};
use hrmerge_lib::{load, logging, MigrationOptions, SqliteStore};

#[derive(Debug, Parser)]
#[command(name = "hrmerge", about = "Consolidate legacy HR collections", version)]
struct Cli {
    /// Database path (overrides HRMERGE_DB and the credentials file)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every migration step in order
    Run {
        /// Read and merge everything but commit nothing
        #[arg(long)]
        dry_run: bool,
        /// Write a JSON run report into this directory
        #[arg(long, value_name = "DIR")]
        report_dir: Option<PathBuf>,
    },
    /// List the steps with their source and target collections
    Plan,
    /// Seed the store from a JSON export keyed by collection
    Load {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() {
    if let Err(err) = logging::init() {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }

    let cli = Cli::parse();
    match handle_cli(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn handle_cli(cli: Cli) -> Result<i32> {
    if let Command::Plan = cli.command {
        print_plan();
        return Ok(0);
    }

    let config = StoreConfig::resolve(cli.db).context("determine database path")?;
    tracing::debug!(
        target: "hrmerge",
        event = "db_path_resolved",
        path = %config.db_path.display(),
        source = ?config.source
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    runtime.block_on(async {
        let store = SqliteStore::open(&config.db_path)
            .await
            .with_context(|| format!("open database {}", config.db_path.display()))?;
        let code = match cli.command {
            Command::Run {
                dry_run,
                report_dir,
            } => run(&store, &config.db_path, dry_run, report_dir.as_deref()).await?,
            Command::Load { file } => {
                let counts = load::load_export(&store, &file)
                    .await
                    .with_context(|| format!("load export {}", file.display()))?;
                for (collection, count) in counts {
                    println!("{collection:<24} {count}");
                }
                0
            }
            Command::Plan => 0,
        };
        store.close().await;
        Ok::<_, anyhow::Error>(code)
    })
}

async fn run(
    store: &SqliteStore,
    db_path: &Path,
    dry_run: bool,
    report_dir: Option<&Path>,
) -> Result<i32> {
    let options = MigrationOptions::default().dry_run(dry_run);
    let mut orchestrator = Orchestrator::new(store, options);
    let result = orchestrator.run().await;

    let (outcome, code) = match result {
        Ok(summary) => {
            println!("{summary}");
            (RunOutcome::Completed { summary }, 0)
        }
        Err(err) => {
            eprintln!("Error: {err}");
            eprintln!("{}", err.guidance());
            let outcome = match &err {
                MigrationError::StepFailed {
                    step,
                    completed,
                    source,
                } => RunOutcome::Failed {
                    step: step.to_string(),
                    error: source.to_string(),
                    guidance: err.guidance().to_string(),
                    completed_steps: completed.clone(),
                },
                MigrationError::AlreadyFinished { .. } => RunOutcome::Failed {
                    step: String::new(),
                    error: err.to_string(),
                    guidance: err.guidance().to_string(),
                    completed_steps: Vec::new(),
                },
            };
            (outcome, 1)
        }
    };

    if let Some(dir) = report_dir {
        let path = write_migration_report(dir, db_path, dry_run, &outcome)?;
        println!("Report written to {}", path.display());
    }
    Ok(code)
}

fn print_plan() {
    for (index, step) in default_plan().into_iter().enumerate() {
        let target = step.target().unwrap_or("-");
        println!(
            "{}. {:<16} {} -> {}",
            index + 1,
            step.name(),
            step.sources().join(", "),
            target
        );
    }
}
