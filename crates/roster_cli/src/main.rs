//! Batch entry point for unit ancestry reconciliation.
//!
//! # Responsibility
//! - Parse flags and environment into a run configuration.
//! - Print the plan, per-group progress and outcome to stdout, failures to
//!   stderr.
//! - Map the run result to the process exit code (0 success, 1 failure).
//!
//! # Invariants
//! - The database file must already exist; a mistyped path is a load
//!   failure, never a fresh empty store.

use clap::Parser;
use log::error;
use roster_core::config::{DEFAULT_COLLECTION, DEFAULT_MAX_BATCH_SIZE};
use roster_core::db::open_existing_db;
use roster_core::{
    default_log_level, display_ancestry, init_logging, ApplyMode, ApplyOutcome, ChunkProgress,
    Plan, ReconcileConfig, ReconcileError, ReconcileService, SqliteUnitStore,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "roster-reconcile",
    version,
    about = "Repair the battalion ancestry field across the unit hierarchy"
)]
struct Cli {
    /// Report the corrections without writing them.
    #[arg(long)]
    dry_run: bool,

    /// Existing SQLite database holding the unit collection.
    #[arg(long, env = "ROSTER_DB")]
    db: PathBuf,

    /// Collection (table) holding the unit records.
    #[arg(long, env = "ROSTER_COLLECTION", default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Maximum corrections per atomic write group.
    #[arg(long, env = "ROSTER_BATCH_SIZE", default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    batch_size: usize,

    /// Absolute directory for rolling log files. Logging is off when unset.
    #[arg(long, env = "ROSTER_LOG_DIR")]
    log_dir: Option<String>,

    /// Log level: trace|debug|info|warn|error.
    #[arg(long, env = "ROSTER_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Errors that end a CLI invocation.
#[derive(Debug)]
enum CliError {
    Reconcile(ReconcileError),
    /// Report could not be written to stdout.
    Output(io::Error),
}

impl CliError {
    fn stage(&self) -> &'static str {
        match self {
            Self::Reconcile(err) => err.stage(),
            Self::Output(_) => "output",
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reconcile(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "failed to write report: {err}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reconcile(err) => Some(err),
            Self::Output(err) => Some(err),
        }
    }
}

impl From<ReconcileError> for CliError {
    fn from(value: ReconcileError) -> Self {
        Self::Reconcile(value)
    }
}

impl From<io::Error> for CliError {
    fn from(value: io::Error) -> Self {
        Self::Output(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("error stage=logging message={err}");
            return ExitCode::FAILURE;
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run(&cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                "event=cli_exit module=cli status=error stage={} error={}",
                err.stage(),
                err
            );
            eprintln!("error stage={} message={err}", err.stage());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, out: &mut impl Write) -> Result<(), CliError> {
    let conn = open_existing_db(&cli.db).map_err(|err| ReconcileError::Load(err.into()))?;
    let store = SqliteUnitStore::try_new(&conn).map_err(ReconcileError::Load)?;
    let config = ReconcileConfig {
        collection: cli.collection.clone(),
        max_batch_size: cli.batch_size,
        ..ReconcileConfig::default()
    };
    let service = ReconcileService::new(store, config)?;
    let mode = if cli.dry_run {
        ApplyMode::DryRun
    } else {
        ApplyMode::Live
    };

    let (loaded, plan) = service.plan()?;
    writeln!(out, "collection={} loaded={}", service.config().collection, loaded)?;
    writeln!(out, "mode={}", mode.as_str())?;
    write_plan(out, &plan)?;

    let mut progress_error = None;
    let outcome = service.apply(&plan, mode, |progress| {
        if progress_error.is_none() {
            progress_error = write_progress(&mut *out, progress).err();
        }
    })?;
    if let Some(err) = progress_error {
        return Err(err.into());
    }

    match outcome {
        ApplyOutcome::DryRun { planned } => {
            writeln!(out, "status=ok dry_run=true planned={planned} written=0")?;
        }
        ApplyOutcome::NothingToDo => writeln!(out, "status=ok nothing_to_do=true")?,
        ApplyOutcome::Applied { chunks, applied } => writeln!(
            out,
            "status=ok chunks={chunks} applied={applied} batch_size={}",
            service.batch_size()
        )?,
    }
    Ok(())
}

fn write_plan(out: &mut impl Write, plan: &Plan) -> io::Result<()> {
    writeln!(out, "corrections={}", plan.corrections.len())?;
    for correction in &plan.corrections {
        let note = if correction.resolution.is_anomaly() {
            format!(" note={}", correction.resolution.label())
        } else {
            String::new()
        };
        writeln!(
            out,
            "correction id={} type={} name={:?} from={} to={}{}",
            correction.id,
            correction.unit_type,
            correction.name,
            display_ancestry(correction.from.as_deref()),
            display_ancestry(correction.to.as_deref()),
            note
        )?;
    }

    if plan.anomalies.is_empty() {
        return Ok(());
    }
    writeln!(out, "anomalies={}", plan.anomalies.len())?;
    for anomaly in &plan.anomalies {
        writeln!(
            out,
            "anomaly id={} name={:?} kind={}",
            anomaly.id,
            anomaly.name,
            anomaly.resolution.label()
        )?;
    }
    Ok(())
}

fn write_progress(out: &mut impl Write, progress: &ChunkProgress) -> io::Result<()> {
    writeln!(
        out,
        "chunk={}/{} committed={} applied={}/{}",
        progress.chunk_index,
        progress.chunk_count,
        progress.chunk_len,
        progress.applied,
        progress.total
    )
}

#[cfg(test)]
mod tests {
    use super::{run, Cli, CliError};
    use clap::Parser;
    use roster_core::db::open_db;
    use roster_core::{SqliteUnitStore, Unit, UnitType};
    use std::path::Path;

    fn cli(db: &Path, extra: &[&str]) -> Cli {
        let mut args = vec!["roster-reconcile", "--db", db.to_str().unwrap()];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    fn seed(db: &Path, units: &[Unit]) {
        let conn = open_db(db).unwrap();
        let store = SqliteUnitStore::try_new(&conn).unwrap();
        for unit in units {
            store.create_unit("units", unit).unwrap();
        }
    }

    fn run_captured(cli: &Cli) -> (Result<(), CliError>, String) {
        let mut out = Vec::new();
        let result = run(cli, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    fn ancestry_of(db: &Path, id: &str) -> Option<String> {
        let conn = open_db(db).unwrap();
        conn.query_row("SELECT ancestry_id FROM units WHERE id = ?1;", [id], |row| {
            row.get(0)
        })
        .unwrap()
    }

    fn battalion_with_companies(count: usize) -> Vec<Unit> {
        let mut units = vec![Unit::with_id("BN", UnitType::Battalion, "1st Bn")
            .unwrap()
            .with_ancestry("BN")];
        for index in 0..count {
            units.push(
                Unit::with_id(format!("CO{index}"), UnitType::Company, format!("Co {index}"))
                    .unwrap()
                    .with_parent("BN"),
            );
        }
        units
    }

    #[test]
    fn defaults_apply_when_only_db_is_given() {
        let cli = Cli::try_parse_from(["roster-reconcile", "--db", "/tmp/roster.sqlite3"]).unwrap();

        assert!(!cli.dry_run);
        assert_eq!(cli.collection, "units");
        assert_eq!(cli.batch_size, 500);
        assert!(cli.log_dir.is_none());
    }

    #[test]
    fn dry_run_and_batch_size_flags_parse() {
        let cli = Cli::try_parse_from([
            "roster-reconcile",
            "--db",
            "/tmp/roster.sqlite3",
            "--dry-run",
            "--batch-size",
            "50",
        ])
        .unwrap();

        assert!(cli.dry_run);
        assert_eq!(cli.batch_size, 50);
    }

    #[test]
    fn dry_run_prints_each_correction_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("roster.db");
        seed(
            &db,
            &[
                Unit::with_id("A", UnitType::Battalion, "1st Bn")
                    .unwrap()
                    .with_ancestry("A"),
                Unit::with_id("B", UnitType::Company, "Bravo")
                    .unwrap()
                    .with_parent("A"),
                Unit::with_id("C", UnitType::Company, "Charlie")
                    .unwrap()
                    .with_parent("ghost")
                    .with_ancestry("A"),
            ],
        );

        let (result, out) = run_captured(&cli(&db, &["--dry-run"]));

        result.unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "collection=units loaded=3",
                "mode=dry_run",
                "corrections=2",
                "correction id=B type=company name=\"Bravo\" from=none to=\"A\"",
                "correction id=C type=company name=\"Charlie\" from=\"A\" to=none note=dangling_parent:ghost",
                "anomalies=1",
                "anomaly id=C name=\"Charlie\" kind=dangling_parent:ghost",
                "status=ok dry_run=true planned=2 written=0",
            ]
        );
        assert_eq!(ancestry_of(&db, "B"), None);
        assert_eq!(ancestry_of(&db, "C").as_deref(), Some("A"));
    }

    #[test]
    fn live_run_reports_progress_per_write_group() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("roster.db");
        seed(&db, &battalion_with_companies(5));

        let (result, out) = run_captured(&cli(&db, &["--batch-size", "2"]));

        result.unwrap();
        let progress: Vec<&str> = out.lines().filter(|line| line.starts_with("chunk=")).collect();
        assert_eq!(
            progress,
            vec![
                "chunk=1/3 committed=2 applied=2/5",
                "chunk=2/3 committed=2 applied=4/5",
                "chunk=3/3 committed=1 applied=5/5",
            ]
        );
        assert!(out.ends_with("status=ok chunks=3 applied=5 batch_size=2\n"));
        assert_eq!(ancestry_of(&db, "CO4").as_deref(), Some("BN"));

        let (result, out) = run_captured(&cli(&db, &["--batch-size", "2"]));
        result.unwrap();
        assert!(out.contains("corrections=0\n"));
        assert!(out.ends_with("status=ok nothing_to_do=true\n"));
    }

    #[test]
    fn commit_failure_names_last_committed_group() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("roster.db");
        seed(&db, &battalion_with_companies(5));
        open_db(&db)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_co3 BEFORE UPDATE OF ancestry_id ON units
                 WHEN NEW.id = 'CO3'
                 BEGIN SELECT RAISE(ABORT, 'write rejected'); END;",
            )
            .unwrap();

        let (result, out) = run_captured(&cli(&db, &["--batch-size", "2"]));

        let err = result.unwrap_err();
        assert_eq!(err.stage(), "commit");
        let message = err.to_string();
        assert!(message.contains("failed to commit write group 2/3"), "{message}");
        assert!(message.contains("last committed group 1"), "{message}");
        assert!(out.contains("chunk=1/3 committed=2 applied=2/5\n"));
        assert!(!out.contains("chunk=2/3"));
        assert_eq!(ancestry_of(&db, "CO1").as_deref(), Some("BN"));
        assert_eq!(ancestry_of(&db, "CO2"), None);
    }

    #[test]
    fn missing_database_fails_load_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("typo_roster.db");

        let (result, out) = run_captured(&cli(&db, &["--dry-run"]));

        let err = result.unwrap_err();
        assert_eq!(err.stage(), "load");
        assert!(err.to_string().contains("does not exist"));
        assert!(out.is_empty());
        assert!(!db.exists());
    }

    #[test]
    fn missing_collection_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("roster.db");
        seed(&db, &battalion_with_companies(1));

        let (result, out) = run_captured(&cli(&db, &["--collection", "squadrons"]));

        let err = result.unwrap_err();
        assert_eq!(err.stage(), "load");
        assert!(err.to_string().contains("squadrons"));
        assert!(out.is_empty());
    }
}
