mod config;
mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use populate_core::{RecordStore, StoreError, redact_database_url};
use populate_generate::{
    CompositeReporter, ConsoleReporter, CsvStore, FanOutShape, GenerateOptions, GenerationError,
    GeoSpread, Orchestrator, StopSignal, TracingReporter,
};
use populate_store::{PostgresStore, StoreOptions};
use registry::{RunContext, init_run_logging, start_run, write_report};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConfigError, PopulateConfig};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "populate",
    version,
    about = "Populate the applicant tracking database with synthetic data"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate users, appliers and screening questions.
    Run(RunArgs),
    /// Wipe every generated table.
    Reset(ResetArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of users to create.
    #[arg(long, allow_negative_numbers = true)]
    users: Option<i64>,
    /// Expected number of appliers, spread over the users.
    #[arg(long, allow_negative_numbers = true)]
    appliers: Option<i64>,
    /// Expected number of screening questions, spread over the appliers.
    #[arg(long, allow_negative_numbers = true)]
    questions: Option<i64>,
    /// Rows per bulk insert.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Bulk inserts of one phase allowed in flight at once.
    #[arg(long)]
    max_in_flight: Option<usize>,
    /// Seed for every random stream of the run.
    #[arg(long)]
    seed: Option<u64>,
    /// Children-per-parent distribution: fixed, uniform or poisson.
    #[arg(long)]
    fan_out: Option<FanOutShape>,
    /// Coordinate spread: metro or global.
    #[arg(long)]
    geo: Option<GeoSpread>,
    /// Attempts per batch before a transient failure halts the run.
    #[arg(long)]
    max_attempts: Option<u32>,
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
    /// Write CSV files into the run directory instead of a database; any
    /// database URL is ignored.
    #[arg(long, default_value_t = false)]
    csv: bool,
    /// Populate a PostGIS geography column for proximity queries.
    #[arg(long, default_value_t = false)]
    postgis: bool,
    /// Wipe the dataset before generating.
    #[arg(long, default_value_t = false)]
    reset: bool,
    /// TOML config file (defaults to ./populate.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ResetArgs {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
    /// TOML config file (defaults to ./populate.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run_populate(args).await,
        Command::Reset(args) => run_reset(args).await,
    }
}

async fn run_populate(args: RunArgs) -> Result<(), CliError> {
    let mut config = PopulateConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    let targets = config.targets()?;
    let options = config.generate_options();
    options.validate_settings()?;

    let database_url = if args.csv {
        None
    } else {
        Some(config.database.url.clone().ok_or_else(|| {
            CliError::InvalidConfig(
                "a database URL is required: pass --database-url, set DATABASE_URL or use --csv"
                    .to_string(),
            )
        })?)
    };
    let engine = if args.csv { "csv" } else { "postgres" };

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        engine: engine.to_string(),
        run_dir: args.run_dir.clone(),
        targets,
        options: options.clone(),
        postgis: config.database.postgis,
        reset: args.reset,
        connection: database_url.as_deref().map(redact_database_url),
    };

    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;

    tracing::info!(event = "run_started", run_id = %run_id, engine = %engine);
    let timer = Instant::now();

    let store: Arc<dyn RecordStore> = match &database_url {
        None => {
            let store = CsvStore::create(&run_paths.data_dir).map_err(GenerationError::from)?;
            tracing::info!(event = "csv_store_ready", dir = %run_paths.data_dir.display());
            Arc::new(store)
        }
        Some(url) => {
            let store_options = StoreOptions {
                postgis: config.database.postgis,
                max_connections: config.database.max_connections,
                acquire_timeout: Duration::from_secs(config.database.acquire_timeout_secs),
            };
            let store = PostgresStore::connect(url, &store_options).await?;
            options.validate(&store)?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
    };

    prepare_store(store.as_ref(), &options, args.reset).await?;

    let stop = StopSignal::new();
    watch_ctrl_c(stop.clone());

    let reporter = CompositeReporter::new()
        .with(Arc::new(ConsoleReporter))
        .with(Arc::new(TracingReporter));
    let orchestrator = Orchestrator::new(Arc::clone(&store), options)
        .with_reporter(Arc::new(reporter))
        .with_stop_signal(stop);

    let result = match orchestrator.run(targets).await {
        Ok(result) => result,
        Err(err) => {
            if let Some((phase, persisted)) = err.halted_at() {
                eprintln!("Halted during {phase} after {persisted} record(s) were persisted.");
                eprintln!("{}", halt_hint(database_url.is_some(), &run_paths.data_dir));
            }
            tracing::info!(
                event = "run_finished",
                status = "failure",
                duration_ms = timer.elapsed().as_millis() as u64
            );
            return Err(err.into());
        }
    };

    write_report(&run_paths, &result.report)?;
    tracing::info!(event = "report_written", path = %run_paths.report_path.display());

    let report = &result.report;
    let counts = store.counts().await?;
    println!(
        "Done: {} users, {} appliers, {} screening questions in {:.2}s ({:.0} rows/s)",
        counts.users,
        counts.appliers,
        counts.questions,
        report.duration_ms as f64 / 1000.0,
        report.rows_per_sec
    );
    println!(
        "Appliers with more than {} screening questions: {}",
        report.summary.question_threshold, report.summary.appliers_above_question_threshold
    );
    println!("Run artifacts: {}", run_paths.root.display());

    tracing::info!(
        event = "run_finished",
        status = "success",
        duration_ms = timer.elapsed().as_millis() as u64
    );

    Ok(())
}

async fn run_reset(args: ResetArgs) -> Result<(), CliError> {
    let config = PopulateConfig::load(args.config.as_deref())?;
    let url = args.database_url.or(config.database.url).ok_or_else(|| {
        CliError::InvalidConfig(
            "a database URL is required: pass --database-url or set DATABASE_URL".to_string(),
        )
    })?;

    let store_options = StoreOptions {
        postgis: config.database.postgis,
        max_connections: 1,
        acquire_timeout: Duration::from_secs(config.database.acquire_timeout_secs),
    };
    let store = PostgresStore::connect(&url, &store_options).await?;
    store.reset().await?;

    println!(
        "Dataset wiped on {}.",
        redact_database_url(&url).redacted
    );
    Ok(())
}

/// Only a database run can be resumed: every CSV run writes a fresh directory.
fn halt_hint(database: bool, data_dir: &Path) -> String {
    if database {
        "Earlier phases are complete. Re-run with the same --seed to resume, or pass --reset to start over."
            .to_string()
    } else {
        format!(
            "Partial CSV files are in {}. A new run starts from scratch.",
            data_dir.display()
        )
    }
}

/// Check the options against the store's limits, then wipe it if asked.
/// Nothing is deleted for a run that cannot start.
async fn prepare_store(
    store: &dyn RecordStore,
    options: &GenerateOptions,
    reset: bool,
) -> Result<(), CliError> {
    options.validate(store)?;
    if reset {
        store.reset().await?;
        tracing::info!(event = "dataset_reset", engine = store.engine());
    }
    Ok(())
}

fn apply_overrides(config: &mut PopulateConfig, args: &RunArgs) {
    if let Some(users) = args.users {
        config.targets.users = users;
    }
    if let Some(appliers) = args.appliers {
        config.targets.appliers = appliers;
    }
    if let Some(questions) = args.questions {
        config.targets.questions = questions;
    }
    if let Some(batch_size) = args.batch_size {
        config.generation.batch_size = batch_size;
    }
    if let Some(max_in_flight) = args.max_in_flight {
        config.generation.max_in_flight = max_in_flight;
    }
    if let Some(seed) = args.seed {
        config.generation.seed = seed;
    }
    if let Some(fan_out) = args.fan_out {
        config.generation.fan_out = fan_out;
    }
    if let Some(geo) = args.geo {
        config.generation.geo = geo;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.retry.max_attempts = max_attempts;
    }
    if args.database_url.is_some() {
        config.database.url = args.database_url.clone();
    }
    if args.postgis {
        config.database.postgis = true;
    }
}

/// Request a stop at the next batch boundary on the first Ctrl-C.
fn watch_ctrl_c(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, stopping after the in-flight batches...");
            tracing::warn!(event = "interrupt_requested");
            stop.request();
        }
    });
}

#[cfg(test)]
mod tests {
    use populate_core::BatchRows;
    use populate_generate::{InMemoryStore, RecordFactory};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn parse(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(args).expect("parse");
        match cli.command {
            Command::Run(args) => args,
            Command::Reset(_) => panic!("expected run"),
        }
    }

    #[test]
    fn flags_override_config_values() {
        let args = parse(&[
            "populate",
            "run",
            "--users",
            "10",
            "--fan-out",
            "uniform",
            "--max-attempts",
            "2",
            "--csv",
        ]);
        let mut config = PopulateConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.targets.users, 10);
        assert_eq!(config.targets.appliers, 150_000);
        assert_eq!(config.generation.fan_out, FanOutShape::Uniform);
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[tokio::test]
    async fn invalid_options_fail_before_the_run_directory_exists() {
        let run_dir =
            std::env::temp_dir().join(format!("populate_cli_{}", uuid::Uuid::new_v4()));
        let run_dir_arg = run_dir.display().to_string();
        let args = parse(&[
            "populate",
            "run",
            "--csv",
            "--batch-size",
            "0",
            "--run-dir",
            &run_dir_arg,
        ]);

        let err = run_populate(args).await.expect_err("zero batch size");
        assert!(matches!(
            err,
            CliError::Generation(GenerationError::Configuration(_))
        ));
        assert!(!run_dir.exists());
    }

    #[tokio::test]
    async fn oversized_batches_are_rejected_before_reset() {
        let store = InMemoryStore::new().with_max_batch_rows(10);
        let users = vec![RecordFactory::default().user(1, &mut ChaCha8Rng::seed_from_u64(1))];
        store
            .insert(BatchRows::Users(&users))
            .await
            .expect("seed row");

        let options = GenerateOptions {
            batch_size: 100,
            ..GenerateOptions::default()
        };
        let err = prepare_store(&store, &options, true)
            .await
            .expect_err("batch above limit");
        assert!(matches!(
            err,
            CliError::Generation(GenerationError::Configuration(_))
        ));
        assert_eq!(store.counts().await.expect("counts").users, 1);

        let options = GenerateOptions {
            batch_size: 10,
            ..GenerateOptions::default()
        };
        prepare_store(&store, &options, true).await.expect("reset");
        assert_eq!(store.counts().await.expect("counts").users, 0);
    }

    #[test]
    fn resume_hint_is_only_given_for_database_runs() {
        let data_dir = Path::new("runs/x/data");
        assert!(halt_hint(true, data_dir).contains("--seed"));

        let csv_hint = halt_hint(false, data_dir);
        assert!(!csv_hint.contains("--seed"));
        assert!(csv_hint.contains("runs/x/data"));
    }

    #[test]
    fn negative_counts_reach_validation() {
        let args = parse(&["populate", "run", "--users", "-3", "--csv"]);
        let mut config = PopulateConfig::default();
        apply_overrides(&mut config, &args);
        assert!(matches!(
            config.targets(),
            Err(GenerationError::Configuration(_))
        ));
    }
}
