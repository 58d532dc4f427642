//! pg-script-migrate CLI - export PostgreSQL schema and data to SQL scripts and replay them.

use clap::{Args, Parser, Subcommand};
use pg_script_migrate::pg::check_connection;
use pg_script_migrate::{
    Config, DatabaseConfig, DumpPipeline, ExportResult, Exporter, MigrateError, PgCatalog,
    PgTarget, ReplayEngine, ReplayOptions, ReplayReport, ScriptStore,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

const DEFAULT_CONFIG: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "pg-script-migrate")]
#[command(about = "Export PostgreSQL schema and data to SQL scripts and replay them")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: config.yaml when present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct SourceArgs {
    /// Source connection string (overrides the config file)
    #[arg(long)]
    source_url: Option<String>,
}

#[derive(Args, Default)]
struct TargetArgs {
    /// Target connection string (overrides the config file)
    #[arg(long)]
    target_url: Option<String>,
}

#[derive(Args, Default)]
struct ExportArgs {
    /// Directory the scripts are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Export only a sample of each table's rows
    #[arg(long)]
    sample: bool,

    /// Rows per table when sampling
    #[arg(long)]
    sample_rows: Option<u64>,
}

#[derive(Args, Default)]
struct ReplayArgs {
    /// Keep existing tables and sequences in the target namespace
    #[arg(long)]
    keep_existing: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export schema, foreign keys and data to SQL scripts
    Export {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        export: ExportArgs,

        /// Namespace to export
        #[arg(long)]
        schema: Option<String>,
    },

    /// Replay exported scripts against the target database
    Replay {
        #[command(flatten)]
        target: TargetArgs,

        /// Directory the scripts are read from
        #[arg(long)]
        scripts_dir: Option<PathBuf>,

        #[command(flatten)]
        replay: ReplayArgs,

        /// Namespace to replay into
        #[arg(long)]
        schema: Option<String>,
    },

    /// Export from the source, then replay into the target
    Migrate {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        export: ExportArgs,

        #[command(flatten)]
        replay: ReplayArgs,

        /// Namespace on both sides
        #[arg(long)]
        schema: Option<String>,
    },

    /// Copy the source into the target with pg_dump and pg_restore
    Direct {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Namespace ensured on the target before restoring
        #[arg(long)]
        schema: Option<String>,
    },

    /// Summarize exported scripts without connecting to a database
    Inspect {
        /// Directory the scripts are read from
        #[arg(long)]
        scripts_dir: Option<PathBuf>,
    },

    /// Test database connections
    HealthCheck {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = load_config(cli.config.as_deref())?;
    let cancel_token = setup_signal_handler().await?;

    match cli.command {
        Commands::Export {
            source,
            export,
            schema,
        } => {
            apply_source(&mut config, &source, schema.as_deref());
            apply_export(&mut config, &export);
            config.validate()?;

            let (_, result) = export_scripts(&config, cancel_token).await?;
            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_export_result(&result);
            }
        }

        Commands::Replay {
            target,
            scripts_dir,
            replay,
            schema,
        } => {
            apply_target(&mut config, &target, schema.as_deref());
            if let Some(dir) = scripts_dir {
                config.replay.scripts_dir = dir;
            }
            apply_replay(&mut config, &replay);
            config.validate()?;

            let store = ScriptStore::new(&config.replay.scripts_dir);
            let report = replay_scripts(&config, &store, cancel_token).await?;
            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_replay_report(&report);
            }
            report.into_result()?;
        }

        Commands::Migrate {
            source,
            target,
            export,
            replay,
            schema,
        } => {
            apply_source(&mut config, &source, schema.as_deref());
            apply_target(&mut config, &target, schema.as_deref());
            apply_export(&mut config, &export);
            apply_replay(&mut config, &replay);
            config.validate()?;
            config.validate_distinct()?;

            let (store, result) = export_scripts(&config, cancel_token.clone()).await?;
            if !cli.output_json {
                print_export_result(&result);
            }
            let replayed = replay_scripts(&config, &store, cancel_token).await;
            if cli.output_json {
                println!("{}", migrate_json(&result, replayed.as_ref().ok())?);
            }
            let report = replayed?;
            if !cli.output_json {
                print_replay_report(&report);
            }
            report.into_result()?;
        }

        Commands::Direct {
            source,
            target,
            schema,
        } => {
            apply_source(&mut config, &source, schema.as_deref());
            apply_target(&mut config, &target, schema.as_deref());
            config.validate()?;
            config.validate_distinct()?;

            direct_migrate(&config, cancel_token, cli.output_json).await?;
        }

        Commands::Inspect { scripts_dir } => {
            let dir = scripts_dir.unwrap_or_else(|| config.replay.scripts_dir.clone());
            inspect_scripts(&ScriptStore::new(dir), cli.output_json)?;
        }

        Commands::HealthCheck { source, target } => {
            apply_source(&mut config, &source, None);
            apply_target(&mut config, &target, None);
            config.validate()?;

            health_check(&config, cli.output_json).await?;
        }
    }

    Ok(())
}

/// Load the explicit config file, or `config.yaml` when present, or defaults.
fn load_config(path: Option<&Path>) -> Result<Config, MigrateError> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(MigrateError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            let config = Config::load(DEFAULT_CONFIG)?;
            info!("Loaded configuration from {}", DEFAULT_CONFIG);
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Apply a connection override, keeping the configured namespace unless `schema` is set.
fn override_database(slot: &mut Option<DatabaseConfig>, url: Option<&String>, schema: Option<&str>) {
    if let Some(url) = url {
        let mut db = DatabaseConfig::from_url(url.clone());
        if let Some(existing) = slot.as_ref() {
            db.schema = existing.schema.clone();
        }
        *slot = Some(db);
    }
    if let (Some(schema), Some(db)) = (schema, slot.as_mut()) {
        db.schema = schema.to_string();
    }
}

fn apply_source(config: &mut Config, args: &SourceArgs, schema: Option<&str>) {
    override_database(&mut config.source, args.source_url.as_ref(), schema);
}

fn apply_target(config: &mut Config, args: &TargetArgs, schema: Option<&str>) {
    override_database(&mut config.target, args.target_url.as_ref(), schema);
}

fn apply_export(config: &mut Config, args: &ExportArgs) {
    if let Some(ref dir) = args.output_dir {
        config.export.output_dir = dir.clone();
        config.replay.scripts_dir = dir.clone();
    }
    if args.sample {
        config.export.sample_data = true;
    }
    if let Some(rows) = args.sample_rows {
        config.export.sample_data = true;
        config.export.sample_rows = rows;
    }
}

fn apply_replay(config: &mut Config, args: &ReplayArgs) {
    if args.keep_existing {
        config.replay.drop_existing = false;
    }
}

async fn export_scripts(
    config: &Config,
    cancel_token: CancellationToken,
) -> Result<(ScriptStore, ExportResult), MigrateError> {
    let source = PgCatalog::connect(config.require_source()?).await?;
    let store = ScriptStore::new(&config.export.output_dir);

    let result = Exporter::new(source, config.export.clone())
        .with_config_hash(config.hash())
        .with_cancel(cancel_token)
        .run(&store)
        .await?;

    Ok((store, result))
}

/// One document for `migrate --output-json`; `replay` is null when it never produced a report.
fn migrate_json(
    result: &ExportResult,
    report: Option<&ReplayReport>,
) -> Result<String, MigrateError> {
    let combined = serde_json::json!({
        "export": serde_json::to_value(result)?,
        "replay": serde_json::to_value(report)?,
    });
    Ok(serde_json::to_string_pretty(&combined)?)
}

fn print_export_result(result: &ExportResult) {
    println!("\nExport completed!");
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!("  Tables: {}", result.tables);
    println!("  Foreign keys: {}", result.foreign_keys);
    println!("  Sequences: {}", result.sequences);
    println!("  Rows: {}", result.rows);
    for file in &result.files {
        println!("  Wrote {}", file.display());
    }
    if !result.warnings.is_empty() {
        println!("  Skipped:");
        for warning in &result.warnings {
            println!("    {}", warning);
        }
    }
}

async fn replay_scripts(
    config: &Config,
    store: &ScriptStore,
    cancel_token: CancellationToken,
) -> Result<ReplayReport, MigrateError> {
    let target = PgTarget::connect(config.require_target()?).await?;
    let options = ReplayOptions {
        drop_existing: config.replay.drop_existing,
    };

    let mut engine = ReplayEngine::new(target, options).with_cancel(cancel_token);
    engine.run(store).await
}

fn print_replay_report(report: &ReplayReport) {
    if report.is_success() {
        println!("\nReplay completed!");
    } else {
        println!("\nReplay stopped ({:?})", report.status);
    }
    println!("  Duration: {:.2}s", report.duration_seconds);
    if let Some(ref cleanup) = report.cleanup {
        println!(
            "  Dropped: {} tables, {} sequences",
            cleanup.tables_dropped, cleanup.sequences_dropped
        );
        for warning in &cleanup.warnings {
            println!("    {}", warning);
        }
    }
    for script in &report.scripts {
        println!(
            "  {}: {} statements ({}ms)",
            script.kind.file_name(),
            script.statements,
            script.duration_ms
        );
    }
    for warning in &report.warnings {
        println!("  Skipped: {}", warning);
    }
    if let Some(ref failure) = report.failure {
        println!(
            "  Failed: statement #{} of {}",
            failure.ordinal,
            failure.kind.file_name()
        );
        println!("    {}", failure.preview);
        println!("    {}", failure.message);
    }
}

async fn direct_migrate(
    config: &Config,
    cancel_token: CancellationToken,
    output_json: bool,
) -> Result<(), MigrateError> {
    let pipeline = DumpPipeline::new(
        config.require_source()?.clone(),
        config.require_target()?.clone(),
        config.dump.clone(),
    )
    .with_cancel(cancel_token);

    let (tx, mut rx) = mpsc::channel::<String>(256);
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if output_json {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    });

    let outcome = pipeline.run(tx).await;
    if let Err(e) = printer.await {
        warn!("Output relay stopped: {}", e);
    }
    let outcome = outcome?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.is_clean() {
        println!(
            "\nDirect migration completed in {}s",
            outcome.duration_seconds()
        );
    } else {
        println!(
            "\nDirect migration completed with restore warnings in {}s",
            outcome.duration_seconds()
        );
    }
    Ok(())
}

fn inspect_scripts(store: &ScriptStore, output_json: bool) -> Result<(), MigrateError> {
    let summaries = store.inspect()?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("Scripts in {}:", store.dir().display());
    for summary in &summaries {
        if summary.present {
            println!(
                "  {}: {} statements",
                summary.kind.file_name(),
                summary.statements
            );
        } else {
            println!("  {}: missing", summary.kind.file_name());
        }
        for table in &summary.tables {
            println!("\n  Table: {}", table.name);
            for col in &table.columns {
                let mut line = format!("    {} {}", col.name, col.data_type);
                if !col.is_nullable {
                    line.push_str(" NOT NULL");
                }
                if let Some(ref default) = col.default {
                    line.push_str(&format!(" DEFAULT {}", default));
                }
                println!("{}", line);
            }
            if table.has_pk() {
                println!("    PRIMARY KEY ({})", table.primary_key.join(", "));
            }
        }
    }
    Ok(())
}

async fn health_check(config: &Config, output_json: bool) -> Result<(), MigrateError> {
    let mut checks = Vec::new();
    if let Some(ref source) = config.source {
        checks.push(("source", check_connection(source).await));
    }
    if let Some(ref target) = config.target {
        checks.push(("target", check_connection(target).await));
    }
    if checks.is_empty() {
        return Err(MigrateError::Config(
            "no source or target database is configured".to_string(),
        ));
    }
    let healthy = checks.iter().all(|(_, c)| c.connected);

    if output_json {
        let results: serde_json::Map<String, serde_json::Value> = checks
            .iter()
            .map(|(role, c)| Ok(((*role).to_string(), serde_json::to_value(c)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        let mut body = serde_json::Value::Object(results);
        body["healthy"] = serde_json::Value::Bool(healthy);
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("Health Check Results:");
        for (role, check) in &checks {
            println!(
                "  {} ({}): {} ({}ms)",
                role,
                check.name,
                if check.connected { "OK" } else { "FAILED" },
                check.latency_ms
            );
            if let Some(ref err) = check.error {
                println!("    Error: {}", err);
            }
        }
        println!(
            "\n  Overall: {}",
            if healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    if !healthy {
        return Err(MigrateError::connection("health check failed", "health-check"));
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("invalid verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("invalid log format '{}'", other)),
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Stopping at the next statement..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Stopping at the next statement..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping at the next statement...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
