use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use local_disc::banner::{BannerInfo, SessionStats, print_banner, print_session_summary};
use local_disc::config::EngineConfig;
use local_disc::consts::{self, format_number};
use local_disc::engine::{ConnectionTarget, Engine, QueryOutput};
use local_disc::error::EngineError;
use local_disc::import::task::ImportTask;
use local_disc::import::{ImportRequest, ImportSummary};
use local_disc::logging;
use local_disc::spinner::Spinner;

#[derive(Parser)]
#[command(name = "localdisc", version, about = "Query local data dumps with SQL.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Connection string: a path, :memory:, sqlite://path, file: URI or
    /// key=value pairs (default: ~/.localdisc/localdisc.db)
    #[arg(short, long)]
    db: Option<String>,

    /// Percentage between two import progress reports (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    progress_step: Option<u8>,

    /// Print query results as JSON instead of a table
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run one SQL statement and print the result
    Query {
        /// SQL text
        sql: String,
    },
    /// Load a dump file (SQL, CSV or JSON-lines)
    Import {
        /// Name of the system that produced the dump
        #[arg(short, long, default_value = "sqlite")]
        platform: String,
        /// Dump file
        file: PathBuf,
    },
    /// List finished imports
    History,
    /// Print the engine version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Version) => {
            println!("{}", Engine::version());
            Ok(())
        }
        Some(Command::Query { sql }) => {
            let engine = open_engine(cli.db.as_deref(), cli.progress_step)?;
            let output = engine.execute(&sql)?;
            print_output(&output, cli.json)
        }
        Some(Command::Import { platform, file }) => {
            let engine = open_engine(cli.db.as_deref(), cli.progress_step)?;
            let summary = run_import(engine, ImportRequest::new(platform, file)).await?;
            print_summary(&summary);
            Ok(())
        }
        Some(Command::History) => {
            let engine = open_engine(cli.db.as_deref(), cli.progress_step)?;
            print_history(&engine)
        }
        None => {
            let engine = open_engine(cli.db.as_deref(), cli.progress_step)?;
            repl(engine, cli.json).await
        }
    }
}

/// Load configuration, apply CLI overrides, start logging and connect.
fn open_engine(db: Option<&str>, progress_step: Option<u8>) -> anyhow::Result<Arc<Engine>> {
    let mut config = EngineConfig::load().context("loading configuration")?;
    if let Some(step) = progress_step {
        config.progress_step = step;
    }
    logging::init(&config.log_filter);

    let target = resolve_target(db)?;
    let engine = Engine::open_with(target, config).context("opening database")?;
    Ok(Arc::new(engine))
}

fn resolve_target(db: Option<&str>) -> anyhow::Result<ConnectionTarget> {
    if let Some(db) = db {
        return db
            .parse()
            .with_context(|| format!("invalid connection string `{db}`"));
    }
    match consts::default_db_path() {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            Ok(ConnectionTarget::file(path))
        }
        None => Ok(ConnectionTarget::memory()),
    }
}

/// Run an import in the background, showing its progress on a spinner.
/// Ctrl+C cancels the import, not the process.
async fn run_import(engine: Arc<Engine>, request: ImportRequest) -> anyhow::Result<ImportSummary> {
    let mut task = ImportTask::spawn(engine, request);
    let cancel = task.cancel_token();
    let spinner = Spinner::start("starting import");
    let mut last_message = String::new();

    loop {
        tokio::select! {
            progress = task.next_progress() => match progress {
                Some(progress) => {
                    last_message = spinner.show_progress(&progress);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                cancel.cancel();
                spinner.set_message("cancelling...");
            }
        }
    }
    spinner.stop().await;
    if !last_message.is_empty() {
        eprintln!("{last_message}");
    }

    Ok(task.join().await?)
}

fn print_output(output: &QueryOutput, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", output.to_json()?);
    } else {
        print!("{}", output.render_table());
        io::stdout().flush()?;
    }
    Ok(())
}

fn print_summary(summary: &ImportSummary) {
    println!(
        "imported {} {} from {} ({} bytes, sha256 {})",
        format_number(summary.records),
        if summary.format.as_str() == "sql" {
            "statements"
        } else {
            "rows"
        },
        summary.source.display(),
        format_number(summary.bytes),
        summary.sha256,
    );
}

fn print_history(engine: &Engine) -> anyhow::Result<()> {
    let records = engine.import_history()?;
    if records.is_empty() {
        println!("no imports yet.");
        return Ok(());
    }
    for record in records {
        println!(
            "{:>4}  {}  {:<10} {:<5} {:>8}  {}",
            record.id,
            record.imported_at,
            record.platform,
            record.format,
            format_number(record.records.max(0) as u64),
            record.source,
        );
    }
    Ok(())
}

/// Split `.import <platform> <file>` arguments. A single argument is the file.
fn parse_import_args(args: &str) -> Option<ImportRequest> {
    let args = args.trim();
    if args.is_empty() {
        return None;
    }
    Some(match args.split_once(char::is_whitespace) {
        Some((platform, file)) => ImportRequest::new(platform, Path::new(file.trim())),
        None => ImportRequest::new("sqlite", Path::new(args)),
    })
}

async fn repl(engine: Arc<Engine>, json: bool) -> anyhow::Result<()> {
    print_banner(&BannerInfo {
        connection: &engine.target().to_string(),
        access: if engine.target().is_read_only() {
            "read-only"
        } else {
            "read-write"
        },
        progress_step: engine.config().progress_step,
        imports: engine.import_history()?.len(),
    });

    let mut stats = SessionStats::default();

    // async stdin so Ctrl+C is caught at the prompt too
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("\nlocaldisc> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // Ctrl+D (EOF)
                        println!();
                        break;
                    }
                    Err(e) => {
                        eprintln!("input error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        if let Some(args) = input
            .strip_prefix(".import")
            .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        {
            let Some(request) = parse_import_args(args) else {
                eprintln!("usage: .import <platform> <file>");
                continue;
            };
            match run_import(engine.clone(), request).await {
                Ok(summary) => {
                    stats.imported_records += summary.records;
                    print_summary(&summary);
                }
                Err(e) => match e.downcast_ref::<EngineError>() {
                    Some(EngineError::Cancelled) => println!("import cancelled."),
                    _ => eprintln!("error: {e}"),
                },
            }
            continue;
        }
        if input == ".history" {
            if let Err(e) = print_history(&engine) {
                eprintln!("error: {e}");
            }
            continue;
        }

        stats.queries += 1;
        let query_engine = engine.clone();
        let sql = input.to_string();
        let result = tokio::task::spawn_blocking(move || query_engine.execute(&sql)).await?;
        match result {
            Ok(output) => print_output(&output, json)?,
            Err(e) => {
                stats.failed_queries += 1;
                eprintln!("error: {e}");
            }
        }
    }

    print_session_summary(stats);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_args_take_platform_then_file() {
        let request = parse_import_args(" shopify /tmp/my orders.csv").unwrap();
        assert_eq!(request.platform, "shopify");
        assert_eq!(request.path, PathBuf::from("/tmp/my orders.csv"));
    }

    #[test]
    fn single_import_arg_is_the_file() {
        let request = parse_import_args("dump.sql").unwrap();
        assert_eq!(request.platform, "sqlite");
        assert_eq!(request.path, PathBuf::from("dump.sql"));
        assert!(parse_import_args("   ").is_none());
    }

    #[test]
    fn explicit_db_is_parsed() {
        let target = resolve_target(Some(":memory:")).unwrap();
        assert_eq!(target, ConnectionTarget::memory());
        assert!(resolve_target(Some("host=db.example.com")).is_err());
    }
}
