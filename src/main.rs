//! dupescan — find duplicate-file candidates on a pool of parallel workers.
//!
//! Thin headless consumer of `dupescan-core`: parses arguments, starts the
//! engine, issues requests, and prints the notifications it gets back.
//! Grouping files into duplicates is left to whatever reads the output.
use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use dupescan_core::config::{parse_workers, ENV_WORKERS};
use dupescan_core::{start_engine, EngineConfig, EngineHandle, Event, TraversalMode};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, Level};

#[derive(Parser, Debug)]
#[command(name = "dupescan", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Number of worker threads (default: logical core count).
    #[arg(short = 'j', long, global = true, value_parser = workers_arg)]
    workers: Option<usize>,

    /// Run with exactly one worker (debug mode).
    #[arg(long, global = true)]
    single_worker: bool,

    /// Directory traversal strategy: per-entry or subtree.
    #[arg(long, global = true, value_parser = traversal_arg)]
    traversal: Option<TraversalMode>,

    /// Print notifications as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    /// More diagnostics on stderr (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors on stderr.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every non-empty file under DIR.
    Scan {
        dir: PathBuf,
        /// Also hash every file found.
        #[arg(long)]
        hash: bool,
    },
    /// Print the MD5 digest of each FILE.
    Hash {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete each FILE.
    Delete {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Confirm the deletion; nothing is removed without it.
        #[arg(long)]
        yes: bool,
    },
}

fn workers_arg(s: &str) -> Result<usize, String> {
    parse_workers("--workers", s).map_err(|e| e.to_string())
}

fn traversal_arg(s: &str) -> Result<TraversalMode, String> {
    s.parse().map_err(|e: dupescan_core::ConfigError| e.to_string())
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(log_level(cli.quiet, cli.verbose))
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    debug!("config: {config:?}");

    if let Command::Delete { files, yes: false } = &cli.command {
        bail!(
            "refusing to delete {} file(s) without --yes",
            files.len()
        );
    }

    let handle = start_engine(config).context("failed to start engine")?;
    let summary = run(&cli, &handle)?;
    let stats = handle.stats();
    handle.shutdown();

    info!(
        "{} files found, {} hashed, {} deleted, {} errors ({} tasks dispatched)",
        summary.files, summary.hashes, summary.deleted, summary.errors, stats.dispatched
    );

    Ok(if summary.errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// stderr verbosity: warnings by default, `-v` debug, `-vv` trace, `-q`
/// errors only.
fn log_level(quiet: bool, verbose: u8) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

/// Environment first, then command-line flags on top.
fn build_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::from_env()
        .with_context(|| format!("invalid environment (check {ENV_WORKERS} and friends)"))?;
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }
    if cli.single_worker {
        config = config.with_workers(1);
    }
    if let Some(traversal) = cli.traversal {
        config = config.with_traversal(traversal);
    }
    Ok(config)
}

#[derive(Debug, Default)]
struct Summary {
    files: u64,
    hashes: u64,
    deleted: u64,
    errors: u64,
}

/// Issue the requests for `cli.command` and print events until the engine
/// has handled all of them (including hash requests made along the way).
fn run(cli: &Cli, handle: &EngineHandle) -> anyhow::Result<Summary> {
    let mut sent: u64 = 0;
    let mut hash_found = false;
    match &cli.command {
        Command::Scan { dir, hash } => {
            handle.open_folder(dir)?;
            sent += 1;
            hash_found = *hash;
        }
        Command::Hash { files } => {
            for file in files {
                handle.hash_file(file)?;
                sent += 1;
            }
        }
        Command::Delete { files, .. } => {
            for file in files {
                handle.delete_file(file)?;
                sent += 1;
            }
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut summary = Summary::default();

    loop {
        let event = handle
            .events
            .recv()
            .context("engine stopped before finishing")?;
        match &event {
            Event::Idle { handled } if *handled >= sent => break,
            Event::Idle { .. } | Event::Log { .. } => continue,
            Event::FileFound { path, .. } => {
                summary.files += 1;
                if hash_found {
                    handle.hash_file(path)?;
                    sent += 1;
                }
            }
            Event::HashComputed { .. } => summary.hashes += 1,
            Event::FileDeleted { .. } => summary.deleted += 1,
            Event::Error { .. } => summary.errors += 1,
            Event::DirectoryFound { .. } => {}
        }
        print_event(&mut out, &event, cli.json)?;
    }

    out.flush()?;
    Ok(summary)
}

fn print_event(out: &mut impl Write, event: &Event, json: bool) -> anyhow::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, event)?;
        writeln!(out)?;
        return Ok(());
    }
    match event {
        Event::DirectoryFound { path } => writeln!(out, "dir      {}", path.display())?,
        Event::FileFound { path, size } => {
            writeln!(out, "file     {size:>12}  {}", path.display())?
        }
        Event::HashComputed { path, hash } => writeln!(out, "{hash}  {}", path.display())?,
        Event::FileDeleted { path } => writeln!(out, "deleted  {}", path.display())?,
        Event::Error { message } => writeln!(out, "error    {message}")?,
        Event::Log { .. } | Event::Idle { .. } => {}
    }
    Ok(())
}
