//! Command-line entry points for the collect and process phases.
//!
//! Path options resolve in order: explicit flag, environment variable, then
//! the default file name in the working directory.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, error::ErrorKind};
use serde::Serialize;
use tracing::info;

use crate::archive::{ArchiveAction, CommandAction, CompositeAction};
use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::collector::{CollectReport, Collector};
use crate::config::{CollectorConfig, ProcessorConfig, StallPolicy, SyncPaths};
use crate::constants::collector::{
    ESCALATE_AFTER_EMPTY_BATCHES, PERSIST_EVERY_ITERATIONS, TERMINATE_AFTER_EMPTY_BATCHES,
};
use crate::constants::files::{
    DEFAULT_ARCHIVE_DIR, DEFAULT_CHECKPOINT_FILENAME, DEFAULT_LEDGER_FILENAME, ENV_ARCHIVE_DIR,
    ENV_CHECKPOINT_PATH, ENV_LEDGER_PATH,
};
use crate::constants::processor::INTER_ITEM_DELAY;
use crate::interrupt::CancelFlag;
use crate::ledger::LedgerFile;
use crate::processor::{ProcessReport, ProcessStop, Processor, StatusReport};
use crate::source::{BatchFileSource, PaginationSource, ProcessPager, ProcessPagerConfig};

#[derive(Debug, Parser)]
#[command(
    name = "feedsync",
    disable_help_subcommand = true,
    about = "Incrementally collect feed identifiers and archive each one exactly once",
    long_about = "Collect newly visible identifiers from a scroll-paginated feed into a ledger, then archive pending ledger entries oldest-first with a resumable checkpoint."
)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,
    #[arg(long, global = true, help = "Print run reports as JSON")]
    json: bool,
    #[command(subcommand)]
    command: CommandKind,
}

#[derive(Debug, Subcommand)]
enum CommandKind {
    /// Collect new identifiers into the ledger.
    Collect(CollectArgs),
    /// Archive ledger entries newer than the checkpoint.
    Process(ProcessArgs),
    /// Collect, then process.
    Sync {
        #[command(flatten)]
        collect: CollectArgs,
        #[command(flatten)]
        process: ProcessArgs,
    },
    /// Show ledger size, checkpoint, and pending count.
    Status,
    /// Clear the checkpoint so the next run archives the whole ledger.
    Reset,
}

#[derive(Debug, Args)]
struct PathArgs {
    #[arg(
        long,
        global = true,
        env = ENV_LEDGER_PATH,
        default_value = DEFAULT_LEDGER_FILENAME,
        value_name = "PATH",
        help = "Ledger file (newest-first identifiers)"
    )]
    ledger: PathBuf,
    #[arg(
        long,
        global = true,
        env = ENV_CHECKPOINT_PATH,
        default_value = DEFAULT_CHECKPOINT_FILENAME,
        value_name = "PATH",
        help = "Checkpoint file (newest archived identifier)"
    )]
    checkpoint: PathBuf,
    #[arg(
        long = "archive-dir",
        global = true,
        env = ENV_ARCHIVE_DIR,
        default_value = DEFAULT_ARCHIVE_DIR,
        value_name = "DIR",
        help = "Output directory passed to archival steps as {out}"
    )]
    archive_dir: PathBuf,
}

impl From<&PathArgs> for SyncPaths {
    fn from(args: &PathArgs) -> Self {
        Self {
            ledger: args.ledger.clone(),
            checkpoint: args.checkpoint.clone(),
            archive_dir: args.archive_dir.clone(),
        }
    }
}

#[derive(Debug, Args)]
struct CollectArgs {
    #[arg(
        long = "batch-file",
        value_name = "PATH",
        conflicts_with = "scraper",
        help = "Replay batches from a file (blank-line separated)"
    )]
    batch_file: Option<PathBuf>,
    #[arg(
        long,
        value_name = "PROGRAM",
        help = "Scraper speaking the advance/jump/end? line protocol"
    )]
    scraper: Option<String>,
    #[arg(
        long = "scraper-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        help = "Argument for --scraper, repeat as needed"
    )]
    scraper_args: Vec<String>,
    #[arg(long = "max-batches", value_parser = parse_positive_usize, help = "Stop after this many batches")]
    max_batches: Option<usize>,
    #[arg(
        long = "escalate-after",
        default_value_t = ESCALATE_AFTER_EMPTY_BATCHES,
        value_parser = parse_positive_usize,
        help = "Consecutive empty batches before jumping ahead"
    )]
    escalate_after: usize,
    #[arg(
        long = "terminate-after",
        default_value_t = TERMINATE_AFTER_EMPTY_BATCHES,
        value_parser = parse_positive_usize,
        help = "Empty batches since last discovery before giving up"
    )]
    terminate_after: usize,
    #[arg(
        long = "persist-every",
        default_value_t = PERSIST_EVERY_ITERATIONS,
        help = "Batches between periodic ledger saves (0 disables)"
    )]
    persist_every: usize,
}

impl CollectArgs {
    fn config(&self) -> CollectorConfig {
        CollectorConfig {
            stall: StallPolicy {
                escalate_after: self.escalate_after,
                terminate_after: self.terminate_after,
            },
            persist_every: self.persist_every,
            max_batches: self.max_batches,
        }
    }

    fn open_source(&self) -> Result<Box<dyn PaginationSource>, Box<dyn Error>> {
        if let Some(path) = &self.batch_file {
            return Ok(Box::new(BatchFileSource::open(path)?));
        }
        if let Some(program) = &self.scraper {
            let config = ProcessPagerConfig::new(program).with_args(self.scraper_args.iter());
            return Ok(Box::new(ProcessPager::spawn(&config)?));
        }
        Err("collect needs a pagination source: pass --batch-file or --scraper".into())
    }
}

#[derive(Debug, Args)]
struct ProcessArgs {
    #[arg(
        long = "step",
        value_name = "NAME=PROGRAM ARGS...",
        value_parser = parse_step,
        help = "Archival step; args may use {id}, {url}, {out}. Repeat for several steps (any success counts)"
    )]
    steps: Vec<StepSpec>,
    #[arg(
        long = "delay-secs",
        default_value_t = INTER_ITEM_DELAY.as_secs_f64(),
        help = "Pause between successful items"
    )]
    delay_secs: f64,
    #[arg(long = "max-items", value_parser = parse_positive_usize, help = "Stop after this many attempts")]
    max_items: Option<usize>,
}

impl ProcessArgs {
    fn config(&self) -> Result<ProcessorConfig, Box<dyn Error>> {
        let delay = Duration::try_from_secs_f64(self.delay_secs)
            .map_err(|err| format!("invalid --delay-secs value {}: {err}", self.delay_secs))?;
        Ok(ProcessorConfig {
            delay,
            max_items: self.max_items,
        })
    }

    fn build_action(&self, paths: &SyncPaths) -> CompositeAction {
        let mut action = CompositeAction::new("archive");
        if self.steps.is_empty() {
            action = action.with_part(Box::new(default_media_step(paths)));
        }
        for step in &self.steps {
            action = action.with_part(Box::new(
                CommandAction::new(&step.name, &step.program, &paths.archive_dir)
                    .with_args(step.args.iter().cloned()),
            ));
        }
        action
    }
}

#[derive(Debug, Clone)]
struct StepSpec {
    name: String,
    program: String,
    args: Vec<String>,
}

fn parse_step(raw: &str) -> Result<StepSpec, String> {
    let (name, command) = raw
        .split_once('=')
        .ok_or_else(|| format!("step '{raw}' must look like NAME=PROGRAM ARGS..."))?;
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| format!("step '{name}' has no program"))?;
    if name.trim().is_empty() {
        return Err(format!("step '{raw}' has an empty name"));
    }
    Ok(StepSpec {
        name: name.trim().to_string(),
        program,
        args: parts.collect(),
    })
}

fn default_media_step(paths: &SyncPaths) -> CommandAction {
    CommandAction::new("media", "gallery-dl", &paths.archive_dir)
        .with_args(["--no-mtime", "-D", "{out}", "{url}"])
        .with_success_detail("Media download completed")
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

/// Parse `args` (without the program name) and run the selected phase(s).
pub fn run<I>(args: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let Some(cli) = parse_cli::<Cli, _>(std::iter::once("feedsync".to_string()).chain(args))?
    else {
        return Ok(());
    };
    let paths = SyncPaths::from(&cli.paths);
    let cancel = CancelFlag::new();

    match &cli.command {
        CommandKind::Collect(collect) => {
            cancel.install_ctrlc_handler()?;
            let report = run_collect(&paths, collect, &cancel)?;
            emit(cli.json, &report, print_collect)?;
        }
        CommandKind::Process(process) => {
            cancel.install_ctrlc_handler()?;
            let report = run_process(&paths, process, &cancel)?;
            emit(cli.json, &report, print_process)?;
        }
        CommandKind::Sync { collect, process } => {
            cancel.install_ctrlc_handler()?;
            let started = Instant::now();
            let collected = run_collect(&paths, collect, &cancel)?;
            if cancel.is_cancelled() {
                emit(cli.json, &collected, print_collect)?;
                return Ok(());
            }
            let processed = run_process(&paths, process, &cancel)?;
            let summary = SyncSummary {
                collect: collected,
                process: processed,
                elapsed_secs: started.elapsed().as_secs_f64(),
            };
            emit(cli.json, &summary, |summary| {
                print_collect(&summary.collect);
                print_process(&summary.process);
                println!("Total time: {:.2} seconds", summary.elapsed_secs);
            })?;
        }
        CommandKind::Status => {
            let ledger = LedgerFile::new(&paths.ledger).load()?;
            let checkpoint = FileCheckpointStore::new(&paths.checkpoint).load()?;
            let status = StatusReport::inspect(&ledger, checkpoint.as_deref());
            emit(cli.json, &status, print_status)?;
        }
        CommandKind::Reset => {
            let store = FileCheckpointStore::new(&paths.checkpoint);
            let previous = store.load()?;
            store.clear()?;
            info!(checkpoint = ?previous, "checkpoint cleared");
            println!(
                "Checkpoint cleared (was {}).",
                previous.as_deref().unwrap_or("unset")
            );
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SyncSummary {
    collect: CollectReport,
    process: ProcessReport,
    elapsed_secs: f64,
}

fn run_collect(
    paths: &SyncPaths,
    args: &CollectArgs,
    cancel: &CancelFlag,
) -> Result<CollectReport, Box<dyn Error>> {
    let mut source = args.open_source()?;
    let collector = Collector::new(LedgerFile::new(&paths.ledger), args.config())
        .with_cancel_flag(cancel.clone());
    Ok(collector.run(&mut source)?.report)
}

fn run_process(
    paths: &SyncPaths,
    args: &ProcessArgs,
    cancel: &CancelFlag,
) -> Result<ProcessReport, Box<dyn Error>> {
    let ledger = LedgerFile::new(&paths.ledger).load()?;
    let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(&paths.checkpoint));
    let processor = Processor::new(store, args.config()?).with_cancel_flag(cancel.clone());
    let mut action = args.build_action(paths);
    info!(
        steps = action.len(),
        action = action.name(),
        "archival action ready"
    );
    Ok(processor.run(&ledger, &mut action)?)
}

fn emit<T: Serialize>(
    json: bool,
    value: &T,
    human: impl FnOnce(&T),
) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_collect(report: &CollectReport) {
    println!(
        "Collected {} new identifiers in {} batches (ledger now {}; stopped: {:?}).",
        report.discovered, report.batches, report.ledger_len, report.stop
    );
    if report.failed_batches > 0 {
        println!("  {} batches failed and were treated as empty.", report.failed_batches);
    }
}

fn print_process(report: &ProcessReport) {
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    match &report.stop {
        ProcessStop::Completed if report.archived == 0 => println!("No new items to archive."),
        ProcessStop::Completed => println!("Archived {} new items.", report.archived),
        ProcessStop::Halted { identifier, reason } => println!(
            "Archived {} of {} pending items; halted at {identifier}: {reason}",
            report.archived, report.pending
        ),
        ProcessStop::ItemLimit => println!(
            "Archived {} of {} pending items; item limit reached.",
            report.archived, report.pending
        ),
        ProcessStop::Interrupted => println!(
            "Archived {} of {} pending items before interruption.",
            report.archived, report.pending
        ),
    }
}

fn print_status(status: &StatusReport) {
    println!("Ledger entries: {}", status.ledger_len);
    match (&status.checkpoint, status.dangling) {
        (None, _) => println!("Checkpoint:     unset"),
        (Some(id), false) => println!("Checkpoint:     {id}"),
        (Some(id), true) => println!("Checkpoint:     {id} (not in ledger; all entries pending)"),
    }
    println!("Pending:        {}", status.pending);
}
