//! rlog CLI: inspect, replay and convert sample-result logs.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use resultlog::{export, summarize, ContentMask, LogFormat, Mode, ResultStore, StoreConfig};

/// Records moved per read/write during `convert`.
const CONVERT_BATCH: usize = 500;

#[derive(Parser)]
#[command(
    name = "rlog",
    about = "rlog: inspect, replay and convert load-test result logs",
    version,
    author
)]
struct Cli {
    /// Log format (default: from the file extension, then the config)
    #[arg(long, short, global = true)]
    format: Option<LogFormat>,
    /// Content mask to replay with: `all`, an integer, or flag names such as
    /// `base_info|sub_results` (default: the CSV header, then the config)
    #[arg(long, short, global = true)]
    mask: Option<ContentMask>,
    /// YAML store config supplying format and mask defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Also write diagnostics to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-label timing and error summary
    Inspect {
        /// Path to the log
        log: PathBuf,
    },
    /// Print records as JSON lines, read in chunks
    Dump {
        /// Path to the log
        log: PathBuf,
        /// Records per incremental read
        #[arg(long, default_value = "100")]
        chunk: NonZeroUsize,
        /// Stop after this many records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export flattened samples to CSV, JSON or Parquet
    Export {
        /// Path to the log
        log: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        to: ExportFormat,
        /// Output file (default: stdout; required for parquet)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Re-encode a log in another format or under a narrower mask
    Convert {
        /// Source log
        src: PathBuf,
        /// Destination log (overwritten)
        dst: PathBuf,
        /// Destination format (default: from the destination extension)
        #[arg(long)]
        to_format: Option<LogFormat>,
        /// Destination mask (default: the source mask)
        #[arg(long)]
        to_mask: Option<ContentMask>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
    Parquet,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    let defaults = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    let settings = Settings {
        format: cli.format,
        mask: cli.mask,
        config_mask: cli.config.is_some().then_some(defaults.mask),
        defaults,
    };

    match cli.command {
        Commands::Inspect { log } => cmd_inspect(&settings, &log)?,
        Commands::Dump { log, chunk, limit } => cmd_dump(&settings, &log, chunk, limit)?,
        Commands::Export { log, to, output } => cmd_export(&settings, &log, to, output)?,
        Commands::Convert {
            src,
            dst,
            to_format,
            to_mask,
        } => cmd_convert(&settings, &src, &dst, to_format, to_mask)?,
    }

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
                .init();
            Ok(None)
        }
    }
}

// ─── Store access ─────────────────────────────────────────────────────────────

/// Resolved global options.
struct Settings {
    format: Option<LogFormat>,
    mask: Option<ContentMask>,
    config_mask: Option<ContentMask>,
    defaults: StoreConfig,
}

impl Settings {
    fn format_for(&self, path: &Path) -> LogFormat {
        self.format
            .or_else(|| LogFormat::from_path(path))
            .unwrap_or(self.defaults.format)
    }

    /// Opens an existing log for replay without truncating it.
    fn open_for_read(&self, path: &Path) -> Result<ResultStore> {
        if !path.is_file() {
            anyhow::bail!("Log not found: {}", path.display());
        }
        let mut store = ResultStore::with_format(path, self.format_for(path));
        let mask = self.mask_for(&store)?;
        store
            .open_source(Mode::Append, mask)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        debug!(path = %path.display(), format = %store.format(), %mask, "Opened log");
        Ok(store)
    }

    /// `--mask`, then the mask recorded in the log header, then the config.
    fn mask_for(&self, store: &ResultStore) -> Result<ContentMask> {
        if let Some(mask) = self.mask {
            return Ok(mask);
        }
        let recorded = store
            .recorded_mask()
            .with_context(|| format!("Failed to read header of {}", store.path().display()))?;
        Ok(recorded
            .or(self.config_mask)
            .unwrap_or(ContentMask::ALL))
    }
}

// ─── Command implementations ──────────────────────────────────────────────────

fn cmd_inspect(settings: &Settings, log: &Path) -> Result<()> {
    let mut store = settings.open_for_read(log)?;
    let mask = store.mask().unwrap_or(ContentMask::ALL);
    let samples = store.load_log()?;
    store.close_source()?;

    println!("Log: {}", log.display());
    println!("Format: {}", store.format());
    println!("Mask: {}", mask);
    println!("Records: {}", samples.len());
    println!();

    let summaries = summarize(&samples);
    if summaries.is_empty() {
        println!("No samples with base info to summarize.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header([
        "Label", "Samples", "Errors", "Error %", "Min", "Mean", "p90", "Max",
    ]);
    for s in &summaries {
        table.add_row([
            s.label.clone(),
            s.samples.to_string(),
            s.errors.to_string(),
            format!("{:.2}", s.error_rate() * 100.0),
            format_ms(s.min_ms as f64),
            format_ms(s.mean_ms),
            format_ms(s.p90_ms as f64),
            format_ms(s.max_ms as f64),
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn cmd_dump(
    settings: &Settings,
    log: &Path,
    chunk: NonZeroUsize,
    limit: Option<usize>,
) -> Result<()> {
    let mut store = settings.open_for_read(log)?;
    let limit = limit.unwrap_or(usize::MAX);
    let mut printed = 0;

    while printed < limit {
        let batch = store.load_log_chunk(chunk.get().min(limit - printed))?;
        if batch.is_empty() {
            break;
        }
        for sample in &batch {
            println!("{}", serde_json::to_string(sample)?);
        }
        printed += batch.len();
    }

    store.close_source()?;
    info!(records = printed, "Dump finished");
    Ok(())
}

fn cmd_export(
    settings: &Settings,
    log: &Path,
    to: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut store = settings.open_for_read(log)?;
    let samples = store.load_log()?;
    store.close_source()?;

    let content = match to {
        ExportFormat::Csv => export::to_csv(&samples),
        ExportFormat::Json => export::to_json(&samples)?,
        ExportFormat::Parquet => {
            let path = output.context("Parquet export needs --output")?;
            export::write_parquet(&path, &samples)?;
            println!("Exported {} samples to {}", samples.len(), path.display());
            return Ok(());
        }
    };

    match output {
        Some(path) => {
            std::fs::write(&path, &content)?;
            println!("Exported {} samples to {}", samples.len(), path.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}

fn cmd_convert(
    settings: &Settings,
    src: &Path,
    dst: &Path,
    to_format: Option<LogFormat>,
    to_mask: Option<ContentMask>,
) -> Result<()> {
    if src == dst {
        anyhow::bail!("Source and destination must differ");
    }
    let mut source = settings.open_for_read(src)?;

    let format = to_format
        .or_else(|| LogFormat::from_path(dst))
        .unwrap_or(source.format());
    let mask = to_mask
        .or_else(|| source.mask())
        .unwrap_or(ContentMask::ALL);
    let mut target = ResultStore::with_format(dst, format);
    target
        .open_source(Mode::Overwrite, mask)
        .with_context(|| format!("Failed to open {}", dst.display()))?;

    // Progress is tracked in source bytes so the records need no prior count.
    let progress = ProgressBar::new(source.committed_len()?);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} ({elapsed})")?
            .progress_chars("=> "),
    );

    let mut total = 0;
    loop {
        let batch = source.load_log_chunk(CONVERT_BATCH)?;
        if batch.is_empty() {
            break;
        }
        target.record_samples(&batch)?;
        total += batch.len();
        progress.set_position(source.cursor()?.offset());
    }
    progress.finish_and_clear();

    source.close_source()?;
    target.close_source()?;
    println!(
        "Converted {} records: {} ({}) -> {} ({}, mask {})",
        total,
        src.display(),
        source.format(),
        dst.display(),
        format,
        mask
    );
    Ok(())
}

// ─── Utilities ────────────────────────────────────────────────────────────────

fn format_ms(ms: f64) -> String {
    if ms >= 60_000.0 {
        format!("{:.1}m", ms / 60_000.0)
    } else if ms >= 1_000.0 {
        format!("{:.2}s", ms / 1_000.0)
    } else {
        format!("{:.0}ms", ms)
    }
}
