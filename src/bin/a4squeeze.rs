//! CLI binary for a4squeeze.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! wires a JSON worklist to an output directory and prints the run summary.

use a4squeeze::orchestrator::suggested_name;
use a4squeeze::{
    press_document, BatchConfig, BatchProgressCallback, DirectorySink, Eligibility, HttpFetcher,
    JobOrchestrator, JsonRowStore, ProgressCallback, QualitySearch, RasterProfile, RenderMode,
    RunSummary,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the worklist plus a log line per
/// finished job. Jobs may finish out of order when `--concurrency > 1`.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading worklist…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} jobs  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Squeezing");
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        self.activate_bar(total_jobs);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_jobs} jobs…"))
        ));
    }

    fn on_job_start(&self, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn on_job_skipped(&self, label: &str) {
        self.bar
            .println(format!("  {} {:<24}  {}", dim("↷"), label, dim("already processed")));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, label: &str, result_ref: &str, size_bytes: u64) {
        self.bar.println(format!(
            "  {} {:<24}  {:<10}  {}",
            green("✓"),
            label,
            dim(&format!("{:.1} KiB", size_bytes as f64 / 1024.0)),
            dim(result_ref),
        ));
        self.bar.inc(1);
    }

    fn on_job_error(&self, label: &str, error: &str) {
        // Keep output tidy; the full status is in the worklist.
        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<24}  {}", red("✗"), label, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, done: usize, skipped: usize, failed: usize) {
        self.bar.finish_and_clear();
        let mark = if failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {} done, {} skipped, {}",
            mark,
            bold(&done.to_string()),
            skipped,
            if failed == 0 {
                "0 failed".to_string()
            } else {
                red(&format!("{failed} failed"))
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a worklist, writing results to ./out
  a4squeeze invoices.json --out-dir out

  # Publish results under a public base URL and run 4 jobs at once
  a4squeeze invoices.json --out-dir /srv/pdf --public-base-url https://files.example.org/pdf -c 4

  # Tighter budget, resume after the first 100 rows
  a4squeeze invoices.json --max-bytes 500000 --start-offset 100

  # See what a run would do
  a4squeeze invoices.json --dry-run

  # Squeeze a single document
  a4squeeze --single https://example.org/scan.pdf -o scan-a4.pdf

  # Image-only output: every page becomes one JPEG (needs pdfium)
  a4squeeze invoices.json --rasterize

WORKLIST FORMAT:
  A JSON array of rows. Rows without source_ref are ignored; rows with a
  non-empty result_ref are skipped. Result reference and status are written
  back into the same file.

  [
    { "id": "r1", "label": "INV-1", "source_ref": "https://…/a.pdf" },
    { "label": "INV-2", "source_ref": "https://drive.google.com/file/d/…/view" }
  ]

ENVIRONMENT VARIABLES:
  Every flag can be set through an A4SQUEEZE_* variable (see --help).
  PDFIUM_LIB_PATH         Path to an existing libpdfium (file or directory)
  RUST_LOG                Override the log filter
"#;

/// Normalise PDFs to A4 and compress them under a size ceiling.
#[derive(Parser, Debug)]
#[command(
    name = "a4squeeze",
    version,
    about = "Normalise PDFs to A4 and compress them under a size ceiling",
    long_about = "Process a worklist of documents (URLs, Google Drive links or local files): \
fit every page onto A4 portrait, re-encode until the PDF fits a byte ceiling, store the \
result and record a reference to it. Rows that already have a result are skipped, so a \
worklist can be re-run safely.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON worklist file.
    #[arg(env = "A4SQUEEZE_WORKLIST", required_unless_present = "single")]
    worklist: Option<PathBuf>,

    /// Directory the compressed PDFs are written to.
    #[arg(long, env = "A4SQUEEZE_OUT_DIR", default_value = "a4squeeze-out")]
    out_dir: PathBuf,

    /// Base URL under which --out-dir is published; result references use it.
    #[arg(long, env = "A4SQUEEZE_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Process one source reference instead of a worklist.
    #[arg(long, env = "A4SQUEEZE_SINGLE", conflicts_with = "worklist")]
    single: Option<String>,

    /// Output file for --single. Default: derived from the source name.
    #[arg(short, long, env = "A4SQUEEZE_OUTPUT", requires = "single")]
    output: Option<PathBuf>,

    /// Size ceiling per document, in bytes.
    #[arg(long, env = "A4SQUEEZE_MAX_BYTES", default_value_t = 1_048_576)]
    max_bytes: u64,

    /// Highest quality tried (0–1].
    #[arg(long, env = "A4SQUEEZE_Q_MAX", default_value_t = 1.0)]
    q_max: f32,

    /// Lowest quality allowed (0–q_max].
    #[arg(long, env = "A4SQUEEZE_Q_MIN", default_value_t = 0.05)]
    q_min: f32,

    /// Maximum number of trial encodings per document (1–32).
    #[arg(long, env = "A4SQUEEZE_MAX_TRIALS", default_value_t = 8,
          value_parser = clap::value_parser!(u32).range(1..=32))]
    max_trials: u32,

    /// Raster resolution at q = 1 (also the decode resolution).
    #[arg(long, env = "A4SQUEEZE_MAX_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    max_dpi: u32,

    /// Raster resolution at q = 0.
    #[arg(long, env = "A4SQUEEZE_MIN_DPI", default_value_t = 72,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    min_dpi: u32,

    /// JPEG quality at q = 1.
    #[arg(long, env = "A4SQUEEZE_MAX_JPEG", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    max_jpeg: u8,

    /// JPEG quality at q = 0.
    #[arg(long, env = "A4SQUEEZE_MIN_JPEG", default_value_t = 30,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    min_jpeg: u8,

    /// Skip the first N jobs of the worklist.
    #[arg(long, env = "A4SQUEEZE_START_OFFSET", default_value_t = 0)]
    start_offset: usize,

    /// Number of jobs processed at once.
    #[arg(short, long, env = "A4SQUEEZE_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "A4SQUEEZE_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Retries per job when the source is unreachable.
    #[arg(long, env = "A4SQUEEZE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per retry).
    #[arg(long, env = "A4SQUEEZE_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Render every PDF page to an image instead of keeping text and vectors.
    #[arg(long, env = "A4SQUEEZE_RASTERIZE")]
    rasterize: bool,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "A4SQUEEZE_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Stop starting new jobs after this many seconds.
    #[arg(long, env = "A4SQUEEZE_DEADLINE_SECS")]
    deadline_secs: Option<u64>,

    /// List jobs and whether they would run, without processing anything.
    #[arg(long, env = "A4SQUEEZE_DRY_RUN")]
    dry_run: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "A4SQUEEZE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "A4SQUEEZE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "A4SQUEEZE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "A4SQUEEZE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run && cli.single.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Single-document mode ─────────────────────────────────────────────
    if let Some(ref source) = cli.single {
        let pressed = press_document(source, &config)
            .await
            .with_context(|| format!("Failed to process {source}"))?;
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(suggested_name("", source)));
        write_atomic(&output, &pressed.bytes).await?;
        if !cli.quiet {
            eprintln!(
                "{}  {} pages  {}  →  {}",
                green("✔"),
                pressed.page_count,
                dim(&pressed.report.status_line()),
                bold(&output.display().to_string()),
            );
        }
        return Ok(());
    }

    let worklist = match cli.worklist {
        Some(ref path) => path.clone(),
        None => bail!("a worklist file is required unless --single is given"),
    };
    let store = Arc::new(JsonRowStore::new(&worklist));
    let mut sink = DirectorySink::new(&cli.out_dir);
    if let Some(ref base) = cli.public_base_url {
        sink = sink.with_public_base_url(base);
    }
    let sink = Arc::new(sink);

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let fetcher = HttpFetcher::standard(&config).context("Failed to set up fetcher")?;
        let orchestrator = JobOrchestrator::new(Arc::new(fetcher), store, sink, config);
        let plan = orchestrator
            .plan()
            .await
            .with_context(|| format!("Failed to read worklist {}", worklist.display()))?;
        let pending = plan
            .iter()
            .filter(|(_, e)| *e == Eligibility::Eligible)
            .count();
        for (job, eligibility) in &plan {
            let verdict = match eligibility {
                Eligibility::Eligible => cyan("run "),
                Eligibility::AlreadyProcessed => dim("skip"),
            };
            println!(
                "{}  {:<8} {:<24} {}",
                verdict,
                job.id.as_str(),
                job.display_name(),
                job.source_ref
            );
        }
        eprintln!("{} of {} jobs would run", pending, plan.len());
        return Ok(());
    }

    // ── Batch run ────────────────────────────────────────────────────────
    let orchestrator = JobOrchestrator::from_config(store, sink, config)
        .context("Failed to initialise the PDF engine")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted: finishing in-flight jobs…");
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = cli.deadline_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::warn!("Deadline of {}s reached; no new jobs will start", secs);
            cancel.cancel();
        });
    }

    let summary = orchestrator
        .run(&cancel)
        .await
        .with_context(|| format!("Failed to read worklist {}", worklist.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&summary, show_progress);
    }

    if !summary.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .size_ceiling_bytes(cli.max_bytes)
        .quality(QualitySearch::new(cli.q_max, cli.q_min, cli.max_trials))
        .raster(RasterProfile {
            max_dpi: cli.max_dpi,
            min_dpi: cli.min_dpi,
            max_jpeg_quality: cli.max_jpeg,
            min_jpeg_quality: cli.min_jpeg,
        })
        .start_offset(cli.start_offset)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout)
        .max_fetch_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .render_mode(if cli.rasterize {
            RenderMode::Raster
        } else {
            RenderMode::Vector
        });

    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write `bytes` to `path` via a temp file + rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn print_summary(summary: &RunSummary, bar_shown: bool) {
    // The progress callback already printed per-job lines and a total.
    if !bar_shown {
        eprintln!(
            "{} done, {} skipped, {} failed in {}ms",
            summary.done, summary.skipped, summary.failed, summary.duration_ms
        );
    }
    if summary.cancelled > 0 {
        eprintln!(
            "{} {} jobs not started (cancelled); re-run to resume",
            cyan("⚠"),
            summary.cancelled
        );
    }
    for failure in &summary.failures {
        eprintln!("  {} {}: {}", red("✗"), failure.label, failure.reason);
    }
}
