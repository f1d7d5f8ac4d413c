//! Batch orchestration: drive every job of a worklist through the pipeline.
//!
//! For each job, in worklist order:
//!
//! 1. already has a result reference → `Skipped`, no stage is invoked;
//! 2. otherwise fetch (retrying transient failures), normalise + compress on
//!    a blocking thread, upload, and write the result back → `Done`;
//! 3. any stage error → `Failed`, with `ERROR: <cause>` written back as the
//!    row's status. The batch always moves on to the next job.
//!
//! Jobs run with bounded parallelism (`concurrency`). Cancellation is
//! cooperative: in-flight jobs finish, jobs not yet started are reported as
//! cancelled and left untouched in the row store.

use crate::config::{BatchConfig, RenderMode};
use crate::error::{BatchError, FetchError, JobError};
use crate::job::{Eligibility, Job, JobEvent, JobState};
use crate::model::Document;
use crate::output::{CompressionReport, JobOutcome, PressedDocument, RunSummary};
use crate::pipeline::compress::SizeBudgetCompressor;
use crate::pipeline::input::{DocumentFetcher, HttpFetcher};
use crate::pipeline::normalize::PageNormalizer;
use crate::pipeline::render::bind_pdfium;
use crate::store::{ResultSink, RowStore};
use futures::stream::{self, Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest status text written back to a row, in characters.
pub const MAX_STATUS_CHARS: usize = 250;

/// Runs jobs from a [`RowStore`] and publishes results to a [`ResultSink`].
#[derive(Clone)]
pub struct JobOrchestrator {
    fetcher: Arc<dyn DocumentFetcher>,
    store: Arc<dyn RowStore>,
    sink: Arc<dyn ResultSink>,
    normalizer: PageNormalizer,
    compressor: Arc<SizeBudgetCompressor>,
    config: BatchConfig,
}

impl JobOrchestrator {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        store: Arc<dyn RowStore>,
        sink: Arc<dyn ResultSink>,
        config: BatchConfig,
    ) -> Self {
        let compressor = SizeBudgetCompressor::new(config.quality, config.raster);
        Self {
            fetcher,
            store,
            sink,
            normalizer: PageNormalizer::new(config.target_page),
            compressor: Arc::new(compressor),
            config,
        }
    }

    /// Orchestrator with the standard HTTP/file fetcher and source decoder.
    ///
    /// In [`RenderMode::Raster`] this fails up front with
    /// [`BatchError::PdfiumBindingFailed`] when no pdfium library can be
    /// loaded, so a broken installation never turns into one failed row per
    /// job. Vector mode only needs pdfium for PDFs lopdf cannot read.
    pub fn from_config(
        store: Arc<dyn RowStore>,
        sink: Arc<dyn ResultSink>,
        config: BatchConfig,
    ) -> Result<Self, BatchError> {
        if config.render_mode == RenderMode::Raster {
            bind_pdfium(config.pdfium_lib_path.as_deref())?;
        }
        let fetcher = HttpFetcher::standard(&config)
            .map_err(|e| BatchError::Internal(e.to_string()))?;
        Ok(Self::new(Arc::new(fetcher), store, sink, config))
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// List the jobs a run would consider, honouring `start_offset`.
    pub async fn plan(&self) -> Result<Vec<(Job, Eligibility)>, BatchError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|job| {
                let eligibility = job.eligibility();
                (job, eligibility)
            })
            .collect())
    }

    /// List jobs from the row store and run them all.
    ///
    /// # Errors
    /// Only [`BatchError::RowStoreUnavailable`]: the worklist could not be
    /// read, so no job was attempted. Per-job failures are reported in the
    /// returned [`RunSummary`].
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, BatchError> {
        let jobs = self.list().await?;
        Ok(self.run_batch(jobs, cancel).await)
    }

    /// Run an explicit list of jobs. Every job appears exactly once in the
    /// summary, in the order given.
    pub async fn run_batch(&self, jobs: Vec<Job>, cancel: &CancellationToken) -> RunSummary {
        let start = Instant::now();
        let total = jobs.len();
        info!(
            "Starting batch: {} jobs, concurrency {}",
            total, self.config.concurrency
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut indexed: Vec<(usize, JobOutcome)> = self
            .indexed_outcomes(jobs, cancel.clone())
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);
        let outcomes = indexed.into_iter().map(|(_, o)| o).collect();

        let summary = RunSummary::from_outcomes(outcomes, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {} done, {} skipped, {} failed, {} cancelled in {}ms",
            summary.done, summary.skipped, summary.failed, summary.cancelled, summary.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(summary.done, summary.skipped, summary.failed);
        }
        summary
    }

    /// Outcomes tagged with their worklist index, in completion order.
    pub(crate) fn indexed_outcomes(
        &self,
        jobs: Vec<Job>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = (usize, JobOutcome)> + Send + 'static {
        let this = self.clone();
        let concurrency = self.config.concurrency.max(1);
        stream::iter(jobs.into_iter().enumerate())
            .map(move |(idx, job)| {
                let this = this.clone();
                let cancel = cancel.clone();
                async move { (idx, this.process_job(job, &cancel).await) }
            })
            .buffer_unordered(concurrency)
    }

    async fn list(&self) -> Result<Vec<Job>, BatchError> {
        let jobs = self
            .store
            .list_jobs()
            .await
            .map_err(BatchError::RowStoreUnavailable)?;
        let offset = self.config.start_offset;
        if offset > 0 {
            debug!("Skipping the first {} of {} jobs", offset.min(jobs.len()), jobs.len());
        }
        Ok(jobs.into_iter().skip(offset).collect())
    }

    /// Drive one job to a terminal state (or report it cancelled).
    async fn process_job(&self, job: Job, cancel: &CancellationToken) -> JobOutcome {
        let start = Instant::now();
        let name = job.display_name().to_string();
        let mut state = JobState::Pending;

        let outcome = |state: JobState, result_ref: Option<String>, status: String| JobOutcome {
            job_id: job.id.clone(),
            label: name.clone(),
            state,
            cancelled: false,
            result_ref,
            status,
            compression: None,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if job.eligibility() == Eligibility::AlreadyProcessed {
            state = advance(state, JobEvent::AlreadyProcessed);
            info!("{}: already processed, skipping", name);
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_job_skipped(&name);
            }
            return outcome(
                state,
                Some(job.result_ref.clone()),
                "already processed".into(),
            );
        }

        if cancel.is_cancelled() {
            debug!("{}: not started, batch cancelled", name);
            return JobOutcome {
                cancelled: true,
                ..outcome(state, None, "cancelled before start".into())
            };
        }

        state = advance(state, JobEvent::Started);
        info!("{}: processing {}", name, job.source_ref);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_start(&name);
        }

        match self.execute(&job).await {
            Ok((result_ref, report)) => {
                state = advance(state, JobEvent::Completed);
                info!(
                    "{}: done, {} bytes → {}",
                    name, report.final_size_bytes, result_ref
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_job_complete(&name, &result_ref, report.final_size_bytes);
                }
                let status = report.status_line();
                JobOutcome {
                    compression: Some(report),
                    ..outcome(state, Some(result_ref), status)
                }
            }
            Err(err) => {
                state = advance(state, JobEvent::Errored);
                let status = failure_status(&err);
                warn!("{}: {}", name, status);
                if let Err(write_err) = self.store.write_result(&job.id, "", &status).await {
                    warn!("{}: could not record failure status: {}", name, write_err);
                }
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_job_error(&name, &status);
                }
                outcome(state, None, status)
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<(String, CompressionReport), JobError> {
        let document = fetch_with_retry(self.fetcher.as_ref(), &job.source_ref, &self.config)
            .await?;
        let pressed = normalize_and_compress(
            self.normalizer,
            Arc::clone(&self.compressor),
            document,
            self.config.size_ceiling_bytes,
        )
        .await?;

        let file_name = suggested_name(&job.label, &job.source_ref);
        let result_ref = self
            .sink
            .upload(pressed.bytes, &file_name)
            .await
            .map_err(JobError::Upload)?;

        let status = pressed.report.status_line();
        self.store
            .write_result(&job.id, &result_ref, &status)
            .await
            .map_err(JobError::WriteBack)?;
        Ok((result_ref, pressed.report))
    }
}

/// Fetch, normalise and compress a single document without a row store.
///
/// # Example
/// ```rust,no_run
/// use a4squeeze::{press_document, BatchConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = BatchConfig::default();
/// let pressed = press_document("https://example.org/scan.pdf", &config).await?;
/// std::fs::write("scan-a4.pdf", &pressed.bytes)?;
/// println!("{}", pressed.report.status_line());
/// # Ok(())
/// # }
/// ```
pub async fn press_document(
    source_ref: &str,
    config: &BatchConfig,
) -> Result<PressedDocument, JobError> {
    let fetcher = HttpFetcher::standard(config)?;
    let document = fetch_with_retry(&fetcher, source_ref, config).await?;
    let compressor = SizeBudgetCompressor::new(config.quality, config.raster);
    normalize_and_compress(
        PageNormalizer::new(config.target_page),
        Arc::new(compressor),
        document,
        config.size_ceiling_bytes,
    )
    .await
}

/// Fetch with exponential backoff. Only `Unreachable` errors are retried.
async fn fetch_with_retry(
    fetcher: &dyn DocumentFetcher,
    source_ref: &str,
    config: &BatchConfig,
) -> Result<Document, FetchError> {
    let mut last_err: Option<FetchError> = None;

    for attempt in 0..=config.max_fetch_retries {
        if attempt > 0 {
            let backoff = backoff_delay(config.retry_backoff_ms, attempt);
            warn!(
                "{}: fetch retry {}/{} after {}ms",
                source_ref, attempt, config.max_fetch_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match fetcher.fetch(source_ref).await {
            Ok(document) => {
                debug!("{}: fetched {} pages", source_ref, document.page_count());
                return Ok(document);
            }
            Err(e) if e.is_transient() => {
                warn!("{}: attempt {} failed: {}", source_ref, attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| FetchError::Unreachable {
        source_ref: source_ref.to_string(),
        reason: "no fetch attempt was made".into(),
    }))
}

/// Delay before retry `attempt` (1-based): `base_ms · 2^(attempt-1)`,
/// saturating at `u64::MAX`.
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Normalise and compress on a blocking thread: both are CPU-bound.
async fn normalize_and_compress(
    normalizer: PageNormalizer,
    compressor: Arc<SizeBudgetCompressor>,
    document: Document,
    ceiling_bytes: u64,
) -> Result<PressedDocument, JobError> {
    tokio::task::spawn_blocking(move || -> Result<PressedDocument, JobError> {
        let normalized = normalizer.normalize(document)?;
        Ok(compressor.compress(&normalized, ceiling_bytes)?)
    })
    .await
    .map_err(|e| JobError::Internal(format!("compression task failed: {e}")))?
}

fn advance(state: JobState, event: JobEvent) -> JobState {
    match state.on(event) {
        Some(next) => next,
        None => {
            warn!("ignoring {:?} in state {}", event, state);
            state
        }
    }
}

/// Status text for a failed job: `ERROR: <cause>`, at most
/// [`MAX_STATUS_CHARS`] characters.
pub fn failure_status(err: &JobError) -> String {
    format!("ERROR: {err}")
        .chars()
        .take(MAX_STATUS_CHARS)
        .collect()
}

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

/// File name for an uploaded result.
///
/// The sanitised label, else the source's base name, else `pdf_<unix
/// seconds>`; always ending in `.pdf`.
pub fn suggested_name(label: &str, source_ref: &str) -> String {
    let sanitize = |s: &str| UNSAFE_NAME_CHARS.replace_all(s.trim(), "_").into_owned();

    let mut name = sanitize(label);
    if name.is_empty() {
        name = source_basename(source_ref).map(|s| sanitize(&s)).unwrap_or_default();
    }
    if name.is_empty() {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        name = format!("pdf_{secs}");
    }
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    name
}

/// Last path segment of a URL or path, without its extension.
fn source_basename(source_ref: &str) -> Option<String> {
    let source_ref = source_ref.trim();
    let segment = match reqwest::Url::parse(source_ref) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .map(str::to_string),
        Err(_) => Path::new(source_ref)
            .file_name()
            .map(|n| n.to_string_lossy().to_string()),
    }?;
    let stem = Path::new(&segment).file_stem()?.to_string_lossy().to_string();
    (!stem.is_empty()).then_some(stem)
}
