//! # a4squeeze
//!
//! Normalise documents to A4 portrait and compress them under a byte
//! ceiling, driven by an idempotent worklist of rows.
//!
//! Each row names a source document (URL, Google Drive share link or local
//! path). The orchestrator fetches it, maps every page onto an A4 page
//! without clipping, re-encodes it at decreasing quality until the PDF fits
//! the size budget, uploads the result and records a reference to it on the
//! row. Rows that already carry a reference are skipped, so re-running a
//! worklist only does the missing work.
//!
//! ## Pipeline Overview
//!
//! ```text
//! row
//!  │
//!  ├─ 1. Skip?      result reference present → Skipped
//!  ├─ 2. Fetch      HTTP / Drive / file, retry on transient errors
//!  ├─ 3. Decode     lopdf vector pages, pdfium rasters, or PNG/JPEG
//!  ├─ 4. Normalise  scale-to-fit + centre on A4, rotate landscape pages
//!  ├─ 5. Compress   q = 1.0 → 0.05 until size ≤ ceiling (spawn_blocking)
//!  ├─ 6. Upload     ResultSink → stable reference
//!  └─ 7. Write back result reference + status, atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a4squeeze::{BatchConfig, DirectorySink, JobOrchestrator, JsonRowStore};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .size_ceiling_bytes(1_048_576)
//!         .concurrency(2)
//!         .build()?;
//!     let store = Arc::new(JsonRowStore::new("invoices.json"));
//!     let sink = Arc::new(DirectorySink::new("out"));
//!     let orchestrator = JobOrchestrator::from_config(store, sink, config)?;
//!
//!     let summary = orchestrator.run(&CancellationToken::new()).await?;
//!     eprintln!("{} done, {} skipped, {} failed",
//!         summary.done, summary.skipped, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `a4squeeze` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! a4squeeze = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BatchConfig, BatchConfigBuilder, QualitySearch, RasterProfile, RenderMode};
pub use error::{BatchError, CompressionError, FetchError, JobError, NormalizeError, StoreError};
pub use job::{Eligibility, Job, JobEvent, JobId, JobState};
pub use model::{
    Document, Orientation, Page, PageContent, PageGeometry, PageSource, Placement, VectorPage,
};
pub use orchestrator::{press_document, JobOrchestrator};
pub use output::{
    CompressionAttempt, CompressionReport, FailureReport, JobOutcome, PressedDocument, RunSummary,
};
pub use pipeline::compress::SizeBudgetCompressor;
pub use pipeline::input::{DocumentFetcher, HttpFetcher};
pub use pipeline::normalize::PageNormalizer;
pub use pipeline::render::{DocumentDecoder, SourceDecoder};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{DirectorySink, JsonRowStore, MemoryRowStore, MemorySink, ResultSink, RowStore};
pub use stream::OutcomeStream;
