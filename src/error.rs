//! Error types for the a4squeeze library.
//!
//! Two tiers of failure exist, mirroring the two scopes of work:
//!
//! * [`JobError`] is **per-job**: one document could not be fetched,
//!   normalised, compressed, uploaded or written back. The orchestrator
//!   catches it, records its Display text as the row's status and moves on
//!   to the next row. It never aborts a batch.
//!
//! * [`BatchError`] is **fatal**: the orchestration substrate itself is
//!   unusable (row store unreachable at startup, invalid configuration,
//!   pdfium not loadable). Returned before any job is attempted.
//!
//! Stage errors ([`FetchError`], [`NormalizeError`], [`CompressionError`],
//! [`StoreError`]) convert into [`JobError`] with `?`.

use std::path::PathBuf;
use thiserror::Error;

/// Retrieval or decoding of a source document failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The transport could not reach the source (DNS, connect, timeout, 5xx).
    #[error("source '{source_ref}' is unreachable: {reason}")]
    Unreachable { source_ref: String, reason: String },

    /// The transport answered, but the document does not exist there.
    #[error("source '{source_ref}' was not found")]
    NotFound { source_ref: String },

    /// The bytes looked like a supported format but could not be decoded.
    #[error("document could not be decoded: {reason}")]
    DecodeFailure { reason: String },

    /// The bytes are not a PDF, PNG or JPEG.
    #[error("unsupported document format (first bytes: {magic:?})")]
    UnsupportedFormat { magic: Vec<u8> },
}

impl FetchError {
    /// Whether retrying the same fetch might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Unreachable { .. })
    }
}

/// A page could not be mapped onto the target geometry.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("page {page_index} could not be normalised: {reason}")]
pub struct NormalizeError {
    /// 0-based index of the offending page.
    pub page_index: usize,
    pub reason: String,
}

/// The size-budget search failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompressionError {
    /// Even the lowest permitted quality still exceeds the ceiling.
    #[error(
        "budget unreachable: best encoding is {best_size} bytes after {trials} trials, ceiling is {ceiling_bytes} bytes"
    )]
    BudgetUnreachable {
        best_size: u64,
        ceiling_bytes: u64,
        trials: usize,
    },

    /// The encoder itself failed at a given quality level.
    #[error("encoding failed at q={quality:.2}: {reason}")]
    EncodeFailed { quality: f32, reason: String },
}

/// Failure reported by a [`crate::store::RowStore`] or
/// [`crate::store::ResultSink`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem or network I/O failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored rows could not be (de)serialised.
    #[error("row data is malformed: {0}")]
    Malformed(String),

    /// A write-back referenced a row the store does not know.
    #[error("unknown job id '{id}'")]
    UnknownJob { id: String },

    /// The backing service refused or could not serve the request.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Any failure of a single job's pipeline.
///
/// The Display text of this type is what lands in the row's status field.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("normalise failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("compress failed: {0}")]
    Compress(#[from] CompressionError),

    #[error("upload failed: {0}")]
    Upload(#[source] StoreError),

    #[error("write-back failed: {0}")]
    WriteBack(#[source] StoreError),

    /// A blocking stage panicked or was aborted.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Fatal errors that stop a run before (or instead of) processing jobs.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The row store could not list jobs.
    #[error("row store is unavailable: {0}")]
    RowStoreUnavailable(#[source] StoreError),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH (or --pdfium-lib) to the directory or file of an existing libpdfium,\n\
or install libpdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
