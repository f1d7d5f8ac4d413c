//! Size-budget compression: find a quality level whose encoding fits.
//!
//! The search itself ([`search`]) is a pure function over an arbitrary
//! `encode(q) -> bytes` closure, so its contract can be tested with a
//! synthetic encoder. [`SizeBudgetCompressor`] plugs the real
//! [`PdfEncoder`] into it.
//!
//! ## Schedule
//!
//! Linear step-down from `q_max` to `q_min` over at most `max_trials`
//! encodings. The first trial is always `q_max`, the last is exactly
//! `q_min`, and the first encoding at or under the ceiling wins. The
//! search never looks for the tightest fit; it stops at the first one.
//! Termination does not depend on `size(q)` being monotone: the step cap
//! alone bounds the work.

use crate::config::{QualitySearch, RasterProfile};
use crate::error::CompressionError;
use crate::model::Document;
use crate::output::{CompressionAttempt, CompressionReport, PressedDocument};
use crate::pipeline::encode::PdfEncoder;
use tracing::{debug, info};

/// A successful search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub bytes: Vec<u8>,
    pub quality: f32,
    pub attempts: Vec<CompressionAttempt>,
}

impl SearchOutcome {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Quality levels tried, in order.
pub fn quality_schedule(params: &QualitySearch) -> Vec<f32> {
    let trials = params.max_trials.max(1) as usize;
    let span = params.q_max - params.q_min;
    if trials == 1 || span <= f32::EPSILON {
        return vec![params.q_max];
    }
    let step = span / (trials - 1) as f32;
    (0..trials)
        .map(|i| {
            if i == trials - 1 {
                params.q_min
            } else {
                params.q_max - step * i as f32
            }
        })
        .collect()
}

/// Search for an encoding no larger than `ceiling_bytes`.
///
/// Calls `encode` once per scheduled quality level and returns the first
/// result that fits. If none does, fails with
/// [`CompressionError::BudgetUnreachable`] carrying the smallest size seen.
/// An encoder error aborts the search immediately.
pub fn search<F>(
    params: &QualitySearch,
    ceiling_bytes: u64,
    mut encode: F,
) -> Result<SearchOutcome, CompressionError>
where
    F: FnMut(f32) -> Result<Vec<u8>, CompressionError>,
{
    let schedule = quality_schedule(params);
    let mut attempts = Vec::with_capacity(schedule.len());

    for quality in schedule {
        let bytes = encode(quality)?;
        let size_bytes = bytes.len() as u64;
        attempts.push(CompressionAttempt {
            quality,
            size_bytes,
        });
        debug!(
            "Trial {}: q={:.3} → {} bytes (ceiling {})",
            attempts.len(),
            quality,
            size_bytes,
            ceiling_bytes
        );
        if size_bytes <= ceiling_bytes {
            return Ok(SearchOutcome {
                bytes,
                quality,
                attempts,
            });
        }
    }

    let best_size = attempts
        .iter()
        .map(|a| a.size_bytes)
        .min()
        .unwrap_or(u64::MAX);
    Err(CompressionError::BudgetUnreachable {
        best_size,
        ceiling_bytes,
        trials: attempts.len(),
    })
}

/// Compresses normalised documents under a byte ceiling.
#[derive(Debug, Clone)]
pub struct SizeBudgetCompressor {
    params: QualitySearch,
    encoder: PdfEncoder,
}

impl SizeBudgetCompressor {
    pub fn new(params: QualitySearch, profile: RasterProfile) -> Self {
        Self {
            params,
            encoder: PdfEncoder::new(profile),
        }
    }

    /// Encode `document` at the highest quality that the schedule reaches
    /// within `ceiling_bytes`. The input is not modified.
    ///
    /// CPU-bound: call from `spawn_blocking` in async contexts.
    pub fn compress(
        &self,
        document: &Document,
        ceiling_bytes: u64,
    ) -> Result<PressedDocument, CompressionError> {
        let outcome = search(&self.params, ceiling_bytes, |q| {
            self.encoder.encode(document, q)
        })?;
        let profile = self.encoder.profile();
        let report = CompressionReport {
            quality: outcome.quality,
            dpi: profile.dpi_at(outcome.quality),
            jpeg_quality: profile.jpeg_quality_at(outcome.quality),
            final_size_bytes: outcome.size_bytes(),
            attempts: outcome.attempts,
        };
        info!(
            "Compressed {} pages to {} bytes in {} trials (q={:.2})",
            document.page_count(),
            report.final_size_bytes,
            report.attempts.len(),
            report.quality
        );
        Ok(PressedDocument {
            bytes: outcome.bytes,
            page_count: document.page_count(),
            report,
        })
    }
}
