//! Configuration types for a batch run.
//!
//! All behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Setters clamp obviously out-of-range values;
//! [`BatchConfigBuilder::build`] rejects combinations that cannot work
//! (e.g. `q_min > q_max`).

use crate::error::BatchError;
use crate::model::PageGeometry;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Bounds of the lossy quality search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySearch {
    /// First (highest-fidelity) quality tried. In (0, 1].
    pub q_max: f32,
    /// Lowest quality the search may reach. In (0, q_max].
    pub q_min: f32,
    /// Hard cap on the number of trial encodings.
    pub max_trials: u32,
}

impl Default for QualitySearch {
    fn default() -> Self {
        Self {
            q_max: 1.0,
            q_min: 0.05,
            max_trials: 8,
        }
    }
}

impl QualitySearch {
    pub fn new(q_max: f32, q_min: f32, max_trials: u32) -> Self {
        Self {
            q_max,
            q_min,
            max_trials,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.q_max > 0.0 && self.q_max <= 1.0) {
            return Err(format!("q_max must be in (0, 1], got {}", self.q_max));
        }
        if !(self.q_min > 0.0 && self.q_min <= self.q_max) {
            return Err(format!(
                "q_min must be in (0, q_max={}], got {}",
                self.q_max, self.q_min
            ));
        }
        if self.max_trials == 0 || self.max_trials > MAX_TRIALS_LIMIT {
            return Err(format!(
                "max_trials must be 1–{MAX_TRIALS_LIMIT}, got {}",
                self.max_trials
            ));
        }
        Ok(())
    }
}

const MAX_TRIALS_LIMIT: u32 = 32;

/// How a quality parameter maps onto raster re-encoding settings.
///
/// `q = 1` means `max_dpi` and `max_jpeg_quality`; quality falls linearly
/// towards `min_dpi` / `min_jpeg_quality` as `q` approaches 0. Source pages
/// are rasterised once at `max_dpi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterProfile {
    pub max_dpi: u32,
    pub min_dpi: u32,
    pub max_jpeg_quality: u8,
    pub min_jpeg_quality: u8,
}

impl Default for RasterProfile {
    fn default() -> Self {
        Self {
            max_dpi: 150,
            min_dpi: 72,
            max_jpeg_quality: 85,
            min_jpeg_quality: 30,
        }
    }
}

impl RasterProfile {
    /// Effective raster resolution at quality `q`.
    pub fn dpi_at(&self, q: f32) -> u32 {
        lerp(self.min_dpi as f32, self.max_dpi as f32, q).round() as u32
    }

    /// JPEG quality (1–100) at quality `q`.
    pub fn jpeg_quality_at(&self, q: f32) -> u8 {
        lerp(
            self.min_jpeg_quality as f32,
            self.max_jpeg_quality as f32,
            q,
        )
        .round()
        .clamp(1.0, 100.0) as u8
    }

    fn validate(&self) -> Result<(), String> {
        if self.min_dpi < 36 || self.max_dpi > 600 || self.min_dpi > self.max_dpi {
            return Err(format!(
                "DPI range must satisfy 36 ≤ min ≤ max ≤ 600, got {}–{}",
                self.min_dpi, self.max_dpi
            ));
        }
        if self.min_jpeg_quality == 0
            || self.max_jpeg_quality > 100
            || self.min_jpeg_quality > self.max_jpeg_quality
        {
            return Err(format!(
                "JPEG quality range must satisfy 1 ≤ min ≤ max ≤ 100, got {}–{}",
                self.min_jpeg_quality, self.max_jpeg_quality
            ));
        }
        Ok(())
    }
}

/// How PDF sources are carried into the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    /// Keep page content as vectors. Only embedded images are re-encoded
    /// for the quality level; PDFs lopdf cannot read are rasterised.
    #[default]
    Vector,
    /// Rasterise every PDF page through pdfium and emit one JPEG per page.
    Raster,
}

fn lerp(lo: f32, hi: f32, t: f32) -> f32 {
    lo + (hi - lo) * t.clamp(0.0, 1.0)
}

/// Configuration for a batch run.
///
/// # Example
/// ```rust
/// use a4squeeze::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .size_ceiling_bytes(512 * 1024)
///     .concurrency(4)
///     .start_offset(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Output page geometry. Always A4 portrait.
    pub target_page: PageGeometry,

    /// Maximum permitted size of a compressed document. Default: 1 MiB.
    pub size_ceiling_bytes: u64,

    /// Quality search bounds. Default: q 1.0 → 0.05 in at most 8 trials.
    pub quality: QualitySearch,

    /// Quality → DPI / JPEG mapping. Default: 150→72 DPI, JPEG 85→30.
    pub raster: RasterProfile,

    /// Rows to skip at the start of the worklist. Default: 0.
    pub start_offset: usize,

    /// Jobs processed at once. Default: 1 (sequential).
    pub concurrency: usize,

    /// Timeout for one source download, in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Extra fetch attempts on transient (unreachable) errors. Default: 2.
    pub max_fetch_retries: u32,

    /// Initial fetch retry delay in milliseconds, doubling per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Vector-preserving or image-only output. Default: [`RenderMode::Vector`].
    pub render_mode: RenderMode,

    /// Explicit libpdfium location (file or directory). Default: system lookup.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional per-job progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            target_page: PageGeometry::A4,
            size_ceiling_bytes: 1_048_576,
            quality: QualitySearch::default(),
            raster: RasterProfile::default(),
            start_offset: 0,
            concurrency: 1,
            download_timeout_secs: 60,
            max_fetch_retries: 2,
            retry_backoff_ms: 500,
            render_mode: RenderMode::Vector,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("target_page", &self.target_page)
            .field("size_ceiling_bytes", &self.size_ceiling_bytes)
            .field("quality", &self.quality)
            .field("raster", &self.raster)
            .field("start_offset", &self.start_offset)
            .field("concurrency", &self.concurrency)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_fetch_retries", &self.max_fetch_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("render_mode", &self.render_mode)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn size_ceiling_bytes(mut self, bytes: u64) -> Self {
        self.config.size_ceiling_bytes = bytes;
        self
    }

    pub fn quality(mut self, search: QualitySearch) -> Self {
        self.config.quality = search;
        self
    }

    pub fn max_trials(mut self, n: u32) -> Self {
        self.config.quality.max_trials = n.clamp(1, MAX_TRIALS_LIMIT);
        self
    }

    pub fn raster(mut self, profile: RasterProfile) -> Self {
        self.config.raster = profile;
        self
    }

    pub fn start_offset(mut self, rows: usize) -> Self {
        self.config.start_offset = rows;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn max_fetch_retries(mut self, n: u32) -> Self {
        self.config.max_fetch_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.config.render_mode = mode;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.size_ceiling_bytes == 0 {
            return Err(BatchError::InvalidConfig(
                "size ceiling must be ≥ 1 byte".into(),
            ));
        }
        c.quality.validate().map_err(BatchError::InvalidConfig)?;
        c.raster.validate().map_err(BatchError::InvalidConfig)?;
        if c.concurrency == 0 {
            return Err(BatchError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = BatchConfig::default();
        assert_eq!(c.size_ceiling_bytes, 1_048_576);
        assert_eq!(c.quality.max_trials, 8);
        assert_eq!(c.raster.max_dpi, 150);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.target_page, PageGeometry::A4);
        assert_eq!(c.render_mode, RenderMode::Vector);
        assert!(BatchConfig::builder().build().is_ok());
    }

    #[test]
    fn builder_rejects_inverted_quality_bounds() {
        let err = BatchConfig::builder()
            .quality(QualitySearch::new(0.3, 0.6, 4))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("q_min"), "got: {err}");
    }

    #[test]
    fn builder_rejects_zero_ceiling_and_bad_q() {
        assert!(BatchConfig::builder().size_ceiling_bytes(0).build().is_err());
        assert!(BatchConfig::builder()
            .quality(QualitySearch::new(1.5, 0.1, 4))
            .build()
            .is_err());
        assert!(BatchConfig::builder()
            .quality(QualitySearch::new(1.0, 0.0, 4))
            .build()
            .is_err());
        assert!(BatchConfig::builder()
            .quality(QualitySearch::new(1.0, 0.1, 0))
            .build()
            .is_err());
    }

    #[test]
    fn builder_rejects_bad_raster_profile() {
        let profile = RasterProfile {
            max_dpi: 72,
            min_dpi: 150,
            ..RasterProfile::default()
        };
        assert!(BatchConfig::builder().raster(profile).build().is_err());
    }

    #[test]
    fn builder_clamps() {
        let c = BatchConfig::builder()
            .concurrency(0)
            .max_trials(1000)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.quality.max_trials, 32);
    }

    #[test]
    fn raster_profile_interpolates() {
        let p = RasterProfile::default();
        assert_eq!(p.dpi_at(1.0), 150);
        assert_eq!(p.dpi_at(0.0), 72);
        assert_eq!(p.dpi_at(0.5), 111);
        assert_eq!(p.jpeg_quality_at(1.0), 85);
        assert_eq!(p.jpeg_quality_at(0.0), 30);
        assert!(p.jpeg_quality_at(0.5) > 30 && p.jpeg_quality_at(0.5) < 85);
        // Monotone in q.
        assert!(p.dpi_at(0.3) <= p.dpi_at(0.6));
    }
}
