//! Pipeline stages for turning one source document into a sized A4 PDF.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own; the orchestrator wires them together per job.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ normalize ──▶ compress ⇄ encode
//! (URL/path) (lopdf or   (A4 fit)     (search)   (lopdf+JPEG)
//!             pdfium)                              └─ vector
//! ```
//!
//! 1. [`input`]: resolve a source reference to bytes (HTTP, Drive, file)
//! 2. [`render`]: sniff the format, then keep PDF pages as vectors or
//!    rasterise them; synchronous, run from `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`normalize`]: fit every page onto A4 portrait, rotating landscape
//!    pages when that wastes less space
//! 4. [`compress`]: step the quality level down until the encoding fits
//!    the byte ceiling
//! 5. [`encode`]: write the A4 PDF at a given quality level; [`vector`]
//!    places source pages as Form XObjects and re-encodes their images

pub mod compress;
pub mod encode;
pub mod input;
pub mod normalize;
pub mod render;
pub mod vector;
