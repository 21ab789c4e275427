//! # contract: the conversion seam
//!
//! This module defines the single trait ([`Converter`]) through which the
//! queue runner turns one decoded source into its opposite format, plus the
//! request and error types that cross that seam.
//!
//! ## Interface & Extensibility
//! - [`crate::engine::Engine`] is the production implementation (resvg for
//!   SVG→PNG, embedding for PNG→SVG).
//! - All methods are async; CPU-bound work is expected to move off the
//!   runtime threads inside the implementation.
//! - Failures are reported as [`ConversionError`], never as panics. The
//!   runner records them on the item and keeps going.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`, so consumers can script per-item
//!   success and failure in queue tests (`MockConverter`).

use async_trait::async_trait;
use bytes::Bytes;
use mockall::automock;
use thiserror::Error;

use crate::item::{ConvertedOutput, Format};

/// Everything the engine needs to convert one item. Owned so it can be
/// moved onto a blocking worker.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: Bytes,
    pub source_format: Format,
    pub width: u32,
    pub height: u32,
}

/// Per-item conversion failure. Recorded on the item, never propagated out
/// of a batch.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("malformed {format:?} source: {reason}")]
    MalformedSource { format: Format, reason: String },

    #[error("source decodes to {actual_width}x{actual_height}, expected {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("could not allocate a {width}x{height} render surface")]
    SurfaceAllocation { width: u32, height: u32 },

    #[error("embedded resource could not be loaded: {0}")]
    UnresolvedResource(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("conversion worker failed: {0}")]
    Task(String),
}

/// Turns one decoded image into its opposite format.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `request.source` (of `request.source_format`) into
    /// `request.source_format.opposite()` at exactly `width`×`height`.
    async fn convert(&self, request: ConversionRequest)
        -> Result<ConvertedOutput, ConversionError>;
}
