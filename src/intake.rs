//! Intake: validate raw input files and turn them into queued items.
//!
//! Each candidate is handled independently and concurrently. A file is
//! accepted only if its declared media type is one of the two supported
//! kinds and its bytes decode as that kind within the configured timeout.
//! Nothing is converted here; accepted items leave as `Queued`.

use bytes::Bytes;
use futures::future::join_all;
use image::ImageFormat;
use resvg::usvg;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::IntakeConfig;
use crate::item::{ConversionItem, Format};

/// A candidate file as handed over by the shell: a name, the media type it
/// was declared with, and its raw content.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl RawFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("invalid file format.")]
    InvalidFormat,
    #[error("cannot read image dimensions.")]
    UnreadableDimensions,
    #[error("failed to read file.")]
    Unreadable,
}

/// Why one file was not accepted. Displays as `<file name>: <reason>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file_name}: {reason}")]
pub struct Rejection {
    pub file_name: String,
    pub reason: IntakeError,
}

impl Rejection {
    pub fn new(file_name: impl Into<String>, reason: IntakeError) -> Self {
        Self {
            file_name: file_name.into(),
            reason,
        }
    }
}

/// The full partition of one intake call. Accepted items keep input order.
#[derive(Debug, Default)]
pub struct IntakeOutcome {
    pub accepted: Vec<ConversionItem>,
    pub rejected: Vec<Rejection>,
}

/// Validate every candidate concurrently and partition the results.
pub async fn intake(files: Vec<RawFile>, config: &IntakeConfig) -> IntakeOutcome {
    let timeout = config.decode_timeout();
    info!(files = files.len(), "[INTAKE] Validating candidate files");

    let results = join_all(files.into_iter().map(|file| admit(file, timeout))).await;

    let mut outcome = IntakeOutcome::default();
    for result in results {
        match result {
            Ok(item) => outcome.accepted.push(item),
            Err(rejection) => outcome.rejected.push(rejection),
        }
    }
    info!(
        accepted = outcome.accepted.len(),
        rejected = outcome.rejected.len(),
        "[INTAKE] Intake complete"
    );
    outcome
}

async fn admit(file: RawFile, timeout: Duration) -> Result<ConversionItem, Rejection> {
    let Some(format) = Format::from_media_type(&file.media_type) else {
        warn!(file = %file.name, media_type = %file.media_type, "[INTAKE] Unsupported media type");
        return Err(Rejection::new(file.name, IntakeError::InvalidFormat));
    };

    let bytes = file.bytes.clone();
    let decode = tokio::task::spawn_blocking(move || read_dimensions(&bytes, format));
    let (width, height) = match tokio::time::timeout(timeout, decode).await {
        Ok(Ok(Ok(dimensions))) => dimensions,
        Ok(Ok(Err(reason))) => {
            warn!(file = %file.name, ?format, %reason, "[INTAKE] Image failed to decode");
            return Err(Rejection::new(file.name, IntakeError::UnreadableDimensions));
        }
        Ok(Err(e)) => {
            warn!(file = %file.name, error = ?e, "[INTAKE] Decode worker failed");
            return Err(Rejection::new(file.name, IntakeError::UnreadableDimensions));
        }
        Err(_) => {
            warn!(file = %file.name, ?timeout, "[INTAKE] Decode timed out");
            return Err(Rejection::new(file.name, IntakeError::UnreadableDimensions));
        }
    };

    debug!(file = %file.name, ?format, width, height, "[INTAKE] Accepted file");
    Ok(ConversionItem::queued(file.name, file.bytes, format, width, height))
}

/// Decode `bytes` as `format` and return its intrinsic pixel size.
///
/// PNG is fully decoded; SVG is parsed and its document size rounded up to
/// whole pixels.
pub fn read_dimensions(bytes: &[u8], format: Format) -> Result<(u32, u32), String> {
    let (width, height) = match format {
        Format::Png => {
            let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
                .map_err(|e| e.to_string())?;
            (img.width(), img.height())
        }
        Format::Svg => {
            let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
                .map_err(|e| e.to_string())?;
            let size = tree.size().to_int_size();
            (size.width(), size.height())
        }
    };
    if width == 0 || height == 0 {
        return Err(format!("zero-sized image {width}x{height}"));
    }
    Ok((width, height))
}
