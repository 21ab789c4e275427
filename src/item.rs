//! Data model for one tracked conversion: the source file, its decoded
//! dimensions, and the lifecycle status that ends in an output or an error.

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

/// The two image kinds the system accepts. The declared media type of an
/// input decides the variant; content is never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Format {
    Svg,
    Png,
}

impl Format {
    pub const SVG_MEDIA_TYPE: &'static str = "image/svg+xml";
    pub const PNG_MEDIA_TYPE: &'static str = "image/png";

    /// Exact match on the declared media type. Parameters or casing
    /// variants are not accepted.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            Self::SVG_MEDIA_TYPE => Some(Format::Svg),
            Self::PNG_MEDIA_TYPE => Some(Format::Png),
            _ => None,
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Format::Svg => Self::SVG_MEDIA_TYPE,
            Format::Png => Self::PNG_MEDIA_TYPE,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Svg => "svg",
            Format::Png => "png",
        }
    }

    /// The conversion target for a source of this format.
    pub fn opposite(self) -> Self {
        match self {
            Format::Svg => Format::Png,
            Format::Png => Format::Svg,
        }
    }
}

/// Encoded result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedOutput {
    pub format: Format,
    pub bytes: Bytes,
}

/// Lifecycle of an item. The output only exists on `Converted` and the
/// message only on `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Queued,
    Converting,
    Converted(ConvertedOutput),
    Failed(String),
}

impl ItemStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            ItemStatus::Queued => StatusKind::Queued,
            ItemStatus::Converting => StatusKind::Converting,
            ItemStatus::Converted(_) => StatusKind::Converted,
            ItemStatus::Failed(_) => StatusKind::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Converted(_) | ItemStatus::Failed(_))
    }
}

/// Payload-free view of [`ItemStatus`], for counting and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusKind {
    Queued,
    Converting,
    Converted,
    Error,
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StatusKind::Queued => "QUEUED",
            StatusKind::Converting => "CONVERTING",
            StatusKind::Converted => "CONVERTED",
            StatusKind::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// One accepted input file and its conversion state.
///
/// Everything except `status` is frozen at intake. Status changes go through
/// [`crate::session::SessionStore::apply`].
#[derive(Debug, Clone)]
pub struct ConversionItem {
    pub(crate) id: Uuid,
    pub(crate) file_name: String,
    pub(crate) source: Bytes,
    pub(crate) source_format: Format,
    pub(crate) target_format: Format,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) status: ItemStatus,
}

impl ConversionItem {
    pub(crate) fn queued(
        file_name: String,
        source: Bytes,
        source_format: Format,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            source,
            source_format,
            target_format: source_format.opposite(),
            width,
            height,
            status: ItemStatus::Queued,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> &Bytes {
        &self.source
    }

    pub fn source_format(&self) -> Format {
        self.source_format
    }

    pub fn target_format(&self) -> Format {
        self.target_format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    pub fn output_preview(&self) -> Option<&ConvertedOutput> {
        match &self.status {
            ItemStatus::Converted(output) => Some(output),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// `<basename>-converted.<ext>`, used both for single downloads and
    /// archive entries.
    pub fn download_name(&self) -> String {
        download_name(&self.file_name, self.target_format)
    }
}

/// Derives the download name for `file_name` converted to `target`.
///
/// The basename is everything before the last `.`; a name with no `.`
/// yields an empty basename.
pub fn download_name(file_name: &str, target: Format) -> String {
    let basename = match file_name.rfind('.') {
        Some(idx) => &file_name[..idx],
        None => "",
    };
    format!("{basename}-converted.{}", target.extension())
}
