//! Conversion engine: SVG→PNG rasterization and PNG→SVG embedding.
//!
//! The two free functions are pure: bytes and dimensions in, encoded bytes
//! out. [`Engine`] wraps them behind [`Converter`] and moves the work onto
//! tokio's blocking pool, since both directions are CPU-bound.
//!
//! PNG→SVG does not trace edges. The raster is embedded as a base64 data
//! URI inside an SVG whose viewport equals the pixel size.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use image::ImageFormat;
use parking_lot::Mutex;
use resvg::usvg::fontdb;
use resvg::{tiny_skia, usvg};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::contract::{ConversionError, ConversionRequest, Converter};
use crate::item::{ConvertedOutput, Format};

/// Fonts and lookup roots shared by every SVG render of a session.
#[derive(Clone)]
pub struct RenderResources {
    fontdb: Arc<fontdb::Database>,
    resources_dir: Option<PathBuf>,
    font_family: Option<String>,
    max_pixels: u64,
}

impl RenderResources {
    pub fn new(config: &RenderConfig) -> Self {
        let mut db = fontdb::Database::new();
        if config.load_system_fonts {
            db.load_system_fonts();
        }
        info!(fonts = db.len(), "[ENGINE] Font database ready");
        Self {
            fontdb: Arc::new(db),
            resources_dir: config.resources_dir.clone(),
            font_family: config.font_family.clone(),
            max_pixels: config.max_pixels,
        }
    }

    /// Parser options whose image and font resolvers record every lookup
    /// that comes back empty into `misses`.
    fn options(&self, misses: Arc<Mutex<Vec<String>>>) -> usvg::Options<'static> {
        let mut options = usvg::Options::default();
        options.resources_dir = self.resources_dir.clone();
        options.fontdb = Arc::clone(&self.fontdb);
        if let Some(family) = &self.font_family {
            options.font_family = family.clone();
        }

        let data_misses = Arc::clone(&misses);
        let string_misses = Arc::clone(&misses);
        let font_misses = misses;
        let resolve_data = usvg::ImageHrefResolver::default_data_resolver();
        let resolve_string = usvg::ImageHrefResolver::default_string_resolver();
        let select_font = usvg::FontResolver::default_font_selector();

        options.image_href_resolver = usvg::ImageHrefResolver {
            resolve_data: Box::new(
                move |mime: &str, data: Arc<Vec<u8>>, opts: &usvg::Options| {
                    let resolved = resolve_data(mime, data, opts);
                    if resolved.is_none() {
                        data_misses.lock().push(format!("embedded {mime} image"));
                    }
                    resolved
                },
            ),
            resolve_string: Box::new(move |href: &str, opts: &usvg::Options| {
                let resolved = resolve_string(href, opts);
                if resolved.is_none() {
                    string_misses.lock().push(format!("image '{href}'"));
                }
                resolved
            }),
        };
        options.font_resolver.select_font = Box::new(
            move |font: &usvg::Font, db: &mut Arc<fontdb::Database>| {
                let selected = select_font(font, db);
                if selected.is_none() {
                    font_misses.lock().push("font for a text element".to_string());
                }
                selected
            },
        );
        options
    }
}

/// Render `svg` onto a `width`×`height` surface and encode it as PNG.
///
/// The document is scaled to fill the surface exactly. Alpha is kept; areas
/// the document leaves unpainted stay transparent.
pub fn vector_to_raster(
    svg: &[u8],
    width: u32,
    height: u32,
    resources: &RenderResources,
) -> Result<Vec<u8>, ConversionError> {
    check_dimensions(width, height)?;
    let mut pixmap = allocate_surface(width, height, resources.max_pixels)?;

    let misses = Arc::new(Mutex::new(Vec::new()));
    let options = resources.options(Arc::clone(&misses));
    let tree = usvg::Tree::from_data(svg, &options).map_err(|e| {
        ConversionError::MalformedSource {
            format: Format::Svg,
            reason: e.to_string(),
        }
    })?;

    let missing = std::mem::take(&mut *misses.lock());
    if !missing.is_empty() {
        warn!(?missing, "[ENGINE] SVG references resources that did not load");
        return Err(ConversionError::UnresolvedResource(missing.join(", ")));
    }

    let size = tree.size();
    if !(size.width() > 0.0 && size.height() > 0.0) {
        return Err(ConversionError::Render(format!(
            "document has empty size {}x{}",
            size.width(),
            size.height()
        )));
    }

    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let png = pixmap
        .encode_png()
        .map_err(|e| ConversionError::Encode(e.to_string()))?;
    debug!(width, height, bytes = png.len(), "[ENGINE] Rasterized SVG");
    Ok(png)
}

/// Wrap `png` in an SVG document whose viewport is `width`×`height`.
///
/// The PNG must decode to exactly those dimensions; the embedded payload is
/// the original byte stream, unchanged.
pub fn raster_to_vector(png: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConversionError> {
    check_dimensions(width, height)?;

    let decoded = image::load_from_memory_with_format(png, ImageFormat::Png).map_err(|e| {
        ConversionError::MalformedSource {
            format: Format::Png,
            reason: e.to_string(),
        }
    })?;
    if decoded.width() != width || decoded.height() != height {
        return Err(ConversionError::DimensionMismatch {
            width,
            height,
            actual_width: decoded.width(),
            actual_height: decoded.height(),
        });
    }

    let payload = STANDARD.encode(png);
    let document = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" "#,
            r#"width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            r#"<image x="0" y="0" width="{w}" height="{h}" xlink:href="data:image/png;base64,{payload}"/>"#,
            "</svg>\n"
        ),
        w = width,
        h = height,
        payload = payload,
    );
    debug!(width, height, bytes = document.len(), "[ENGINE] Embedded PNG in SVG");
    Ok(document.into_bytes())
}

/// Zeroed RGBA surface of exactly `width`×`height`. Sizes above
/// `max_pixels`, or memory the allocator refuses, fail the item instead of
/// aborting the process.
fn allocate_surface(
    width: u32,
    height: u32,
    max_pixels: u64,
) -> Result<tiny_skia::Pixmap, ConversionError> {
    let refused = ConversionError::SurfaceAllocation { width, height };
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        warn!(width, height, max_pixels, "[ENGINE] Render surface exceeds the pixel limit");
        return Err(refused);
    }
    let Some(len) = usize::try_from(pixels)
        .ok()
        .and_then(|pixels| pixels.checked_mul(4))
    else {
        return Err(refused);
    };
    let Some(size) = tiny_skia::IntSize::from_wh(width, height) else {
        return Err(refused);
    };

    let mut data = Vec::new();
    if data.try_reserve_exact(len).is_err() {
        warn!(width, height, bytes = len, "[ENGINE] Render surface allocation refused");
        return Err(refused);
    }
    data.resize(len, 0);
    tiny_skia::Pixmap::from_vec(data, size).ok_or(refused)
}

fn check_dimensions(width: u32, height: u32) -> Result<(), ConversionError> {
    if width == 0 || height == 0 {
        return Err(ConversionError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Production [`Converter`]: dispatches on the source format and runs the
/// matching function on the blocking pool.
#[derive(Clone)]
pub struct Engine {
    resources: RenderResources,
}

impl Engine {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            resources: RenderResources::new(config),
        }
    }

    pub fn with_resources(resources: RenderResources) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl Converter for Engine {
    async fn convert(&self, request: ConversionRequest) -> Result<ConvertedOutput, ConversionError> {
        let ConversionRequest {
            source,
            source_format,
            width,
            height,
        } = request;
        check_dimensions(width, height)?;

        let resources = self.resources.clone();
        let encoded = tokio::task::spawn_blocking(move || match source_format {
            Format::Png => raster_to_vector(&source, width, height),
            Format::Svg => vector_to_raster(&source, width, height, &resources),
        })
        .await
        .map_err(|e| ConversionError::Task(e.to_string()))??;

        Ok(ConvertedOutput {
            format: source_format.opposite(),
            bytes: Bytes::from(encoded),
        })
    }
}
