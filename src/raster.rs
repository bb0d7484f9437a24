//! Raster conversion: SVG markup to base64 PNG sized for the destination.
//!
//! DESIGN
//! ======
//! Two modes:
//! - natural resolution (no target size): intrinsic size times a fixed
//!   scale factor, caller-chosen background. Used for slide and clipboard
//!   paths where the destination does not dictate the size.
//! - fixed DPI (target size in points): pixel size realises the configured
//!   DPI against 72 points per inch, background forced opaque white because
//!   the destination cannot composite transparency reliably.
//!
//! Declared dimensions parsed from the markup win over the size usvg
//! reports after decoding. Decoding and painting run on the blocking pool so
//! callers suspend instead of stalling the runtime.

use std::sync::{Arc, LazyLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use resvg::tiny_skia;
use resvg::usvg;
use serde::{Deserialize, Serialize};

use crate::geometry::{DEFAULT_SVG_HEIGHT, DEFAULT_SVG_WIDTH, POINTS_PER_INCH, TargetGeometry};

pub const DEFAULT_PRINT_DPI: f64 = 300.0;
pub const DEFAULT_NATURAL_SCALE: f64 = 2.0;
pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;

/// System fonts for `<text>` nodes, loaded once.
static FONTDB: LazyLock<Arc<usvg::fontdb::Database>> = LazyLock::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    tracing::debug!(faces = db.len(), "loaded system fonts for rasterization");
    Arc::new(db)
});

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderFailure {
    /// Diagram source rejected by the rendering collaborator. Shown verbatim.
    #[error("{0}")]
    Syntax(String),
    #[error("the diagram markup could not be decoded: {0}")]
    Decode(String),
    #[error("the diagram image is too large to rasterize ({width}x{height} pixels); reduce the diagram size")]
    CanvasTooLarge { width: u32, height: u32 },
    #[error("the diagram image could not be encoded: {0}")]
    Encode(String),
}

impl crate::error::ErrorCode for RenderFailure {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "E_RENDER_SYNTAX",
            Self::Decode(_) => "E_RENDER_DECODE",
            Self::CanvasTooLarge { .. } => "E_RENDER_TOO_LARGE",
            Self::Encode(_) => "E_RENDER_ENCODE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Transparent,
    OpaqueWhite,
}

/// Encoded raster ready to hand to a host placement API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterAsset {
    /// Base64-encoded PNG.
    pub pixel_data: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl RasterAsset {
    /// Decode the PNG bytes back out of `pixel_data`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pixel_data` is not valid base64.
    pub fn png_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.pixel_data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterOptions {
    pub print_dpi: f64,
    pub natural_scale: f64,
    pub max_dimension: u32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self { print_dpi: DEFAULT_PRINT_DPI, natural_scale: DEFAULT_NATURAL_SCALE, max_dimension: DEFAULT_MAX_DIMENSION }
    }
}

/// Declared size of an SVG document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SvgDimensions {
    Known { width: f64, height: f64 },
    Unknown,
}

impl SvgDimensions {
    /// Declared size, or the planner defaults (800x600) when unknown.
    #[must_use]
    pub fn or_default(self) -> (f64, f64) {
        match self {
            Self::Known { width, height } => (width, height),
            Self::Unknown => (DEFAULT_SVG_WIDTH, DEFAULT_SVG_HEIGHT),
        }
    }
}

// =============================================================================
// DIMENSION PARSING
// =============================================================================

/// Read the declared size of the root `<svg>` element.
///
/// Tries `viewBox` (four numbers, positive extent) first, then the `width`
/// and `height` attributes in user units or pixels. Anything else yields
/// [`SvgDimensions::Unknown`]; this never fails.
#[must_use]
pub fn parse_svg_dimensions(markup: &str) -> SvgDimensions {
    let Ok(doc) = roxmltree::Document::parse(markup) else {
        return SvgDimensions::Unknown;
    };
    let root = doc.root_element();
    if !root.has_tag_name("svg") {
        return SvgDimensions::Unknown;
    }

    if let Some((width, height)) = root.attribute("viewBox").and_then(parse_view_box) {
        return SvgDimensions::Known { width, height };
    }

    let width = root.attribute("width").and_then(parse_length);
    let height = root.attribute("height").and_then(parse_length);
    match (width, height) {
        (Some(width), Some(height)) => SvgDimensions::Known { width, height },
        _ => SvgDimensions::Unknown,
    }
}

fn parse_view_box(raw: &str) -> Option<(f64, f64)> {
    let numbers: Vec<f64> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;
    let [_, _, width, height] = numbers.as_slice() else {
        return None;
    };
    (width.is_finite() && height.is_finite() && *width > 0.0 && *height > 0.0).then_some((*width, *height))
}

fn parse_length(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    let value = number.parse::<f64>().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

// =============================================================================
// RASTERIZATION
// =============================================================================

/// Rasterize `markup`, in fixed-DPI mode when `target` is given, else at
/// natural resolution with `background`.
///
/// # Errors
///
/// Returns [`RenderFailure`] when the markup cannot be decoded, the canvas
/// would exceed `options.max_dimension`, or PNG encoding fails.
pub async fn rasterize(
    markup: &str,
    target: Option<TargetGeometry>,
    background: Background,
    options: &RasterOptions,
) -> Result<RasterAsset, RenderFailure> {
    let markup = markup.to_owned();
    let options = *options;
    tokio::task::spawn_blocking(move || rasterize_blocking(&markup, target, background, &options))
        .await
        .map_err(|e| RenderFailure::Encode(format!("rasterization task failed: {e}")))?
}

fn rasterize_blocking(
    markup: &str,
    target: Option<TargetGeometry>,
    background: Background,
    options: &RasterOptions,
) -> Result<RasterAsset, RenderFailure> {
    let opts = usvg::Options { fontdb: FONTDB.clone(), ..Default::default() };
    let tree = usvg::Tree::from_str(markup, &opts).map_err(|e| RenderFailure::Decode(e.to_string()))?;
    let tree_size = tree.size();

    let (intrinsic_width, intrinsic_height) = match parse_svg_dimensions(markup) {
        SvgDimensions::Known { width, height } => (width, height),
        SvgDimensions::Unknown => (f64::from(tree_size.width()), f64::from(tree_size.height())),
    };

    let (width, height, background) = match target {
        Some(target) => {
            let scale = options.print_dpi / POINTS_PER_INCH;
            if background == Background::Transparent {
                tracing::debug!("fixed-DPI raster ignores transparent background");
            }
            (to_pixels(target.width * scale), to_pixels(target.height * scale), Background::OpaqueWhite)
        }
        None => (
            to_pixels(intrinsic_width * options.natural_scale),
            to_pixels(intrinsic_height * options.natural_scale),
            background,
        ),
    };

    if width > options.max_dimension || height > options.max_dimension {
        return Err(RenderFailure::CanvasTooLarge { width, height });
    }
    let mut pixmap =
        tiny_skia::Pixmap::new(width, height).ok_or(RenderFailure::CanvasTooLarge { width, height })?;
    if background == Background::OpaqueWhite {
        pixmap.fill(tiny_skia::Color::WHITE);
    }

    #[allow(clippy::cast_precision_loss)]
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / tree_size.width(),
        height as f32 / tree_size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let png = encode_png(&pixmap)?;
    tracing::debug!(width, height, bytes = png.len(), ?background, "rasterized diagram");
    Ok(RasterAsset { pixel_data: BASE64.encode(png), pixel_width: width, pixel_height: height })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_pixels(value: f64) -> u32 {
    if value.is_finite() && value >= 1.0 {
        value.round().min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

/// tiny-skia stores premultiplied RGBA; PNG wants straight alpha.
fn encode_png(pixmap: &tiny_skia::Pixmap) -> Result<Vec<u8>, RenderFailure> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        rgba.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&rgba, pixmap.width(), pixmap.height(), image::ExtendedColorType::Rgba8)
        .map_err(|e| RenderFailure::Encode(e.to_string()))?;
    Ok(png)
}

#[cfg(test)]
#[path = "raster_test.rs"]
mod tests;
