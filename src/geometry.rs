//! Geometry planner: display sizes in host page coordinates (points).
//!
//! DESIGN
//! ======
//! The planner fits a diagram's intrinsic aspect ratio into the printable
//! area of a page. It never fails; callers reject zero-area pages and
//! substitute default diagram dimensions before calling.

use serde::{Deserialize, Serialize};

pub const POINTS_PER_INCH: f64 = 72.0;

/// Smallest display size on the fitted axis: two inches.
pub const MIN_DISPLAY_SIZE: f64 = 2.0 * POINTS_PER_INCH;

/// Diagram size assumed when the markup declares no usable dimensions.
pub const DEFAULT_SVG_WIDTH: f64 = 800.0;
pub const DEFAULT_SVG_HEIGHT: f64 = 600.0;

// =============================================================================
// TYPES
// =============================================================================

/// Position and size of a placed artifact (the geometry descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    #[must_use]
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    #[must_use]
    pub fn size(&self) -> TargetGeometry {
        TargetGeometry { width: self.width, height: self.height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Margins {
    #[must_use]
    pub fn uniform(value: f64) -> Self {
        Self { left: value, right: value, top: value, bottom: value }
    }
}

/// Page dimensions and margins as reported by the document host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSetup {
    pub width: f64,
    pub height: f64,
    pub margins: Margins,
}

impl PageSetup {
    /// US Letter with one-inch margins, the document host's default section.
    #[must_use]
    pub fn letter() -> Self {
        Self { width: 8.5 * POINTS_PER_INCH, height: 11.0 * POINTS_PER_INCH, margins: Margins::uniform(POINTS_PER_INCH) }
    }

    /// Width and height inside the margins, or `None` for a zero-area page.
    #[must_use]
    pub fn printable_area(&self) -> Option<(f64, f64)> {
        let width = self.width - self.margins.left - self.margins.right;
        let height = self.height - self.margins.top - self.margins.bottom;
        (width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()).then_some((width, height))
    }
}

/// Display size in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetGeometry {
    pub width: f64,
    pub height: f64,
}

// =============================================================================
// PLANNING
// =============================================================================

/// Fit a `svg_width` x `svg_height` diagram into the printable area of `page`.
///
/// A diagram relatively wider than the printable area is fitted to its width,
/// otherwise to its height. If the fitted axis ends up under
/// [`MIN_DISPLAY_SIZE`] it is raised to the floor and the other axis follows
/// the aspect ratio, so the other axis may stay below the floor.
#[must_use]
pub fn compute_target_size(svg_width: f64, svg_height: f64, page: &PageSetup) -> TargetGeometry {
    let available_width = page.width - page.margins.left - page.margins.right;
    let available_height = page.height - page.margins.top - page.margins.bottom;

    let svg_aspect = svg_width / svg_height;
    let available_aspect = available_width / available_height;

    if svg_aspect > available_aspect {
        let width = available_width.max(MIN_DISPLAY_SIZE);
        TargetGeometry { width, height: width / svg_aspect }
    } else {
        let height = available_height.max(MIN_DISPLAY_SIZE);
        TargetGeometry { width: height * svg_aspect, height }
    }
}

/// Scale `width` x `height` down (never up) to fit inside `max_width` x `max_height`.
#[must_use]
pub fn fit_within(width: f64, height: f64, max_width: f64, max_height: f64) -> TargetGeometry {
    let scale = (max_width / width).min(max_height / height).min(1.0);
    if scale.is_finite() && scale > 0.0 {
        TargetGeometry { width: width * scale, height: height * scale }
    } else {
        TargetGeometry { width, height }
    }
}

/// Scale `width` x `height` up or down to the largest size that fits inside
/// `box_width` x `box_height`, keeping the aspect ratio.
#[must_use]
pub fn fit_aspect(width: f64, height: f64, box_width: f64, box_height: f64) -> TargetGeometry {
    let scale = (box_width / width).min(box_height / height);
    if scale.is_finite() && scale > 0.0 {
        TargetGeometry { width: width * scale, height: height * scale }
    } else {
        TargetGeometry { width: box_width, height: box_height }
    }
}

#[cfg(test)]
#[path = "geometry_test.rs"]
mod tests;
