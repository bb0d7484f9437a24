//! Shape matcher: fuzzy equality of geometry descriptors.
//!
//! Position is compared strictly because hosts rarely move an artifact on
//! their own. Size is compared loosely because hosts routinely auto-resize
//! inserted pictures. Both axes must pass.

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::host::Artifact;

pub const DEFAULT_POSITION_TOLERANCE: f64 = 5.0;
pub const DEFAULT_SIZE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchTolerance {
    /// Largest allowed difference of `left` and of `top`, in points.
    pub position: f64,
    /// Smallest allowed `min / max` ratio of widths and of heights.
    pub size_ratio: f64,
}

impl Default for MatchTolerance {
    fn default() -> Self {
        Self { position: DEFAULT_POSITION_TOLERANCE, size_ratio: DEFAULT_SIZE_RATIO }
    }
}

#[must_use]
pub fn geometry_matches(a: &Geometry, b: &Geometry, tolerance: &MatchTolerance) -> bool {
    let position_ok =
        (a.left - b.left).abs() <= tolerance.position && (a.top - b.top).abs() <= tolerance.position;
    let size_ok = size_ratio(a.width, b.width) >= tolerance.size_ratio
        && size_ratio(a.height, b.height) >= tolerance.size_ratio;
    position_ok && size_ok
}

fn size_ratio(a: f64, b: f64) -> f64 {
    let (small, large) = if a.abs() <= b.abs() { (a.abs(), b.abs()) } else { (b.abs(), a.abs()) };
    if large == 0.0 { 1.0 } else { small / large }
}

/// Among `candidates`, the matching artifact closest in position to `hint`.
#[must_use]
pub fn best_match<'a>(candidates: &'a [Artifact], hint: &Geometry, tolerance: &MatchTolerance) -> Option<&'a Artifact> {
    candidates
        .iter()
        .filter(|artifact| geometry_matches(&artifact.geometry, hint, tolerance))
        .min_by(|a, b| position_distance(&a.geometry, hint).total_cmp(&position_distance(&b.geometry, hint)))
}

fn position_distance(a: &Geometry, b: &Geometry) -> f64 {
    (a.left - b.left).hypot(a.top - b.top)
}

#[cfg(test)]
#[path = "matcher_test.rs"]
mod tests;
