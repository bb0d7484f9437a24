//! Engine tuning knobs, loaded from environment variables.

use std::time::Duration;

use tracing::warn;

use crate::matcher::{DEFAULT_POSITION_TOLERANCE, DEFAULT_SIZE_RATIO, MatchTolerance};
use crate::raster::{DEFAULT_MAX_DIMENSION, DEFAULT_NATURAL_SCALE, DEFAULT_PRINT_DPI, RasterOptions};

const DEFAULT_SETTLE_POLL_MS: u64 = 50;
const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 1000;
const DEFAULT_PLACEMENT_OFFSET: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub raster: RasterOptions,
    /// Interval between artifact queries while a placement settles.
    pub settle_poll: Duration,
    /// Upper bound on the settle wait; past it the new diagram is saved untagged.
    pub settle_timeout: Duration,
    /// Distance of a new slide image from the slide's top-left corner, in points.
    pub placement_offset: f64,
    pub matcher: MatchTolerance,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            raster: RasterOptions::default(),
            settle_poll: Duration::from_millis(DEFAULT_SETTLE_POLL_MS),
            settle_timeout: Duration::from_millis(DEFAULT_SETTLE_TIMEOUT_MS),
            placement_offset: DEFAULT_PLACEMENT_OFFSET,
            matcher: MatchTolerance::default(),
        }
    }
}

impl EngineConfig {
    /// Read every knob from the environment. Unparseable or out-of-range
    /// values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            raster: RasterOptions {
                print_dpi: env_parse_valid("MERMAID_PRINT_DPI", DEFAULT_PRINT_DPI, positive),
                natural_scale: env_parse_valid("MERMAID_NATURAL_SCALE", DEFAULT_NATURAL_SCALE, positive),
                max_dimension: env_parse_valid("MERMAID_MAX_RASTER_DIM", DEFAULT_MAX_DIMENSION, |v| v > 0),
            },
            settle_poll: Duration::from_millis(env_parse_valid(
                "MERMAID_SETTLE_POLL_MS",
                DEFAULT_SETTLE_POLL_MS,
                |v| v >= 1,
            )),
            settle_timeout: Duration::from_millis(env_parse("MERMAID_SETTLE_TIMEOUT_MS", DEFAULT_SETTLE_TIMEOUT_MS)),
            placement_offset: env_parse_valid("MERMAID_PLACEMENT_OFFSET", DEFAULT_PLACEMENT_OFFSET, non_negative),
            matcher: MatchTolerance {
                position: env_parse_valid("MERMAID_POSITION_TOLERANCE", DEFAULT_POSITION_TOLERANCE, non_negative),
                size_ratio: env_parse_valid("MERMAID_SIZE_RATIO", DEFAULT_SIZE_RATIO, |v| v > 0.0 && v <= 1.0),
            },
        }
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// [`env_parse`], then reject values `valid` refuses.
pub(crate) fn env_parse_valid<T>(key: &str, default: T, valid: impl Fn(T) -> bool) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    let value = env_parse(key, default);
    if valid(value) {
        value
    } else {
        warn!(key, %value, %default, "setting out of range; using default");
        default
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
