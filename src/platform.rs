//! Platform selection and API-version capability checks.
//!
//! DESIGN
//! ======
//! `select_host` is a pure mapping from the reported application name to a
//! `HostKind`. Unknown hosts fail immediately, before any inserter state is
//! built. Capabilities map to host requirement sets; a capability is used
//! only after `HostInfo::supports` confirms the set and minimum version.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EmbedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    Presentation,
    Document,
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presentation => f.write_str("presentation"),
            Self::Document => f.write_str("document"),
        }
    }
}

// =============================================================================
// API VERSIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `"1.4"` style versions. A bare major (`"2"`) means minor 0.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().splitn(2, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(minor) => minor.parse().ok()?,
            None => 0,
        };
        Some(Self { major, minor })
    }
}

/// A feature the engine may use, backed by one host requirement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Document-scoped custom metadata containers.
    MetadataContainers,
    /// Key/value tags on slide shapes.
    ShapeTags,
    /// Native image placement on a slide.
    ImageShapes,
    /// Image placement through "set selected data".
    SelectedDataImage,
    /// Copying an image to the system clipboard.
    Clipboard,
    /// Inline picture insertion into document text.
    InlinePictures,
    /// Selection-change notifications.
    SelectionEvents,
}

impl Capability {
    /// Requirement set and minimum version for `kind`. `None` means the
    /// capability does not exist on that host.
    #[must_use]
    pub fn requirement(self, kind: HostKind) -> Option<(&'static str, ApiVersion)> {
        match (self, kind) {
            (Self::MetadataContainers, HostKind::Presentation) => Some(("PowerPointApi", ApiVersion::new(1, 7))),
            (Self::MetadataContainers, HostKind::Document) => Some(("WordApi", ApiVersion::new(1, 4))),
            (Self::ShapeTags, HostKind::Presentation) => Some(("PowerPointApi", ApiVersion::new(1, 3))),
            (Self::ImageShapes, HostKind::Presentation) => Some(("PowerPointApi", ApiVersion::new(1, 8))),
            (Self::SelectedDataImage, HostKind::Presentation) => Some(("ImageCoercion", ApiVersion::new(1, 1))),
            (Self::Clipboard, _) => Some(("Clipboard", ApiVersion::new(1, 0))),
            (Self::InlinePictures, HostKind::Document) => Some(("WordApi", ApiVersion::new(1, 1))),
            (Self::SelectionEvents, HostKind::Document) => Some(("DocumentEvents", ApiVersion::new(1, 1))),
            _ => None,
        }
    }

    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::MetadataContainers => "store diagram metadata in the document",
            Self::ShapeTags => "tag shapes",
            Self::ImageShapes => "place images on slides",
            Self::SelectedDataImage => "insert images at the selection",
            Self::Clipboard => "copy images to the clipboard",
            Self::InlinePictures => "insert inline pictures",
            Self::SelectionEvents => "watch the selection",
        }
    }
}

// =============================================================================
// HOST INFO
// =============================================================================

/// Host identity and supported requirement sets as reported at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub application: String,
    pub api_sets: BTreeMap<String, ApiVersion>,
}

impl HostInfo {
    #[must_use]
    pub fn new(application: impl Into<String>) -> Self {
        Self { application: application.into(), api_sets: BTreeMap::new() }
    }

    /// Declare support for `name` up to `version`. Unparseable versions are ignored.
    #[must_use]
    pub fn with_api_set(mut self, name: &str, version: &str) -> Self {
        match ApiVersion::parse(version) {
            Some(version) => {
                self.api_sets.insert(name.to_string(), version);
            }
            None => tracing::warn!(name, version, "ignoring unparseable API set version"),
        }
        self
    }

    #[must_use]
    pub fn is_set_supported(&self, name: &str, minimum: ApiVersion) -> bool {
        self.api_sets.get(name).is_some_and(|supported| *supported >= minimum)
    }

    /// Whether `capability` is usable on this host. Unknown hosts support nothing.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        let Ok(kind) = select_host(self) else {
            return false;
        };
        capability
            .requirement(kind)
            .is_some_and(|(name, minimum)| self.is_set_supported(name, minimum))
    }
}

/// Map the reported host application to the inserter variant that drives it.
///
/// # Errors
///
/// Returns `UnsupportedHost` for anything other than a presentation or
/// document host.
pub fn select_host(info: &HostInfo) -> Result<HostKind, EmbedError> {
    match info.application.trim().to_ascii_lowercase().as_str() {
        "powerpoint" | "presentation" => Ok(HostKind::Presentation),
        "word" | "document" => Ok(HostKind::Document),
        _ => Err(EmbedError::UnsupportedHost(info.application.clone())),
    }
}

#[cfg(test)]
#[path = "platform_test.rs"]
mod tests;
