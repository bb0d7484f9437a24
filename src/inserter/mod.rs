//! Capability-tiered inserter: places, re-identifies and replaces diagrams.
//!
//! ARCHITECTURE
//! ============
//! `DiagramInserter` is the narrow interface shared by both host variants.
//! `Inserter` is the closed set of variants; operations that exist on one
//! host only (the document host's two-phase placement) are reached through
//! `Inserter::as_document`, so callers match on the host kind at compile
//! time instead of probing for methods.
//!
//! Every insert or update runs: rasterize, place, settle, tag, persist.
//! Fallback-tier failures stay inside the variant; callers see an error only
//! once every tier is exhausted. Degraded successes (clipboard fallback,
//! awaiting placement) come back as `Outcome`, never as an error.
//!
//! CONCURRENCY
//! ===========
//! Each inserter owns an `InFlight` flag. A second insert or update while one
//! is running is rejected with `EmbedError::Busy` rather than interleaving
//! partial document mutations.

pub mod document;
pub mod presentation;

use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{EmbedError, HostError, HostErrorKind};
use crate::host::HostEnvironment;
use crate::platform::{Capability, HostKind, select_host};
use crate::record::DiagramRecord;
use crate::store::DiagramStore;

pub use document::DocumentInserter;
pub use presentation::PresentationInserter;

// =============================================================================
// OUTCOME
// =============================================================================

/// Non-error result of an insert or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The diagram is placed, identified and its source saved.
    Success { diagram_id: String },
    /// The goal was reached through a manual fallback the user must finish.
    SuccessWithInstructions { instructions: String },
    /// Waiting for the user to pick a location; not terminal.
    AwaitingUserAction { instructions: String },
}

impl Outcome {
    #[must_use]
    pub fn diagram_id(&self) -> Option<&str> {
        match self {
            Self::Success { diagram_id } => Some(diagram_id),
            Self::SuccessWithInstructions { .. } | Self::AwaitingUserAction { .. } => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::AwaitingUserAction { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { .. } => f.write_str("Diagram saved."),
            Self::SuccessWithInstructions { instructions } | Self::AwaitingUserAction { instructions } => {
                f.write_str(instructions)
            }
        }
    }
}

// =============================================================================
// IN-FLIGHT GUARD
// =============================================================================

/// Rejects overlapping document mutations from one inserter.
#[derive(Debug, Default)]
pub struct InFlight(AtomicBool);

/// Clears the in-flight flag when dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a>(&'a AtomicBool);

impl InFlight {
    /// Claim the flag for one operation.
    ///
    /// # Errors
    ///
    /// `Busy` while another guard is alive.
    pub fn enter(&self) -> Result<InFlightGuard<'_>, EmbedError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlightGuard(&self.0))
            .map_err(|_| EmbedError::Busy)
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// INVENTORY
// =============================================================================

/// How a stored record relates to the artifacts currently in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Presence {
    /// An artifact carries the record's id.
    Tagged { artifact_id: String },
    /// No artifact carries the id, but one matches the geometry hint.
    /// Reported only; never used to recover a diagram.
    Untagged { artifact_id: String },
    /// No backing artifact was found.
    Orphaned,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tagged { artifact_id } => write!(f, "tagged ({artifact_id})"),
            Self::Untagged { artifact_id } => write!(f, "untagged, geometry matches {artifact_id}"),
            Self::Orphaned => f.write_str("orphaned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryEntry {
    pub record: DiagramRecord,
    pub presence: Presence,
}

/// Render an inventory as the diagnostic summary returned by `list_all`.
#[must_use]
pub fn format_inventory(entries: &[InventoryEntry]) -> String {
    if entries.is_empty() {
        return "No saved diagrams in this document.".to_string();
    }
    let orphaned = entries.iter().filter(|e| e.presence == Presence::Orphaned).count();
    let mut out = format!("{} saved diagram(s), {orphaned} orphaned:", entries.len());
    for entry in entries {
        let first_line = entry.record.source_code.lines().next().unwrap_or_default().trim();
        let _ = write!(out, "\n- {} [{}] {first_line}", entry.record.id, entry.presence);
    }
    out
}

// =============================================================================
// SHARED INTERFACE
// =============================================================================

#[async_trait::async_trait]
pub trait DiagramInserter: Send + Sync {
    fn kind(&self) -> HostKind;

    /// Place a new diagram rendered as `svg`, saving `source_code` with it.
    async fn insert(&self, source_code: &str, svg: &str) -> Result<Outcome, EmbedError>;

    /// Replace diagram `id` in place with a new rendering.
    async fn update(&self, id: &str, source_code: &str, svg: &str) -> Result<Outcome, EmbedError>;

    /// The record of the selected artifact. `None` when nothing identifiable
    /// is selected; geometry never stands in for a missing tag.
    async fn recover_selected(&self) -> Result<Option<DiagramRecord>, EmbedError>;

    /// Every stored record with its presence in the document.
    async fn inventory(&self) -> Result<Vec<InventoryEntry>, EmbedError>;

    /// Diagnostic summary of stored diagrams.
    async fn list_all(&self) -> Result<String, EmbedError> {
        Ok(format_inventory(&self.inventory().await?))
    }

    /// Diagnostic summary of the current selection.
    async fn describe_selection(&self) -> Result<String, EmbedError>;
}

/// Map a failed placement call to the error surfaced once no tier is left.
pub(crate) fn placement_error(capability: Capability, err: &HostError) -> EmbedError {
    match err.kind {
        HostErrorKind::Unsupported => {
            EmbedError::HostCapabilityUnavailable { capability: capability.describe(), detail: err.to_string() }
        }
        HostErrorKind::Unavailable | HostErrorKind::Rejected => EmbedError::Placement {
            detail: err.to_string(),
            advice: "Click inside the document and try again.",
        },
    }
}

// =============================================================================
// HOST VARIANTS
// =============================================================================

pub enum Inserter {
    Presentation(PresentationInserter),
    Document(DocumentInserter),
}

impl Inserter {
    /// Select and build the inserter for the running host.
    ///
    /// # Errors
    ///
    /// `UnsupportedHost` for unknown hosts; `HostCapabilityUnavailable` when
    /// metadata containers or the host's document surface are missing.
    pub fn from_environment(env: &dyn HostEnvironment, config: EngineConfig) -> Result<Self, EmbedError> {
        let info = env.info();
        let kind = select_host(&info)?;

        let containers = match env.containers() {
            Some(containers) if info.supports(Capability::MetadataContainers) => containers,
            _ => {
                return Err(EmbedError::HostCapabilityUnavailable {
                    capability: Capability::MetadataContainers.describe(),
                    detail: requirement_detail(Capability::MetadataContainers, kind),
                });
            }
        };
        let store = DiagramStore::new(containers);

        let inserter = match kind {
            HostKind::Presentation => {
                let slides = env.slides().ok_or_else(|| EmbedError::HostCapabilityUnavailable {
                    capability: "reach the slides",
                    detail: format!("{} exposes no slide surface", info.application),
                })?;
                Self::Presentation(PresentationInserter::new(slides, store, info, config))
            }
            HostKind::Document => {
                let document = env.document().ok_or_else(|| EmbedError::HostCapabilityUnavailable {
                    capability: "reach the document body",
                    detail: format!("{} exposes no document surface", info.application),
                })?;
                Self::Document(DocumentInserter::new(document, store, info, config))
            }
        };
        info!(host = %kind, "inserter ready");
        Ok(inserter)
    }

    /// Document-host operations, when running on a document host.
    #[must_use]
    pub fn as_document(&self) -> Option<&DocumentInserter> {
        match self {
            Self::Document(inserter) => Some(inserter),
            Self::Presentation(_) => None,
        }
    }

    fn shared(&self) -> &dyn DiagramInserter {
        match self {
            Self::Presentation(inserter) => inserter,
            Self::Document(inserter) => inserter,
        }
    }
}

pub(crate) fn requirement_detail(capability: Capability, kind: HostKind) -> String {
    match capability.requirement(kind) {
        Some((set, version)) => format!("requires {set} {}.{}", version.major, version.minor),
        None => format!("not available on a {kind} host"),
    }
}

#[async_trait::async_trait]
impl DiagramInserter for Inserter {
    fn kind(&self) -> HostKind {
        self.shared().kind()
    }

    async fn insert(&self, source_code: &str, svg: &str) -> Result<Outcome, EmbedError> {
        self.shared().insert(source_code, svg).await
    }

    async fn update(&self, id: &str, source_code: &str, svg: &str) -> Result<Outcome, EmbedError> {
        self.shared().update(id, source_code, svg).await
    }

    async fn recover_selected(&self) -> Result<Option<DiagramRecord>, EmbedError> {
        self.shared().recover_selected().await
    }

    async fn inventory(&self) -> Result<Vec<InventoryEntry>, EmbedError> {
        self.shared().inventory().await
    }

    async fn describe_selection(&self) -> Result<String, EmbedError> {
        self.shared().describe_selection().await
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
