//! Error taxonomy for the embed engine.
//!
//! DESIGN
//! ======
//! Three layers, each with its own `thiserror` enum:
//! - `HostError`: raised by host adapters (document surface, metadata
//!   containers). Carries a coarse kind so callers can tell "API missing"
//!   from "API refused this call".
//! - `StoreError`: the Metadata Store's view of failures.
//! - `EmbedError`: what inserters and the editor session surface to the UI.
//!
//! Fallback-tier failures never reach `EmbedError` unless every tier is
//! exhausted. Tagging failures never reach it at all (see `tagger`).
//! Degraded successes travel through `inserter::Outcome`, not here.

use crate::raster::RenderFailure;

/// Stable machine-readable code for an error, mirrored into UI messages.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// HOST
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorKind {
    /// The API surface is not reachable at all (context lost, host busy).
    Unavailable,
    /// The requirement set backing the call is not supported by this host.
    Unsupported,
    /// The host accepted the call but rejected the arguments or state.
    Rejected,
}

/// Failure reported by a host adapter for a single API round trip.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct HostError {
    pub kind: HostErrorKind,
    pub operation: &'static str,
    pub message: String,
}

impl HostError {
    pub fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self { kind: HostErrorKind::Unavailable, operation, message: message.into() }
    }

    pub fn unsupported(operation: &'static str, message: impl Into<String>) -> Self {
        Self { kind: HostErrorKind::Unsupported, operation, message: message.into() }
    }

    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        Self { kind: HostErrorKind::Rejected, operation, message: message.into() }
    }
}

impl ErrorCode for HostError {
    fn error_code(&self) -> &'static str {
        match self.kind {
            HostErrorKind::Unavailable => "E_HOST_UNAVAILABLE",
            HostErrorKind::Unsupported => "E_HOST_UNSUPPORTED",
            HostErrorKind::Rejected => "E_HOST_REJECTED",
        }
    }

    fn retryable(&self) -> bool {
        self.kind == HostErrorKind::Unavailable
    }
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record carries the requested id. The id is kept for logging only.
    #[error("no saved diagram matches this image")]
    NotFound(String),
    /// The document's metadata containers could not be read.
    #[error("document metadata is not accessible: {0}")]
    Unavailable(HostError),
    /// A write or delete against the containers failed.
    #[error("saving diagram metadata failed: {0}")]
    Write(HostError),
}

impl StoreError {
    /// Classify a failed container write.
    pub(crate) fn from_write(err: HostError) -> Self {
        match err.kind {
            HostErrorKind::Unavailable => Self::Unavailable(err),
            HostErrorKind::Unsupported | HostErrorKind::Rejected => Self::Write(err),
        }
    }
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
            Self::Write(_) => "E_PERSISTENCE",
        }
    }
}

// =============================================================================
// EMBED
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Diagram source or vector markup could not be turned into an image.
    #[error(transparent)]
    Render(#[from] RenderFailure),

    /// A capability the operation needs is missing and no fallback remains.
    #[error("this host cannot {capability} ({detail}); update the application or use copy and paste")]
    HostCapabilityUnavailable { capability: &'static str, detail: String },

    /// Every placement tier was tried and the host rejected all of them.
    #[error("the diagram image could not be placed ({detail}). {advice}")]
    Placement { detail: String, advice: &'static str },

    /// Metadata persistence failed. `placed` tells whether a visible
    /// artifact was already placed in the document.
    #[error("{}", persistence_message(.placed, .source))]
    Persistence {
        placed: bool,
        #[source]
        source: StoreError,
    },

    /// The diagram (record or tagged artifact) to act on does not exist.
    #[error("{what} was not found. {advice}")]
    NotFound { what: &'static str, advice: &'static str },

    /// A host read the operation depends on failed.
    #[error("{0}; try again")]
    Host(#[from] HostError),

    /// The metadata container API is not accessible.
    #[error("document metadata is not accessible ({0}); reopen the document and try again")]
    StoreUnavailable(HostError),

    /// Another insert or update is still running.
    #[error("another diagram operation is still in progress")]
    Busy,

    /// Platform selection found a host this engine does not drive.
    #[error("unsupported host application: {0}")]
    UnsupportedHost(String),

    /// `insert_at_current_position` without a preceding `insert`.
    #[error("no diagram is waiting to be placed; choose Insert first")]
    NoPendingInsertion,
}

fn persistence_message(placed: &bool, source: &StoreError) -> String {
    if *placed {
        format!(
            "the diagram was placed in the document but its source could not be saved ({source}); \
             it cannot be edited later, so delete it and insert it again"
        )
    } else {
        format!("the diagram source could not be saved ({source}); nothing was changed in the document")
    }
}

impl EmbedError {
    /// Surface a store failure that happened after an artifact was placed.
    pub(crate) fn after_placement(err: StoreError) -> Self {
        Self::Persistence { placed: true, source: err }
    }

    pub(crate) fn missing_record() -> Self {
        Self::NotFound {
            what: "the saved diagram source",
            advice: "Insert the diagram again to make it editable.",
        }
    }

    pub(crate) fn missing_artifact() -> Self {
        Self::NotFound {
            what: "the diagram image on the current slide",
            advice: "Go to the slide that shows the diagram and try again. If the image was deleted, insert the diagram as a new image.",
        }
    }
}

impl From<StoreError> for EmbedError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::missing_record(),
            StoreError::Unavailable(host) => Self::StoreUnavailable(host),
            StoreError::Write(_) => Self::Persistence { placed: false, source: err },
        }
    }
}

impl ErrorCode for EmbedError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Render(_) => "E_RENDER",
            Self::HostCapabilityUnavailable { .. } => "E_HOST_CAPABILITY",
            Self::Placement { .. } => "E_PLACEMENT",
            Self::Persistence { .. } => "E_PERSISTENCE",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Host(err) => err.error_code(),
            Self::StoreUnavailable(_) => "E_STORE_UNAVAILABLE",
            Self::Busy => "E_BUSY",
            Self::UnsupportedHost(_) => "E_UNSUPPORTED_HOST",
            Self::NoPendingInsertion => "E_NO_PENDING_INSERTION",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Host(err) => err.retryable(),
            other => matches!(other, Self::Busy | Self::Placement { .. }),
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
