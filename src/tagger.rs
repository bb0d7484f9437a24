//! Identity tagger: binds a placed artifact to its diagram id.
//!
//! DESIGN
//! ======
//! Write path: try the host's native key/value tag. Any failure (capability
//! missing, host rejection) degrades to recording the artifact's geometry
//! in the metadata record; the insertion itself still succeeds.
//!
//! Read path: only an explicit tag (or description token) identifies a
//! diagram. Geometry never resolves a selection, so recovery fails closed.
//!
//! Document hosts have no tag primitive. Their carrier is a token embedded
//! in the picture's accessible description: `[mermaid-diagram-id:<id>]`.

use tracing::{debug, warn};

use crate::error::{ErrorCode, HostError};
use crate::geometry::Geometry;
use crate::host::{Artifact, DocumentHost, InlinePicture, SlideHost};
use crate::platform::{Capability, HostInfo};

pub const DIAGRAM_TAG_KEY: &str = "mermaid_diagram_id";

const TOKEN_OPEN: &str = "[mermaid-diagram-id:";
const TOKEN_CLOSE: char = ']';
const DESCRIPTION_LABEL: &str = "Mermaid diagram";

/// Terminal state of one tagging attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagOutcome {
    /// The artifact carries the id natively.
    Tagged,
    /// Tagging failed; the geometry was captured as a weaker hint.
    TaggedByGeometry(Geometry),
}

impl TagOutcome {
    #[must_use]
    pub fn shape_tagged(&self) -> bool {
        matches!(self, Self::Tagged)
    }

    #[must_use]
    pub fn geometry_hint(&self) -> Option<Geometry> {
        match self {
            Self::Tagged => None,
            Self::TaggedByGeometry(geometry) => Some(*geometry),
        }
    }
}

/// Why a tag could not be attached. Never fatal; logged and folded into
/// [`TagOutcome::TaggedByGeometry`].
#[derive(Debug, thiserror::Error)]
pub enum TaggingFailure {
    #[error("shape tags are not supported by this host")]
    Unsupported,
    #[error(transparent)]
    Host(#[from] HostError),
}

impl ErrorCode for TaggingFailure {
    fn error_code(&self) -> &'static str {
        "E_TAGGING"
    }
}

// =============================================================================
// SLIDE SHAPES
// =============================================================================

/// Tag `artifact` with `diagram_id`, degrading to a geometry hint on failure.
pub async fn tag_artifact(slides: &dyn SlideHost, info: &HostInfo, artifact: &Artifact, diagram_id: &str) -> TagOutcome {
    match try_tag(slides, info, artifact, diagram_id).await {
        Ok(()) => {
            debug!(diagram_id, artifact = %artifact.id, "artifact tagged");
            TagOutcome::Tagged
        }
        Err(err) => {
            warn!(
                diagram_id,
                artifact = %artifact.id,
                code = err.error_code(),
                error = %err,
                "tagging failed; keeping geometry hint"
            );
            TagOutcome::TaggedByGeometry(artifact.geometry)
        }
    }
}

async fn try_tag(
    slides: &dyn SlideHost,
    info: &HostInfo,
    artifact: &Artifact,
    diagram_id: &str,
) -> Result<(), TaggingFailure> {
    if !info.supports(Capability::ShapeTags) {
        return Err(TaggingFailure::Unsupported);
    }
    slides.set_tag(&artifact.id, DIAGRAM_TAG_KEY, diagram_id).await?;
    Ok(())
}

/// The diagram id carried by `artifact`'s native tag.
#[must_use]
pub fn tagged_id(artifact: &Artifact) -> Option<&str> {
    artifact
        .tags
        .get(DIAGRAM_TAG_KEY)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Artifacts whose tag names `diagram_id`, in host order.
#[must_use]
pub fn artifacts_tagged(artifacts: &[Artifact], diagram_id: &str) -> Vec<Artifact> {
    artifacts.iter().filter(|a| tagged_id(a) == Some(diagram_id)).cloned().collect()
}

// =============================================================================
// INLINE PICTURES
// =============================================================================

#[must_use]
pub fn description_with_token(diagram_id: &str) -> String {
    format!("{DESCRIPTION_LABEL} {TOKEN_OPEN}{diagram_id}{TOKEN_CLOSE}")
}

/// The id inside the first well-formed token of `description`.
#[must_use]
pub fn extract_description_token(description: &str) -> Option<&str> {
    let start = description.find(TOKEN_OPEN)? + TOKEN_OPEN.len();
    let rest = &description[start..];
    let id = &rest[..rest.find(TOKEN_CLOSE)?];
    let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

#[must_use]
pub fn picture_id(picture: &InlinePicture) -> Option<&str> {
    picture.description.as_deref().and_then(extract_description_token)
}

/// Write the id token into `picture`'s description. Inline pictures have no
/// position, so a fallback hint carries the size only.
pub async fn tag_inline_picture(document: &dyn DocumentHost, picture: &InlinePicture, diagram_id: &str) -> TagOutcome {
    match document.set_description(&picture.id, &description_with_token(diagram_id)).await {
        Ok(()) => {
            debug!(diagram_id, picture = %picture.id, "picture description tagged");
            TagOutcome::Tagged
        }
        Err(err) => {
            let err = TaggingFailure::from(err);
            warn!(diagram_id, picture = %picture.id, error = %err, "description tagging failed; keeping size hint");
            TagOutcome::TaggedByGeometry(Geometry::new(0.0, 0.0, picture.width, picture.height))
        }
    }
}

#[cfg(test)]
#[path = "tagger_test.rs"]
mod tests;
