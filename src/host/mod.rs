//! Host document surface consumed by the engine.
//!
//! ARCHITECTURE
//! ============
//! The host application owns the document model. Adapters implement these
//! traits over the host's scripting API; the engine never reaches past them.
//! Every call is one asynchronous host round trip and may suspend.
//!
//! - `MetadataContainers`: opaque text blobs scoped to the document.
//! - `SlideHost`: presentation surface with shapes and native key/value tags.
//! - `DocumentHost`: word-processing surface with inline pictures and
//!   selection-change notifications, but no tags.
//! - `DiagramRenderer`: the rendering collaborator (source text to SVG).

#[cfg(test)]
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::geometry::{Geometry, PageSetup};
use crate::platform::HostInfo;
use crate::raster::RenderFailure;
use crate::settings::RenderConfig;

pub type HostResult<T> = Result<T, HostError>;

// =============================================================================
// METADATA CONTAINERS
// =============================================================================

/// One stored blob and the host-assigned handle used to delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub id: String,
    pub xml: String,
}

#[async_trait::async_trait]
pub trait MetadataContainers: Send + Sync {
    /// Store a new blob and return its handle. There is no in-place update.
    async fn add(&self, xml: &str) -> HostResult<String>;

    /// Every blob in the document, including ones written by other add-ins.
    async fn list(&self) -> HostResult<Vec<ContainerEntry>>;

    async fn delete(&self, id: &str) -> HostResult<()>;
}

// =============================================================================
// PRESENTATION HOST
// =============================================================================

/// A shape on a slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Host shape id.
    pub id: String,
    pub name: String,
    pub geometry: Geometry,
    pub tags: BTreeMap<String, String>,
}

#[async_trait::async_trait]
pub trait SlideHost: Send + Sync {
    /// Slide width and height in points.
    async fn slide_size(&self) -> HostResult<(f64, f64)>;

    /// Shapes on every slide.
    async fn artifacts(&self) -> HostResult<Vec<Artifact>>;

    /// Shapes on the current slide, oldest first.
    async fn current_slide_artifacts(&self) -> HostResult<Vec<Artifact>>;

    async fn selected_artifacts(&self) -> HostResult<Vec<Artifact>>;

    /// Native image placement on the current slide. Returns no handle.
    async fn add_image(&self, png_base64: &str, geometry: Geometry) -> HostResult<()>;

    /// Alternate placement through the "set selected data" primitive.
    async fn insert_selected_image(&self, png_base64: &str, geometry: Geometry) -> HostResult<()>;

    async fn copy_image_to_clipboard(&self, png_base64: &str) -> HostResult<()>;

    async fn set_tag(&self, artifact_id: &str, key: &str, value: &str) -> HostResult<()>;

    async fn delete_artifact(&self, artifact_id: &str) -> HostResult<()>;
}

// =============================================================================
// DOCUMENT HOST
// =============================================================================

/// A picture laid out inline with the document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlinePicture {
    pub id: String,
    pub width: f64,
    pub height: f64,
    /// Accessible description (alt text).
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertLocation {
    /// After the selected range, keeping the selected text.
    After,
    /// Replacing the selected range (or at the collapsed cursor).
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub type SelectionListener = Arc<dyn Fn() + Send + Sync>;

#[async_trait::async_trait]
pub trait DocumentHost: Send + Sync {
    /// Page size and margins of the section holding the selection.
    async fn page_setup(&self) -> HostResult<PageSetup>;

    async fn selection_has_text(&self) -> HostResult<bool>;

    async fn selected_inline_pictures(&self) -> HostResult<Vec<InlinePicture>>;

    async fn inline_pictures(&self) -> HostResult<Vec<InlinePicture>>;

    async fn insert_inline_picture(
        &self,
        png_base64: &str,
        width: f64,
        height: f64,
        location: InsertLocation,
    ) -> HostResult<InlinePicture>;

    async fn set_description(&self, picture_id: &str, description: &str) -> HostResult<()>;

    async fn add_selection_listener(&self, listener: SelectionListener) -> HostResult<ListenerId>;

    async fn remove_selection_listener(&self, id: ListenerId) -> HostResult<()>;
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// What the running host exposes. Exactly one of `slides` / `document` is
/// expected to be present, matching `info().application`.
pub trait HostEnvironment: Send + Sync {
    fn info(&self) -> HostInfo;

    fn containers(&self) -> Option<Arc<dyn MetadataContainers>>;

    fn slides(&self) -> Option<Arc<dyn SlideHost>>;

    fn document(&self) -> Option<Arc<dyn DocumentHost>>;
}

// =============================================================================
// RENDERER
// =============================================================================

#[async_trait::async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// Render diagram source text into SVG markup.
    ///
    /// Syntax errors come back as [`RenderFailure::Syntax`] with the
    /// renderer's own message.
    async fn render(&self, source: &str, config: &RenderConfig) -> Result<String, RenderFailure>;
}
