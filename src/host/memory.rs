//! In-memory hosts for tests.
//!
//! Each fake keeps its document state behind a `Mutex` and exposes fault
//! switches so tests can make individual host calls fail on demand.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{
    Artifact, ContainerEntry, DiagramRenderer, DocumentHost, HostEnvironment, HostResult, InlinePicture,
    InsertLocation, ListenerId, MetadataContainers, SelectionListener, SlideHost,
};
use crate::error::HostError;
use crate::geometry::{Geometry, PageSetup};
use crate::platform::HostInfo;
use crate::raster::RenderFailure;
use crate::settings::RenderConfig;

// =============================================================================
// HOST INFO
// =============================================================================

/// A presentation host with every capability this engine uses.
pub fn presentation_info() -> HostInfo {
    HostInfo::new("PowerPoint")
        .with_api_set("PowerPointApi", "1.8")
        .with_api_set("ImageCoercion", "1.1")
        .with_api_set("Clipboard", "1.0")
}

/// A document host with every capability this engine uses.
pub fn document_info() -> HostInfo {
    HostInfo::new("Word")
        .with_api_set("WordApi", "1.4")
        .with_api_set("DocumentEvents", "1.1")
        .with_api_set("Clipboard", "1.0")
}

// =============================================================================
// CONTAINERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFault {
    /// Every call reports the API as unreachable.
    Unavailable,
    Add,
    Delete,
}

#[derive(Default)]
pub struct MemoryContainers {
    entries: Mutex<Vec<ContainerEntry>>,
    next_id: Mutex<u64>,
    faults: Mutex<HashSet<ContainerFault>>,
}

impl MemoryContainers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, fault: ContainerFault) {
        self.faults.lock().unwrap().insert(fault);
    }

    pub fn heal(&self, fault: ContainerFault) {
        self.faults.lock().unwrap().remove(&fault);
    }

    fn faulty(&self, fault: ContainerFault) -> bool {
        self.faults.lock().unwrap().contains(&fault)
    }

    /// Store a blob bypassing fault switches, e.g. foreign metadata.
    pub fn insert_raw(&self, xml: &str) -> String {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("container-{next}")
        };
        self.entries.lock().unwrap().push(ContainerEntry { id: id.clone(), xml: xml.to_string() });
        id
    }

    pub fn entries(&self) -> Vec<ContainerEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MetadataContainers for MemoryContainers {
    async fn add(&self, xml: &str) -> HostResult<String> {
        if self.faulty(ContainerFault::Unavailable) {
            return Err(HostError::unavailable("customXmlParts.add", "context lost"));
        }
        if self.faulty(ContainerFault::Add) {
            return Err(HostError::rejected("customXmlParts.add", "write refused"));
        }
        Ok(self.insert_raw(xml))
    }

    async fn list(&self) -> HostResult<Vec<ContainerEntry>> {
        if self.faulty(ContainerFault::Unavailable) {
            return Err(HostError::unavailable("customXmlParts.list", "context lost"));
        }
        Ok(self.entries())
    }

    async fn delete(&self, id: &str) -> HostResult<()> {
        if self.faulty(ContainerFault::Unavailable) {
            return Err(HostError::unavailable("customXmlParts.delete", "context lost"));
        }
        if self.faulty(ContainerFault::Delete) {
            return Err(HostError::rejected("customXmlParts.delete", "delete refused"));
        }
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Err(HostError::rejected("customXmlParts.delete", format!("no container {id}")));
        }
        Ok(())
    }
}

// =============================================================================
// SLIDES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlideFault {
    Tags,
    NativeImage,
    SelectedData,
    Clipboard,
    Delete,
    /// Current-slide shape queries fail.
    ShapeQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementPath {
    NativeImage,
    SelectedData,
}

#[derive(Debug, Clone)]
pub struct Placement {
    pub path: PlacementPath,
    pub geometry: Geometry,
    pub png_base64: String,
}

#[derive(Debug, Clone)]
struct SlideArtifact {
    slide: usize,
    artifact: Artifact,
}

#[derive(Default)]
struct SlideState {
    slide_size: (f64, f64),
    current_slide: usize,
    artifacts: Vec<SlideArtifact>,
    /// Placed but not yet visible to queries, with the reads left before they appear.
    unsettled: Vec<(SlideArtifact, usize)>,
    settle_lag: usize,
    selected: Vec<String>,
    clipboard: Option<String>,
    placements: Vec<Placement>,
    next_id: u64,
}

impl SlideState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("shape-{}", self.next_id)
    }

    /// Age unsettled placements by one read and publish the ones that are due.
    fn settle(&mut self) {
        let mut still_pending = Vec::new();
        for (artifact, reads_left) in self.unsettled.drain(..) {
            if reads_left == 0 {
                self.artifacts.push(artifact);
            } else {
                still_pending.push((artifact, reads_left - 1));
            }
        }
        self.unsettled = still_pending;
    }

    fn place(&mut self, path: PlacementPath, png_base64: &str, geometry: Geometry) {
        let id = self.next_id();
        let artifact = SlideArtifact {
            slide: self.current_slide,
            artifact: Artifact { id, name: format!("Picture {}", self.next_id), geometry, tags: BTreeMap::new() },
        };
        self.unsettled.push((artifact, self.settle_lag));
        self.placements.push(Placement { path, geometry, png_base64: png_base64.to_string() });
    }
}

pub struct MemorySlides {
    state: Mutex<SlideState>,
    faults: Mutex<HashSet<SlideFault>>,
}

impl MemorySlides {
    /// A 720×540 deck with one empty slide.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlideState { slide_size: (720.0, 540.0), ..SlideState::default() }),
            faults: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail(&self, fault: SlideFault) {
        self.faults.lock().unwrap().insert(fault);
    }

    pub fn heal(&self, fault: SlideFault) {
        self.faults.lock().unwrap().remove(&fault);
    }

    fn faulty(&self, fault: SlideFault) -> bool {
        self.faults.lock().unwrap().contains(&fault)
    }

    /// New placements stay invisible for `reads` artifact queries.
    pub fn set_settle_lag(&self, reads: usize) {
        self.state.lock().unwrap().settle_lag = reads;
    }

    pub fn go_to_slide(&self, slide: usize) {
        self.state.lock().unwrap().current_slide = slide;
    }

    /// Seed a shape on the current slide.
    pub fn add_shape(&self, geometry: Geometry, tags: &[(&str, &str)]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let tags = tags.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        let artifact = Artifact { id: id.clone(), name: format!("Shape {}", state.next_id), geometry, tags };
        let slide = state.current_slide;
        state.artifacts.push(SlideArtifact { slide, artifact });
        id
    }

    /// Simulate the user deleting a shape.
    pub fn remove_shape(&self, id: &str) {
        self.state.lock().unwrap().artifacts.retain(|a| a.artifact.id != id);
    }

    pub fn select(&self, ids: &[&str]) {
        self.state.lock().unwrap().selected = ids.iter().map(|id| (*id).to_string()).collect();
    }

    pub fn shapes(&self) -> Vec<Artifact> {
        let mut state = self.state.lock().unwrap();
        state.settle();
        state.artifacts.iter().map(|a| a.artifact.clone()).collect()
    }

    pub fn shape(&self, id: &str) -> Option<Artifact> {
        self.shapes().into_iter().find(|a| a.id == id)
    }

    pub fn placements(&self) -> Vec<Placement> {
        self.state.lock().unwrap().placements.clone()
    }

    pub fn clipboard(&self) -> Option<String> {
        self.state.lock().unwrap().clipboard.clone()
    }
}

#[async_trait::async_trait]
impl SlideHost for MemorySlides {
    async fn slide_size(&self) -> HostResult<(f64, f64)> {
        Ok(self.state.lock().unwrap().slide_size)
    }

    async fn artifacts(&self) -> HostResult<Vec<Artifact>> {
        Ok(self.shapes())
    }

    async fn current_slide_artifacts(&self) -> HostResult<Vec<Artifact>> {
        if self.faulty(SlideFault::ShapeQuery) {
            return Err(HostError::unavailable("slide.shapes.load", "object model busy"));
        }
        let mut state = self.state.lock().unwrap();
        state.settle();
        let current = state.current_slide;
        Ok(state.artifacts.iter().filter(|a| a.slide == current).map(|a| a.artifact.clone()).collect())
    }

    async fn selected_artifacts(&self) -> HostResult<Vec<Artifact>> {
        let mut state = self.state.lock().unwrap();
        state.settle();
        let selected = state.selected.clone();
        Ok(state
            .artifacts
            .iter()
            .filter(|a| selected.contains(&a.artifact.id))
            .map(|a| a.artifact.clone())
            .collect())
    }

    async fn add_image(&self, png_base64: &str, geometry: Geometry) -> HostResult<()> {
        if self.faulty(SlideFault::NativeImage) {
            return Err(HostError::rejected("shapes.addImage", "image rejected"));
        }
        self.state.lock().unwrap().place(PlacementPath::NativeImage, png_base64, geometry);
        Ok(())
    }

    async fn insert_selected_image(&self, png_base64: &str, geometry: Geometry) -> HostResult<()> {
        if self.faulty(SlideFault::SelectedData) {
            return Err(HostError::rejected("setSelectedDataAsync", "coercion failed"));
        }
        self.state.lock().unwrap().place(PlacementPath::SelectedData, png_base64, geometry);
        Ok(())
    }

    async fn copy_image_to_clipboard(&self, png_base64: &str) -> HostResult<()> {
        if self.faulty(SlideFault::Clipboard) {
            return Err(HostError::rejected("clipboard.write", "permission denied"));
        }
        self.state.lock().unwrap().clipboard = Some(png_base64.to_string());
        Ok(())
    }

    async fn set_tag(&self, artifact_id: &str, key: &str, value: &str) -> HostResult<()> {
        if self.faulty(SlideFault::Tags) {
            return Err(HostError::rejected("tags.add", "tags are not supported on this shape"));
        }
        let mut state = self.state.lock().unwrap();
        let artifact = state
            .artifacts
            .iter_mut()
            .find(|a| a.artifact.id == artifact_id)
            .ok_or_else(|| HostError::rejected("tags.add", format!("no shape {artifact_id}")))?;
        artifact.artifact.tags.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_artifact(&self, artifact_id: &str) -> HostResult<()> {
        if self.faulty(SlideFault::Delete) {
            return Err(HostError::rejected("shape.delete", "delete refused"));
        }
        let mut state = self.state.lock().unwrap();
        let before = state.artifacts.len();
        state.artifacts.retain(|a| a.artifact.id != artifact_id);
        if state.artifacts.len() == before {
            return Err(HostError::rejected("shape.delete", format!("no shape {artifact_id}")));
        }
        state.selected.retain(|id| id != artifact_id);
        Ok(())
    }
}

// =============================================================================
// DOCUMENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFault {
    PageSetup,
    Insert,
    Description,
    Listeners,
}

#[derive(Debug, Clone)]
pub struct PictureInsert {
    pub picture_id: String,
    pub location: InsertLocation,
    pub png_base64: String,
}

#[derive(Default)]
struct DocumentState {
    page: Option<PageSetup>,
    pictures: Vec<InlinePicture>,
    selected: Vec<String>,
    selection_has_text: bool,
    listeners: HashMap<u64, SelectionListener>,
    next_listener: u64,
    next_picture: u64,
    inserts: Vec<PictureInsert>,
}

pub struct MemoryDocument {
    state: Mutex<DocumentState>,
    faults: Mutex<HashSet<DocumentFault>>,
}

impl MemoryDocument {
    /// A letter-size document with one-inch margins.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DocumentState { page: Some(PageSetup::letter()), ..DocumentState::default() }),
            faults: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail(&self, fault: DocumentFault) {
        self.faults.lock().unwrap().insert(fault);
    }

    pub fn heal(&self, fault: DocumentFault) {
        self.faults.lock().unwrap().remove(&fault);
    }

    fn faulty(&self, fault: DocumentFault) -> bool {
        self.faults.lock().unwrap().contains(&fault)
    }

    pub fn set_page_setup(&self, page: PageSetup) {
        self.state.lock().unwrap().page = Some(page);
    }

    pub fn set_selection_text(&self, has_text: bool) {
        self.state.lock().unwrap().selection_has_text = has_text;
    }

    /// Seed a picture that was not placed by the engine.
    pub fn add_picture(&self, description: Option<&str>) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_picture += 1;
        let id = format!("picture-{}", state.next_picture);
        state.pictures.push(InlinePicture {
            id: id.clone(),
            width: 200.0,
            height: 100.0,
            description: description.map(str::to_string),
        });
        id
    }

    pub fn remove_picture(&self, id: &str) {
        self.state.lock().unwrap().pictures.retain(|p| p.id != id);
    }

    pub fn select_picture(&self, id: Option<&str>) {
        self.state.lock().unwrap().selected = id.map(|id| vec![id.to_string()]).unwrap_or_default();
    }

    pub fn pictures(&self) -> Vec<InlinePicture> {
        self.state.lock().unwrap().pictures.clone()
    }

    pub fn inserts(&self) -> Vec<PictureInsert> {
        self.state.lock().unwrap().inserts.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().listeners.len()
    }

    /// Invoke every registered selection listener, outside the state lock.
    pub fn fire_selection_changed(&self) {
        let listeners: Vec<SelectionListener> = self.state.lock().unwrap().listeners.values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

#[async_trait::async_trait]
impl DocumentHost for MemoryDocument {
    async fn page_setup(&self) -> HostResult<PageSetup> {
        if self.faulty(DocumentFault::PageSetup) {
            return Err(HostError::unavailable("section.pageSetup", "section not loaded"));
        }
        self.state
            .lock()
            .unwrap()
            .page
            .ok_or_else(|| HostError::unsupported("section.pageSetup", "no page setup"))
    }

    async fn selection_has_text(&self) -> HostResult<bool> {
        Ok(self.state.lock().unwrap().selection_has_text)
    }

    async fn selected_inline_pictures(&self) -> HostResult<Vec<InlinePicture>> {
        let state = self.state.lock().unwrap();
        Ok(state.pictures.iter().filter(|p| state.selected.contains(&p.id)).cloned().collect())
    }

    async fn inline_pictures(&self) -> HostResult<Vec<InlinePicture>> {
        Ok(self.pictures())
    }

    async fn insert_inline_picture(
        &self,
        png_base64: &str,
        width: f64,
        height: f64,
        location: InsertLocation,
    ) -> HostResult<InlinePicture> {
        if self.faulty(DocumentFault::Insert) {
            return Err(HostError::rejected("insertInlinePictureFromBase64", "selection is not editable"));
        }
        let mut state = self.state.lock().unwrap();
        state.next_picture += 1;
        let picture =
            InlinePicture { id: format!("picture-{}", state.next_picture), width, height, description: None };
        state.pictures.push(picture.clone());
        state.inserts.push(PictureInsert {
            picture_id: picture.id.clone(),
            location,
            png_base64: png_base64.to_string(),
        });
        Ok(picture)
    }

    async fn set_description(&self, picture_id: &str, description: &str) -> HostResult<()> {
        if self.faulty(DocumentFault::Description) {
            return Err(HostError::rejected("inlinePicture.altTextDescription", "read-only"));
        }
        let mut state = self.state.lock().unwrap();
        let picture = state
            .pictures
            .iter_mut()
            .find(|p| p.id == picture_id)
            .ok_or_else(|| HostError::rejected("inlinePicture.altTextDescription", "no such picture"))?;
        picture.description = Some(description.to_string());
        Ok(())
    }

    async fn add_selection_listener(&self, listener: SelectionListener) -> HostResult<ListenerId> {
        if self.faulty(DocumentFault::Listeners) {
            return Err(HostError::unsupported("addHandlerAsync", "selection events unavailable"));
        }
        let mut state = self.state.lock().unwrap();
        state.next_listener += 1;
        let id = state.next_listener;
        state.listeners.insert(id, listener);
        Ok(ListenerId(id))
    }

    async fn remove_selection_listener(&self, id: ListenerId) -> HostResult<()> {
        if self.faulty(DocumentFault::Listeners) {
            return Err(HostError::unsupported("removeHandlerAsync", "selection events unavailable"));
        }
        self.state.lock().unwrap().listeners.remove(&id.0);
        Ok(())
    }
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

pub struct MemoryEnvironment {
    pub info: HostInfo,
    pub containers: Option<Arc<MemoryContainers>>,
    pub slides: Option<Arc<MemorySlides>>,
    pub document: Option<Arc<MemoryDocument>>,
}

impl MemoryEnvironment {
    pub fn presentation() -> Self {
        Self {
            info: presentation_info(),
            containers: Some(MemoryContainers::new()),
            slides: Some(MemorySlides::new()),
            document: None,
        }
    }

    pub fn document() -> Self {
        Self {
            info: document_info(),
            containers: Some(MemoryContainers::new()),
            slides: None,
            document: Some(MemoryDocument::new()),
        }
    }

    pub fn store_containers(&self) -> Arc<MemoryContainers> {
        Arc::clone(self.containers.as_ref().unwrap())
    }

    pub fn slide_host(&self) -> Arc<MemorySlides> {
        Arc::clone(self.slides.as_ref().unwrap())
    }

    pub fn document_host(&self) -> Arc<MemoryDocument> {
        Arc::clone(self.document.as_ref().unwrap())
    }
}

impl HostEnvironment for MemoryEnvironment {
    fn info(&self) -> HostInfo {
        self.info.clone()
    }

    fn containers(&self) -> Option<Arc<dyn MetadataContainers>> {
        self.containers.clone().map(|c| c as Arc<dyn MetadataContainers>)
    }

    fn slides(&self) -> Option<Arc<dyn SlideHost>> {
        self.slides.clone().map(|s| s as Arc<dyn SlideHost>)
    }

    fn document(&self) -> Option<Arc<dyn DocumentHost>> {
        self.document.clone().map(|d| d as Arc<dyn DocumentHost>)
    }
}

// =============================================================================
// RENDERER
// =============================================================================

pub const TEST_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100" viewBox="0 0 200 100"><rect width="200" height="100" fill="#ECECFF"/></svg>"##;

/// Accepts flowchart and sequence sources and renders a fixed 200×100 SVG.
#[derive(Default)]
pub struct MemoryRenderer {
    configs: Mutex<Vec<RenderConfig>>,
}

impl MemoryRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn configs(&self) -> Vec<RenderConfig> {
        self.configs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DiagramRenderer for MemoryRenderer {
    async fn render(&self, source: &str, config: &RenderConfig) -> Result<String, RenderFailure> {
        self.configs.lock().unwrap().push(config.clone());
        let first = source.split_whitespace().next().unwrap_or_default();
        if matches!(first, "graph" | "flowchart" | "sequenceDiagram") {
            Ok(TEST_SVG.to_string())
        } else {
            Err(RenderFailure::Syntax(format!("Parse error on line 1: unknown diagram type '{first}'")))
        }
    }
}
