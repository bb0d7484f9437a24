//! Presentation-host inserter.
//!
//! DESIGN
//! ======
//! Placement tiers, best first:
//! 1. `NativeImage`: native image shape at an explicit position.
//! 2. `SelectedData`: the "set selected data" image primitive.
//! 3. `Clipboard`: copy the image and ask the user to paste (insert only).
//!
//! Neither placement primitive returns a handle. The current slide's shape
//! ids are snapshotted before placing, then polled (bounded by
//! `settle_timeout`) for the newest untagged shape outside that snapshot.
//! If none appears, or the snapshot could not be read, nothing is tagged and
//! the record keeps the placement geometry as a hint.
//!
//! Update scans the current slide for shapes tagged with the diagram id.
//! The new raster is produced before the old shape is deleted; if placement
//! still fails after the delete, the shape is lost but the record survives.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{DiagramInserter, InFlight, InventoryEntry, Outcome, Presence, placement_error, requirement_detail};
use crate::config::EngineConfig;
use crate::error::{EmbedError, HostError};
use crate::geometry::{Geometry, fit_aspect, fit_within};
use crate::host::{Artifact, SlideHost};
use crate::matcher::{best_match, geometry_matches};
use crate::platform::{Capability, HostInfo, HostKind};
use crate::raster::{Background, RasterAsset, parse_svg_dimensions, rasterize};
use crate::record::DiagramRecord;
use crate::store::DiagramStore;
use crate::tagger::{self, TagOutcome};

const CLIPBOARD_INSTRUCTIONS: &str =
    "The diagram image was copied to the clipboard. Click the slide and paste (Ctrl+V / Cmd+V) to place it.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementTier {
    NativeImage,
    SelectedData,
    Clipboard,
}

impl PlacementTier {
    fn capability(self) -> Capability {
        match self {
            Self::NativeImage => Capability::ImageShapes,
            Self::SelectedData => Capability::SelectedDataImage,
            Self::Clipboard => Capability::Clipboard,
        }
    }
}

const INSERT_TIERS: [PlacementTier; 3] =
    [PlacementTier::NativeImage, PlacementTier::SelectedData, PlacementTier::Clipboard];
const UPDATE_TIERS: [PlacementTier; 2] = [PlacementTier::NativeImage, PlacementTier::SelectedData];

pub struct PresentationInserter {
    slides: Arc<dyn SlideHost>,
    store: DiagramStore,
    info: HostInfo,
    config: EngineConfig,
    in_flight: InFlight,
}

impl PresentationInserter {
    #[must_use]
    pub fn new(slides: Arc<dyn SlideHost>, store: DiagramStore, info: HostInfo, config: EngineConfig) -> Self {
        Self { slides, store, info, config, in_flight: InFlight::default() }
    }

    /// Offset from the slide corner, scaled down to fit the slide.
    async fn initial_geometry(&self, asset: &RasterAsset) -> Geometry {
        let offset = self.config.placement_offset;
        let (slide_width, slide_height) = self.slides.slide_size().await.unwrap_or_else(|err| {
            warn!(error = %err, "slide size unavailable; assuming 4:3");
            (720.0, 540.0)
        });
        let scale = self.config.raster.natural_scale;
        let size = fit_within(
            f64::from(asset.pixel_width) / scale,
            f64::from(asset.pixel_height) / scale,
            slide_width - 2.0 * offset,
            slide_height - 2.0 * offset,
        );
        Geometry::new(offset, offset, size.width, size.height)
    }

    /// Ids of the shapes on the current slide, taken before a placement.
    async fn snapshot(&self) -> Option<HashSet<String>> {
        match self.slides.current_slide_artifacts().await {
            Ok(artifacts) => Some(artifacts.into_iter().map(|a| a.id).collect()),
            Err(err) => {
                warn!(error = %err, "could not read shapes before placement; new shape will not be tagged");
                None
            }
        }
    }

    /// The shape created by the last placement: the newest shape absent from
    /// `before` that carries no diagram id. `None` if it does not show up in time.
    async fn settled_artifact(&self, before: &HashSet<String>) -> Option<Artifact> {
        let deadline = Instant::now() + self.config.settle_timeout;
        loop {
            match self.slides.current_slide_artifacts().await {
                Ok(artifacts) => {
                    let placed = artifacts
                        .into_iter()
                        .rev()
                        .find(|a| !before.contains(&a.id) && tagger::tagged_id(a).is_none());
                    if placed.is_some() {
                        return placed;
                    }
                }
                Err(err) => warn!(error = %err, "shape query failed while settling"),
            }
            if Instant::now() >= deadline {
                warn!(shapes_before = before.len(), "placed shape did not appear in time");
                return None;
            }
            tokio::time::sleep(self.config.settle_poll).await;
        }
    }

    /// Tag the placed shape and return the tag outcome with its last known
    /// geometry. A shape that cannot be told apart from pre-existing ones is
    /// never tagged.
    async fn identify(
        &self,
        before: Option<&HashSet<String>>,
        placed_at: Geometry,
        diagram_id: &str,
    ) -> (TagOutcome, Geometry) {
        let settled = match before {
            Some(before) => self.settled_artifact(before).await,
            None => None,
        };
        match settled {
            Some(artifact) => {
                let outcome = tagger::tag_artifact(self.slides.as_ref(), &self.info, &artifact, diagram_id).await;
                (outcome, artifact.geometry)
            }
            None => {
                warn!(diagram_id, "placed shape not identified; keeping placement geometry");
                (TagOutcome::TaggedByGeometry(placed_at), placed_at)
            }
        }
    }

    /// Pick the shape to replace among those tagged `id`.
    async fn locate(&self, id: &str, hint: Option<Geometry>) -> Result<Artifact, EmbedError> {
        let shapes = self.slides.current_slide_artifacts().await?;
        let mut candidates = tagger::artifacts_tagged(&shapes, id);
        if candidates.len() > 1 {
            warn!(diagram_id = %id, count = candidates.len(), "several shapes carry the same diagram id");
            if let Some(found) = hint.and_then(|hint| best_match(&candidates, &hint, &self.config.matcher)) {
                return Ok(found.clone());
            }
        }
        if candidates.is_empty() {
            return Err(EmbedError::missing_artifact());
        }
        Ok(candidates.swap_remove(0))
    }
}

#[async_trait::async_trait]
impl DiagramInserter for PresentationInserter {
    fn kind(&self) -> HostKind {
        HostKind::Presentation
    }

    async fn insert(&self, source_code: &str, svg: &str) -> Result<Outcome, EmbedError> {
        let _guard = self.in_flight.enter()?;

        let asset = rasterize(svg, None, Background::Transparent, &self.config.raster).await?;
        let geometry = self.initial_geometry(&asset).await;
        let before = self.snapshot().await;

        let tier = self.place(&asset, geometry, &INSERT_TIERS).await?;
        if tier == PlacementTier::Clipboard {
            info!("diagram copied to clipboard for manual paste");
            return Ok(Outcome::SuccessWithInstructions { instructions: CLIPBOARD_INSTRUCTIONS.to_string() });
        }

        let mut record = DiagramRecord::new(source_code);
        let (outcome, last_geometry) = self.identify(before.as_ref(), geometry, &record.id).await;
        record.shape_tagged = outcome.shape_tagged();
        record.geometry_hint = Some(last_geometry);

        self.store.put(&record).await.map_err(EmbedError::after_placement)?;
        info!(diagram_id = %record.id, ?tier, shape_tagged = record.shape_tagged, "diagram inserted");
        Ok(Outcome::Success { diagram_id: record.id })
    }

    async fn update(&self, id: &str, source_code: &str, svg: &str) -> Result<Outcome, EmbedError> {
        let _guard = self.in_flight.enter()?;

        let existing = self.store.find(id).await?;
        let target = self.locate(id, existing.as_ref().and_then(|r| r.geometry_hint)).await?;
        let (svg_width, svg_height) = parse_svg_dimensions(svg).or_default();
        let size = fit_aspect(svg_width, svg_height, target.geometry.width, target.geometry.height);
        let geometry = Geometry::new(target.geometry.left, target.geometry.top, size.width, size.height);

        let asset = rasterize(svg, Some(size), Background::OpaqueWhite, &self.config.raster).await?;

        self.slides.delete_artifact(&target.id).await?;
        let before = self.snapshot().await;
        if let Err(err) = self.place(&asset, geometry, &UPDATE_TIERS).await {
            warn!(diagram_id = %id, error = %err, "replacement placement failed after delete; record kept");
            return Err(err);
        }

        let (outcome, last_geometry) = self.identify(before.as_ref(), geometry, id).await;
        let mut record = existing.unwrap_or_else(|| {
            warn!(diagram_id = %id, "tagged shape had no saved record; creating one");
            DiagramRecord { id: id.to_string(), ..DiagramRecord::new(source_code) }
        });
        record.revise(source_code);
        record.shape_tagged = outcome.shape_tagged();
        record.geometry_hint = Some(last_geometry);

        self.store.put(&record).await.map_err(EmbedError::after_placement)?;
        info!(diagram_id = %id, shape_tagged = record.shape_tagged, "diagram updated");
        Ok(Outcome::Success { diagram_id: record.id })
    }

    async fn recover_selected(&self) -> Result<Option<DiagramRecord>, EmbedError> {
        let selected = self.slides.selected_artifacts().await?;
        let [artifact] = selected.as_slice() else {
            debug!(count = selected.len(), "recovery needs exactly one selected shape");
            return Ok(None);
        };
        let Some(id) = tagger::tagged_id(artifact) else {
            debug!(artifact = %artifact.id, "selected shape carries no diagram id");
            return Ok(None);
        };
        let record = self.store.find(id).await?;
        if record.is_none() {
            warn!(diagram_id = %id, "tagged shape has no saved record");
        }
        Ok(record)
    }

    async fn inventory(&self) -> Result<Vec<InventoryEntry>, EmbedError> {
        let records = self.store.list().await?;
        let shapes = self.slides.artifacts().await?;
        let untagged: Vec<&Artifact> = shapes.iter().filter(|a| tagger::tagged_id(a).is_none()).collect();

        Ok(records
            .into_iter()
            .map(|record| {
                let presence = if let Some(shape) = shapes.iter().find(|a| tagger::tagged_id(a) == Some(record.id.as_str())) {
                    Presence::Tagged { artifact_id: shape.id.clone() }
                } else if let Some(shape) = record.geometry_hint.and_then(|hint| {
                    untagged.iter().find(|a| geometry_matches(&a.geometry, &hint, &self.config.matcher))
                }) {
                    Presence::Untagged { artifact_id: shape.id.clone() }
                } else {
                    Presence::Orphaned
                };
                InventoryEntry { record, presence }
            })
            .collect())
    }

    async fn describe_selection(&self) -> Result<String, EmbedError> {
        let selected = self.slides.selected_artifacts().await?;
        let [artifact] = selected.as_slice() else {
            return Ok(format!("{} shapes selected; select exactly one diagram.", selected.len()));
        };
        let g = artifact.geometry;
        let mut summary = format!(
            "{} ({}) at ({:.0}, {:.0}), {:.0}x{:.0} pt",
            artifact.name, artifact.id, g.left, g.top, g.width, g.height
        );
        match tagger::tagged_id(artifact) {
            Some(id) => {
                let saved = if self.store.find(id).await?.is_some() { "source saved" } else { "no saved source" };
                let _ = write!(summary, ", diagram {id}, {saved}");
            }
            None => summary.push_str(", not a tagged diagram"),
        }
        Ok(summary)
    }
}

#[cfg(test)]
#[path = "presentation_test.rs"]
mod tests;
