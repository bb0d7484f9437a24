//! Document-host inserter.
//!
//! DESIGN
//! ======
//! The host offers no insertion point the add-in can read synchronously, so
//! insertion has two phases:
//!
//! ```text
//!   insert()  ──► Awaiting ──► insert_at_current_position() ──► idle
//!                    │
//!                    └──────► exit_insertion_mode() ─────────► idle
//! ```
//!
//! Entering `Awaiting` registers one selection-change listener; both exits
//! remove it, whether placement succeeded or not. A second `insert()` while
//! awaiting first tears down the previous listener.
//!
//! Inline pictures carry no tags. The diagram id travels in the picture's
//! accessible description (see `tagger::description_with_token`).

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DiagramInserter, InFlight, InventoryEntry, Outcome, Presence, placement_error};
use crate::config::EngineConfig;
use crate::error::EmbedError;
use crate::geometry::{Geometry, PageSetup, TargetGeometry, compute_target_size};
use crate::host::{DocumentHost, InlinePicture, InsertLocation, ListenerId};
use crate::matcher::geometry_matches;
use crate::platform::{Capability, HostInfo, HostKind};
use crate::raster::{Background, parse_svg_dimensions, rasterize};
use crate::record::DiagramRecord;
use crate::store::DiagramStore;
use crate::tagger;

const AWAITING_INSTRUCTIONS: &str =
    "Click in the document where the diagram should go, then choose Insert here.";

/// State held between `insert` and its matching exit.
struct PendingInsertion {
    source_code: String,
    svg: String,
    target: TargetGeometry,
    listener: Option<ListenerId>,
}

pub struct DocumentInserter {
    document: Arc<dyn DocumentHost>,
    store: DiagramStore,
    info: HostInfo,
    config: EngineConfig,
    in_flight: InFlight,
    pending: Mutex<Option<PendingInsertion>>,
    selection_changes: Arc<AtomicU64>,
}

impl DocumentInserter {
    #[must_use]
    pub fn new(document: Arc<dyn DocumentHost>, store: DiagramStore, info: HostInfo, config: EngineConfig) -> Self {
        Self {
            document,
            store,
            info,
            config,
            in_flight: InFlight::default(),
            pending: Mutex::new(None),
            selection_changes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn is_awaiting_placement(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    /// Selection changes observed since the current insertion started.
    #[must_use]
    pub fn selection_changes(&self) -> u64 {
        self.selection_changes.load(Ordering::Relaxed)
    }

    /// Phase two: place the pending diagram at the current selection.
    ///
    /// # Errors
    ///
    /// `NoPendingInsertion` without a preceding `insert`; otherwise as for
    /// `update`. The insertion mode ends either way.
    pub async fn insert_at_current_position(&self) -> Result<Outcome, EmbedError> {
        let _guard = self.in_flight.enter()?;
        let pending = self.pending.lock().await.take().ok_or(EmbedError::NoPendingInsertion)?;

        let result = self.place_new(&pending).await;
        self.release_listener(pending.listener).await;
        result
    }

    /// Cancel a pending insertion. A no-op when nothing is pending.
    pub async fn exit_insertion_mode(&self) {
        let pending = self.pending.lock().await.take();
        if let Some(pending) = pending {
            debug!("leaving insertion mode");
            self.release_listener(pending.listener).await;
        }
    }

    async fn release_listener(&self, listener: Option<ListenerId>) {
        let Some(id) = listener else { return };
        if let Err(err) = self.document.remove_selection_listener(id).await {
            warn!(listener = id.0, error = %err, "selection listener could not be removed");
        }
    }

    async fn watch_selection(&self) -> Option<ListenerId> {
        if !self.info.supports(Capability::SelectionEvents) {
            debug!("selection events unsupported; waiting for explicit placement only");
            return None;
        }
        self.selection_changes.store(0, Ordering::Relaxed);
        let counter = Arc::clone(&self.selection_changes);
        let listener = Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        match self.document.add_selection_listener(listener).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "selection listener could not be registered");
                None
            }
        }
    }

    /// Page setup of the current section, or US Letter when unreadable.
    async fn page_setup(&self) -> PageSetup {
        match self.document.page_setup().await {
            Ok(page) if page.printable_area().is_some() => page,
            Ok(page) => {
                warn!(?page, "page has no printable area; using letter defaults");
                PageSetup::letter()
            }
            Err(err) => {
                warn!(error = %err, "page setup unavailable; using letter defaults");
                PageSetup::letter()
            }
        }
    }

    async fn target_for(&self, svg: &str) -> TargetGeometry {
        let (svg_width, svg_height) = parse_svg_dimensions(svg).or_default();
        compute_target_size(svg_width, svg_height, &self.page_setup().await)
    }

    async fn insert_location(&self) -> InsertLocation {
        match self.document.selection_has_text().await {
            Ok(true) => InsertLocation::After,
            Ok(false) => InsertLocation::Replace,
            Err(err) => {
                warn!(error = %err, "selection unreadable; inserting at the cursor");
                InsertLocation::Replace
            }
        }
    }

    async fn insert_picture(&self, png_base64: &str, target: TargetGeometry) -> Result<InlinePicture, EmbedError> {
        let location = self.insert_location().await;
        self.document
            .insert_inline_picture(png_base64, target.width, target.height, location)
            .await
            .map_err(|err| placement_error(Capability::InlinePictures, &err))
    }

    async fn place_new(&self, pending: &PendingInsertion) -> Result<Outcome, EmbedError> {
        let asset = rasterize(&pending.svg, Some(pending.target), Background::OpaqueWhite, &self.config.raster).await?;
        let picture = self.insert_picture(&asset.pixel_data, pending.target).await?;

        let mut record = DiagramRecord::new(pending.source_code.as_str());
        let outcome = tagger::tag_inline_picture(self.document.as_ref(), &picture, &record.id).await;
        record.shape_tagged = outcome.shape_tagged();
        record.geometry_hint = outcome.geometry_hint();

        self.store.put(&record).await.map_err(EmbedError::after_placement)?;
        info!(diagram_id = %record.id, shape_tagged = record.shape_tagged, "diagram inserted");
        Ok(Outcome::Success { diagram_id: record.id })
    }
}

#[async_trait::async_trait]
impl DiagramInserter for DocumentInserter {
    fn kind(&self) -> HostKind {
        HostKind::Document
    }

    /// Phase one: remember the diagram and wait for the user to pick a spot.
    async fn insert(&self, source_code: &str, svg: &str) -> Result<Outcome, EmbedError> {
        let _guard = self.in_flight.enter()?;
        self.exit_insertion_mode().await;

        let target = self.target_for(svg).await;
        let listener = self.watch_selection().await;
        *self.pending.lock().await = Some(PendingInsertion {
            source_code: source_code.to_string(),
            svg: svg.to_string(),
            target,
            listener,
        });
        debug!(width = target.width, height = target.height, "awaiting placement");
        Ok(Outcome::AwaitingUserAction { instructions: AWAITING_INSTRUCTIONS.to_string() })
    }

    async fn update(&self, id: &str, source_code: &str, svg: &str) -> Result<Outcome, EmbedError> {
        let _guard = self.in_flight.enter()?;

        let previous = self.store.get(id).await?;
        let target = self.target_for(svg).await;
        let asset = rasterize(svg, Some(target), Background::OpaqueWhite, &self.config.raster).await?;

        self.store.delete(id).await?;
        let picture = match self.insert_picture(&asset.pixel_data, target).await {
            Ok(picture) => picture,
            Err(err) => return Err(self.restore_after_failed_update(&previous, err).await),
        };

        let outcome = tagger::tag_inline_picture(self.document.as_ref(), &picture, id).await;
        let mut record = previous;
        record.revise(source_code);
        record.shape_tagged = outcome.shape_tagged();
        record.geometry_hint = outcome.geometry_hint();

        self.store.put(&record).await.map_err(EmbedError::after_placement)?;
        info!(diagram_id = %id, shape_tagged = record.shape_tagged, "diagram updated");
        Ok(Outcome::Success { diagram_id: record.id })
    }

    async fn recover_selected(&self) -> Result<Option<DiagramRecord>, EmbedError> {
        let selected = self.document.selected_inline_pictures().await?;
        let Some(picture) = selected.first() else {
            debug!("no inline picture selected");
            return Ok(None);
        };
        let Some(id) = tagger::picture_id(picture) else {
            debug!(picture = %picture.id, "selected picture carries no diagram id");
            return Ok(None);
        };
        Ok(self.store.find(id).await?)
    }

    async fn inventory(&self) -> Result<Vec<InventoryEntry>, EmbedError> {
        let records = self.store.list().await?;
        let pictures = self.document.inline_pictures().await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let presence = if let Some(picture) =
                    pictures.iter().find(|p| tagger::picture_id(p) == Some(record.id.as_str()))
                {
                    Presence::Tagged { artifact_id: picture.id.clone() }
                } else if let Some(picture) = record.geometry_hint.and_then(|hint| {
                    pictures.iter().filter(|p| tagger::picture_id(p).is_none()).find(|p| {
                        geometry_matches(&Geometry::new(0.0, 0.0, p.width, p.height), &hint, &self.config.matcher)
                    })
                }) {
                    Presence::Untagged { artifact_id: picture.id.clone() }
                } else {
                    Presence::Orphaned
                };
                InventoryEntry { record, presence }
            })
            .collect())
    }

    async fn describe_selection(&self) -> Result<String, EmbedError> {
        let selected = self.document.selected_inline_pictures().await?;
        let Some(picture) = selected.first() else {
            return Ok("No picture selected.".to_string());
        };
        let mut summary = format!("Picture {} {:.0}x{:.0} pt", picture.id, picture.width, picture.height);
        match tagger::picture_id(picture) {
            Some(id) => {
                let saved = if self.store.find(id).await?.is_some() { "source saved" } else { "no saved source" };
                let _ = write!(summary, ", diagram {id}, {saved}");
            }
            None => summary.push_str(", not a tagged diagram"),
        }
        if selected.len() > 1 {
            let _ = write!(summary, " (+{} more selected)", selected.len() - 1);
        }
        Ok(summary)
    }
}

impl DocumentInserter {
    /// Put the old record back after a failed replacement and report whether that worked.
    async fn restore_after_failed_update(&self, previous: &DiagramRecord, err: EmbedError) -> EmbedError {
        let restored = match self.store.put(previous).await {
            Ok(()) => true,
            Err(restore_err) => {
                warn!(diagram_id = %previous.id, error = %restore_err, "saved source could not be restored");
                false
            }
        };
        warn!(diagram_id = %previous.id, restored, error = %err, "replacement picture was not inserted");
        match err {
            EmbedError::Placement { detail, advice } => {
                let state = if restored { "the saved source was kept" } else { "the saved source was lost" };
                EmbedError::Placement { detail: format!("{detail}; {state}"), advice }
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[path = "document_test.rs"]
mod tests;
