//! Editor session: the transient per-panel state between user actions.
//!
//! DESIGN
//! ======
//! The document owns every persisted value. A session holds copies only:
//! the settings loaded at open, and the id of the diagram being edited
//! (set by `load_selected` or a completed insert, cleared by
//! `new_diagram`). `apply` uses that id to choose update over insert.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::EmbedError;
use crate::host::{DiagramRenderer, HostEnvironment};
use crate::inserter::{DiagramInserter, Inserter, Outcome};
use crate::platform::Capability;
use crate::record::DiagramRecord;
use crate::settings::Settings;
use crate::store::SettingsStore;

pub struct EditorSession {
    inserter: Inserter,
    renderer: Arc<dyn DiagramRenderer>,
    settings_store: SettingsStore,
    settings: Settings,
    current: Option<String>,
}

impl EditorSession {
    /// Build the inserter for the running host and load document settings.
    ///
    /// # Errors
    ///
    /// Any error from [`Inserter::from_environment`].
    pub async fn open(
        env: &dyn HostEnvironment,
        renderer: Arc<dyn DiagramRenderer>,
        config: EngineConfig,
    ) -> Result<Self, EmbedError> {
        let inserter = Inserter::from_environment(env, config)?;
        let containers = env.containers().ok_or_else(|| EmbedError::HostCapabilityUnavailable {
            capability: Capability::MetadataContainers.describe(),
            detail: "no metadata container surface".to_string(),
        })?;
        let settings_store = SettingsStore::new(containers);
        let settings = settings_store.load().await.unwrap_or_else(|err| {
            warn!(error = %err, "settings unreadable; using defaults");
            Settings::default()
        });
        debug!(theme = %settings.theme, host = %inserter.kind(), "editor session opened");
        Ok(Self { inserter, renderer, settings_store, settings, current: None })
    }

    #[must_use]
    pub fn inserter(&self) -> &Inserter {
        &self.inserter
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Id of the diagram the next `apply` will update, if any.
    #[must_use]
    pub fn current_diagram(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Persist `settings` to the document and use them for later renders.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` or `Persistence` when the settings block cannot be written.
    pub async fn save_settings(&mut self, mut settings: Settings) -> Result<(), EmbedError> {
        settings.set_font_size(settings.font_size);
        self.settings_store.save(&settings).await?;
        self.settings = settings;
        Ok(())
    }

    /// Render `source` to SVG with the session settings.
    ///
    /// # Errors
    ///
    /// `Render` carrying the renderer's message verbatim.
    pub async fn render(&self, source: &str) -> Result<String, EmbedError> {
        Ok(self.renderer.render(source, &self.settings.render_config()).await?)
    }

    /// Recover the selected diagram and make it the one being edited.
    ///
    /// # Errors
    ///
    /// Host or store failures while reading the selection.
    pub async fn load_selected(&mut self) -> Result<Option<DiagramRecord>, EmbedError> {
        let record = self.inserter.recover_selected().await?;
        self.current = record.as_ref().map(|r| r.id.clone());
        Ok(record)
    }

    /// Render `source` and insert it, or update the diagram being edited.
    ///
    /// # Errors
    ///
    /// Rendering, placement and persistence errors from the inserter.
    pub async fn apply(&mut self, source: &str) -> Result<Outcome, EmbedError> {
        let svg = self.render(source).await?;
        let outcome = match self.current.as_deref() {
            Some(id) => self.inserter.update(id, source, &svg).await?,
            None => self.inserter.insert(source, &svg).await?,
        };
        self.remember(&outcome);
        Ok(outcome)
    }

    /// Finish a pending document-host insertion at the current selection.
    ///
    /// # Errors
    ///
    /// `NoPendingInsertion` on presentation hosts or without a pending insert.
    pub async fn place_pending(&mut self) -> Result<Outcome, EmbedError> {
        let document = self.inserter.as_document().ok_or(EmbedError::NoPendingInsertion)?;
        let outcome = document.insert_at_current_position().await?;
        self.remember(&outcome);
        Ok(outcome)
    }

    /// Start editing a fresh diagram, cancelling any pending placement.
    pub async fn new_diagram(&mut self) {
        self.current = None;
        if let Some(document) = self.inserter.as_document() {
            document.exit_insertion_mode().await;
        }
    }

    fn remember(&mut self, outcome: &Outcome) {
        if let Some(id) = outcome.diagram_id() {
            self.current = Some(id.to_string());
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
