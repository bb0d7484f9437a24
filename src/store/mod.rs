//! Metadata store: diagram records and settings in document containers.
//!
//! DESIGN
//! ======
//! One container per block. The host primitive has no in-place mutation,
//! so `update` and `put` delete the old container(s) and add a new one.
//! That sequence is not atomic: a failure between the delete and the add
//! leaves the record absent, and callers must not assume durability until
//! the call returns `Ok`.
//!
//! ERROR HANDLING
//! ==============
//! Scans skip blocks that fail to decode (foreign or corrupt metadata)
//! instead of aborting. A container API that cannot be listed at all is
//! `StoreError::Unavailable` and is never retried here.

pub mod codec;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::host::{ContainerEntry, MetadataContainers};
use crate::record::DiagramRecord;
use crate::settings::Settings;
use codec::{Block, DecodeError};

// =============================================================================
// SCAN
// =============================================================================

/// A decoded block and the handle of the container holding it.
struct Stored<T> {
    container_id: String,
    value: T,
}

async fn scan(containers: &dyn MetadataContainers) -> Result<Vec<Stored<Block>>, StoreError> {
    let entries = containers.list().await.map_err(StoreError::Unavailable)?;
    Ok(entries.into_iter().filter_map(decode_entry).collect())
}

fn decode_entry(entry: ContainerEntry) -> Option<Stored<Block>> {
    match codec::decode_block(&entry.xml) {
        Ok(block) => Some(Stored { container_id: entry.id, value: block }),
        Err(DecodeError::Foreign) => {
            debug!(container = %entry.id, "skipping foreign metadata container");
            None
        }
        Err(err) => {
            warn!(container = %entry.id, error = %err, "skipping unreadable metadata container");
            None
        }
    }
}

async fn delete_all(containers: &dyn MetadataContainers, ids: &[String]) -> Result<(), StoreError> {
    for id in ids {
        containers.delete(id).await.map_err(StoreError::from_write)?;
    }
    Ok(())
}

// =============================================================================
// DIAGRAM STORE
// =============================================================================

/// CRUD over diagram records. Cheap to clone.
#[derive(Clone)]
pub struct DiagramStore {
    containers: Arc<dyn MetadataContainers>,
}

impl DiagramStore {
    #[must_use]
    pub fn new(containers: Arc<dyn MetadataContainers>) -> Self {
        Self { containers }
    }

    async fn records(&self) -> Result<Vec<Stored<DiagramRecord>>, StoreError> {
        let blocks = scan(self.containers.as_ref()).await?;
        Ok(blocks
            .into_iter()
            .filter_map(|stored| match stored.value {
                Block::Diagram(record) => Some(Stored { container_id: stored.container_id, value: record }),
                Block::Settings(_) => None,
            })
            .collect())
    }

    async fn containers_for(&self, id: &str) -> Result<(Option<DiagramRecord>, Vec<String>), StoreError> {
        let mut found = None;
        let mut container_ids = Vec::new();
        for stored in self.records().await? {
            if stored.value.id == id {
                container_ids.push(stored.container_id);
                found.get_or_insert(stored.value);
            }
        }
        Ok((found, container_ids))
    }

    /// Persist `record`, replacing any record already stored under its id.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the containers cannot be listed, `Write` if a delete
    /// or the final add fails.
    pub async fn put(&self, record: &DiagramRecord) -> Result<(), StoreError> {
        let (_, existing) = self.containers_for(&record.id).await?;
        delete_all(self.containers.as_ref(), &existing).await?;
        self.add(record).await
    }

    async fn add(&self, record: &DiagramRecord) -> Result<(), StoreError> {
        let xml = codec::encode_record(record);
        match self.containers.add(&xml).await {
            Ok(container_id) => {
                debug!(diagram_id = %record.id, container = %container_id, "diagram record saved");
                Ok(())
            }
            Err(err) => {
                warn!(diagram_id = %record.id, error = %err, "diagram record write failed; record is absent");
                Err(StoreError::from_write(err))
            }
        }
    }

    /// Look up a record.
    ///
    /// # Errors
    ///
    /// `NotFound` if no record has `id`.
    pub async fn get(&self, id: &str) -> Result<DiagramRecord, StoreError> {
        self.find(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Look up a record, `None` if absent.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the containers cannot be listed.
    pub async fn find(&self, id: &str) -> Result<Option<DiagramRecord>, StoreError> {
        Ok(self.records().await?.into_iter().map(|stored| stored.value).find(|record| record.id == id))
    }

    /// Every readable record, oldest first.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the containers cannot be listed.
    pub async fn list(&self) -> Result<Vec<DiagramRecord>, StoreError> {
        let mut records: Vec<DiagramRecord> = self.records().await?.into_iter().map(|stored| stored.value).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Replace the source text of `id`, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// `NotFound` (store untouched) if `id` is missing. `Write` if the
    /// delete or add fails; after a failed add the record is absent.
    pub async fn update(&self, id: &str, source_code: &str) -> Result<DiagramRecord, StoreError> {
        let (found, existing) = self.containers_for(id).await?;
        let mut record = found.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.revise(source_code);

        delete_all(self.containers.as_ref(), &existing).await?;
        self.add(&record).await?;
        Ok(record)
    }

    /// Remove `id` and return the removed record.
    ///
    /// # Errors
    ///
    /// `NotFound` if `id` is missing, `Write` if a delete fails.
    pub async fn delete(&self, id: &str) -> Result<DiagramRecord, StoreError> {
        let (found, existing) = self.containers_for(id).await?;
        let record = found.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        delete_all(self.containers.as_ref(), &existing).await?;
        debug!(diagram_id = %id, "diagram record deleted");
        Ok(record)
    }
}

// =============================================================================
// SETTINGS STORE
// =============================================================================

/// The single per-document settings block.
#[derive(Clone)]
pub struct SettingsStore {
    containers: Arc<dyn MetadataContainers>,
}

impl SettingsStore {
    #[must_use]
    pub fn new(containers: Arc<dyn MetadataContainers>) -> Self {
        Self { containers }
    }

    /// Stored settings, or defaults when the document has none.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the containers cannot be listed.
    pub async fn load(&self) -> Result<Settings, StoreError> {
        let settings = scan(self.containers.as_ref()).await?.into_iter().find_map(|stored| match stored.value {
            Block::Settings(settings) => Some(settings),
            Block::Diagram(_) => None,
        });
        Ok(settings.unwrap_or_default())
    }

    /// Replace the document's settings block.
    ///
    /// # Errors
    ///
    /// `Unavailable` or `Write` as for [`DiagramStore::put`].
    pub async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        let existing: Vec<String> = scan(self.containers.as_ref())
            .await?
            .into_iter()
            .filter(|stored| matches!(stored.value, Block::Settings(_)))
            .map(|stored| stored.container_id)
            .collect();
        delete_all(self.containers.as_ref(), &existing).await?;
        self.containers
            .add(&codec::encode_settings(settings))
            .await
            .map_err(StoreError::from_write)?;
        debug!(theme = %settings.theme, "settings saved");
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
