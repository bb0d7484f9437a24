//! Diagram records: the source text persisted for each embedded diagram.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::geometry::Geometry;

const ID_PREFIX: &str = "mermaid-";

/// Fresh document-unique diagram id.
#[must_use]
pub fn new_diagram_id() -> String {
    format!("{ID_PREFIX}{}", Uuid::new_v4().simple())
}

/// Source text and identity of one embedded diagram.
///
/// Created when a raster is inserted, rewritten on edit (id and
/// `created_at` preserved), never deleted automatically. A record whose
/// artifact was removed from the document simply becomes unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramRecord {
    pub id: String,
    pub source_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Whether a native tag (or description token) carries the id.
    pub shape_tagged: bool,
    /// Last known position and size; matcher input only, never used to
    /// recover a diagram from a selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_hint: Option<Geometry>,
}

impl DiagramRecord {
    #[must_use]
    pub fn new(source_code: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: new_diagram_id(),
            source_code: source_code.into(),
            created_at: now,
            updated_at: now,
            shape_tagged: false,
            geometry_hint: None,
        }
    }

    /// Replace the source text and bump `updated_at`, keeping the id.
    pub fn revise(&mut self, source_code: impl Into<String>) {
        self.source_code = source_code.into();
        self.updated_at = OffsetDateTime::now_utc();
    }
}
