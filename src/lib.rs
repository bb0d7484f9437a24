//! Diagram identity and lifecycle engine for Mermaid diagrams embedded in
//! presentation and document hosts.
//!
//! A diagram is rendered to SVG by a [`host::DiagramRenderer`], rasterized,
//! placed into the host, tagged with a durable id, and its source text is
//! stored in the document's metadata containers under that id. Selecting
//! the placed picture later recovers the source for editing.

pub mod config;
pub mod error;
pub mod geometry;
pub mod host;
pub mod inserter;
pub mod matcher;
pub mod platform;
pub mod raster;
pub mod record;
pub mod session;
pub mod settings;
pub mod store;
pub mod tagger;

pub use config::EngineConfig;
pub use error::{EmbedError, ErrorCode, HostError, StoreError};
pub use inserter::{DiagramInserter, Inserter, Outcome};
pub use record::DiagramRecord;
pub use session::EditorSession;
pub use settings::Settings;
