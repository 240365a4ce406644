//! Filesystem-backed artifact storage: content a
//! task produces that outlives the task's message history — generated
//! files, reports, structured data blobs.

pub mod service;

pub use service::{ArtifactService, FsArtifactService};
