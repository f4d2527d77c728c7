//! Storage subsystem
//!
//! This module covers the HLS artifacts the transcoder writes to disk: naming, reading them
//! back for clients, deleting them when a session ends, and sweeping leftovers.
//!
//! Components:
//! - `artifact`: file naming rules and artifact metadata.
//! - `storage_trait`: the ArtifactStorage trait defining a uniform API.
//! - `file_storage`: filesystem-backed implementation over the output directory.
//! - `artifact_gateway`: serves artifacts of live sessions only.
//! - `janitor`: periodic age-based cleanup.

pub mod artifact;
pub mod artifact_gateway;
pub mod file_storage;
pub mod janitor;
pub mod storage_trait;

pub use artifact::{Artifact, ArtifactKind};
pub use artifact_gateway::{ArtifactGateway, ArtifactRequest, ServedArtifact};
pub use file_storage::FileStorage;
pub use janitor::{Janitor, JanitorHandle};
pub use storage_trait::ArtifactStorage;
