//! Content-addressable asset store for a project folder.
//!
//! Reference inputs are stored once per content hash, generated outputs
//! get a shared timestamp base name with companion thumbnails and one
//! provenance sidecar per batch, and deleting the last output of a
//! batch reclaims its sidecar.

pub mod outputs;
pub mod provenance;
pub mod reclamation;
pub mod references;
pub mod store;

pub use provenance::Provenance;
pub use store::{AssetStore, StoredBatch};
