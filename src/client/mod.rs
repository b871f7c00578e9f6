//! Client seams: the Docker Engine adapter, the local host adapter, and the
//! deterministic in-memory fakes used by tests and demos.

pub mod docker;
pub mod host;
pub mod memory;

use std::path::Path;

use async_trait::async_trait;

use crate::core::errors::Result;
use crate::core::resource::Resource;

/// Read/remove surface of the container engine.
///
/// Listings return fully-mapped [`Resource`] values. Network resources carry
/// their connected-container ids (the engine only reports attachments on
/// inspect); image and volume `used_by` backfill happens in the scanner by
/// cross-referencing the container list.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Cheap liveness probe against the engine.
    async fn ping(&self) -> Result<()>;

    /// List containers, optionally including stopped and exited ones.
    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<Resource>>;
    async fn list_images(&self) -> Result<Vec<Resource>>;
    async fn list_volumes(&self) -> Result<Vec<Resource>>;
    async fn list_networks(&self) -> Result<Vec<Resource>>;

    async fn remove_container(&self, id: &str) -> Result<()>;
    async fn remove_image(&self, id: &str) -> Result<()>;
    async fn remove_volume(&self, name: &str) -> Result<()>;
    async fn remove_network(&self, id: &str) -> Result<()>;
}

/// Host-side collaborator for size probes and disk accounting.
#[async_trait]
pub trait HostClient: Send + Sync {
    /// Run a command and return its stdout. Non-zero exit is an error.
    async fn run_command(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Free bytes on the filesystem containing `path`.
    async fn disk_free_bytes(&self, path: &Path) -> Result<u64>;
}
