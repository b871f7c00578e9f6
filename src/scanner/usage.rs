//! Usage classification: which resources are unused, and is a given
//! resource in use *right now*.
//!
//! Cross-reference rules per kind:
//! - container: unused when not running (stopped or exited).
//! - image: unused when no container, running or stopped, was created
//!   from it.
//! - volume: unused when no container, running or stopped, mounts it.
//! - network: unused when no container is attached and the name is not
//!   one of the engine's reserved networks.
//!
//! The `used_by`/`connected` fields are recomputed from live listings on
//! every call and never read back from earlier scans.

#![allow(missing_docs)]

use std::sync::Arc;

use tracing::debug;

use crate::client::RuntimeClient;
use crate::core::errors::Result;
use crate::core::resource::{Resource, ResourceDetails, ResourceKind};

/// Engine-managed networks that must never be considered removable.
pub const RESERVED_NETWORKS: [&str; 3] = ["bridge", "host", "none"];

/// Whether a network name is one the engine manages itself.
#[must_use]
pub fn is_reserved_network(name: &str) -> bool {
    RESERVED_NETWORKS.contains(&name)
}

/// Classifies resources as used or unused against live engine listings.
pub struct UsageScanner {
    runtime: Arc<dyn RuntimeClient>,
}

impl UsageScanner {
    #[must_use]
    pub fn new(runtime: Arc<dyn RuntimeClient>) -> Self {
        Self { runtime }
    }

    /// Scan all four kinds concurrently and concatenate the unused
    /// candidates in kind order.
    pub async fn scan_all(&self) -> Result<Vec<Resource>> {
        let (containers, images, volumes, networks) = tokio::try_join!(
            self.unused_containers(),
            self.unused_images(),
            self.unused_volumes(),
            self.unused_networks(),
        )?;

        let mut all = containers;
        all.extend(images);
        all.extend(volumes);
        all.extend(networks);
        debug!(candidates = all.len(), "scan complete");
        Ok(all)
    }

    /// Unused candidates for a single kind.
    pub async fn scan_unused(&self, kind: ResourceKind) -> Result<Vec<Resource>> {
        match kind {
            ResourceKind::Container => self.unused_containers().await,
            ResourceKind::Image => self.unused_images().await,
            ResourceKind::Volume => self.unused_volumes().await,
            ResourceKind::Network => self.unused_networks().await,
        }
    }

    /// Point-in-time safety oracle: re-list the relevant resources and
    /// answer whether `resource` is in use at this instant. A resource
    /// that has vanished since the scan counts as not in use.
    pub async fn is_in_use(&self, resource: &Resource) -> Result<bool> {
        match resource.kind() {
            ResourceKind::Container => {
                let live = self.runtime.list_containers(true).await?;
                Ok(live.iter().any(|c| {
                    c.id == resource.id
                        && matches!(
                            &c.details,
                            ResourceDetails::Container { status, .. } if status.is_active()
                        )
                }))
            }
            ResourceKind::Image => {
                let live = self.runtime.list_containers(true).await?;
                Ok(!referencing_containers(&live, &resource.id).is_empty())
            }
            ResourceKind::Volume => {
                let live = self.runtime.list_containers(true).await?;
                Ok(!mounting_containers(&live, &resource.name).is_empty())
            }
            ResourceKind::Network => {
                if is_reserved_network(&resource.name) {
                    return Ok(true);
                }
                let networks = self.runtime.list_networks().await?;
                Ok(networks
                    .iter()
                    .any(|n| n.id == resource.id && !network_is_unused(n)))
            }
        }
    }

    async fn unused_containers(&self) -> Result<Vec<Resource>> {
        let containers = self.runtime.list_containers(true).await?;
        Ok(containers
            .into_iter()
            .filter(|c| {
                matches!(
                    &c.details,
                    ResourceDetails::Container { status, .. } if !status.is_active()
                )
            })
            .collect())
    }

    async fn unused_images(&self) -> Result<Vec<Resource>> {
        let (containers, images) = tokio::try_join!(
            self.runtime.list_containers(true),
            self.runtime.list_images(),
        )?;

        let mut unused = Vec::new();
        for mut image in images {
            let users = referencing_containers(&containers, &image.id);
            if let ResourceDetails::Image { used_by, .. } = &mut image.details {
                *used_by = users;
                if used_by.is_empty() {
                    unused.push(image);
                }
            }
        }
        Ok(unused)
    }

    async fn unused_volumes(&self) -> Result<Vec<Resource>> {
        let (containers, volumes) = tokio::try_join!(
            self.runtime.list_containers(true),
            self.runtime.list_volumes(),
        )?;

        let mut unused = Vec::new();
        for mut volume in volumes {
            let users = mounting_containers(&containers, &volume.name);
            if let ResourceDetails::Volume { used_by, .. } = &mut volume.details {
                *used_by = users;
                if used_by.is_empty() {
                    unused.push(volume);
                }
            }
        }
        Ok(unused)
    }

    async fn unused_networks(&self) -> Result<Vec<Resource>> {
        let networks = self.runtime.list_networks().await?;
        Ok(networks.into_iter().filter(network_is_unused).collect())
    }
}

/// Ids of containers created from the given image, running or not.
fn referencing_containers(containers: &[Resource], image_id: &str) -> Vec<String> {
    containers
        .iter()
        .filter(|c| {
            matches!(
                &c.details,
                ResourceDetails::Container { image_id: used, .. } if used == image_id
            )
        })
        .map(|c| c.id.clone())
        .collect()
}

/// Ids of containers mounting the given volume, running or not.
fn mounting_containers(containers: &[Resource], volume_name: &str) -> Vec<String> {
    containers
        .iter()
        .filter(|c| {
            matches!(
                &c.details,
                ResourceDetails::Container { mounted_volumes, .. }
                    if mounted_volumes.iter().any(|v| v == volume_name)
            )
        })
        .map(|c| c.id.clone())
        .collect()
}

fn network_is_unused(network: &Resource) -> bool {
    if is_reserved_network(&network.name) {
        return false;
    }
    matches!(
        &network.details,
        ResourceDetails::Network { connected, .. } if connected.is_empty()
    )
}
