//! Docker Engine adapter over bollard.
//!
//! Pure mapping from engine wire models to [`Resource`] lives in free
//! functions so it stays testable without a daemon. Removal calls are
//! deliberately non-forcing (`force: false` everywhere): the engine's own
//! in-use refusals remain a second safety net under the scanner's recheck.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, RemoveContainerOptions};
use bollard::errors::Error as BollardError;
use bollard::image::{ListImagesOptions, RemoveImageOptions};
use bollard::models::{ContainerSummary, ImageSummary, Network, Volume};
use bollard::network::{InspectNetworkOptions, ListNetworksOptions};
use bollard::volume::{ListVolumesOptions, RemoveVolumeOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::RuntimeClient;
use crate::core::config::DockerConfig;
use crate::core::errors::{DswError, Result};
use crate::core::resource::{ContainerStatus, Resource, ResourceDetails};

/// Production [`RuntimeClient`] backed by the Docker Engine API.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect according to `[docker]` config. `unix://` and `tcp://` or
    /// `http://` addresses are honored; no address means platform defaults
    /// (which respect `DOCKER_HOST`).
    pub fn connect(config: &DockerConfig) -> Result<Self> {
        let timeout = config.timeout_seconds;
        let connected = match config.host.as_deref() {
            None => Docker::connect_with_local_defaults(),
            Some(addr) if addr.starts_with("unix://") => {
                Docker::connect_with_socket(addr, timeout, API_DEFAULT_VERSION)
            }
            Some(addr) if addr.starts_with("tcp://") || addr.starts_with("http://") => {
                Docker::connect_with_http(addr, timeout, API_DEFAULT_VERSION)
            }
            Some(other) => {
                return Err(DswError::InvalidConfig {
                    details: format!(
                        "docker.host {other:?} must start with unix://, tcp://, or http://"
                    ),
                });
            }
        };
        let docker = connected.map_err(|error| DswError::Connectivity {
            details: error.to_string(),
        })?;
        debug!(host = ?config.host, "docker client ready");
        Ok(Self { docker })
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|error| DswError::Connectivity {
                details: error.to_string(),
            })?;
        Ok(())
    }

    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<Resource>> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            size: true,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_transport_error)?;
        Ok(summaries.into_iter().map(container_resource).collect())
    }

    async fn list_images(&self) -> Result<Vec<Resource>> {
        let summaries = self
            .docker
            .list_images(Some(ListImagesOptions::<String>::default()))
            .await
            .map_err(map_transport_error)?;
        Ok(summaries.into_iter().map(image_resource).collect())
    }

    async fn list_volumes(&self) -> Result<Vec<Resource>> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions<String>>)
            .await
            .map_err(map_transport_error)?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(volume_resource)
            .collect())
    }

    async fn list_networks(&self) -> Result<Vec<Resource>> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(map_transport_error)?;

        let mut resources = Vec::with_capacity(networks.len());
        for network in networks {
            let Some(id) = network.id.clone() else {
                continue;
            };
            // The list endpoint leaves the containers map empty; only
            // inspect reports attachments.
            let inspected = self
                .docker
                .inspect_network(
                    &id,
                    Some(InspectNetworkOptions::<String> {
                        verbose: true,
                        ..Default::default()
                    }),
                )
                .await;
            let connected = match inspected {
                Ok(detail) => detail
                    .containers
                    .map(|attached| attached.into_keys().collect())
                    .unwrap_or_default(),
                Err(BollardError::DockerResponseServerError {
                    status_code: 404, ..
                }) => {
                    // Vanished between list and inspect.
                    continue;
                }
                Err(error) => return Err(map_transport_error(error)),
            };
            resources.push(network_resource(network, connected));
        }
        Ok(resources)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: false,
                    v: false,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|error| map_engine_error(id, error))?;
        debug!(container = %id, "container removed");
        Ok(())
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        self.docker
            .remove_image(
                id,
                Some(RemoveImageOptions {
                    force: false,
                    noprune: false,
                }),
                None,
            )
            .await
            .map_err(|error| map_engine_error(id, error))?;
        debug!(image = %id, "image removed");
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: false }))
            .await
            .map_err(|error| map_engine_error(name, error))?;
        debug!(volume = %name, "volume removed");
        Ok(())
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        self.docker
            .remove_network(id)
            .await
            .map_err(|error| map_engine_error(id, error))?;
        debug!(network = %id, "network removed");
        Ok(())
    }
}

// ──────────────────── wire model mapping ────────────────────

fn container_resource(summary: ContainerSummary) -> Resource {
    let id = summary.id.unwrap_or_default();
    let name = summary
        .names
        .as_deref()
        .and_then(|names| names.first())
        .map_or_else(|| id.clone(), |n| n.trim_start_matches('/').to_string());
    let engine_state = summary
        .state
        .map(|state| state.to_string())
        .unwrap_or_default();
    let mounted_volumes = summary
        .mounts
        .unwrap_or_default()
        .into_iter()
        .filter_map(|mount| mount.name)
        .collect();

    Resource {
        id,
        name,
        size_bytes: summary.size_rw.map_or(0, |s| u64::try_from(s).unwrap_or(0)),
        created_at: timestamp_from_secs(summary.created.unwrap_or(0)),
        last_used_at: None,
        tags: label_tags(summary.labels.unwrap_or_default()),
        details: ResourceDetails::Container {
            status: ContainerStatus::from_engine_state(&engine_state),
            image_id: summary.image_id.unwrap_or_default(),
            mounted_volumes,
        },
    }
}

fn image_resource(summary: ImageSummary) -> Resource {
    let name = summary
        .repo_tags
        .first()
        .cloned()
        .unwrap_or_else(|| "<none>:<none>".to_string());
    let (repository, tag) = split_repo_tag(&name);

    Resource {
        id: summary.id,
        name,
        size_bytes: u64::try_from(summary.size).unwrap_or(0),
        created_at: timestamp_from_secs(summary.created),
        last_used_at: None,
        tags: label_tags(summary.labels),
        details: ResourceDetails::Image {
            repository,
            tag,
            used_by: Vec::new(),
        },
    }
}

fn volume_resource(volume: Volume) -> Resource {
    Resource {
        id: volume.name.clone(),
        name: volume.name,
        size_bytes: 0,
        created_at: volume.created_at.unwrap_or(DateTime::UNIX_EPOCH),
        last_used_at: None,
        tags: label_tags(volume.labels),
        details: ResourceDetails::Volume {
            mount_point: volume.mountpoint,
            used_by: Vec::new(),
        },
    }
}

fn network_resource(network: Network, connected: Vec<String>) -> Resource {
    let name = network.name.unwrap_or_default();
    Resource {
        id: network.id.unwrap_or_else(|| name.clone()),
        name,
        size_bytes: 0,
        created_at: network.created.unwrap_or(DateTime::UNIX_EPOCH),
        last_used_at: None,
        tags: label_tags(network.labels.unwrap_or_default()),
        details: ResourceDetails::Network {
            driver: network.driver.unwrap_or_default(),
            connected,
        },
    }
}

/// Split `repo:tag`, tolerating registry ports (`host:5000/app:v1`).
fn split_repo_tag(raw: &str) -> (String, String) {
    raw.rsplit_once(':').map_or_else(
        || (raw.to_string(), "latest".to_string()),
        |(repo, tag)| (repo.to_string(), tag.to_string()),
    )
}

/// Flatten engine labels to `key=value` tags (bare key for empty values).
fn label_tags(labels: HashMap<String, String>) -> BTreeSet<String> {
    labels
        .into_iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key
            } else {
                format!("{key}={value}")
            }
        })
        .collect()
}

fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn map_engine_error(id: &str, error: BollardError) -> DswError {
    match error {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => DswError::ResourceNotFound { id: id.to_string() },
        BollardError::DockerResponseServerError {
            status_code: 409, ..
        } => DswError::ResourceInUse { id: id.to_string() },
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => DswError::Api {
            details: format!("{id}: status {status_code}: {message}"),
        },
        other => DswError::Connectivity {
            details: other.to_string(),
        },
    }
}

fn map_transport_error(error: BollardError) -> DswError {
    match error {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => DswError::Api {
            details: format!("status {status_code}: {message}"),
        },
        other => DswError::Connectivity {
            details: other.to_string(),
        },
    }
}
