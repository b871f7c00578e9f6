//! Deterministic in-memory fakes for the runtime and host seams.
//!
//! Used by unit and integration tests to drive the full pipeline without a
//! Docker daemon. Seed resources with the `add_*` methods, inject failures
//! with the `set_*`/`fail_*` knobs, and assert on `removed_ids` afterwards.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::client::{HostClient, RuntimeClient};
use crate::core::errors::{DswError, Result};
use crate::core::resource::{ContainerStatus, Resource, ResourceDetails};

// ──────────────────── runtime fake ────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    containers: Vec<Resource>,
    images: Vec<Resource>,
    volumes: Vec<Resource>,
    networks: Vec<Resource>,
    removed: Vec<String>,
    container_listings_seen: u64,
    flip_running_after_first_listing: BTreeSet<String>,
    vanish_after_first_listing: BTreeSet<String>,
    refuse_in_use: BTreeSet<String>,
    fail_removal: BTreeSet<String>,
    fail_ping: bool,
    fail_listings: bool,
}

/// In-memory [`RuntimeClient`] with seedable state and failure injection.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<MemoryState>,
    next_id: AtomicU64,
}

impl MemoryRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Seed a container; returns its id.
    pub fn add_container(
        &self,
        name: &str,
        status: ContainerStatus,
        image_id: &str,
        mounted_volumes: &[&str],
        size_bytes: u64,
    ) -> String {
        let id = format!("ctr-{:04}", self.next_id());
        let resource = Resource {
            id: id.clone(),
            name: name.to_string(),
            size_bytes,
            created_at: Utc::now(),
            last_used_at: None,
            tags: BTreeSet::new(),
            details: ResourceDetails::Container {
                status,
                image_id: image_id.to_string(),
                mounted_volumes: mounted_volumes
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            },
        };
        self.state.lock().containers.push(resource);
        id
    }

    /// Seed an image; returns its id.
    pub fn add_image(&self, repository: &str, tag: &str, size_bytes: u64) -> String {
        let id = format!("sha256:{:016x}", self.next_id());
        let resource = Resource {
            id: id.clone(),
            name: format!("{repository}:{tag}"),
            size_bytes,
            created_at: Utc::now(),
            last_used_at: None,
            tags: BTreeSet::new(),
            details: ResourceDetails::Image {
                repository: repository.to_string(),
                tag: tag.to_string(),
                used_by: Vec::new(),
            },
        };
        self.state.lock().images.push(resource);
        id
    }

    /// Seed a volume; the name doubles as the id, like the engine does.
    pub fn add_volume(&self, name: &str, mount_point: &str) -> String {
        let resource = Resource {
            id: name.to_string(),
            name: name.to_string(),
            size_bytes: 0,
            created_at: Utc::now(),
            last_used_at: None,
            tags: BTreeSet::new(),
            details: ResourceDetails::Volume {
                mount_point: mount_point.to_string(),
                used_by: Vec::new(),
            },
        };
        self.state.lock().volumes.push(resource);
        name.to_string()
    }

    /// Seed a network; returns its id.
    pub fn add_network(&self, name: &str, connected: &[&str]) -> String {
        let id = format!("net-{:04}", self.next_id());
        let resource = Resource {
            id: id.clone(),
            name: name.to_string(),
            size_bytes: 0,
            created_at: Utc::now(),
            last_used_at: None,
            tags: BTreeSet::new(),
            details: ResourceDetails::Network {
                driver: "bridge".to_string(),
                connected: connected.iter().map(ToString::to_string).collect(),
            },
        };
        self.state.lock().networks.push(resource);
        id
    }

    /// Attach a tag to a seeded resource of any kind.
    pub fn tag_resource(&self, id: &str, tag: &str) {
        let mut state = self.state.lock();
        let state = &mut *state;
        for list in [
            &mut state.containers,
            &mut state.images,
            &mut state.volumes,
            &mut state.networks,
        ] {
            if let Some(resource) = list.iter_mut().find(|r| r.id == id) {
                resource.tags.insert(tag.to_string());
                return;
            }
        }
    }

    /// Change a seeded container's status in place.
    pub fn set_container_status(&self, id: &str, status: ContainerStatus) {
        let mut state = self.state.lock();
        if let Some(resource) = state.containers.iter_mut().find(|r| r.id == id)
            && let ResourceDetails::Container { status: slot, .. } = &mut resource.details
        {
            *slot = status;
        }
    }

    /// After the first container listing completes, flip this container to
    /// Running. Models a container restarted between scan and recheck.
    pub fn mark_running_after_first_listing(&self, id: &str) {
        self.state
            .lock()
            .flip_running_after_first_listing
            .insert(id.to_string());
    }

    /// After the first container listing completes, drop this container from
    /// the engine entirely. Models a concurrent removal by another actor.
    pub fn vanish_after_first_listing(&self, id: &str) {
        self.state
            .lock()
            .vanish_after_first_listing
            .insert(id.to_string());
    }

    /// Make the next removal of `id` fail with an in-use refusal.
    pub fn refuse_removal_in_use(&self, id: &str) {
        self.state.lock().refuse_in_use.insert(id.to_string());
    }

    /// Make the next removal of `id` fail with a generic engine error.
    pub fn fail_removal(&self, id: &str) {
        self.state.lock().fail_removal.insert(id.to_string());
    }

    pub fn set_ping_failure(&self, fail: bool) {
        self.state.lock().fail_ping = fail;
    }

    pub fn set_listing_failure(&self, fail: bool) {
        self.state.lock().fail_listings = fail;
    }

    /// Ids removed so far, in removal order.
    #[must_use]
    pub fn removed_ids(&self) -> Vec<String> {
        self.state.lock().removed.clone()
    }

    /// Remaining resource counts: containers, images, volumes, networks.
    #[must_use]
    pub fn remaining_counts(&self) -> [usize; 4] {
        let state = self.state.lock();
        [
            state.containers.len(),
            state.images.len(),
            state.volumes.len(),
            state.networks.len(),
        ]
    }

    fn check_removal_injections(state: &mut MemoryState, id: &str) -> Result<()> {
        if state.refuse_in_use.contains(id) {
            return Err(DswError::ResourceInUse { id: id.to_string() });
        }
        if state.fail_removal.contains(id) {
            return Err(DswError::Api {
                details: format!("injected removal failure for {id}"),
            });
        }
        Ok(())
    }

    fn remove_from(list: &mut Vec<Resource>, removed: &mut Vec<String>, id: &str) -> Result<()> {
        let position = list
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| DswError::ResourceNotFound { id: id.to_string() })?;
        list.remove(position);
        removed.push(id.to_string());
        Ok(())
    }
}

#[async_trait]
impl RuntimeClient for MemoryRuntime {
    async fn ping(&self) -> Result<()> {
        if self.state.lock().fail_ping {
            return Err(DswError::Connectivity {
                details: "injected ping failure".to_string(),
            });
        }
        Ok(())
    }

    async fn list_containers(&self, include_stopped: bool) -> Result<Vec<Resource>> {
        let mut state = self.state.lock();
        if state.fail_listings {
            return Err(DswError::Connectivity {
                details: "injected listing failure".to_string(),
            });
        }
        if state.container_listings_seen > 0 && !state.flip_running_after_first_listing.is_empty()
        {
            let flips = std::mem::take(&mut state.flip_running_after_first_listing);
            for id in &flips {
                if let Some(resource) = state.containers.iter_mut().find(|r| &r.id == id)
                    && let ResourceDetails::Container { status, .. } = &mut resource.details
                {
                    *status = ContainerStatus::Running;
                }
            }
        }
        if state.container_listings_seen > 0 && !state.vanish_after_first_listing.is_empty() {
            let gone = std::mem::take(&mut state.vanish_after_first_listing);
            state.containers.retain(|r| !gone.contains(&r.id));
        }
        state.container_listings_seen += 1;

        Ok(state
            .containers
            .iter()
            .filter(|r| {
                include_stopped
                    || matches!(
                        r.details,
                        ResourceDetails::Container {
                            status: ContainerStatus::Running,
                            ..
                        }
                    )
            })
            .cloned()
            .collect())
    }

    async fn list_images(&self) -> Result<Vec<Resource>> {
        let state = self.state.lock();
        if state.fail_listings {
            return Err(DswError::Connectivity {
                details: "injected listing failure".to_string(),
            });
        }
        Ok(state.images.clone())
    }

    async fn list_volumes(&self) -> Result<Vec<Resource>> {
        let state = self.state.lock();
        if state.fail_listings {
            return Err(DswError::Connectivity {
                details: "injected listing failure".to_string(),
            });
        }
        Ok(state.volumes.clone())
    }

    async fn list_networks(&self) -> Result<Vec<Resource>> {
        let state = self.state.lock();
        if state.fail_listings {
            return Err(DswError::Connectivity {
                details: "injected listing failure".to_string(),
            });
        }
        Ok(state.networks.clone())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_removal_injections(&mut state, id)?;
        let MemoryState {
            containers,
            removed,
            ..
        } = &mut *state;
        Self::remove_from(containers, removed, id)
    }

    async fn remove_image(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_removal_injections(&mut state, id)?;
        let MemoryState {
            images, removed, ..
        } = &mut *state;
        Self::remove_from(images, removed, id)
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_removal_injections(&mut state, name)?;
        let MemoryState {
            volumes, removed, ..
        } = &mut *state;
        Self::remove_from(volumes, removed, name)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_removal_injections(&mut state, id)?;
        let MemoryState {
            networks, removed, ..
        } = &mut *state;
        Self::remove_from(networks, removed, id)
    }
}

// ──────────────────── host fake ────────────────────

/// In-memory [`HostClient`] with canned `du` outputs and a scripted
/// free-space sequence.
#[derive(Debug, Default)]
pub struct StaticHost {
    du_sizes: Mutex<HashMap<String, u64>>,
    free_sequence: Mutex<VecDeque<u64>>,
    fail_commands: Mutex<bool>,
    fail_disk_free: Mutex<bool>,
}

impl StaticHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the `du` answer for a mount point.
    pub fn set_du_size(&self, path: &str, bytes: u64) {
        self.du_sizes.lock().insert(path.to_string(), bytes);
    }

    /// Queue a free-space reading; the last queued value repeats.
    pub fn push_free_bytes(&self, bytes: u64) {
        self.free_sequence.lock().push_back(bytes);
    }

    pub fn set_command_failure(&self, fail: bool) {
        *self.fail_commands.lock() = fail;
    }

    pub fn set_disk_free_failure(&self, fail: bool) {
        *self.fail_disk_free.lock() = fail;
    }
}

#[async_trait]
impl HostClient for StaticHost {
    async fn run_command(&self, program: &str, args: &[&str]) -> Result<String> {
        if *self.fail_commands.lock() {
            return Err(DswError::HostCommand {
                command: program.to_string(),
                details: "injected command failure".to_string(),
            });
        }
        if program == "du" {
            let path = args.last().copied().unwrap_or_default();
            return self.du_sizes.lock().get(path).map_or_else(
                || {
                    Err(DswError::HostCommand {
                        command: format!("du {path}"),
                        details: "no du fixture for path".to_string(),
                    })
                },
                |bytes| Ok(format!("{bytes}\t{path}\n")),
            );
        }
        Err(DswError::HostCommand {
            command: program.to_string(),
            details: "no fixture for command".to_string(),
        })
    }

    async fn disk_free_bytes(&self, _path: &Path) -> Result<u64> {
        if *self.fail_disk_free.lock() {
            return Err(DswError::HostCommand {
                command: "statvfs".to_string(),
                details: "injected disk-free failure".to_string(),
            });
        }
        let mut sequence = self.free_sequence.lock();
        match sequence.len() {
            0 => Ok(0),
            1 => Ok(sequence[0]),
            _ => Ok(sequence.pop_front().unwrap_or(0)),
        }
    }
}
