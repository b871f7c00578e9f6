//! Resource model shared by the scanner, protection filter, and cleanup
//! pipeline.
//!
//! One scan pass produces a flat list of [`Resource`] values; everything
//! downstream (filtering, sizing, removal, reporting) dispatches over
//! [`ResourceKind`] with exhaustive matches. The cross-reference fields
//! (`used_by`, `connected`) are recomputed from live listings on every scan
//! and are never treated as authoritative state.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── resource kinds ────────────────────

/// Discriminant for the four Docker resource kinds the cleaner handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Container,
    Image,
    Volume,
    Network,
}

impl ResourceKind {
    /// All kinds, in scan order.
    pub const ALL: [Self; 4] = [Self::Container, Self::Image, Self::Volume, Self::Network];

    /// Parse a kind from a config or CLI string. Accepts singular and
    /// plural lowercase forms.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "container" | "containers" => Some(Self::Container),
            "image" | "images" => Some(Self::Image),
            "volume" | "volumes" => Some(Self::Volume),
            "network" | "networks" => Some(Self::Network),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Image => write!(f, "image"),
            Self::Volume => write!(f, "volume"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Coarse lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Running,
    Stopped,
    Exited,
}

impl ContainerStatus {
    /// Map an engine state string onto the coarse status used here.
    ///
    /// Paused and restarting containers count as running (they hold their
    /// resources and may resume at any moment); created containers count
    /// as stopped.
    #[must_use]
    pub fn from_engine_state(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "running" | "restarting" | "paused" => Self::Running,
            "exited" | "dead" => Self::Exited,
            _ => Self::Stopped,
        }
    }

    /// Whether the container currently holds its resources.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running)
    }
}

// ──────────────────── resource ────────────────────

/// Kind-specific payload carried by a [`Resource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDetails {
    Container {
        status: ContainerStatus,
        /// Engine id of the image this container was created from.
        image_id: String,
        /// Names of the volumes mounted into this container.
        mounted_volumes: Vec<String>,
    },
    Image {
        repository: String,
        tag: String,
        /// Ids of containers (running or stopped) created from this image.
        /// Derived per scan, never persisted as ground truth.
        #[serde(default)]
        used_by: Vec<String>,
    },
    Volume {
        mount_point: String,
        /// Ids of containers mounting this volume. Derived per scan.
        #[serde(default)]
        used_by: Vec<String>,
    },
    Network {
        driver: String,
        /// Ids of containers attached to this network. Derived per scan.
        #[serde(default)]
        connected: Vec<String>,
    },
}

/// A single Docker resource as observed by one scan pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Engine identifier (content digest for images, generated id otherwise).
    pub id: String,
    /// Human-facing name (`repo:tag` for images, plain name otherwise).
    pub name: String,
    /// Size in bytes as of the last sizing pass. Networks are always 0.
    #[serde(default)]
    pub size_bytes: u64,
    /// Creation timestamp reported by the engine.
    pub created_at: DateTime<Utc>,
    /// Last observed use, where the engine reports one.
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Labels attached to the resource, flattened to `key=value` strings
    /// (bare `key` when the label has no value).
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Kind-specific payload.
    pub details: ResourceDetails,
}

impl Resource {
    /// The kind discriminant of this resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self.details {
            ResourceDetails::Container { .. } => ResourceKind::Container,
            ResourceDetails::Image { .. } => ResourceKind::Image,
            ResourceDetails::Volume { .. } => ResourceKind::Volume,
            ResourceDetails::Network { .. } => ResourceKind::Network,
        }
    }

    /// Shortened id for log lines: digest prefix stripped, 12 characters.
    #[must_use]
    pub fn short_id(&self) -> &str {
        let id = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        id.get(..12).unwrap_or(id)
    }
}

// ──────────────────── cleanup outcome ────────────────────

/// Why a candidate was spared during the removal pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The point-in-time recheck immediately before removal found the
    /// resource back in use.
    InUseAtRecheck,
    /// The engine refused the removal because the resource is in use.
    RemovalRefused,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InUseAtRecheck => write!(f, "in use at recheck"),
            Self::RemovalRefused => write!(f, "removal refused: in use"),
        }
    }
}

/// A candidate spared during the removal pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedResource {
    pub resource: Resource,
    pub reason: SkipReason,
}

/// A failed removal attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalError {
    /// The resource the failure applies to, when attributable.
    #[serde(default)]
    pub resource: Option<Resource>,
    /// Stable `DSW-` code, when the failure carried one.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable failure description.
    pub message: String,
}

/// Outcome of one cleanup pass.
///
/// Closed partition: every candidate that enters the removal pass lands in
/// exactly one of `removed`, `skipped`, or `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOutcome {
    /// Removed (destructive mode) or would-be-removed (preview mode).
    pub removed: Vec<Resource>,
    /// Spared after the pre-removal recheck or an in-use refusal.
    pub skipped: Vec<SkippedResource>,
    /// Per-resource and per-step failures that did not abort the run.
    pub errors: Vec<RemovalError>,
}

impl CleanupOutcome {
    /// Number of candidates accounted for across all three buckets.
    #[must_use]
    pub fn total_accounted(&self) -> usize {
        self.removed.len() + self.skipped.len() + self.errors.len()
    }

    /// Predicted bytes freed: the summed sizes of the removed resources.
    #[must_use]
    pub fn freed_bytes(&self) -> u64 {
        self.removed
            .iter()
            .fold(0_u64, |acc, r| acc.saturating_add(r.size_bytes))
    }
}

// ──────────────────── run mode & report ────────────────────

/// Whether a cleanup pass may issue destructive engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Full pipeline, no destructive calls, no backup.
    Preview,
    /// Full pipeline with backup (when enabled) and real removals.
    Destructive,
}

impl RunMode {
    #[must_use]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::Destructive)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preview => write!(f, "preview"),
            Self::Destructive => write!(f, "destructive"),
        }
    }
}

/// Aggregate counters for one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Unused candidates discovered by the scan, before protection filtering.
    pub scanned: usize,
    /// Resources removed (or recorded as removable in preview mode).
    pub removed_count: usize,
    /// Predicted bytes freed by the removed resources.
    pub space_freed_bytes: u64,
    /// Wall-clock duration of the pass.
    pub duration_ms: u64,
}

/// Immutable record of one completed cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub mode: RunMode,
    pub summary: ReportSummary,
    pub details: CleanupOutcome,
}

impl Report {
    /// Assemble a report from a finished pass.
    #[must_use]
    pub fn new(mode: RunMode, scanned: usize, details: CleanupOutcome, elapsed: Duration) -> Self {
        let summary = ReportSummary {
            scanned,
            removed_count: details.removed.len(),
            space_freed_bytes: details.freed_bytes(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        Self {
            timestamp: Utc::now(),
            mode,
            summary,
            details,
        }
    }
}
