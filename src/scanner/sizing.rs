//! Size accounting: per-resource byte sizes, aggregation, ordering, and
//! the predicted-vs-actual verification check.
//!
//! Sizing is strictly best-effort. A failed size query logs a warning and
//! falls back to 0 so a cleanup run is never aborted over accounting.

#![allow(missing_docs)]

use std::sync::Arc;

use tracing::warn;

use crate::client::HostClient;
use crate::core::resource::{Resource, ResourceDetails, ResourceKind};

/// Tolerance for the space-freed verification, as a fraction of the
/// predicted value.
pub const DEFAULT_VERIFY_TOLERANCE: f64 = 0.05;

/// Computes and refreshes per-resource sizes.
///
/// Containers and images carry their size from the engine listing.
/// Volumes need a host filesystem query; networks occupy no disk space.
pub struct SizeAccountant {
    host: Arc<dyn HostClient>,
}

impl SizeAccountant {
    #[must_use]
    pub fn new(host: Arc<dyn HostClient>) -> Self {
        Self { host }
    }

    /// Best-effort size of one resource in bytes.
    pub async fn size_of(&self, resource: &Resource) -> u64 {
        match resource.kind() {
            ResourceKind::Network => 0,
            ResourceKind::Volume => self.volume_size(resource).await,
            ResourceKind::Container | ResourceKind::Image => resource.size_bytes,
        }
    }

    /// Refresh `size_bytes` on every resource in place.
    pub async fn assign_sizes(&self, resources: &mut [Resource]) {
        for resource in resources.iter_mut() {
            resource.size_bytes = self.size_of(resource).await;
        }
    }

    async fn volume_size(&self, volume: &Resource) -> u64 {
        let ResourceDetails::Volume { mount_point, .. } = &volume.details else {
            return volume.size_bytes;
        };

        match self.host.run_command("du", &["-sb", mount_point]).await {
            Ok(output) => parse_du_bytes(&output).unwrap_or_else(|| {
                warn!(volume = %volume.name, "unparseable du output, sizing as 0");
                0
            }),
            Err(err) => {
                warn!(volume = %volume.name, error = %err, "volume size query failed, sizing as 0");
                0
            }
        }
    }
}

/// Sum of resource sizes, saturating rather than overflowing.
#[must_use]
pub fn total_size(resources: &[Resource]) -> u64 {
    resources
        .iter()
        .fold(0_u64, |acc, r| acc.saturating_add(r.size_bytes))
}

/// Stable sort, largest first. Equal sizes keep their original order.
#[must_use]
pub fn sort_descending(mut resources: Vec<Resource>) -> Vec<Resource> {
    resources.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    resources
}

/// Check predicted freed bytes against the observed disk delta.
///
/// A zero prediction accepts any observation. Otherwise the relative
/// deviation `|predicted - actual| / predicted` must stay within
/// `tolerance`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn verify_freed(predicted: u64, actual: u64, tolerance: f64) -> bool {
    if predicted == 0 {
        return true;
    }
    predicted.abs_diff(actual) as f64 / predicted as f64 <= tolerance
}

/// First whitespace-separated token of `du` output, parsed as bytes.
fn parse_du_bytes(output: &str) -> Option<u64> {
    output.split_whitespace().next()?.parse().ok()
}
