//! Cleanup orchestrator. One pass drives connect, scan, filter, size,
//! backup, remove, verify, and report in that order.
//!
//! Preview and destructive passes share this single implementation; the mode
//! is threaded through as a plain parameter so the two paths cannot diverge.
//! Removal is strictly sequential, with a fresh in-use recheck immediately
//! before each engine call.

#![allow(missing_docs)]

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backup::BackupRecorder;
use crate::client::{HostClient, RuntimeClient};
use crate::core::config::Config;
use crate::core::errors::{DswError, Result};
use crate::core::resource::{
    CleanupOutcome, RemovalError, Report, Resource, ResourceKind, RunMode, SkipReason,
    SkippedResource,
};
use crate::daemon::notifications::{NotificationEvent, NotificationManager};
use crate::report::{self, ReportStore};
use crate::scanner::protection::ProtectionPolicy;
use crate::scanner::sizing::{self, SizeAccountant};
use crate::scanner::usage::UsageScanner;

/// Stock engine data root. The free-space probe is best-effort and only
/// meaningful when the engine actually stores its data here.
const ENGINE_DATA_ROOT: &str = "/var/lib/docker";

// ──────────────────────────── pass phases ────────────────────────────

/// Where a cleanup pass currently is. Transitions are logged at debug level;
/// `Failed` is reachable from any phase when a fatal error aborts the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPhase {
    Idle,
    Connecting,
    Scanning,
    Filtering,
    Sizing,
    BackingUp,
    Removing,
    Verifying,
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for CleanupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Scanning => "scanning",
            Self::Filtering => "filtering",
            Self::Sizing => "sizing",
            Self::BackingUp => "backing-up",
            Self::Removing => "removing",
            Self::Verifying => "verifying",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn advance(phase: &mut CleanupPhase, next: CleanupPhase) {
    debug!(from = %phase, to = %next, "phase transition");
    *phase = next;
}

// ──────────────────────────── orchestrator ────────────────────────────

/// Runs cleanup passes over a runtime client and a host client.
///
/// Protection patterns and the kind allow-list are compiled once at
/// construction; both were already validated during config load, so failures
/// here mean the config changed underneath us.
pub struct Cleaner {
    config: Config,
    runtime: Arc<dyn RuntimeClient>,
    host: Arc<dyn HostClient>,
    scanner: UsageScanner,
    accountant: SizeAccountant,
    policy: ProtectionPolicy,
    allowed_kinds: Vec<ResourceKind>,
    backups: BackupRecorder,
    reports: ReportStore,
    notifier: NotificationManager,
}

impl Cleaner {
    pub fn new(
        config: Config,
        runtime: Arc<dyn RuntimeClient>,
        host: Arc<dyn HostClient>,
    ) -> Result<Self> {
        let policy = ProtectionPolicy::new(&config.cleanup.protected)?;
        let allowed_kinds = config.cleanup.allowed_kinds()?;
        let scanner = UsageScanner::new(Arc::clone(&runtime));
        let accountant = SizeAccountant::new(Arc::clone(&host));
        let backups = BackupRecorder::new(config.backup.dir.clone());
        let reports = ReportStore::new(config.report.dir.clone());
        let notifier = NotificationManager::from_config(&config.notifications);

        Ok(Self {
            config,
            runtime,
            host,
            scanner,
            accountant,
            policy,
            allowed_kinds,
            backups,
            reports,
            notifier,
        })
    }

    /// Execute one full cleanup pass in the given mode.
    ///
    /// Fatal errors (connectivity, backup) abort the pass and are returned to
    /// the caller after a minimal error-only report has been persisted.
    /// Per-resource failures never abort; they land in the report instead.
    pub async fn run(&self, mode: RunMode) -> Result<Report> {
        let started = Instant::now();
        let mut phase = CleanupPhase::Idle;
        info!(%mode, "cleanup pass starting");

        match self.execute_pass(mode, started, &mut phase).await {
            Ok(report) => {
                info!(
                    %mode,
                    removed = report.summary.removed_count,
                    freed_bytes = report.summary.space_freed_bytes,
                    duration_ms = report.summary.duration_ms,
                    "cleanup pass finished"
                );
                Ok(report)
            }
            Err(error) => {
                advance(&mut phase, CleanupPhase::Failed);
                warn!(code = error.code(), %error, "cleanup pass aborted");
                let report = failure_report(mode, &error, started.elapsed());
                self.persist_outputs(&report);
                self.notifier.notify(&NotificationEvent::PassFailed {
                    code: error.code().to_string(),
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Preview pass. Identical to `run(RunMode::Preview)`; kept as a named
    /// entry point for callers that only ever report.
    pub async fn execute_dry_run(&self) -> Result<Report> {
        self.run(RunMode::Preview).await
    }

    /// Scan, filter, size, and sort without removing anything. Backs the
    /// `scan` CLI command.
    pub async fn scan_candidates(&self) -> Result<Vec<Resource>> {
        self.runtime.ping().await?;
        let candidates = self.scanner.scan_all().await?;
        let mut eligible = self.policy.filter(candidates, &self.allowed_kinds);
        self.accountant.assign_sizes(&mut eligible).await;
        Ok(sizing::sort_descending(eligible))
    }

    // ──── pass body ────

    async fn execute_pass(
        &self,
        mode: RunMode,
        started: Instant,
        phase: &mut CleanupPhase,
    ) -> Result<Report> {
        advance(phase, CleanupPhase::Connecting);
        self.runtime.ping().await?;

        advance(phase, CleanupPhase::Scanning);
        let candidates = self.scanner.scan_all().await?;
        let scanned = candidates.len();

        advance(phase, CleanupPhase::Filtering);
        let mut eligible = self.policy.filter(candidates, &self.allowed_kinds);

        advance(phase, CleanupPhase::Sizing);
        self.accountant.assign_sizes(&mut eligible).await;
        let eligible = sizing::sort_descending(eligible);
        debug!(
            scanned,
            eligible = eligible.len(),
            predicted_bytes = sizing::total_size(&eligible),
            "candidates sized"
        );

        // Snapshot of every candidate before the first destructive call.
        // A backup failure aborts the whole pass.
        if mode.is_destructive() && self.config.backup.enabled && !eligible.is_empty() {
            advance(phase, CleanupPhase::BackingUp);
            let path = self.backups.create_backup(mode, &eligible)?;
            info!(path = %path.display(), resources = eligible.len(), "backup written");
        }

        let free_before = if mode.is_destructive() {
            self.sample_free_space().await
        } else {
            None
        };

        advance(phase, CleanupPhase::Removing);
        let outcome = self.remove_candidates(mode, eligible).await;

        advance(phase, CleanupPhase::Verifying);
        if mode.is_destructive() {
            self.verify_space_freed(outcome.freed_bytes(), free_before)
                .await;
        }

        advance(phase, CleanupPhase::Reporting);
        let report = Report::new(mode, scanned, outcome, started.elapsed());
        self.persist_outputs(&report);
        self.notifier.notify(&NotificationEvent::PassCompleted {
            mode,
            removed: report.summary.removed_count,
            skipped: report.details.skipped.len(),
            errors: report.details.errors.len(),
            bytes_freed: report.summary.space_freed_bytes,
        });

        advance(phase, CleanupPhase::Done);
        Ok(report)
    }

    /// Remove candidates one at a time, largest first.
    ///
    /// Every outcome is accounted for: a candidate ends up in exactly one of
    /// removed, skipped, or errors. A failed in-use recheck counts as an
    /// error, not a skip, so an unreachable engine never widens the removal
    /// set.
    async fn remove_candidates(&self, mode: RunMode, candidates: Vec<Resource>) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        for resource in candidates {
            match self.scanner.is_in_use(&resource).await {
                Ok(true) => {
                    debug!(
                        kind = %resource.kind(),
                        id = %resource.short_id(),
                        "came into use since the scan, skipping"
                    );
                    outcome.skipped.push(SkippedResource {
                        resource,
                        reason: SkipReason::InUseAtRecheck,
                    });
                }
                Err(error) => {
                    warn!(
                        kind = %resource.kind(),
                        id = %resource.short_id(),
                        %error,
                        "in-use recheck failed"
                    );
                    outcome.errors.push(RemovalError {
                        code: Some(error.code().to_string()),
                        message: format!("in-use recheck failed: {error}"),
                        resource: Some(resource),
                    });
                }
                Ok(false) if mode.is_destructive() => match self.remove_one(&resource).await {
                    Ok(()) => {
                        info!(
                            kind = %resource.kind(),
                            id = %resource.short_id(),
                            name = %resource.name,
                            size_bytes = resource.size_bytes,
                            "removed"
                        );
                        outcome.removed.push(resource);
                    }
                    Err(DswError::ResourceInUse { .. }) => {
                        debug!(
                            kind = %resource.kind(),
                            id = %resource.short_id(),
                            "engine refused removal, resource is in use"
                        );
                        outcome.skipped.push(SkippedResource {
                            resource,
                            reason: SkipReason::RemovalRefused,
                        });
                    }
                    Err(error @ DswError::ResourceNotFound { .. }) => {
                        outcome.errors.push(RemovalError {
                            code: Some(error.code().to_string()),
                            message: format!("vanished before removal: {error}"),
                            resource: Some(resource),
                        });
                    }
                    Err(error) => {
                        warn!(
                            kind = %resource.kind(),
                            id = %resource.short_id(),
                            %error,
                            "removal failed"
                        );
                        outcome.errors.push(RemovalError {
                            code: Some(error.code().to_string()),
                            message: error.to_string(),
                            resource: Some(resource),
                        });
                    }
                },
                // Preview: record what a destructive pass would remove.
                Ok(false) => outcome.removed.push(resource),
            }
        }

        outcome
    }

    async fn remove_one(&self, resource: &Resource) -> Result<()> {
        match resource.kind() {
            ResourceKind::Container => self.runtime.remove_container(&resource.id).await,
            ResourceKind::Image => self.runtime.remove_image(&resource.id).await,
            // Volumes are addressed by name on the engine API.
            ResourceKind::Volume => self.runtime.remove_volume(&resource.name).await,
            ResourceKind::Network => self.runtime.remove_network(&resource.id).await,
        }
    }

    // ──── verification ────

    async fn sample_free_space(&self) -> Option<u64> {
        match self.host.disk_free_bytes(Path::new(ENGINE_DATA_ROOT)).await {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                warn!(%error, "free-space probe unavailable, skipping verification");
                None
            }
        }
    }

    /// Compare measured freed space against the predicted total. Never fails
    /// the pass; a mismatch is logged and notified.
    async fn verify_space_freed(&self, predicted: u64, free_before: Option<u64>) {
        let Some(before) = free_before else {
            return;
        };
        match self.host.disk_free_bytes(Path::new(ENGINE_DATA_ROOT)).await {
            Ok(after) => {
                let actual = after.saturating_sub(before);
                let tolerance = self.config.cleanup.verify_tolerance;
                if sizing::verify_freed(predicted, actual, tolerance) {
                    debug!(predicted, actual, "freed-space verification passed");
                } else {
                    warn!(
                        predicted,
                        actual, tolerance, "freed space outside tolerance"
                    );
                    self.notifier
                        .notify(&NotificationEvent::VerificationMismatch {
                            predicted_bytes: predicted,
                            actual_bytes: actual,
                        });
                }
            }
            Err(error) => warn!(%error, "freed-space verification unavailable"),
        }
    }

    // ──── outputs ────

    /// Persist the JSON report and optional human summary. Output failures
    /// are logged and swallowed; the pass result stands either way.
    fn persist_outputs(&self, report: &Report) {
        match self.reports.persist_report(report) {
            Ok(path) => info!(path = %path.display(), "report written"),
            Err(error) => warn!(%error, "failed to persist report"),
        }
        if self.config.report.write_summary {
            let summary = report::render_summary(report);
            if let Err(error) = self.reports.persist_summary(report.mode, &summary) {
                warn!(%error, "failed to persist summary");
            }
        }
    }
}

/// Minimal error-only report for a pass that aborted before reporting.
fn failure_report(mode: RunMode, error: &DswError, elapsed: Duration) -> Report {
    let outcome = CleanupOutcome {
        errors: vec![RemovalError {
            resource: None,
            code: Some(error.code().to_string()),
            message: error.to_string(),
        }],
        ..CleanupOutcome::default()
    };
    Report::new(mode, 0, outcome, elapsed)
}

// ──────────────────────────── tests ────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{MemoryRuntime, StaticHost};
    use crate::core::resource::ContainerStatus;
    use std::fs;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.backup.dir = root.join("backups");
        config.report.dir = root.join("reports");
        config.notifications.enabled = false;
        config
    }

    fn build(config: Config, runtime: &Arc<MemoryRuntime>, host: &Arc<StaticHost>) -> Cleaner {
        let runtime: Arc<dyn RuntimeClient> = runtime.clone();
        let host: Arc<dyn HostClient> = host.clone();
        Cleaner::new(config, runtime, host).expect("cleaner should build from default config")
    }

    fn json_reports(dir: &Path) -> Vec<Report> {
        let mut reports = Vec::new();
        for entry in fs::read_dir(dir).expect("report dir should exist") {
            let path = entry.expect("dir entry").path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let raw = fs::read_to_string(&path).expect("report should be readable");
                reports.push(serde_json::from_str(&raw).expect("report should parse"));
            }
        }
        reports
    }

    #[test]
    fn phase_names_are_lowercase() {
        assert_eq!(CleanupPhase::Idle.to_string(), "idle");
        assert_eq!(CleanupPhase::BackingUp.to_string(), "backing-up");
        assert_eq!(CleanupPhase::Done.to_string(), "done");
        assert_eq!(CleanupPhase::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn preview_pass_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("a", ContainerStatus::Exited, "img-1", &[], 100);
        runtime.add_container("b", ContainerStatus::Exited, "img-1", &[], 200);
        runtime.add_container("c", ContainerStatus::Stopped, "img-1", &[], 50);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let report = cleaner.run(RunMode::Preview).await.expect("preview pass");

        assert_eq!(report.mode, RunMode::Preview);
        assert_eq!(report.summary.scanned, 3);
        assert_eq!(report.summary.removed_count, 3);
        assert_eq!(report.summary.space_freed_bytes, 350);
        assert!(runtime.removed_ids().is_empty());
        assert_eq!(runtime.remaining_counts(), [3, 0, 0, 0]);
        // No backup for a preview pass.
        assert!(
            cleaner
                .backups
                .list_backups()
                .expect("backup listing")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn preview_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("web", ContainerStatus::Exited, "img-1", &["data"], 400);
        runtime.add_volume("data", "/var/lib/docker/volumes/data/_data");
        runtime.add_network("legacy", &[]);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let first = cleaner.execute_dry_run().await.expect("first preview");
        let second = cleaner.execute_dry_run().await.expect("second preview");

        assert_eq!(first.details, second.details);
        assert_eq!(
            first.summary.space_freed_bytes,
            second.summary.space_freed_bytes
        );
        assert!(runtime.removed_ids().is_empty());
    }

    #[tokio::test]
    async fn destructive_pass_removes_what_preview_predicted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("a", ContainerStatus::Exited, "img-1", &[], 100);
        runtime.add_container("b", ContainerStatus::Exited, "img-2", &[], 200);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let preview = cleaner.run(RunMode::Preview).await.expect("preview pass");
        assert_eq!(runtime.remaining_counts(), [2, 0, 0, 0]);

        let destructive = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        assert_eq!(
            preview.summary.removed_count,
            destructive.summary.removed_count
        );
        assert_eq!(runtime.remaining_counts(), [0, 0, 0, 0]);
        assert_eq!(runtime.removed_ids().len(), 2);
    }

    #[tokio::test]
    async fn largest_resources_are_removed_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        let small = runtime.add_container("small", ContainerStatus::Exited, "img-1", &[], 10);
        let large = runtime.add_container("large", ContainerStatus::Exited, "img-1", &[], 500);
        let medium = runtime.add_container("medium", ContainerStatus::Exited, "img-1", &[], 100);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        assert_eq!(runtime.removed_ids(), vec![large, medium, small]);
    }

    #[tokio::test]
    async fn protected_resources_survive_destructive_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("prod-db", ContainerStatus::Exited, "img-1", &[], 300);
        let pinned = runtime.add_container("scratch", ContainerStatus::Exited, "img-1", &[], 200);
        runtime.tag_resource(&pinned, "keep");
        runtime.add_container("junk", ContainerStatus::Exited, "img-1", &[], 100);

        let mut config = test_config(dir.path());
        config.cleanup.protected = vec!["prod-*".to_string(), "tag:keep".to_string()];
        let cleaner = build(config, &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        assert_eq!(report.summary.scanned, 3);
        assert_eq!(report.summary.removed_count, 1);
        assert_eq!(report.details.removed[0].name, "junk");
        assert_eq!(runtime.remaining_counts(), [2, 0, 0, 0]);
    }

    #[tokio::test]
    async fn kind_allow_list_restricts_removal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("old", ContainerStatus::Exited, "img-live", &[], 100);
        runtime.add_image("left", "over", 700);

        let mut config = test_config(dir.path());
        config.cleanup.kinds = vec!["containers".to_string()];
        let cleaner = build(config, &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        // Both were unused, only the container was eligible.
        assert_eq!(report.summary.scanned, 2);
        assert_eq!(report.summary.removed_count, 1);
        assert_eq!(runtime.remaining_counts(), [0, 1, 0, 0]);
    }

    #[tokio::test]
    async fn backup_precedes_destructive_removal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("a", ContainerStatus::Exited, "img-1", &[], 100);
        runtime.add_container("b", ContainerStatus::Exited, "img-1", &[], 200);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        let backups = cleaner.backups.list_backups().expect("backup listing");
        assert_eq!(backups.len(), 1);
        let backup = crate::backup::load_backup(&backups[0]).expect("backup should load");
        assert_eq!(backup.resource_count, 2);
        assert_eq!(backup.total_size_bytes, 300);
    }

    #[tokio::test]
    async fn backup_failure_aborts_without_removing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("a", ContainerStatus::Exited, "img-1", &[], 100);

        let config = test_config(dir.path());
        let report_dir = config.report.dir.clone();
        // A plain file where the backup directory should go makes every
        // backup attempt fail.
        fs::write(&config.backup.dir, b"blocker").expect("blocker file");
        let cleaner = build(config, &runtime, &host);

        let error = cleaner
            .run(RunMode::Destructive)
            .await
            .expect_err("pass must abort when the backup cannot be written");

        assert_eq!(error.code(), "DSW-3001");
        assert!(error.is_run_fatal());
        assert!(runtime.removed_ids().is_empty());
        assert_eq!(runtime.remaining_counts(), [1, 0, 0, 0]);

        // A minimal error-only report is still persisted.
        let reports = json_reports(&report_dir);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].summary.removed_count, 0);
        assert_eq!(reports[0].details.errors.len(), 1);
        assert_eq!(reports[0].details.errors[0].code.as_deref(), Some("DSW-3001"));
    }

    #[tokio::test]
    async fn recheck_skips_container_that_came_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("steady", ContainerStatus::Exited, "img-1", &[], 10);
        let restarted =
            runtime.add_container("flappy", ContainerStatus::Exited, "img-1", &[], 100);
        runtime.mark_running_after_first_listing(&restarted);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        assert_eq!(report.summary.removed_count, 1);
        assert_eq!(report.details.removed[0].name, "steady");
        assert_eq!(report.details.skipped.len(), 1);
        assert_eq!(
            report.details.skipped[0].reason,
            SkipReason::InUseAtRecheck
        );
        assert_eq!(report.details.skipped[0].resource.name, "flappy");
        assert_eq!(runtime.remaining_counts(), [1, 0, 0, 0]);
    }

    #[tokio::test]
    async fn engine_refusal_is_recorded_as_skip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        let id = runtime.add_container("held", ContainerStatus::Exited, "img-1", &[], 100);
        runtime.refuse_removal_in_use(&id);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        assert_eq!(report.summary.removed_count, 0);
        assert_eq!(report.details.skipped.len(), 1);
        assert_eq!(
            report.details.skipped[0].reason,
            SkipReason::RemovalRefused
        );
        assert!(report.details.errors.is_empty());
        assert_eq!(runtime.remaining_counts(), [1, 0, 0, 0]);
    }

    #[tokio::test]
    async fn removal_failure_is_recorded_and_pass_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        let broken = runtime.add_container("broken", ContainerStatus::Exited, "img-1", &[], 500);
        runtime.fail_removal(&broken);
        runtime.add_container("fine", ContainerStatus::Exited, "img-1", &[], 10);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        // The larger resource fails first, the smaller one is still removed.
        assert_eq!(report.summary.removed_count, 1);
        assert_eq!(report.details.removed[0].name, "fine");
        assert_eq!(report.details.errors.len(), 1);
        assert_eq!(report.details.errors[0].code.as_deref(), Some("DSW-2005"));
        assert_eq!(runtime.remaining_counts(), [1, 0, 0, 0]);
    }

    #[tokio::test]
    async fn vanished_candidate_becomes_error_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        let ghost = runtime.add_container("ghost", ContainerStatus::Exited, "img-1", &[], 100);
        runtime.vanish_after_first_listing(&ghost);
        runtime.add_container("solid", ContainerStatus::Exited, "img-1", &[], 10);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        // The ghost scanned as unused, then disappeared before its removal
        // call. Absent at recheck means not in use, so removal was attempted
        // and the engine answered NotFound.
        assert_eq!(report.details.errors.len(), 1);
        assert_eq!(report.details.errors[0].code.as_deref(), Some("DSW-2002"));
        assert!(
            report.details.errors[0]
                .message
                .contains("vanished before removal")
        );
        assert_eq!(report.summary.removed_count, 1);
        assert_eq!(report.details.removed[0].name, "solid");
    }

    #[tokio::test]
    async fn every_candidate_lands_in_exactly_one_bucket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("clean", ContainerStatus::Exited, "img-1", &[], 10);
        let held = runtime.add_container("held", ContainerStatus::Exited, "img-1", &[], 20);
        runtime.refuse_removal_in_use(&held);
        let flappy = runtime.add_container("flappy", ContainerStatus::Exited, "img-1", &[], 30);
        runtime.mark_running_after_first_listing(&flappy);
        let broken = runtime.add_container("broken", ContainerStatus::Exited, "img-1", &[], 40);
        runtime.fail_removal(&broken);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        assert_eq!(report.summary.scanned, 4);
        assert_eq!(report.summary.removed_count, 1);
        assert_eq!(report.details.skipped.len(), 2);
        assert_eq!(report.details.errors.len(), 1);
        assert_eq!(report.details.total_accounted(), 4);
    }

    #[tokio::test]
    async fn connectivity_failure_leaves_minimal_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("a", ContainerStatus::Exited, "img-1", &[], 100);
        runtime.set_ping_failure(true);

        let config = test_config(dir.path());
        let report_dir = config.report.dir.clone();
        let cleaner = build(config, &runtime, &host);

        let error = cleaner
            .run(RunMode::Preview)
            .await
            .expect_err("ping failure must abort the pass");

        assert_eq!(error.code(), "DSW-2001");
        assert!(error.is_run_fatal());

        let reports = json_reports(&report_dir);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].summary.scanned, 0);
        assert_eq!(reports[0].summary.removed_count, 0);
        assert_eq!(reports[0].details.errors[0].code.as_deref(), Some("DSW-2001"));
    }

    #[tokio::test]
    async fn freed_space_within_tolerance_passes_quietly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("a", ContainerStatus::Exited, "img-1", &[], 1000);
        // 990 bytes measured against 1000 predicted is inside the default
        // 5 percent tolerance.
        host.push_free_bytes(5000);
        host.push_free_bytes(5990);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        assert_eq!(report.summary.removed_count, 1);
        assert_eq!(report.summary.space_freed_bytes, 1000);
    }

    #[tokio::test]
    async fn freed_space_mismatch_never_fails_the_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("a", ContainerStatus::Exited, "img-1", &[], 1000);
        // Only 400 bytes actually came back.
        host.push_free_bytes(5000);
        host.push_free_bytes(5400);
        let cleaner = build(test_config(dir.path()), &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("mismatch is warn-only");

        assert_eq!(report.summary.removed_count, 1);
        assert_eq!(runtime.remaining_counts(), [0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn empty_engine_yields_empty_report_and_no_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        let config = test_config(dir.path());
        let report_dir = config.report.dir.clone();
        let cleaner = build(config, &runtime, &host);

        let report = cleaner
            .run(RunMode::Destructive)
            .await
            .expect("destructive pass");

        assert_eq!(report.summary.scanned, 0);
        assert_eq!(report.summary.removed_count, 0);
        assert_eq!(report.summary.space_freed_bytes, 0);
        // Nothing to remove, nothing to back up.
        assert!(
            cleaner
                .backups
                .list_backups()
                .expect("backup listing")
                .is_empty()
        );
        assert_eq!(json_reports(&report_dir).len(), 1);
    }

    #[tokio::test]
    async fn scan_candidates_filters_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Arc::new(MemoryRuntime::new());
        let host = Arc::new(StaticHost::new());
        runtime.add_container("stopped", ContainerStatus::Exited, "img-live", &[], 10);
        runtime.add_image("left", "over", 700);
        runtime.add_volume("data", "/var/lib/docker/volumes/data/_data");
        host.set_du_size("/var/lib/docker/volumes/data/_data", 5000);

        let mut config = test_config(dir.path());
        config.cleanup.protected = vec!["data".to_string()];
        let cleaner = build(config, &runtime, &host);

        let candidates = cleaner.scan_candidates().await.expect("scan");

        let names: Vec<&str> = candidates.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["left:over", "stopped"]);
        assert_eq!(candidates[0].size_bytes, 700);
        assert!(runtime.removed_ids().is_empty());
    }
}
