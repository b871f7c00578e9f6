//! Report persistence and rendering.
//!
//! Every cleanup pass produces one structured JSON report and, optionally,
//! a plain-text summary of the same pass. The store is append-only: each
//! persist call creates a new timestamped file and never overwrites an
//! earlier one.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use tracing::info;

use crate::core::errors::{DswError, Result};
use crate::core::resource::{Report, RunMode};

static REPORT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Append-only sink for cleanup reports under a fixed directory.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist the structured report as pretty JSON.
    pub fn persist_report(&self, report: &Report) -> Result<PathBuf> {
        let payload = serde_json::to_vec_pretty(report)?;
        let path = self.write_unique(&format!("report-{}", report.mode), "json", &payload)?;
        info!(path = %path.display(), "report written");
        Ok(path)
    }

    /// Persist a rendered plain-text summary alongside the JSON report.
    pub fn persist_summary(&self, mode: RunMode, summary: &str) -> Result<PathBuf> {
        self.write_unique(&format!("report-{mode}"), "txt", summary.as_bytes())
    }

    fn write_unique(&self, prefix: &str, extension: &str, payload: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|err| DswError::io(&self.dir, err))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        // The sequence keeps names unique within a second; create_new turns
        // any remaining collision into an error instead of an overwrite.
        for _ in 0..8 {
            let seq = REPORT_SEQ.fetch_add(1, Ordering::Relaxed);
            let path = self.dir.join(format!("{prefix}-{stamp}-{seq:04}.{extension}"));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(payload)
                        .map_err(|err| DswError::io(&path, err))?;
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(DswError::io(&path, err)),
            }
        }

        Err(DswError::io(
            &self.dir,
            std::io::Error::other("no free report filename"),
        ))
    }
}

/// Render a report as the human-readable summary text.
#[must_use]
pub fn render_summary(report: &Report) -> String {
    let mut out = String::new();
    let when = report.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
    let _ = writeln!(out, "docksweep {} run at {when}", report.mode);
    let _ = writeln!(out, "  scanned:  {} unused candidate(s)", report.summary.scanned);
    let _ = writeln!(
        out,
        "  removed:  {} ({})",
        report.summary.removed_count,
        format_bytes(report.summary.space_freed_bytes)
    );
    let _ = writeln!(out, "  skipped:  {}", report.details.skipped.len());
    let _ = writeln!(out, "  errors:   {}", report.details.errors.len());
    let _ = writeln!(out, "  duration: {} ms", report.summary.duration_ms);

    if !report.details.removed.is_empty() {
        let verb = if report.mode.is_destructive() {
            "removed"
        } else {
            "would remove"
        };
        let _ = writeln!(out, "\n{verb}:");
        for r in &report.details.removed {
            let kind = r.kind().to_string();
            let _ = writeln!(
                out,
                "  {kind:<9} {:<40} {:>10}  {}",
                r.name,
                format_bytes(r.size_bytes),
                r.short_id()
            );
        }
    }

    if !report.details.skipped.is_empty() {
        let _ = writeln!(out, "\nskipped:");
        for s in &report.details.skipped {
            let kind = s.resource.kind().to_string();
            let _ = writeln!(out, "  {kind:<9} {:<40} {}", s.resource.name, s.reason);
        }
    }

    if !report.details.errors.is_empty() {
        let _ = writeln!(out, "\nerrors:");
        for e in &report.details.errors {
            let subject = e
                .resource
                .as_ref()
                .map_or_else(|| "run".to_string(), |r| format!("{} {}", r.kind(), r.name));
            match &e.code {
                Some(code) => {
                    let _ = writeln!(out, "  {subject}: [{code}] {}", e.message);
                }
                None => {
                    let _ = writeln!(out, "  {subject}: {}", e.message);
                }
            }
        }
    }

    out
}

/// Humanize a byte count for summaries and CLI output.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.0} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
