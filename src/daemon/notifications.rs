//! Multi-channel notifications: file, journal, and webhook channels.
//!
//! Dispatches structured events through the configured channels with min-level
//! filtering. Every channel is fire-and-forget; a notification failure is
//! logged and never affects a cleanup pass.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::paths::default_data_dir;
use crate::core::resource::RunMode;
use crate::report::format_bytes;

// ──────────────────── notification level ────────────────────

/// Severity level for notification filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ──────────────────── notification events ────────────────────

/// A structured notification event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    PassCompleted {
        mode: RunMode,
        removed: usize,
        skipped: usize,
        errors: usize,
        bytes_freed: u64,
    },
    PassFailed {
        code: String,
        message: String,
    },
    VerificationMismatch {
        predicted_bytes: u64,
        actual_bytes: u64,
    },
    DaemonStarted {
        version: String,
        cron: String,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
    },
}

impl NotificationEvent {
    /// The severity level of this event (for min-level filtering).
    #[must_use]
    pub const fn level(&self) -> NotificationLevel {
        match self {
            Self::DaemonStarted { .. } | Self::DaemonStopped { .. } => NotificationLevel::Info,

            Self::PassCompleted { errors, .. } => {
                if *errors > 0 {
                    NotificationLevel::Warning
                } else {
                    NotificationLevel::Info
                }
            }

            Self::VerificationMismatch { .. } => NotificationLevel::Warning,

            Self::PassFailed { .. } => NotificationLevel::Error,
        }
    }

    /// Short human-readable summary line.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::PassCompleted {
                mode,
                removed,
                skipped,
                errors,
                bytes_freed,
            } => format!(
                "{mode} pass: {removed} removed ({}), {skipped} skipped, {errors} errors",
                format_bytes(*bytes_freed)
            ),
            Self::PassFailed { code, message } => format!("[{code}] {message}"),
            Self::VerificationMismatch {
                predicted_bytes,
                actual_bytes,
            } => format!(
                "freed-space check: predicted {} but measured {}",
                format_bytes(*predicted_bytes),
                format_bytes(*actual_bytes)
            ),
            Self::DaemonStarted { version, cron } => {
                format!("docksweep v{version} started (schedule {cron})")
            }
            Self::DaemonStopped {
                reason,
                uptime_secs,
            } => {
                let hours = uptime_secs / 3600;
                let minutes = (uptime_secs % 3600) / 60;
                format!("docksweep stopped ({reason}) after {hours}h {minutes}m")
            }
        }
    }
}

// ──────────────────── configuration ────────────────────

/// Top-level notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Master switch for all notifications.
    pub enabled: bool,
    /// Which channel names to activate.
    pub channels: Vec<String>,
    pub file: FileConfig,
    pub journal: JournalConfig,
    pub webhook: WebhookConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: vec!["journal".to_string(), "file".to_string()],
            file: FileConfig::default(),
            journal: JournalConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// File notification settings (append-only JSONL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub path: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("notifications.jsonl"),
        }
    }
}

/// Journal notification settings (systemd journal via stderr).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JournalConfig {
    pub min_level: NotificationLevel,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            min_level: NotificationLevel::Warning,
        }
    }
}

/// Webhook notification settings (HTTP POST).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    pub min_level: NotificationLevel,
    /// Template string with `${SUMMARY}`, `${LEVEL}`, `${MODE}`, `${FREED}` placeholders.
    pub template: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            min_level: NotificationLevel::Error,
            template: r#"{"text": "docksweep: ${SUMMARY}"}"#.to_string(),
        }
    }
}

// ──────────────────── JSONL record ────────────────────

/// A single notification record written to the JSONL file.
#[derive(Debug, Serialize)]
struct NotificationRecord {
    ts: String,
    level: NotificationLevel,
    summary: String,
    #[serde(flatten)]
    event: NotificationEvent,
}

// ──────────────────── notification channels ────────────────────

/// A notification channel that can dispatch events.
trait Channel: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, event: &NotificationEvent);
}

// ──── File (append-only JSONL) ────

struct FileChannel {
    path: PathBuf,
}

impl FileChannel {
    fn new(config: &FileConfig) -> Self {
        Self {
            path: config.path.clone(),
        }
    }
}

impl Channel for FileChannel {
    fn name(&self) -> &'static str {
        "file"
    }

    fn send(&self, event: &NotificationEvent) {
        let record = NotificationRecord {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: event.level(),
            summary: event.summary(),
            event: event.clone(),
        };

        let Ok(json) = serde_json::to_string(&record) else {
            return;
        };

        // Ensure parent directory exists.
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let file = {
            let mut opts = OpenOptions::new();
            opts.create(true).append(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o600);
            }
            opts.open(&self.path)
        };

        if let Ok(mut f) = file {
            let _ = writeln!(f, "{json}");
        }
    }
}

// ──── Journal (systemd structured stderr) ────

struct JournalChannel {
    min_level: NotificationLevel,
}

impl JournalChannel {
    const fn new(config: &JournalConfig) -> Self {
        Self {
            min_level: config.min_level,
        }
    }
}

impl Channel for JournalChannel {
    fn name(&self) -> &'static str {
        "journal"
    }

    fn send(&self, event: &NotificationEvent) {
        if event.level() < self.min_level {
            return;
        }

        // systemd captures stderr; the bracketed priority keeps journal
        // filtering usable without structured logging support.
        let priority = match event.level() {
            NotificationLevel::Error => "ERR",
            NotificationLevel::Warning => "WARNING",
            NotificationLevel::Info => "INFO",
        };

        eprintln!("[DSW-NOTIFY] [{priority}] {}", event.summary());
    }
}

// ──── Webhook (HTTP POST) ────

struct WebhookChannel {
    url: String,
    min_level: NotificationLevel,
    template: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    fn new(config: &WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            url: config.url.clone(),
            min_level: config.min_level,
            template: config.template.clone(),
            client,
        }
    }

    fn render_body(&self, event: &NotificationEvent) -> String {
        let summary = event.summary();
        let level = event.level().to_string();

        let (mode, freed) = match event {
            NotificationEvent::PassCompleted {
                mode, bytes_freed, ..
            } => (mode.to_string(), format_bytes(*bytes_freed)),
            _ => ("N/A".to_string(), "N/A".to_string()),
        };

        // JSON-escape substituted values so the rendered body stays valid JSON.
        let esc = |s: &str| {
            s.replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n")
        };

        self.template
            .replace("${SUMMARY}", &esc(&summary))
            .replace("${LEVEL}", &esc(&level))
            .replace("${MODE}", &esc(&mode))
            .replace("${FREED}", &esc(&freed))
    }
}

impl Channel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send(&self, event: &NotificationEvent) {
        if event.level() < self.min_level {
            return;
        }

        if self.url.is_empty() {
            return;
        }

        let request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(self.render_body(event));

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("webhook notification dropped outside an async runtime");
            return;
        };
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "webhook notification rejected");
                }
                Ok(_) => {}
                Err(error) => warn!(%error, "webhook notification failed"),
            }
        });
    }
}

// ──────────────────── notification manager ────────────────────

/// Coordinates dispatching notification events to all enabled channels.
///
/// Cheap to call from the daemon loop: file appends, journal writes to
/// stderr, and the webhook posts on a spawned task. Channel failures never
/// propagate.
pub struct NotificationManager {
    channels: Vec<Box<dyn Channel>>,
    enabled: bool,
}

impl NotificationManager {
    /// Build a manager from configuration.
    #[must_use]
    pub fn from_config(config: &NotificationConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let mut channels: Vec<Box<dyn Channel>> = Vec::new();

        for channel_name in &config.channels {
            match channel_name.as_str() {
                "file" => {
                    channels.push(Box::new(FileChannel::new(&config.file)));
                }
                "journal" => {
                    channels.push(Box::new(JournalChannel::new(&config.journal)));
                }
                "webhook" if config.webhook.enabled => {
                    channels.push(Box::new(WebhookChannel::new(&config.webhook)));
                }
                _ => {
                    // Unknown or disabled channel name, skip silently.
                }
            }
        }

        Self {
            channels,
            enabled: true,
        }
    }

    /// Create a disabled (no-op) manager.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: Vec::new(),
            enabled: false,
        }
    }

    /// Dispatch a notification event to all enabled channels.
    pub fn notify(&self, event: &NotificationEvent) {
        if !self.enabled {
            return;
        }

        for channel in &self.channels {
            channel.send(event);
        }
    }

    /// Number of active channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Whether the manager is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// List the names of active channels.
    #[must_use]
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

// ──────────────────── tests ────────────────────
