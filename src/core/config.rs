//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DswError, Result};
use crate::core::paths::{default_config_file, default_data_dir, resolve_absolute_path};
use crate::core::resource::ResourceKind;
use crate::daemon::notifications::NotificationConfig;

/// Full docksweep configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub docker: DockerConfig,
    pub cleanup: CleanupConfig,
    pub backup: BackupConfig,
    pub report: ReportConfig,
    pub schedule: ScheduleConfig,
    pub notifications: NotificationConfig,
    pub paths: PathsConfig,
}

/// Docker daemon connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DockerConfig {
    /// Daemon address (`unix:///...` or `tcp://host:port`). `None` uses the
    /// platform defaults, honoring `DOCKER_HOST`.
    pub host: Option<String>,
    pub timeout_seconds: u64,
}

/// What the cleaner may touch and how removals are checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleanupConfig {
    /// Protection patterns: `tag:<name>`, `id:<value>`, `*`-globs over the
    /// resource name, or exact names.
    pub protected: Vec<String>,
    /// Resource kinds eligible for removal. Empty means all four kinds.
    pub kinds: Vec<String>,
    /// Relative tolerance for the space-freed verification.
    pub verify_tolerance: f64,
}

/// Pre-removal backup snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

/// Cleanup report persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    pub dir: PathBuf,
    /// Also write a human-readable summary next to the JSON report.
    pub write_summary: bool,
}

/// Daemon schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Five-field cron expression (minute hour day-of-month month day-of-week).
    pub cron: String,
    /// Whether scheduled passes actually remove resources. When false the
    /// daemon runs preview passes only.
    pub destructive: bool,
}

/// Filesystem paths used by docksweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout_seconds: 30,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            protected: Vec::new(),
            kinds: Vec::new(),
            verify_tolerance: 0.05,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_data_dir().join("backups"),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir().join("reports"),
            write_summary: true,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 3 * * *".to_string(),
            destructive: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: default_config_file(),
        }
    }
}

impl CleanupConfig {
    /// Parse the configured kind allow-list. Empty input means no
    /// restriction and yields an empty vec.
    pub fn allowed_kinds(&self) -> Result<Vec<ResourceKind>> {
        self.kinds
            .iter()
            .map(|raw| {
                ResourceKind::parse(raw).ok_or_else(|| DswError::InvalidConfig {
                    details: format!(
                        "cleanup.kinds entry {raw:?} is not one of \
                         containers/images/volumes/networks"
                    ),
                })
            })
            .collect()
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DswError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(DswError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// Uses FNV-1a for cross-process-stable hashing (no `DefaultHasher`
    /// whose seed may vary across Rust releases).
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // docker
        if let Some(raw) = env_var("DSW_DOCKER_HOST") {
            self.docker.host = Some(raw);
        }
        set_env_u64(
            "DSW_DOCKER_TIMEOUT_SECONDS",
            &mut self.docker.timeout_seconds,
        )?;

        // cleanup (list-valued overrides share the injectable helper below)
        set_env_f64(
            "DSW_CLEANUP_VERIFY_TOLERANCE",
            &mut self.cleanup.verify_tolerance,
        )?;
        self.apply_list_env_overrides_from(env_var);

        // backup
        set_env_bool("DSW_BACKUP_ENABLED", &mut self.backup.enabled)?;
        if let Some(raw) = env_var("DSW_BACKUP_DIR") {
            self.backup.dir = PathBuf::from(raw);
        }

        // report
        if let Some(raw) = env_var("DSW_REPORT_DIR") {
            self.report.dir = PathBuf::from(raw);
        }
        set_env_bool("DSW_REPORT_WRITE_SUMMARY", &mut self.report.write_summary)?;

        // schedule
        if let Some(raw) = env_var("DSW_SCHEDULE_CRON") {
            self.schedule.cron = raw;
        }
        set_env_bool(
            "DSW_SCHEDULE_DESTRUCTIVE",
            &mut self.schedule.destructive,
        )?;

        Ok(())
    }

    fn apply_list_env_overrides_from<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DSW_CLEANUP_PROTECTED") {
            self.cleanup.protected = split_env_list(&raw);
        }
        if let Some(raw) = lookup("DSW_CLEANUP_KINDS") {
            self.cleanup.kinds = split_env_list(&raw);
        }
    }

    /// Resolve configured locations to absolute, normalized paths.
    ///
    /// Relative directories (TOML values or `DSW_*_DIR` overrides) are
    /// anchored to the working directory once at load time. Empty values
    /// stay empty for `validate` to reject.
    fn normalize_paths(&mut self) {
        for path in [
            &mut self.paths.config_file,
            &mut self.backup.dir,
            &mut self.report.dir,
        ] {
            if !path.as_os_str().is_empty() {
                *path = resolve_absolute_path(path);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.docker.timeout_seconds == 0 {
            return Err(DswError::InvalidConfig {
                details: "docker.timeout_seconds must be >= 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.cleanup.verify_tolerance) {
            return Err(DswError::InvalidConfig {
                details: format!(
                    "cleanup.verify_tolerance must be in [0, 1], got {}",
                    self.cleanup.verify_tolerance
                ),
            });
        }

        // Reject unknown kinds and uncompilable protection patterns early.
        self.cleanup.allowed_kinds()?;
        for pattern in &self.cleanup.protected {
            crate::scanner::protection::validate_pattern(pattern)?;
        }

        if self.backup.enabled && self.backup.dir.as_os_str().is_empty() {
            return Err(DswError::InvalidConfig {
                details: "backup.dir must not be empty while backup.enabled=true".to_string(),
            });
        }
        if self.report.dir.as_os_str().is_empty() {
            return Err(DswError::InvalidConfig {
                details: "report.dir must not be empty".to_string(),
            });
        }

        crate::schedule::Schedule::parse(&self.schedule.cron)?;

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn split_env_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn set_env_f64(name: &str, slot: &mut f64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<f64>().map_err(|error| DswError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| DswError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| DswError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
