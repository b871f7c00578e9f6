//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use docksweep::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DswError, Result};
pub use crate::core::resource::{Report, Resource, ResourceKind, RunMode};

// Clients
pub use crate::client::docker::DockerRuntime;
pub use crate::client::host::LocalHost;
pub use crate::client::{HostClient, RuntimeClient};

// Pipeline
pub use crate::cleaner::Cleaner;
pub use crate::scanner::protection::ProtectionPolicy;
pub use crate::scanner::sizing::SizeAccountant;
pub use crate::scanner::usage::UsageScanner;

// Persistence
pub use crate::backup::{Backup, BackupRecorder, load_backup};
pub use crate::report::ReportStore;

// Scheduling
pub use crate::schedule::Schedule;
