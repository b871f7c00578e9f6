#![forbid(unsafe_code)]

//! docksweep — safety-first cleaner for unused Docker resources.
//!
//! One pipeline behind every entry point:
//! 1. **Scan** — list containers, images, volumes, and networks and work out
//!    which ones nothing uses anymore
//! 2. **Protect** — drop everything matching the configured protection
//!    patterns and kind allow-list
//! 3. **Remove** — preview or actually delete, largest first, with a backup
//!    snapshot, a fresh in-use recheck per resource, and a space-freed check
//!    at the end
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use docksweep::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use docksweep::core::config::Config;
//! use docksweep::scanner::usage::UsageScanner;
//! ```

pub mod prelude;

pub mod backup;
pub mod cleaner;
pub mod client;
pub mod core;
pub mod daemon;
pub mod report;
pub mod scanner;
pub mod schedule;
