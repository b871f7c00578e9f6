//! Daemon subsystem: the scheduled sweep loop and operator notifications.

#[cfg(feature = "daemon")]
pub mod loop_main;
pub mod notifications;
