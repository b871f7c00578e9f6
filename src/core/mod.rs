//! Core types: errors, configuration, resource model, shared paths.

pub mod config;
pub mod errors;
pub mod paths;
pub mod resource;
