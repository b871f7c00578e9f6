//! Resource scanner: usage classification, protection filtering, size accounting.

pub mod protection;
pub mod sizing;
pub mod usage;
