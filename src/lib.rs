//! # `ontrack`
//!
//! Personal task tracker built around a prerequisite graph: task and
//! group status derive from due dates and dependency completion, groups
//! can be instantiated from templates with date shifting, and a scan
//! loop fires one-time reminders and daily overdue escalations.

pub mod calendar;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod graph;
pub mod notify;
pub mod presets;
pub mod store;
pub mod templates;
pub mod testing;

pub use error::{Error, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
