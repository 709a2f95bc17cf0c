//! Directory watching and ingestion scheduling.
//!
//! This module provides:
//! - Per-watch filesystem event loops with debounced ingestion
//! - Recursive directory tracking with native or polling backends
//! - Crash/restart supervision per watch
//! - The ordered watch registry with its persistence lifecycle

mod dirwatch;
mod registry;

pub use dirwatch::Dirwatch;
pub use registry::Dirwatches;
