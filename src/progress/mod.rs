//! Progress module throttling raw transfer progress.
//!
//! Transfers report their byte counts at whatever rate the executor produces
//! them. The scheduler runs every report through a [`ProgressTracker`], which
//! accepts at most one report per download per interval and derives speed and
//! ETA for the accepted ones.
//!
//! # Examples
//!
//! ```rust
//! use haul::progress::ProgressTracker;
//! use std::time::Duration;
//!
//! let tracker = ProgressTracker::new(Duration::from_millis(500));
//! assert_eq!(tracker.interval(), Duration::from_millis(500));
//! ```

pub mod tracker;

pub use tracker::{ProgressTracker, ProgressUpdate, DEFAULT_PROGRESS_INTERVAL};
