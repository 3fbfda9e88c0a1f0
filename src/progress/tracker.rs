//! Throttled progress tracking.
//!
//! Executors report cumulative byte counts as often as they like. The
//! [`ProgressTracker`] lets at most one report per download through every
//! interval and turns it into a [`ProgressUpdate`] carrying the derived speed
//! and time remaining.

use crate::download::{DownloadId, DownloadItem};
use crate::transfer::TransferProgress;

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default minimum time between two accepted updates of one download.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(1000);

/// An accepted progress report with its derived values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub bytes_written: u64,
    /// 0 when unknown.
    pub bytes_expected: u64,
    /// Bytes per second since the previous accepted update.
    pub speed: f64,
    /// Seconds remaining at the current speed, 0 when it cannot be computed.
    pub eta: f64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_update: Instant,
    high_water: u64,
}

/// Per-download throttle state.
#[derive(Debug)]
pub struct ProgressTracker {
    interval: Duration,
    entries: HashMap<DownloadId, Entry>,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            entries: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts tracking a new transfer attempt of `id`.
    ///
    /// The first report of the attempt is accepted one interval after `now`.
    pub fn begin(&mut self, id: DownloadId, now: Instant) {
        self.entries.insert(
            id,
            Entry {
                last_update: now,
                high_water: 0,
            },
        );
    }

    /// Stops tracking `id`.
    pub fn forget(&mut self, id: &DownloadId) {
        self.entries.remove(id);
    }

    /// Whether `id` has a transfer attempt being tracked.
    pub fn is_tracking(&self, id: &DownloadId) -> bool {
        self.entries.contains_key(id)
    }

    /// Feeds a raw report for `item`.
    ///
    /// Returns `None` when the report is throttled, belongs to an untracked
    /// download, or moves backwards within the current attempt.
    pub fn observe(
        &mut self,
        item: &DownloadItem,
        progress: TransferProgress,
        now: Instant,
    ) -> Option<ProgressUpdate> {
        let entry = self.entries.get_mut(&item.id)?;
        if progress.bytes_written < entry.high_water {
            return None;
        }

        let elapsed = now.saturating_duration_since(entry.last_update);
        if elapsed < self.interval {
            return None;
        }

        let seconds = elapsed.as_secs_f64();
        let delta = progress
            .bytes_written
            .saturating_sub(item.state.bytes_downloaded);
        let speed = if seconds > 0.0 {
            delta as f64 / seconds
        } else {
            0.0
        };
        let eta = if speed > 0.0 && progress.bytes_expected > 0 {
            progress.bytes_expected.saturating_sub(progress.bytes_written) as f64 / speed
        } else {
            0.0
        };

        entry.last_update = now;
        entry.high_water = progress.bytes_written;

        Some(ProgressUpdate {
            bytes_written: progress.bytes_written,
            bytes_expected: progress.bytes_expected,
            speed,
            eta,
        })
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{ContentInfo, SourceRef, TransferSpec, DEFAULT_MAX_RETRIES};
    use std::path::PathBuf;

    fn create_test_item(expected_size: u64) -> DownloadItem {
        DownloadItem::new(
            SourceRef::new("svc-1", "sonarr"),
            ContentInfo::new("Pilot", "episode"),
            TransferSpec {
                source_url: "https://example.com/pilot.mkv".to_string(),
                destination_path: PathBuf::from("/tmp/haul/pilot.mkv"),
                file_name: "pilot.mkv".to_string(),
                mime_type: None,
                expected_size,
                checksum: None,
            },
            DEFAULT_MAX_RETRIES,
        )
    }

    fn report(bytes_written: u64, bytes_expected: u64) -> TransferProgress {
        TransferProgress {
            bytes_written,
            bytes_expected,
        }
    }

    #[test]
    fn test_untracked_download_is_ignored() {
        let mut tracker = ProgressTracker::default();
        let item = create_test_item(1000);
        let later = Instant::now() + Duration::from_secs(5);
        assert!(tracker.observe(&item, report(10, 1000), later).is_none());
    }

    #[test]
    fn test_reports_within_interval_are_throttled() {
        let mut tracker = ProgressTracker::default();
        let item = create_test_item(1000);
        let start = Instant::now();
        tracker.begin(item.id, start);

        assert!(tracker
            .observe(&item, report(100, 1000), start + Duration::from_millis(999))
            .is_none());
        assert!(tracker
            .observe(&item, report(200, 1000), start + Duration::from_millis(1000))
            .is_some());
        assert!(tracker
            .observe(&item, report(300, 1000), start + Duration::from_millis(1500))
            .is_none());
    }

    #[test]
    fn test_high_frequency_reports_yield_one_update_per_interval() {
        let mut tracker = ProgressTracker::default();
        let item = create_test_item(60_000);
        let start = Instant::now();
        tracker.begin(item.id, start);

        let mut accepted = 0;
        for tick in 1..=60u64 {
            let now = start + Duration::from_millis(tick * 50);
            if tracker.observe(&item, report(tick * 1000, 60_000), now).is_some() {
                accepted += 1;
            }
        }
        assert!(accepted <= 3, "accepted {} updates", accepted);
        assert!(accepted >= 2);
    }

    #[test]
    fn test_speed_and_eta() {
        let mut tracker = ProgressTracker::default();
        let mut item = create_test_item(10_000);
        let start = Instant::now();
        tracker.begin(item.id, start);

        let update = tracker
            .observe(&item, report(2000, 10_000), start + Duration::from_secs(2))
            .unwrap();
        assert_eq!(update.speed, 1000.0);
        assert_eq!(update.eta, 8.0);

        item.record_progress(update.bytes_written, update.bytes_expected, update.speed, update.eta);
        let update = tracker
            .observe(&item, report(6000, 10_000), start + Duration::from_secs(4))
            .unwrap();
        assert_eq!(update.speed, 2000.0);
        assert_eq!(update.eta, 2.0);
    }

    #[test]
    fn test_unknown_size_has_no_eta() {
        let mut tracker = ProgressTracker::default();
        let item = create_test_item(0);
        let start = Instant::now();
        tracker.begin(item.id, start);

        let update = tracker
            .observe(&item, report(500, 0), start + Duration::from_secs(1))
            .unwrap();
        assert_eq!(update.speed, 500.0);
        assert_eq!(update.eta, 0.0);
    }

    #[test]
    fn test_regression_is_ignored() {
        let mut tracker = ProgressTracker::new(Duration::from_millis(10));
        let item = create_test_item(1000);
        let start = Instant::now();
        tracker.begin(item.id, start);

        assert!(tracker
            .observe(&item, report(500, 1000), start + Duration::from_millis(20))
            .is_some());
        assert!(tracker
            .observe(&item, report(400, 1000), start + Duration::from_millis(40))
            .is_none());
    }

    #[test]
    fn test_begin_resets_attempt() {
        let mut tracker = ProgressTracker::new(Duration::from_millis(10));
        let item = create_test_item(1000);
        let start = Instant::now();
        tracker.begin(item.id, start);
        tracker.observe(&item, report(800, 1000), start + Duration::from_millis(20));

        tracker.begin(item.id, start + Duration::from_millis(30));
        assert!(tracker
            .observe(&item, report(100, 1000), start + Duration::from_millis(50))
            .is_some());

        tracker.forget(&item.id);
        assert!(!tracker.is_tracking(&item.id));
    }
}
