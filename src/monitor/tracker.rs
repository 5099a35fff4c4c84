//! Sync-state tracking for a range-event stream.
//!
//! This module provides the `SyncTracker`, which ingests out-of-order,
//! possibly-duplicate range events, maintains them as a merged ordered set of
//! covered spans, and computes the contiguous block ranges that have not been
//! observed relative to a moving frontier.
//!
//! The tracker is the single source of truth for the sync status of one
//! monitored event stream. It is driven by the monitor worker, which feeds it
//! one batch of events per poll cycle and reports the resulting status.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::monitor::range_event::{BlockRange, RangeEvent};

/// Whether the observed coverage keeps up with the chain frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No reportable gaps behind the frontier.
    InSync,
    /// At least one gap beyond the tolerance window.
    OutOfSync,
}

/// Configuration for a `SyncTracker`, fixed at construction.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Trailing distance from the frontier that is not yet considered a
    /// problem, accounting for source finality lag.
    pub gap_tolerance: u64,
    /// Known pre-existing gaps: if the earliest covered range starts at one
    /// of these heights, the leading gap `[0, height)` stems from a prior
    /// contract version and is not reported.
    pub accepted_leading_gaps: BTreeSet<u64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gap_tolerance: 192,
            accepted_leading_gaps: BTreeSet::new(),
        }
    }
}

/// Outcome of one check cycle: the status before and after, and the gaps
/// found at that frontier.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub previous: SyncStatus,
    pub current: SyncStatus,
    pub missing: Vec<BlockRange>,
}

impl SyncReport {
    /// True when this cycle flipped the sync status.
    pub fn is_transition(&self) -> bool {
        self.previous != self.current
    }
}

/// Tracks which block spans of the event stream have been observed.
///
/// Covered spans are kept in an ordered map keyed by start height, so
/// duplicate-origin merges are O(log n) and iteration is always ascending.
/// Spans from distinct origins may overlap; gap computation treats the
/// running end as a high-water mark.
#[derive(Debug, Clone)]
pub struct SyncTracker {
    /// Start height -> largest finalized count seen for that start.
    covered: BTreeMap<u64, u64>,
    /// Frontier of the last check, `None` until the first one.
    last_checked: Option<u64>,
    status: SyncStatus,
    config: TrackerConfig,
}

impl SyncTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            covered: BTreeMap::new(),
            last_checked: None,
            status: SyncStatus::InSync,
            config,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn last_checked(&self) -> Option<u64> {
        self.last_checked
    }

    pub fn gap_tolerance(&self) -> u64 {
        self.config.gap_tolerance
    }

    /// Covered spans in ascending start order, one per distinct start.
    pub fn covered_ranges(&self) -> impl Iterator<Item = RangeEvent> + '_ {
        self.covered
            .iter()
            .map(|(&start, &count)| RangeEvent::new(start, count))
    }

    /// Merge one observed range into the covered set.
    ///
    /// Events may arrive out of order and more than once; for each distinct
    /// start the stored count only ever grows to the maximum supplied.
    pub fn add_event(&mut self, event: RangeEvent) {
        self.covered
            .entry(event.start_block)
            .and_modify(|count| *count = (*count).max(event.num_finalized))
            .or_insert(event.num_finalized);
    }

    /// Compute the gaps behind `latest_block`, without mutating any state.
    ///
    /// Every returned interval is half-open: start inclusive, end exclusive.
    /// Gaps are measured against the safe boundary
    /// `latest_block - gap_tolerance`; the trailing interval (and the
    /// whole-range interval when nothing is covered) ends at
    /// `safe boundary + 1`, so the boundary block itself is expected.
    /// Intervals are ascending, non-overlapping and maximally merged.
    pub fn missing_ranges(&self, latest_block: u64) -> Vec<BlockRange> {
        let mut missing = Vec::new();
        let safe_boundary = latest_block.saturating_sub(self.config.gap_tolerance);

        let mut ranges = self.covered_ranges();
        let Some(first) = ranges.next() else {
            // Nothing observed yet. Until the frontier clears the tolerance
            // window, no block is expected to be finalized.
            if latest_block >= self.config.gap_tolerance {
                missing.push(BlockRange::new(0, safe_boundary + 1));
            }
            return missing;
        };

        if first.start_block > 0 {
            if self.config.accepted_leading_gaps.contains(&first.start_block) {
                info!(
                    "Ignoring known gap [0, {}): accepted as pre-existing",
                    first.start_block
                );
            } else {
                missing.push(BlockRange::new(0, first.start_block));
            }
        }

        let mut next_expected = first.end_block();
        for range in ranges {
            if range.start_block > next_expected {
                missing.push(BlockRange::new(next_expected, range.start_block));
            }
            // High-water mark: a span contained in an earlier one must not
            // pull the cursor backwards.
            next_expected = next_expected.max(range.end_block());
        }

        if next_expected < safe_boundary {
            missing.push(BlockRange::new(next_expected, safe_boundary + 1));
        }

        missing
    }

    /// Ingest a batch of events and commit the new status and frontier.
    ///
    /// This is the only mutator of status and frontier, and is meant to run
    /// as one unit per poll cycle with no overlapping invocation.
    pub fn check_and_update(
        &mut self,
        events: impl IntoIterator<Item = RangeEvent>,
        latest_block: u64,
    ) -> SyncReport {
        for event in events {
            self.add_event(event);
        }

        // A remote height below the committed frontier means the source
        // regressed (reorg, lagging replica). Never evaluate backwards.
        let height = match self.last_checked {
            Some(previous) if latest_block < previous => {
                warn!(
                    "Frontier regressed from {} to {}, evaluating at {}",
                    previous, latest_block, previous
                );
                previous
            }
            _ => latest_block,
        };

        let missing = self.missing_ranges(height);
        let previous = self.status;
        let current = if missing.is_empty() {
            SyncStatus::InSync
        } else {
            SyncStatus::OutOfSync
        };
        self.status = current;
        self.last_checked = Some(height);

        SyncReport {
            previous,
            current,
            missing,
        }
    }
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn tracker_with(events: &[(u64, u64)]) -> SyncTracker {
        let mut tracker = SyncTracker::default();
        for &(start, count) in events {
            tracker.add_event(RangeEvent::new(start, count));
        }
        tracker
    }

    #[test]
    fn add_single_event() {
        let tracker = tracker_with(&[(0, 128)]);
        let ranges: Vec<_> = tracker.covered_ranges().collect();
        assert_eq!(ranges, vec![RangeEvent::new(0, 128)]);
    }

    #[test]
    fn overlapping_events_keep_the_largest_count() {
        let tracker = tracker_with(&[(0, 128), (0, 256), (0, 384)]);
        let ranges: Vec<_> = tracker.covered_ranges().collect();
        assert_eq!(ranges, vec![RangeEvent::new(0, 384)]);
    }

    #[test]
    fn merge_never_shrinks_coverage() {
        let tracker = tracker_with(&[(0, 384), (0, 128)]);
        let ranges: Vec<_> = tracker.covered_ranges().collect();
        assert_eq!(ranges, vec![RangeEvent::new(0, 384)]);
    }

    #[test]
    fn non_overlapping_events_are_kept_apart() {
        let tracker = tracker_with(&[(0, 128), (1024, 128)]);
        let ranges: Vec<_> = tracker.covered_ranges().collect();
        assert_eq!(
            ranges,
            vec![RangeEvent::new(0, 128), RangeEvent::new(1024, 128)]
        );
    }

    #[test]
    fn out_of_order_arrival_stays_sorted_and_merged() {
        let tracker = tracker_with(&[(0, 128), (1024, 128), (0, 256)]);
        let ranges: Vec<_> = tracker.covered_ranges().collect();
        assert_eq!(
            ranges,
            vec![RangeEvent::new(0, 256), RangeEvent::new(1024, 128)]
        );
    }

    #[test]
    fn merge_is_order_independent() {
        let events = [(1024u64, 128u64), (0, 256), (1024, 528), (0, 128), (2048, 64)];
        let expected: Vec<_> = tracker_with(&events).covered_ranges().collect();
        for permutation in events.iter().copied().permutations(events.len()) {
            let tracker = tracker_with(&permutation);
            let ranges: Vec<_> = tracker.covered_ranges().collect();
            assert_eq!(ranges, expected);
            assert!(
                ranges
                    .iter()
                    .tuple_windows()
                    .all(|(a, b)| a.start_block < b.start_block)
            );
        }
    }

    #[test]
    fn no_missing_ranges_when_covered_up_to_tolerance() {
        let tracker = tracker_with(&[(0, 128), (0, 256), (1024, 128)]);
        let missing = tracker.missing_ranges(1024 + 128 + 192);
        assert_eq!(missing, vec![BlockRange::new(256, 1024)]);
    }

    #[test]
    fn leading_gap_is_reported() {
        let tracker = tracker_with(&[(1024, 128), (2048, 128)]);
        let missing = tracker.missing_ranges(2048 + 128 + 1);
        assert_eq!(
            missing,
            vec![BlockRange::new(0, 1024), BlockRange::new(1152, 2048)]
        );
    }

    #[test]
    fn empty_coverage_is_one_gap_to_the_boundary() {
        let tracker = SyncTracker::default();
        let missing = tracker.missing_ranges(1192);
        assert_eq!(missing, vec![BlockRange::new(0, 1001)]);
    }

    #[test]
    fn empty_coverage_below_tolerance_reports_nothing() {
        let tracker = SyncTracker::default();
        assert_eq!(tracker.missing_ranges(191), vec![]);
        // At exactly the tolerance the genesis block becomes expected.
        assert_eq!(tracker.missing_ranges(192), vec![BlockRange::new(0, 1)]);
    }

    #[test]
    fn trailing_gap_starts_one_past_the_tolerance() {
        let tracker = tracker_with(&[(0, 1024), (1024, 128)]);
        assert_eq!(tracker.missing_ranges(1024 + 128 + 192), vec![]);
        let missing = tracker.missing_ranges(1024 + 128 + 193);
        assert_eq!(missing, vec![BlockRange::new(1152, 1154)]);
    }

    #[test]
    fn gaps_on_all_three_sides() {
        let tracker = tracker_with(&[(1024, 128), (1024, 528), (1024, 256), (2048, 128)]);
        let missing = tracker.missing_ranges(2048 + 128 + 292);
        assert_eq!(
            missing,
            vec![
                BlockRange::new(0, 1024),
                BlockRange::new(1552, 2048),
                BlockRange::new(2176, 2277),
            ]
        );
    }

    #[test]
    fn contained_span_does_not_pull_the_cursor_back() {
        // (512, 64) ends before the high-water mark set by (0, 1024).
        let tracker = tracker_with(&[(0, 1024), (512, 64), (2048, 128)]);
        let missing = tracker.missing_ranges(2048 + 128 + 192);
        assert_eq!(missing, vec![BlockRange::new(1024, 2048)]);
    }

    #[test]
    fn accepted_leading_gap_is_suppressed() {
        let config = TrackerConfig {
            accepted_leading_gaps: BTreeSet::from([17031168]),
            ..TrackerConfig::default()
        };
        let mut tracker = SyncTracker::new(config);
        tracker.add_event(RangeEvent::new(17031168, 128));
        let missing = tracker.missing_ranges(17031168 + 128 + 192);
        assert_eq!(missing, vec![]);

        // A different first start is still reported in full.
        let mut other = SyncTracker::new(TrackerConfig {
            accepted_leading_gaps: BTreeSet::from([17031168]),
            ..TrackerConfig::default()
        });
        other.add_event(RangeEvent::new(1024, 128));
        assert_eq!(
            other.missing_ranges(1024 + 128 + 192),
            vec![BlockRange::new(0, 1024)]
        );
    }

    #[test]
    fn missing_ranges_does_not_mutate_state() {
        let tracker = tracker_with(&[(1024, 128)]);
        let before: Vec<_> = tracker.covered_ranges().collect();
        let _ = tracker.missing_ranges(4096);
        let after: Vec<_> = tracker.covered_ranges().collect();
        assert_eq!(before, after);
        assert_eq!(tracker.last_checked(), None);
        assert_eq!(tracker.status(), SyncStatus::InSync);
    }

    #[test]
    fn missing_ranges_complement_coverage_below_the_boundary() {
        let cases: &[&[(u64, u64)]] = &[
            &[],
            &[(0, 128)],
            &[(1024, 128), (2048, 128)],
            &[(0, 1024), (512, 64), (2048, 128), (4096, 1)],
            &[(5, 10), (20, 1), (21, 100), (300, 7)],
        ];
        let latest = 4096 + 192;
        for events in cases {
            let tracker = tracker_with(events);
            let missing = tracker.missing_ranges(latest);
            let boundary = latest - tracker.gap_tolerance();

            // Ascending, non-overlapping, non-touching.
            assert!(
                missing
                    .iter()
                    .tuple_windows()
                    .all(|(a, b)| a.end < b.start),
                "overlapping or unmerged gaps for {events:?}: {missing:?}"
            );

            // Every height below the boundary is covered or missing, never both.
            for height in 0..boundary {
                let covered = tracker
                    .covered_ranges()
                    .any(|r| r.start_block <= height && height < r.end_block());
                let gap = missing.iter().any(|g| g.start <= height && height < g.end);
                assert!(
                    covered ^ gap,
                    "height {height} covered={covered} gap={gap} for {events:?}"
                );
            }
        }
    }

    #[test]
    fn check_stays_in_sync() {
        let mut tracker = SyncTracker::default();
        let report = tracker.check_and_update(
            [RangeEvent::new(0, 1024), RangeEvent::new(1024, 128)],
            1024 + 128,
        );
        assert_eq!(report.previous, SyncStatus::InSync);
        assert_eq!(report.current, SyncStatus::InSync);
        assert_eq!(report.missing, vec![]);
        assert!(!report.is_transition());

        let report = tracker.check_and_update(
            [RangeEvent::new(1024, 256), RangeEvent::new(1024, 512)],
            1024 + 512,
        );
        assert_eq!(report.previous, SyncStatus::InSync);
        assert_eq!(report.current, SyncStatus::InSync);
        assert_eq!(report.missing, vec![]);
    }

    #[test]
    fn check_stays_out_of_sync() {
        let mut tracker = SyncTracker::default();
        let report = tracker.check_and_update(
            [RangeEvent::new(0, 128), RangeEvent::new(1024, 128)],
            1024 + 128,
        );
        assert_eq!(report.previous, SyncStatus::InSync);
        assert_eq!(report.current, SyncStatus::OutOfSync);
        assert_eq!(report.missing, vec![BlockRange::new(128, 1024)]);

        let report = tracker.check_and_update(
            [RangeEvent::new(1024, 256), RangeEvent::new(1024, 512)],
            1024 + 512,
        );
        assert_eq!(report.previous, SyncStatus::OutOfSync);
        assert_eq!(report.current, SyncStatus::OutOfSync);
        assert_eq!(report.missing, vec![BlockRange::new(128, 1024)]);
        assert!(!report.is_transition());
    }

    #[test]
    fn check_falls_out_of_sync_when_coverage_lags() {
        let mut tracker = SyncTracker::default();
        let report = tracker.check_and_update(
            [RangeEvent::new(0, 1024), RangeEvent::new(1024, 128)],
            1152,
        );
        assert_eq!(report.current, SyncStatus::InSync);

        let report = tracker.check_and_update(
            [RangeEvent::new(1024, 256), RangeEvent::new(1024, 512)],
            2048,
        );
        assert_eq!(report.previous, SyncStatus::InSync);
        assert_eq!(report.current, SyncStatus::OutOfSync);
        assert_eq!(report.missing, vec![BlockRange::new(1536, 1857)]);
        assert!(report.is_transition());
    }

    #[test]
    fn check_recovers_once_gaps_are_filled() {
        let mut tracker = SyncTracker::default();
        let report = tracker.check_and_update(
            [RangeEvent::new(0, 128), RangeEvent::new(1024, 128)],
            1024 + 128,
        );
        assert_eq!(report.current, SyncStatus::OutOfSync);

        let report = tracker.check_and_update(
            [RangeEvent::new(0, 1024), RangeEvent::new(1024, 512)],
            1024 + 512,
        );
        assert_eq!(report.previous, SyncStatus::OutOfSync);
        assert_eq!(report.current, SyncStatus::InSync);
        assert_eq!(report.missing, vec![]);
        assert!(report.is_transition());
    }

    #[test]
    fn check_commits_the_frontier() {
        let mut tracker = SyncTracker::default();
        assert_eq!(tracker.last_checked(), None);
        tracker.check_and_update([RangeEvent::new(0, 2048)], 2048);
        assert_eq!(tracker.last_checked(), Some(2048));
    }

    #[test]
    fn frontier_regression_is_clamped() {
        let mut tracker = SyncTracker::default();
        tracker.check_and_update([RangeEvent::new(0, 2048)], 2048);

        // A lagging replica reports a lower height; the committed frontier
        // must not move backwards and the status must not flip spuriously.
        let report = tracker.check_and_update([], 1500);
        assert_eq!(tracker.last_checked(), Some(2048));
        assert_eq!(report.current, SyncStatus::InSync);
    }
}
