// ============================================================================
// MVCC Statistics
// ============================================================================
//
// Per-range counters kept alongside the data. Accounting per key:
// - the key itself costs `len(key) + 1` key bytes and counts once
// - every version costs MVCC_VERSION_TIMESTAMP_SIZE key bytes plus its value
// - the newest version is live unless it is a tombstone (empty value)
//
// ============================================================================

use super::iter::MvccIterator;
use super::{MvccKey, Result, Span};
use serde::{Deserialize, Serialize};

/// Key bytes charged for the timestamp suffix of a versioned key
pub const MVCC_VERSION_TIMESTAMP_SIZE: i64 = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MvccStats {
    pub live_bytes: i64,
    pub live_count: i64,
    pub key_bytes: i64,
    pub key_count: i64,
    pub val_bytes: i64,
    pub val_count: i64,
    pub intent_count: i64,
    pub last_update_nanos: i64,
    /// Non-zero when the counters are known to be approximate
    pub contains_estimates: u64,
}

/// How a merge affects `contains_estimates` on the receiving stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimatesUpdate {
    /// The delta is exact; the merged stats become exact.
    Reset,
    /// The delta ignores overlap with existing data.
    Increment,
}

/// A stats delta plus the accuracy instruction for merging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsMerge {
    pub delta: MvccStats,
    pub estimates: EstimatesUpdate,
}

impl StatsMerge {
    pub fn is_exact(&self) -> bool {
        self.estimates == EstimatesUpdate::Reset
    }
}

impl MvccStats {
    pub fn add(&mut self, other: &MvccStats) {
        self.live_bytes += other.live_bytes;
        self.live_count += other.live_count;
        self.key_bytes += other.key_bytes;
        self.key_count += other.key_count;
        self.val_bytes += other.val_bytes;
        self.val_count += other.val_count;
        self.intent_count += other.intent_count;
        self.last_update_nanos = self.last_update_nanos.max(other.last_update_nanos);
        self.contains_estimates += other.contains_estimates;
    }

    pub fn subtract(&mut self, other: &MvccStats) {
        self.live_bytes -= other.live_bytes;
        self.live_count -= other.live_count;
        self.key_bytes -= other.key_bytes;
        self.key_count -= other.key_count;
        self.val_bytes -= other.val_bytes;
        self.val_count -= other.val_count;
        self.intent_count -= other.intent_count;
        self.last_update_nanos = self.last_update_nanos.max(other.last_update_nanos);
        self.contains_estimates = self.contains_estimates.saturating_sub(other.contains_estimates);
    }

    /// Apply a merge instruction produced by an ingestion
    pub fn merge(&mut self, merge: &StatsMerge) {
        self.add(&merge.delta);
        match merge.estimates {
            EstimatesUpdate::Reset => self.contains_estimates = 0,
            EstimatesUpdate::Increment => self.contains_estimates += 1,
        }
    }

    /// Equality that ignores the freshness watermark
    pub fn equal_ignoring_update(&self, other: &MvccStats) -> bool {
        let mut other = *other;
        other.last_update_nanos = self.last_update_nanos;
        *self == other
    }

    /// Human-readable list of differing counters, used for mismatch reports
    pub fn diff(&self, other: &MvccStats) -> Vec<String> {
        let pairs = [
            ("live_bytes", self.live_bytes, other.live_bytes),
            ("live_count", self.live_count, other.live_count),
            ("key_bytes", self.key_bytes, other.key_bytes),
            ("key_count", self.key_count, other.key_count),
            ("val_bytes", self.val_bytes, other.val_bytes),
            ("val_count", self.val_count, other.val_count),
            ("intent_count", self.intent_count, other.intent_count),
        ];
        let mut out: Vec<String> = pairs
            .iter()
            .filter(|(_, a, b)| a != b)
            .map(|(name, a, b)| format!("{}: {} != {}", name, a, b))
            .collect();
        if self.contains_estimates != other.contains_estimates {
            out.push(format!(
                "contains_estimates: {} != {}",
                self.contains_estimates, other.contains_estimates
            ));
        }
        out
    }
}

/// Accumulates stats over entries fed in `MvccKey` order.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    stats: MvccStats,
    prev_key: Option<Vec<u8>>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &MvccKey, value: &[u8]) {
        let first_of_key = self.prev_key.as_deref() != Some(key.key.as_slice());
        let ms = &mut self.stats;
        let val_len = value.len() as i64;

        if first_of_key {
            let meta_key_size = key.key.len() as i64 + 1;
            ms.key_count += 1;
            ms.key_bytes += meta_key_size;
            let mut version_bytes = val_len;
            if key.is_value() {
                ms.key_bytes += MVCC_VERSION_TIMESTAMP_SIZE;
                version_bytes += MVCC_VERSION_TIMESTAMP_SIZE;
            }
            if !value.is_empty() {
                ms.live_count += 1;
                ms.live_bytes += meta_key_size + version_bytes;
            }
            self.prev_key = Some(key.key.clone());
        } else {
            ms.key_bytes += MVCC_VERSION_TIMESTAMP_SIZE;
        }
        ms.val_bytes += val_len;
        ms.val_count += 1;
    }

    pub fn finish(mut self, now_nanos: i64) -> MvccStats {
        self.stats.last_update_nanos = now_nanos;
        self.stats
    }
}

/// Stats for a sorted run of entries
pub fn compute_stats_for_entries<'a, I>(entries: I, now_nanos: i64) -> MvccStats
where
    I: IntoIterator<Item = (&'a MvccKey, &'a [u8])>,
{
    let mut acc = StatsAccumulator::new();
    for (key, value) in entries {
        acc.push(key, value);
    }
    acc.finish(now_nanos)
}

/// Stats for every entry of `iter` whose key lies in `span`.
///
/// `poll` runs before each entry; an error from it aborts the scan.
pub fn compute_stats_for_range<P>(
    iter: &mut dyn MvccIterator,
    span: &Span,
    now_nanos: i64,
    mut poll: P,
) -> Result<MvccStats>
where
    P: FnMut() -> Result<()>,
{
    let mut acc = StatsAccumulator::new();
    iter.seek_ge(&span.start());
    while iter.valid()? {
        poll()?;
        let key = iter.key();
        if !span.contains(&key.key) {
            break;
        }
        acc.push(key, iter.value());
        iter.next();
    }
    Ok(acc.finish(now_nanos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Timestamp;
    use crate::core::iter::MemIterator;

    fn ts(wall: i64) -> Timestamp {
        Timestamp::from_wall(wall)
    }

    #[test]
    fn test_single_live_version() {
        let key = MvccKey::new("a", ts(5));
        let stats = compute_stats_for_entries([(&key, b"v1".as_slice())], 42);
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.key_bytes, 2 + 12);
        assert_eq!(stats.val_count, 1);
        assert_eq!(stats.val_bytes, 2);
        assert_eq!(stats.live_count, 1);
        assert_eq!(stats.live_bytes, 2 + 12 + 2);
        assert_eq!(stats.last_update_nanos, 42);
    }

    #[test]
    fn test_history_counts_only_newest_as_live() {
        let newer = MvccKey::new("a", ts(9));
        let older = MvccKey::new("a", ts(3));
        let stats = compute_stats_for_entries(
            [(&newer, b"new".as_slice()), (&older, b"old".as_slice())],
            0,
        );
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.val_count, 2);
        assert_eq!(stats.key_bytes, 2 + 12 + 12);
        assert_eq!(stats.live_count, 1);
        assert_eq!(stats.live_bytes, 2 + 12 + 3);
    }

    #[test]
    fn test_tombstone_is_not_live() {
        let tomb = MvccKey::new("a", ts(9));
        let older = MvccKey::new("a", ts(3));
        let stats =
            compute_stats_for_entries([(&tomb, b"".as_slice()), (&older, b"x".as_slice())], 0);
        assert_eq!(stats.live_count, 0);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.val_count, 2);
    }

    #[test]
    fn test_unversioned_entry() {
        let key = MvccKey::unversioned("meta");
        let stats = compute_stats_for_entries([(&key, b"xyz".as_slice())], 0);
        assert_eq!(stats.key_bytes, 5);
        assert_eq!(stats.live_bytes, 5 + 3);
    }

    #[test]
    fn test_compute_stats_for_range_respects_span() {
        let mut iter = MemIterator::new(vec![
            (MvccKey::new("a", ts(1)), b"1".to_vec()),
            (MvccKey::new("b", ts(1)), b"2".to_vec()),
            (MvccKey::new("c", ts(1)), b"3".to_vec()),
        ]);
        let stats = compute_stats_for_range(&mut iter, &Span::new("b", "c"), 7, || Ok(())).unwrap();
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.val_bytes, 1);
    }

    #[test]
    fn test_compute_stats_for_range_stops_when_poll_fails() {
        let mut iter = MemIterator::new(vec![
            (MvccKey::new("a", ts(1)), b"1".to_vec()),
            (MvccKey::new("b", ts(1)), b"2".to_vec()),
        ]);
        let mut polls = 0;
        let result = compute_stats_for_range(&mut iter, &Span::new("a", "z"), 7, || {
            polls += 1;
            if polls > 1 {
                return Err(crate::core::IngestError::Cancelled);
            }
            Ok(())
        });
        assert!(matches!(result, Err(crate::core::IngestError::Cancelled)));
        assert_eq!(polls, 2);
    }

    #[test]
    fn test_merge_estimates() {
        let mut range = MvccStats {
            contains_estimates: 3,
            ..Default::default()
        };
        let delta = MvccStats {
            key_count: 2,
            ..Default::default()
        };
        range.merge(&StatsMerge {
            delta,
            estimates: EstimatesUpdate::Increment,
        });
        assert_eq!(range.contains_estimates, 4);
        assert_eq!(range.key_count, 2);

        range.merge(&StatsMerge {
            delta,
            estimates: EstimatesUpdate::Reset,
        });
        assert_eq!(range.contains_estimates, 0);
        assert_eq!(range.key_count, 4);
    }

    #[test]
    fn test_equal_ignoring_update() {
        let a = MvccStats {
            key_count: 1,
            last_update_nanos: 10,
            ..Default::default()
        };
        let b = MvccStats {
            last_update_nanos: 99,
            ..a
        };
        assert!(a.equal_ignoring_update(&b));
        assert!(a.diff(&b).is_empty());

        let c = MvccStats { key_count: 2, ..a };
        assert!(!a.equal_ignoring_update(&c));
        assert_eq!(a.diff(&c), vec!["key_count: 1 != 2".to_string()]);
    }
}
