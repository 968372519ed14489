use super::apply::apply_replicated;
use super::engine::{Reader, Writer};
use crate::core::{
    IngestError, Intent, Key, MemIterator, MvccIterator, MvccKey, MvccStats, Result, Span,
    StatsMerge, Timestamp, compute_stats_for_entries, format_key,
};
use crate::result::{EvalResult, IngestOutcome};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// In-memory MVCC range: committed versions, at most one intent per key, and
/// the range's running statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemEngine {
    data: BTreeMap<MvccKey, Vec<u8>>,
    intents: BTreeMap<Key, Intent>,
    stats: MvccStats,
}

impl MemEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an uncommitted intent. Replaces an intent from the same
    /// transaction; an intent from another transaction is an error.
    pub fn put_intent(&mut self, intent: Intent) -> Result<()> {
        match self.intents.get(&intent.key) {
            Some(existing) if existing.txn_id != intent.txn_id => {
                return Err(IngestError::Storage(format!(
                    "key {} already has an intent from txn {}",
                    format_key(&intent.key),
                    existing.txn_id
                )));
            }
            Some(_) => {}
            None => self.stats.intent_count += 1,
        }
        debug!(
            "intent placed on {} by txn {}",
            format_key(&intent.key),
            intent.txn_id
        );
        self.intents.insert(intent.key.clone(), intent);
        Ok(())
    }

    /// Commit or abort the intent on `key`. Returns false when there was none.
    pub fn resolve_intent(&mut self, key: &[u8], txn_id: Uuid, commit: bool) -> Result<bool> {
        let Some(intent) = self.intents.get(key) else {
            return Ok(false);
        };
        if intent.txn_id != txn_id {
            return Ok(false);
        }
        let Some(intent) = self.intents.remove(key) else {
            return Ok(false);
        };
        self.stats.intent_count -= 1;
        if commit {
            let before = self.key_stats(key);
            self.data
                .insert(MvccKey::new(intent.key, intent.timestamp), intent.value);
            let mut delta = self.key_stats(key);
            delta.subtract(&before);
            self.stats.add(&delta);
        }
        Ok(true)
    }

    /// Stats of every committed version of `key`
    fn key_stats(&self, key: &[u8]) -> MvccStats {
        let versions = self
            .data
            .range(MvccKey::unversioned(key.to_vec())..)
            .take_while(|(k, _)| k.key.as_slice() == key)
            .map(|(k, v)| (k, v.as_slice()));
        compute_stats_for_entries(versions, self.stats.last_update_nanos)
    }

    /// Newest committed value of `key` visible at `read_ts`. Tombstones read
    /// as absent.
    pub fn get(&self, key: &[u8], read_ts: Timestamp) -> Option<Vec<u8>> {
        let from = MvccKey::unversioned(key.to_vec());
        self.data
            .range(from..)
            .take_while(|(k, _)| k.key.as_slice() == key)
            .find(|(k, _)| !k.is_value() || k.timestamp <= read_ts)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    }

    /// All committed versions in `span`, in `MvccKey` order
    pub fn entries(&self, span: &Span) -> Vec<(MvccKey, Vec<u8>)> {
        if span.is_empty() {
            return Vec::new();
        }
        self.data
            .range(span.start()..span.end())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn version_count(&self) -> usize {
        self.data.len()
    }

    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }

    pub fn range_stats(&self) -> &MvccStats {
        &self.stats
    }

    pub fn merge_stats(&mut self, merge: &StatsMerge) {
        self.stats.merge(merge);
    }

    /// Apply the effects of a successful evaluation the way the replication
    /// layer would: ingest a replicated file (replayed writes are already in
    /// place) and merge the stats.
    pub fn apply_outcome(&mut self, outcome: &IngestOutcome) -> Result<()> {
        if let EvalResult::Replicated(ingest) = &outcome.result {
            apply_replicated(self, ingest)?;
        }
        self.merge_stats(&outcome.stats);
        Ok(())
    }

    /// Recompute exact statistics from the stored data. Clears any
    /// estimation carried by earlier approximate merges.
    pub fn recompute_stats(&mut self, now_nanos: i64) -> MvccStats {
        let mut stats =
            compute_stats_for_entries(self.data.iter().map(|(k, v)| (k, v.as_slice())), now_nanos);
        stats.intent_count = self.intents.len() as i64;
        stats.contains_estimates = 0;
        if !self.stats.equal_ignoring_update(&stats) {
            debug!("recomputed stats differ: {:?}", self.stats.diff(&stats));
        }
        self.stats = stats;
        stats
    }
}

impl Reader for MemEngine {
    fn new_mvcc_iter(&self, span: &Span) -> Result<Box<dyn MvccIterator + '_>> {
        Ok(Box::new(MemIterator::new(self.entries(span))))
    }

    fn get_intent(&self, key: &[u8]) -> Result<Option<Intent>> {
        Ok(self.intents.get(key).cloned())
    }

    fn scan_intents(&self, span: &Span, max_intents: usize) -> Result<Vec<Intent>> {
        if span.is_empty() {
            return Ok(Vec::new());
        }
        let limit = if max_intents == 0 { usize::MAX } else { max_intents };
        Ok(self
            .intents
            .range(span.start_key.clone()..span.end_key.clone())
            .map(|(_, intent)| intent.clone())
            .take(limit)
            .collect())
    }
}

impl Writer for MemEngine {
    fn put_unversioned(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.insert(MvccKey::unversioned(key.to_vec()), value.to_vec());
        Ok(())
    }

    fn put_mvcc(&mut self, key: &MvccKey, value: &[u8]) -> Result<()> {
        if !key.is_value() {
            return Err(IngestError::InvalidRequest(format!(
                "versioned put for {} requires a timestamp",
                key
            )));
        }
        self.data.insert(key.clone(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EstimatesUpdate;

    fn ts(wall: i64) -> Timestamp {
        Timestamp::from_wall(wall)
    }

    #[test]
    fn test_get_reads_visible_version() {
        let mut engine = MemEngine::new();
        engine.put_mvcc(&MvccKey::new("a", ts(2)), b"old").unwrap();
        engine.put_mvcc(&MvccKey::new("a", ts(8)), b"new").unwrap();
        engine.put_mvcc(&MvccKey::new("b", ts(3)), b"").unwrap();

        assert_eq!(engine.get(b"a", ts(1)), None);
        assert_eq!(engine.get(b"a", ts(5)), Some(b"old".to_vec()));
        assert_eq!(engine.get(b"a", ts(9)), Some(b"new".to_vec()));
        assert_eq!(engine.get(b"b", ts(9)), None);
    }

    #[test]
    fn test_intents_lifecycle() {
        let mut engine = MemEngine::new();
        let txn = Uuid::new_v4();
        engine
            .put_intent(Intent::new("k", txn, ts(4), b"v".to_vec()))
            .unwrap();
        assert!(
            engine
                .put_intent(Intent::new("k", Uuid::new_v4(), ts(5), b"w".to_vec()))
                .is_err()
        );

        let found = engine.scan_intents(&Span::new("a", "z"), 0).unwrap();
        assert_eq!(found.len(), 1);
        assert!(engine.scan_intents(&Span::new("l", "z"), 0).unwrap().is_empty());

        assert!(engine.resolve_intent(b"k", txn, true).unwrap());
        assert_eq!(engine.intent_count(), 0);
        assert_eq!(engine.get(b"k", ts(10)), Some(b"v".to_vec()));
    }

    #[test]
    fn test_intent_resolution_keeps_stats_exact() {
        let mut engine = MemEngine::new();
        engine.put_mvcc(&MvccKey::new("k", ts(2)), b"old").unwrap();
        engine.recompute_stats(0);

        let committed = Uuid::new_v4();
        let aborted = Uuid::new_v4();
        engine
            .put_intent(Intent::new("k", committed, ts(4), b"new".to_vec()))
            .unwrap();
        engine
            .put_intent(Intent::new("k", committed, ts(5), b"newer".to_vec()))
            .unwrap();
        engine
            .put_intent(Intent::new("m", aborted, ts(4), b"gone".to_vec()))
            .unwrap();
        assert_eq!(engine.range_stats().intent_count, 2);
        let exact = engine.clone().recompute_stats(0);
        assert!(engine.range_stats().equal_ignoring_update(&exact));

        assert!(engine.resolve_intent(b"k", committed, true).unwrap());
        assert!(engine.resolve_intent(b"m", aborted, false).unwrap());
        assert_eq!(engine.range_stats().intent_count, 0);
        assert_eq!(engine.range_stats().val_count, 2);
        let exact = engine.clone().recompute_stats(0);
        assert!(
            engine.range_stats().equal_ignoring_update(&exact),
            "{:?}",
            engine.range_stats().diff(&exact)
        );
    }

    #[test]
    fn test_scan_intents_limit() {
        let mut engine = MemEngine::new();
        for key in ["a", "b", "c"] {
            engine
                .put_intent(Intent::new(key, Uuid::new_v4(), ts(1), b"v".to_vec()))
                .unwrap();
        }
        assert_eq!(engine.scan_intents(&Span::new("a", "z"), 2).unwrap().len(), 2);
        assert_eq!(engine.scan_intents(&Span::new("a", "z"), 0).unwrap().len(), 3);
    }

    #[test]
    fn test_recompute_clears_estimates() {
        let mut engine = MemEngine::new();
        engine.put_mvcc(&MvccKey::new("a", ts(2)), b"v").unwrap();
        engine.merge_stats(&StatsMerge {
            delta: MvccStats::default(),
            estimates: EstimatesUpdate::Increment,
        });
        assert_eq!(engine.range_stats().contains_estimates, 1);

        let stats = engine.recompute_stats(100);
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.contains_estimates, 0);
        assert_eq!(engine.range_stats(), &stats);
    }

    #[test]
    fn test_put_mvcc_requires_timestamp() {
        let mut engine = MemEngine::new();
        assert!(engine.put_mvcc(&MvccKey::unversioned("a"), b"v").is_err());
    }
}
