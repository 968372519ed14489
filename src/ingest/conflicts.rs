// ============================================================================
// Conflict Checking
// ============================================================================
//
// Walks the file key by key and compares each key's history in the file with
// the history already stored in the range. Any key present on both sides is
// checked for MVCC violations, and the stats delta records how the merged
// history differs from simply adding the file's own stats.
//
// ============================================================================

use super::config::EvalContext;
use super::request::ConflictPolicy;
use crate::core::{
    IngestError, MvccIterator, MvccKey, MvccStats, Result, Span, compute_stats_for_entries,
    format_key,
};
use crate::sst::MemSstIterator;
use crate::storage::Reader;
use std::collections::BTreeMap;
use tracing::{Level, event};

type Versions = Vec<(MvccKey, Vec<u8>)>;

/// Check the file against existing data in `span` and return the stats
/// correction to add to the file's own stats.
pub(crate) fn check_sst_conflicts<R: Reader + ?Sized>(
    ctx: &EvalContext,
    sst: &[u8],
    reader: &R,
    span: &Span,
    policy: ConflictPolicy,
    now_nanos: i64,
) -> Result<MvccStats> {
    let max_intents = ctx.settings().max_intents;
    let mut sst_iter = MemSstIterator::new(sst)?;
    let mut ext_iter = reader.new_mvcc_iter(span)?;

    let mut delta = MvccStats::default();
    let mut intents = Vec::new();
    let mut overlapping = 0usize;

    sst_iter.seek_ge(&span.start());
    while sst_iter.valid()? {
        ctx.check_cancelled()?;
        let key = sst_iter.key().key.clone();
        if !span.contains(&key) {
            break;
        }

        if let Some(intent) = reader.get_intent(&key)? {
            intents.push(intent);
            if max_intents > 0 && intents.len() >= max_intents {
                return Err(IngestError::WriteIntent { intents });
            }
            sst_iter.next_key()?;
            continue;
        }
        // Once an intent was seen, only look for more intents.
        if !intents.is_empty() {
            sst_iter.next_key()?;
            continue;
        }

        let sst_versions = collect_versions(&mut sst_iter, &key)?;

        ext_iter.seek_ge(&MvccKey::unversioned(key.clone()));
        let ext_versions = collect_versions(ext_iter.as_mut(), &key)?;
        if ext_versions.is_empty() {
            continue;
        }

        overlapping += 1;
        check_key(&key, &sst_versions, &ext_versions, policy)?;
        delta.add(&overlap_delta(&sst_versions, &ext_versions, now_nanos));
    }

    if !intents.is_empty() {
        return Err(IngestError::WriteIntent { intents });
    }
    ctx.check_cancelled()?;

    event!(Level::DEBUG, overlapping, "conflict check passed");
    delta.last_update_nanos = now_nanos;
    Ok(delta)
}

/// Fail when any intent exists in `span`. Used when full conflict checking
/// is off.
pub(crate) fn ensure_no_intents<R: Reader + ?Sized>(
    ctx: &EvalContext,
    reader: &R,
    span: &Span,
) -> Result<()> {
    ctx.check_cancelled()?;
    let intents = reader.scan_intents(span, ctx.settings().max_intents)?;
    ctx.check_cancelled()?;
    if !intents.is_empty() {
        return Err(IngestError::WriteIntent { intents });
    }
    Ok(())
}

/// Drain every version of `key` from `iter`, leaving it on the next key
fn collect_versions(iter: &mut dyn MvccIterator, key: &[u8]) -> Result<Versions> {
    let mut versions = Vec::new();
    while iter.valid()? {
        if iter.key().key.as_slice() != key {
            break;
        }
        versions.push((iter.key().clone(), iter.value().to_vec()));
        iter.next();
    }
    Ok(versions)
}

fn check_key(key: &[u8], sst: &Versions, ext: &Versions, policy: ConflictPolicy) -> Result<()> {
    // Entries identical to a stored version in key, timestamp and bytes are
    // no-ops and never conflict.
    let fresh: Vec<&(MvccKey, Vec<u8>)> = sst
        .iter()
        .filter(|(k, v)| !ext.iter().any(|(ek, ev)| ek == k && ev == v))
        .collect();
    let (Some((newest, newest_value)), Some((oldest, _))) = (fresh.first(), fresh.last()) else {
        return Ok(());
    };
    let (ext_key, ext_value) = &ext[0];

    if !newest.is_value() || !ext_key.is_value() {
        return Err(IngestError::InvalidRequest(format!(
            "inline value at key {} cannot be checked for conflicts",
            format_key(key)
        )));
    }

    // Checked before the timestamp: retrying at a higher timestamp would
    // collide all the same.
    if let ConflictPolicy::DisallowShadowing { below } = policy
        && !ext_value.is_empty()
    {
        let allowed = match below {
            Some(threshold) => threshold <= ext_key.timestamp && newest_value == ext_value,
            None => false,
        };
        if !allowed {
            return Err(IngestError::KeyCollision { key: key.to_vec() });
        }
    }

    if oldest.timestamp <= ext_key.timestamp {
        return Err(IngestError::WriteTooOld {
            key: key.to_vec(),
            timestamp: oldest.timestamp,
            actual_timestamp: ext_key.timestamp.next(),
        });
    }
    Ok(())
}

/// `stats(merged) - stats(existing) - stats(file)` for one key
fn overlap_delta(sst: &Versions, ext: &Versions, now_nanos: i64) -> MvccStats {
    let mut merged: BTreeMap<&MvccKey, &[u8]> = BTreeMap::new();
    for (key, value) in ext.iter().chain(sst.iter()) {
        merged.entry(key).or_insert(value.as_slice());
    }

    let mut delta = compute_stats_for_entries(merged.iter().map(|(k, v)| (*k, *v)), now_nanos);
    delta.subtract(&compute_stats_for_entries(
        ext.iter().map(|(k, v)| (k, v.as_slice())),
        now_nanos,
    ));
    delta.subtract(&compute_stats_for_entries(
        sst.iter().map(|(k, v)| (k, v.as_slice())),
        now_nanos,
    ));
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Timestamp;

    fn ts(wall: i64) -> Timestamp {
        Timestamp::from_wall(wall)
    }

    fn versions(entries: &[(i64, &str)]) -> Versions {
        entries
            .iter()
            .map(|(wall, value)| (MvccKey::new("k", ts(*wall)), value.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_exact_duplicate_is_not_a_conflict() {
        let sst = versions(&[(5, "v")]);
        let ext = versions(&[(5, "v")]);
        for policy in [
            ConflictPolicy::CheckOnly,
            ConflictPolicy::DisallowShadowing { below: None },
        ] {
            assert!(check_key(b"k", &sst, &ext, policy).is_ok());
        }
    }

    #[test]
    fn test_same_timestamp_different_value_is_too_old() {
        let err = check_key(
            b"k",
            &versions(&[(5, "new")]),
            &versions(&[(5, "old")]),
            ConflictPolicy::CheckOnly,
        )
        .unwrap_err();
        match err {
            IngestError::WriteTooOld {
                timestamp,
                actual_timestamp,
                ..
            } => {
                assert_eq!(timestamp, ts(5));
                assert_eq!(actual_timestamp, Timestamp::new(5, 1));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_shadowing_rules() {
        let sst = versions(&[(9, "new")]);
        let live = versions(&[(5, "old")]);
        let tombstone = versions(&[(5, "")]);
        let strict = ConflictPolicy::DisallowShadowing { below: None };

        assert!(check_key(b"k", &sst, &live, ConflictPolicy::CheckOnly).is_ok());
        assert!(matches!(
            check_key(b"k", &sst, &live, strict),
            Err(IngestError::KeyCollision { .. })
        ));
        assert!(check_key(b"k", &sst, &tombstone, strict).is_ok());
    }

    #[test]
    fn test_shadowing_threshold() {
        let below = ConflictPolicy::DisallowShadowing {
            below: Some(ts(4)),
        };
        // existing value under the threshold may never be shadowed
        assert!(check_key(b"k", &versions(&[(9, "old")]), &versions(&[(3, "old")]), below).is_err());
        // at or above the threshold only identical bytes may be re-written
        assert!(check_key(b"k", &versions(&[(9, "old")]), &versions(&[(5, "old")]), below).is_ok());
        assert!(check_key(b"k", &versions(&[(9, "new")]), &versions(&[(5, "old")]), below).is_err());
    }

    #[test]
    fn test_older_file_version_below_existing_is_too_old() {
        let sst = versions(&[(9, "b"), (2, "a")]);
        let ext = versions(&[(5, "x")]);
        assert!(matches!(
            check_key(b"k", &sst, &ext, ConflictPolicy::CheckOnly),
            Err(IngestError::WriteTooOld { .. })
        ));
    }

    #[test]
    fn test_overlap_delta_cancels_duplicates() {
        let sst = versions(&[(5, "v")]);
        let ext = versions(&[(5, "v")]);
        let file_stats = compute_stats_for_entries(sst.iter().map(|(k, v)| (k, v.as_slice())), 0);
        let mut total = file_stats;
        total.add(&overlap_delta(&sst, &ext, 0));
        assert!(total.equal_ignoring_update(&MvccStats::default()));
    }

    #[test]
    fn test_overlap_delta_for_shadowed_value() {
        let sst = versions(&[(9, "new")]);
        let ext = versions(&[(5, "old")]);
        let delta = overlap_delta(&sst, &ext, 0);
        assert_eq!(delta.key_count, -1);
        assert_eq!(delta.live_count, -1);
        assert_eq!(delta.key_bytes, -2);
        assert_eq!(delta.val_count, 0);
        assert_eq!(delta.live_bytes, -(2 + 12 + 3));
    }
}
