use super::{EncodedEntry, SST_MAGIC, SstWriter};
use crate::core::{IngestError, MemIterator, MvccIterator, MvccKey, Result, Timestamp};

/// Decode and validate every entry of a file.
pub fn read_entries(data: &[u8]) -> Result<Vec<(MvccKey, Vec<u8>)>> {
    let body = data.strip_prefix(SST_MAGIC.as_slice()).ok_or_else(|| {
        IngestError::Corruption("missing file header".to_string())
    })?;

    let mut entries: Vec<(MvccKey, Vec<u8>)> = Vec::new();
    let mut offset = 0usize;
    while offset < body.len() {
        let len_bytes: [u8; 4] = body
            .get(offset..offset + 4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                IngestError::Corruption(format!("truncated entry length at offset {}", offset))
            })?;
        offset += 4;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let payload = body.get(offset..offset + len).ok_or_else(|| {
            IngestError::Corruption(format!("truncated entry of {} bytes at offset {}", len, offset))
        })?;
        offset += len;

        let entry: EncodedEntry = rmp_serde::from_slice(payload)?;
        let key = MvccKey::new(entry.key, Timestamp::new(entry.wall_time, entry.logical));
        if let Some((prev, _)) = entries.last()
            && prev >= &key
        {
            return Err(IngestError::Corruption(format!(
                "entries out of order: {} after {}",
                key, prev
            )));
        }
        entries.push((key, entry.value));
    }
    Ok(entries)
}

/// Iterator over the entries of an in-memory file
pub struct MemSstIterator {
    inner: MemIterator,
}

impl MemSstIterator {
    pub fn new(data: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: MemIterator::new(read_entries(data)?),
        })
    }
}

impl MvccIterator for MemSstIterator {
    fn seek_ge(&mut self, key: &MvccKey) {
        self.inner.seek_ge(key)
    }

    fn valid(&self) -> Result<bool> {
        self.inner.valid()
    }

    fn next(&mut self) {
        self.inner.next()
    }

    fn key(&self) -> &MvccKey {
        self.inner.key()
    }

    fn value(&self) -> &[u8] {
        self.inner.value()
    }
}

/// Rewrite every entry of the file to `timestamp`.
///
/// Unversioned entries cannot be rewritten, and a key may carry at most one
/// version. `poll` runs before each entry; an error from it aborts the
/// rewrite.
pub fn update_timestamps<P>(data: &[u8], timestamp: Timestamp, mut poll: P) -> Result<Vec<u8>>
where
    P: FnMut() -> Result<()>,
{
    if timestamp.is_empty() {
        return Err(IngestError::InvalidRequest(
            "cannot rewrite file to an empty timestamp".to_string(),
        ));
    }

    let mut writer = SstWriter::new();
    let mut prev_key: Option<Vec<u8>> = None;
    for (key, value) in read_entries(data)? {
        poll()?;
        if !key.is_value() {
            return Err(IngestError::InvalidRequest(format!(
                "unversioned key {} cannot be rewritten to timestamp {}",
                key, timestamp
            )));
        }
        if prev_key.as_deref() == Some(key.key.as_slice()) {
            return Err(IngestError::InvalidRequest(format!(
                "multiple versions of key {} cannot be rewritten to timestamp {}",
                crate::core::format_key(&key.key),
                timestamp
            )));
        }
        writer.put(MvccKey::new(key.key.clone(), timestamp), &value)?;
        prev_key = Some(key.key);
    }
    Ok(writer.finish())
}

/// Check that every entry carries exactly `timestamp`, calling `poll` before
/// each entry.
pub fn assert_timestamp<P>(data: &[u8], timestamp: Timestamp, mut poll: P) -> Result<()>
where
    P: FnMut() -> Result<()>,
{
    let mut iter = MemSstIterator::new(data)?;
    iter.seek_ge(&MvccKey::unversioned(Vec::new()));
    while iter.valid()? {
        poll()?;
        let key = iter.key();
        if key.timestamp != timestamp {
            return Err(IngestError::AssertionFailed(format!(
                "incorrect timestamp {} for SST key {} (expected {})",
                key.timestamp,
                crate::core::format_key(&key.key),
                timestamp
            )));
        }
        iter.next();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(wall: i64) -> Timestamp {
        Timestamp::from_wall(wall)
    }

    fn no_poll() -> Result<()> {
        Ok(())
    }

    fn build(entries: &[(&str, i64, &str)]) -> Vec<u8> {
        let mut writer = SstWriter::new();
        for (key, wall, value) in entries {
            writer
                .put(MvccKey::new(key.as_bytes(), ts(*wall)), value.as_bytes())
                .unwrap();
        }
        writer.finish()
    }

    #[test]
    fn test_read_back_in_order() {
        let data = build(&[("a", 5, "v1"), ("a", 2, "v0"), ("b", 5, "v2")]);
        let entries = read_entries(&data).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].0, MvccKey::new("a", ts(2)));
        assert_eq!(entries[2].1, b"v2".to_vec());
    }

    #[test]
    fn test_writer_rejects_unsorted() {
        let mut writer = SstWriter::new();
        writer.put_mvcc("b", ts(1), b"x").unwrap();
        let err = writer.put_mvcc("a", ts(1), b"y").unwrap_err();
        assert!(matches!(err, IngestError::InvalidRequest(_)));
        // older version after newer is fine, newer after older is not
        writer.put_mvcc("c", ts(5), b"x").unwrap();
        assert!(writer.put_mvcc("c", ts(6), b"x").is_err());
        assert_eq!(writer.entry_count(), 2);
    }

    #[test]
    fn test_corrupt_inputs() {
        assert!(matches!(
            read_entries(b"nope"),
            Err(IngestError::Corruption(_))
        ));

        let mut data = build(&[("a", 5, "v1")]);
        data.truncate(data.len() - 2);
        assert!(matches!(read_entries(&data), Err(IngestError::Corruption(_))));
    }

    #[test]
    fn test_empty_file() {
        let data = SstWriter::new().finish();
        let mut iter = MemSstIterator::new(&data).unwrap();
        iter.seek_ge(&MvccKey::unversioned("a"));
        assert!(!iter.valid().unwrap());
    }

    #[test]
    fn test_update_timestamps() {
        let data = build(&[("a", 1, "v1"), ("b", 3, "v2")]);
        let rewritten = update_timestamps(&data, ts(10), no_poll).unwrap();
        let entries = read_entries(&rewritten).unwrap();
        assert!(entries.iter().all(|(k, _)| k.timestamp == ts(10)));
        assert_eq!(entries[0].1, b"v1".to_vec());
        assert!(assert_timestamp(&rewritten, ts(10), no_poll).is_ok());
    }

    #[test]
    fn test_update_timestamps_rejects_multiple_versions() {
        let data = build(&[("a", 3, "v1"), ("a", 1, "v0")]);
        assert!(matches!(
            update_timestamps(&data, ts(10), no_poll),
            Err(IngestError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_update_timestamps_rejects_unversioned() {
        let mut writer = SstWriter::new();
        writer.put_unversioned("a", b"inline").unwrap();
        assert!(update_timestamps(&writer.finish(), ts(10), no_poll).is_err());
    }

    #[test]
    fn test_assert_timestamp_mismatch() {
        let data = build(&[("a", 1, "v1"), ("b", 2, "v2")]);
        let err = assert_timestamp(&data, ts(1), no_poll).unwrap_err();
        assert!(matches!(err, IngestError::AssertionFailed(_)));
        assert!(err.to_string().contains("\"b\""));
    }

    #[test]
    fn test_scans_stop_when_poll_fails() {
        let data = build(&[("a", 1, "v1"), ("b", 1, "v2")]);
        let cancelled = || Err(IngestError::Cancelled);
        assert!(matches!(
            update_timestamps(&data, ts(10), cancelled),
            Err(IngestError::Cancelled)
        ));
        assert!(matches!(
            assert_timestamp(&data, ts(1), cancelled),
            Err(IngestError::Cancelled)
        ));
    }
}
