use super::{EncodedEntry, SST_MAGIC};
use crate::core::{IngestError, MvccKey, Result, Timestamp};

/// Builds an in-memory sorted file.
///
/// Entries must be added in strictly increasing `MvccKey` order.
pub struct SstWriter {
    buf: Vec<u8>,
    last_key: Option<MvccKey>,
    entry_count: usize,
}

impl SstWriter {
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(SST_MAGIC);
        Self {
            buf,
            last_key: None,
            entry_count: 0,
        }
    }

    pub fn put(&mut self, key: MvccKey, value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key
            && &key <= last
        {
            return Err(IngestError::InvalidRequest(format!(
                "keys must be added in strictly increasing order: {} after {}",
                key, last
            )));
        }

        let entry = EncodedEntry {
            key: key.key.clone(),
            wall_time: key.timestamp.wall_time,
            logical: key.timestamp.logical,
            value: value.to_vec(),
        };
        let serialized = rmp_serde::to_vec(&entry)?;
        let len = u32::try_from(serialized.len()).map_err(|_| {
            IngestError::InvalidRequest(format!("entry for key {} is too large", key))
        })?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(&serialized);

        self.last_key = Some(key);
        self.entry_count += 1;
        Ok(())
    }

    pub fn put_mvcc(&mut self, key: impl Into<Vec<u8>>, timestamp: Timestamp, value: &[u8]) -> Result<()> {
        self.put(MvccKey::new(key, timestamp), value)
    }

    pub fn put_unversioned(&mut self, key: impl Into<Vec<u8>>, value: &[u8]) -> Result<()> {
        self.put(MvccKey::unversioned(key), value)
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for SstWriter {
    fn default() -> Self {
        Self::new()
    }
}
