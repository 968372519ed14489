use super::engine::Writer;
use crate::core::{IngestError, Result};
use crate::result::ReplicatedResult;
use crate::sst::{checksum, read_entries};
use log::debug;

/// Apply a replicated ingestion below the evaluation layer.
///
/// The checksum is verified and the whole file decoded before the first
/// write, so a corrupt payload leaves the target untouched. Returns the
/// number of entries written.
pub fn apply_replicated<W: Writer + ?Sized>(writer: &mut W, ingest: &ReplicatedResult) -> Result<usize> {
    let actual = checksum(&ingest.data);
    if actual != ingest.crc32 {
        return Err(IngestError::ChecksumMismatch {
            expected: ingest.crc32,
            actual,
        });
    }

    let entries = read_entries(&ingest.data)?;
    for (key, value) in &entries {
        if key.is_value() {
            writer.put_mvcc(key, value)?;
        } else {
            writer.put_unversioned(&key.key, value)?;
        }
    }
    debug!(
        "applied replicated ingestion: {} entries, {} bytes",
        entries.len(),
        ingest.data.len()
    );
    Ok(entries.len())
}
