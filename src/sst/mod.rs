// ============================================================================
// Sorted File Format
// ============================================================================
//
// Layout: the 6-byte header `KVSST\x01`, then one record per entry, each a
// little-endian u32 length followed by a MessagePack-encoded entry. Entries
// appear in strictly increasing `MvccKey` order. An empty value is a
// tombstone; an empty timestamp marks an unversioned entry.
//
// ============================================================================

pub mod reader;
pub mod writer;

pub use reader::{MemSstIterator, assert_timestamp, read_entries, update_timestamps};
pub use writer::SstWriter;

use serde::{Deserialize, Serialize};

pub(crate) const SST_MAGIC: &[u8; 6] = b"KVSST\x01";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EncodedEntry {
    pub key: Vec<u8>,
    pub wall_time: i64,
    pub logical: i32,
    pub value: Vec<u8>,
}

/// Whole-file CRC32 (IEEE) shipped with replicated ingestions
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
