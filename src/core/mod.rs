pub mod error;
pub mod iter;
pub mod stats;
pub mod types;

pub use error::{BoundarySide, IngestError, Result};
pub use iter::{MemIterator, MvccIterator};
pub use stats::{
    EstimatesUpdate, MVCC_VERSION_TIMESTAMP_SIZE, MvccStats, StatsAccumulator, StatsMerge,
    compute_stats_for_entries, compute_stats_for_range,
};
pub use types::{Intent, Key, MvccKey, Span, Timestamp, format_key};
