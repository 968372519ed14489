// ============================================================================
// kvingest Library
// ============================================================================
//
// Bulk ingestion of pre-sorted MVCC files into a key range: conflict
// checking against existing data, boundary validation, stats reconciliation
// and the choice between replicated-blob application and replayed writes.
//
// ============================================================================

pub mod core;
pub mod ingest;
pub mod result;
pub mod sst;
pub mod storage;

// Re-export main types for convenience
pub use crate::core::{
    EstimatesUpdate, IngestError, Intent, MvccKey, MvccStats, Result, Span, StatsMerge,
    Timestamp,
};
pub use crate::ingest::{
    CancellationFlag, ConflictPolicy, EvalContext, IngestRequest, IngestSettings,
    eval_add_sstable,
};
pub use crate::result::{EvalResult, IngestOutcome, LocalResult, Metrics, ReplicatedResult};
pub use crate::sst::SstWriter;
pub use crate::storage::{MemEngine, ReadWriter, Reader, SnapshotManager, Writer};

/// Evaluate `req` against `engine` and apply the outcome, as a node does for
/// a command it both evaluates and applies.
///
/// # Examples
///
/// ```
/// use kvingest::{EvalContext, IngestRequest, MemEngine, Span, SstWriter, Timestamp};
///
/// # fn main() -> kvingest::Result<()> {
/// let mut writer = SstWriter::new();
/// writer.put_mvcc("a", Timestamp::from_wall(5), b"v1")?;
/// writer.put_mvcc("b", Timestamp::from_wall(5), b"v2")?;
///
/// let req = IngestRequest::new(Span::new("a", "c"), writer.finish(), Timestamp::from_wall(10))
///     .disallow_shadowing();
///
/// let mut engine = MemEngine::new();
/// let outcome = kvingest::ingest(&EvalContext::default(), &mut engine, &req)?;
///
/// assert!(outcome.stats.is_exact());
/// assert_eq!(engine.range_stats().key_count, 2);
/// # Ok(())
/// # }
/// ```
pub fn ingest(ctx: &EvalContext, engine: &mut MemEngine, req: &IngestRequest) -> Result<IngestOutcome> {
    let outcome = eval_add_sstable(ctx, engine, req)?;
    engine.apply_outcome(&outcome)?;
    Ok(outcome)
}
