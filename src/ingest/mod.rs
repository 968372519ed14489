// ============================================================================
// Ingestion Module
// ============================================================================
//
// Evaluates the ingestion of a pre-sorted file into a key range:
//
//   timestamp rewrite -> conflict check | intent scan -> boundary check
//     -> stats reconciliation -> dispatch (replicated blob | replayed writes)
//
// Every stage may fail the whole evaluation. No stage retries, and nothing
// is written before the dispatch stage.
//
// ============================================================================

mod bounds;
pub mod config;
mod conflicts;
pub mod eval;
mod reconcile;
pub mod request;

pub use config::{CancellationFlag, DEFAULT_MAX_INTENTS, EvalContext, IngestSettings};
pub use eval::eval_add_sstable;
pub use request::{ConflictPolicy, IngestRequest};
