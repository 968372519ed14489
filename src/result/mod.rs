use crate::core::StatsMerge;
use serde::{Deserialize, Serialize};

/// Counters reported to the local node only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub add_sst_as_writes: u64,
}

/// Effects of an evaluation that stay on the evaluating node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalResult {
    pub metrics: Metrics,
}

/// A file to be applied atomically by the replication layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedResult {
    pub data: Vec<u8>,
    pub crc32: u32,
}

/// Outcome of one evaluation: either the entries were replayed as ordinary
/// writes, or the file travels through replication as an opaque blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalResult {
    Local(LocalResult),
    Replicated(ReplicatedResult),
}

impl EvalResult {
    pub fn as_replicated(&self) -> Option<&ReplicatedResult> {
        match self {
            EvalResult::Replicated(r) => Some(r),
            EvalResult::Local(_) => None,
        }
    }

    pub fn as_local(&self) -> Option<&LocalResult> {
        match self {
            EvalResult::Local(l) => Some(l),
            EvalResult::Replicated(_) => None,
        }
    }
}

/// Everything the caller needs after a successful evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Merge into the range's statistics
    pub stats: StatsMerge,
    pub result: EvalResult,
}
