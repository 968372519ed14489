use crate::core::{IngestError, MvccStats, Result, Span, Timestamp};
use serde::{Deserialize, Serialize};

/// Request to ingest a sorted file into `span`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub span: Span,

    /// Encoded file contents
    pub data: Vec<u8>,

    /// Request timestamp
    pub timestamp: Timestamp,

    /// Stats of the file as computed by its producer
    pub mvcc_stats: Option<MvccStats>,

    /// Rewrite every entry to the request timestamp before ingesting
    pub write_at_request_timestamp: bool,

    /// The single timestamp every entry of the file already carries
    pub sst_timestamp: Option<Timestamp>,

    pub disallow_conflicts: bool,

    pub disallow_shadowing: bool,

    /// Like `disallow_shadowing`, but values at or above this timestamp may be
    /// re-written with identical bytes
    pub disallow_shadowing_below: Option<Timestamp>,

    /// Replay the entries as ordinary writes instead of shipping the file
    pub ingest_as_writes: bool,
}

/// Collapsed form of the three conflict flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    NoCheck,
    CheckOnly,
    DisallowShadowing { below: Option<Timestamp> },
}

impl ConflictPolicy {
    pub fn checks_conflicts(&self) -> bool {
        !matches!(self, ConflictPolicy::NoCheck)
    }
}

impl IngestRequest {
    pub fn new(span: Span, data: Vec<u8>, timestamp: Timestamp) -> Self {
        Self {
            span,
            data,
            timestamp,
            mvcc_stats: None,
            write_at_request_timestamp: false,
            sst_timestamp: None,
            disallow_conflicts: false,
            disallow_shadowing: false,
            disallow_shadowing_below: None,
            ingest_as_writes: false,
        }
    }

    pub fn with_stats(mut self, stats: MvccStats) -> Self {
        self.mvcc_stats = Some(stats);
        self
    }

    pub fn write_at_request_timestamp(mut self) -> Self {
        self.write_at_request_timestamp = true;
        self
    }

    pub fn sst_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.sst_timestamp = Some(timestamp);
        self
    }

    pub fn disallow_conflicts(mut self) -> Self {
        self.disallow_conflicts = true;
        self
    }

    pub fn disallow_shadowing(mut self) -> Self {
        self.disallow_shadowing = true;
        self
    }

    pub fn disallow_shadowing_below(mut self, timestamp: Timestamp) -> Self {
        self.disallow_shadowing_below = Some(timestamp);
        self
    }

    pub fn ingest_as_writes(mut self) -> Self {
        self.ingest_as_writes = true;
        self
    }

    /// File timestamp, with an empty timestamp treated as absent
    pub fn file_timestamp(&self) -> Option<Timestamp> {
        self.sst_timestamp.filter(|ts| !ts.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.span.is_empty() {
            return Err(IngestError::InvalidRequest(format!(
                "empty request span {}",
                self.span
            )));
        }
        if self.timestamp.is_empty() {
            return Err(IngestError::InvalidRequest(
                "request timestamp must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn conflict_policy(&self) -> Result<ConflictPolicy> {
        let below = self.disallow_shadowing_below.filter(|ts| !ts.is_empty());
        match (self.disallow_shadowing, below) {
            (true, Some(_)) => Err(IngestError::InvalidRequest(
                "cannot set both disallow_shadowing and disallow_shadowing_below".to_string(),
            )),
            (true, None) => Ok(ConflictPolicy::DisallowShadowing { below: None }),
            (false, Some(ts)) => Ok(ConflictPolicy::DisallowShadowing { below: Some(ts) }),
            (false, None) if self.disallow_conflicts => Ok(ConflictPolicy::CheckOnly),
            (false, None) => Ok(ConflictPolicy::NoCheck),
        }
    }
}
