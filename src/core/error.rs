use super::types::{Intent, MvccKey, Span, Timestamp, format_key};
use std::fmt;
use thiserror::Error;

/// Which end of the request span a file entry fell outside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySide {
    First,
    Last,
}

impl fmt::Display for BoundarySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundarySide::First => write!(f, "first"),
            BoundarySide::Last => write!(f, "last"),
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(
        "write for key {} at timestamp {timestamp} too old; must write at or above {actual_timestamp}",
        format_key(.key)
    )]
    WriteTooOld {
        key: Vec<u8>,
        timestamp: Timestamp,
        actual_timestamp: Timestamp,
    },

    #[error("ingested key collides with an existing one: {}", format_key(.key))]
    KeyCollision { key: Vec<u8> },

    #[error("conflicting intents on {} key(s), first at {}", .intents.len(), first_intent_key(.intents))]
    WriteIntent { intents: Vec<Intent> },

    #[error("{side} key {key} not in request range {span}")]
    OutOfBounds {
        side: BoundarySide,
        key: MvccKey,
        span: Span,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Corrupt file: {0}")]
    Corruption(String),

    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl IngestError {
    /// Conflicts with existing data. The requester may retry with a higher
    /// timestamp, different flags, or after resolving intents.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            IngestError::WriteTooOld { .. }
                | IngestError::KeyCollision { .. }
                | IngestError::WriteIntent { .. }
        )
    }
}

fn first_intent_key(intents: &[Intent]) -> String {
    intents
        .first()
        .map(|intent| format_key(&intent.key))
        .unwrap_or_else(|| "<none>".to_string())
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for IngestError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Storage(format!("Failed to encode: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for IngestError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Corruption(format!("Failed to decode: {}", err))
    }
}
