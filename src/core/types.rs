use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

pub type Key = Vec<u8>;

/// Hybrid-logical timestamp. The zero value is "empty" and marks an
/// unversioned key.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub wall_time: i64,
    pub logical: i32,
}

impl Timestamp {
    pub const fn new(wall_time: i64, logical: i32) -> Self {
        Self { wall_time, logical }
    }

    pub const fn from_wall(wall_time: i64) -> Self {
        Self::new(wall_time, 0)
    }

    /// Wall-clock timestamp taken from the system clock
    pub fn now() -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        Self::from_wall(nanos)
    }

    pub fn is_empty(&self) -> bool {
        self.wall_time == 0 && self.logical == 0
    }

    /// Smallest timestamp strictly greater than this one. Saturates at the
    /// maximum timestamp.
    pub fn next(&self) -> Self {
        if self.logical < i32::MAX {
            return Self::new(self.wall_time, self.logical + 1);
        }
        match self.wall_time.checked_add(1) {
            Some(wall_time) => Self::new(wall_time, 0),
            None => *self,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.wall_time, self.logical)
    }
}

/// A user key plus an optional version timestamp.
///
/// Ordering follows MVCC convention: keys ascend, and within one key the
/// unversioned entry sorts first, followed by versions from newest to oldest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MvccKey {
    pub key: Key,
    pub timestamp: Timestamp,
}

impl MvccKey {
    pub fn new(key: impl Into<Key>, timestamp: Timestamp) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }

    pub fn unversioned(key: impl Into<Key>) -> Self {
        Self::new(key, Timestamp::default())
    }

    /// True when the key carries a version timestamp
    pub fn is_value(&self) -> bool {
        !self.timestamp.is_empty()
    }
}

impl Ord for MvccKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.cmp(&other.key) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match (self.timestamp.is_empty(), other.timestamp.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => other.timestamp.cmp(&self.timestamp),
        }
    }
}

impl PartialOrd for MvccKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MvccKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timestamp.is_empty() {
            write!(f, "{}", format_key(&self.key))
        } else {
            write!(f, "{}/{}", format_key(&self.key), self.timestamp)
        }
    }
}

/// Half-open key span `[start_key, end_key)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start_key: Key,
    pub end_key: Key,
}

impl Span {
    pub fn new(start_key: impl Into<Key>, end_key: impl Into<Key>) -> Self {
        Self {
            start_key: start_key.into(),
            end_key: end_key.into(),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice() && key < self.end_key.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.start_key >= self.end_key
    }

    pub fn start(&self) -> MvccKey {
        MvccKey::unversioned(self.start_key.clone())
    }

    pub fn end(&self) -> MvccKey {
        MvccKey::unversioned(self.end_key.clone())
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{})",
            format_key(&self.start_key),
            format_key(&self.end_key)
        )
    }
}

/// Provisional value written by a transaction that has not yet committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub key: Key,
    pub txn_id: Uuid,
    pub timestamp: Timestamp,
    pub value: Vec<u8>,
}

impl Intent {
    pub fn new(key: impl Into<Key>, txn_id: Uuid, timestamp: Timestamp, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            txn_id,
            timestamp,
            value,
        }
    }
}

/// Render a key for messages: printable ASCII as-is, other bytes escaped.
pub fn format_key(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key {
        out.extend(std::ascii::escape_default(*byte).map(char::from));
    }
    format!("\"{}\"", out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mvcc_key_ordering() {
        let mut keys = vec![
            MvccKey::new("b", Timestamp::from_wall(1)),
            MvccKey::new("a", Timestamp::from_wall(1)),
            MvccKey::new("a", Timestamp::from_wall(7)),
            MvccKey::unversioned("a"),
            MvccKey::new("a", Timestamp::new(7, 2)),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                MvccKey::unversioned("a"),
                MvccKey::new("a", Timestamp::new(7, 2)),
                MvccKey::new("a", Timestamp::from_wall(7)),
                MvccKey::new("a", Timestamp::from_wall(1)),
                MvccKey::new("b", Timestamp::from_wall(1)),
            ]
        );
    }

    #[test]
    fn test_timestamp_next() {
        assert_eq!(Timestamp::from_wall(5).next(), Timestamp::new(5, 1));
        assert_eq!(Timestamp::new(5, i32::MAX).next(), Timestamp::from_wall(6));
        let max = Timestamp::new(i64::MAX, i32::MAX);
        assert_eq!(max.next(), max);
        assert!(Timestamp::default().is_empty());
        assert!(!Timestamp::new(0, 1).is_empty());
    }

    #[test]
    fn test_span_contains() {
        let span = Span::new("a", "c");
        assert!(span.contains(b"a"));
        assert!(span.contains(b"bzz"));
        assert!(!span.contains(b"c"));
        assert!(!span.contains(b"0"));
        assert!(Span::new("c", "c").is_empty());
    }

    #[test]
    fn test_format_key_escapes() {
        assert_eq!(format_key(b"abc"), "\"abc\"");
        assert_eq!(format_key(&[0x61, 0xff]), "\"a\\xff\"");
    }
}
