use crate::core::{Intent, MvccIterator, MvccKey, Result, Span};

/// Read access to the existing data of a range
pub trait Reader {
    /// Cursor over committed versions in `span`
    fn new_mvcc_iter(&self, span: &Span) -> Result<Box<dyn MvccIterator + '_>>;

    /// Uncommitted intent on `key`, if any
    fn get_intent(&self, key: &[u8]) -> Result<Option<Intent>>;

    /// Intents in `span`, at most `max_intents` of them (0 means no limit)
    fn scan_intents(&self, span: &Span, max_intents: usize) -> Result<Vec<Intent>>;
}

/// Write access to a range
pub trait Writer {
    fn put_unversioned(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn put_mvcc(&mut self, key: &MvccKey, value: &[u8]) -> Result<()>;
}

pub trait ReadWriter: Reader + Writer {}

impl<T: Reader + Writer + ?Sized> ReadWriter for T {}
