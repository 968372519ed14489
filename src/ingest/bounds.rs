use super::config::EvalContext;
use crate::core::{BoundarySide, IngestError, MvccIterator, MvccKey, Result, Span};

/// Verify that every entry of the file lies within `span`.
pub(crate) fn validate_bounds(
    ctx: &EvalContext,
    iter: &mut dyn MvccIterator,
    span: &Span,
) -> Result<()> {
    ctx.check_cancelled()?;
    iter.seek_ge(&MvccKey::unversioned(Vec::new()));
    if iter.valid()? {
        let first = iter.key();
        if first < &span.start() {
            return Err(IngestError::OutOfBounds {
                side: BoundarySide::First,
                key: first.clone(),
                span: span.clone(),
            });
        }
    }

    ctx.check_cancelled()?;
    iter.seek_ge(&span.end());
    if iter.valid()? {
        return Err(IngestError::OutOfBounds {
            side: BoundarySide::Last,
            key: iter.key().clone(),
            span: span.clone(),
        });
    }
    Ok(())
}
