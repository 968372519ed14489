use super::bounds::validate_bounds;
use super::config::EvalContext;
use super::conflicts::{check_sst_conflicts, ensure_no_intents};
use super::reconcile::reconcile_stats;
use super::request::IngestRequest;
use crate::core::{IngestError, MvccIterator, MvccKey, Result, format_key};
use crate::result::{EvalResult, IngestOutcome, LocalResult, Metrics, ReplicatedResult};
use crate::sst::{MemSstIterator, assert_timestamp, checksum, update_timestamps};
use crate::storage::{ReadWriter, Writer};
use std::borrow::Cow;
use tracing::{Level, event, info_span};

/// Evaluate an ingestion of `req.data` into `req.span`.
///
/// The caller must hold exclusive access to the span for the duration of the
/// call. Nothing is written before every check has passed; on the replay
/// path a failure part-way through leaves the already replayed prefix in
/// place.
pub fn eval_add_sstable<RW: ReadWriter + ?Sized>(
    ctx: &EvalContext,
    rw: &mut RW,
    req: &IngestRequest,
) -> Result<IngestOutcome> {
    let span = info_span!(
        "ingest.add_sstable",
        start = %format_key(&req.span.start_key),
        end = %format_key(&req.span.end_key),
        bytes = req.data.len()
    );
    let _enter = span.enter();

    req.validate()?;
    let policy = req.conflict_policy()?;
    event!(Level::DEBUG, ?policy, "evaluating ingestion");

    let sst = rewrite_timestamps(ctx, req)?;

    let conflict_delta = if policy.checks_conflicts() {
        Some(check_sst_conflicts(
            ctx,
            &sst,
            &*rw,
            &req.span,
            policy,
            req.timestamp.wall_time,
        )?)
    } else {
        ensure_no_intents(ctx, &*rw, &req.span)?;
        None
    };

    let mut iter = MemSstIterator::new(&sst)?;
    validate_bounds(ctx, &mut iter, &req.span)?;

    let stats = reconcile_stats(ctx, &mut iter, req, conflict_delta)?;
    ctx.check_cancelled()?;

    let result = if req.ingest_as_writes {
        event!(
            Level::DEBUG,
            keys = stats.delta.key_count,
            bytes = sst.len(),
            "ingesting file via regular writes"
        );
        replay_as_writes(ctx, rw, &mut iter)?
    } else {
        EvalResult::Replicated(ReplicatedResult {
            crc32: checksum(&sst),
            data: sst.into_owned(),
        })
    };

    Ok(IngestOutcome { stats, result })
}

/// Apply the request-timestamp rewrite when asked to, verifying the
/// producer's timestamp claim first when verification is on.
fn rewrite_timestamps<'a>(ctx: &EvalContext, req: &'a IngestRequest) -> Result<Cow<'a, [u8]>> {
    let file_ts = req.file_timestamp();

    if ctx.settings().verify
        && let Some(expected) = file_ts
        && let Err(err) = assert_timestamp(&req.data, expected, || ctx.check_cancelled())
    {
        if matches!(err, IngestError::AssertionFailed(_)) {
            event!(Level::ERROR, error = %err, "file timestamp assertion failed");
        }
        return Err(err);
    }

    if req.write_at_request_timestamp && file_ts != Some(req.timestamp) {
        event!(Level::DEBUG, timestamp = %req.timestamp, "rewriting file timestamps");
        return Ok(Cow::Owned(update_timestamps(&req.data, req.timestamp, || {
            ctx.check_cancelled()
        })?));
    }
    Ok(Cow::Borrowed(req.data.as_slice()))
}

/// Replay every entry as a plain put. Every entry is assumed to be a simple
/// set.
fn replay_as_writes<W: Writer + ?Sized>(
    ctx: &EvalContext,
    writer: &mut W,
    iter: &mut dyn MvccIterator,
) -> Result<EvalResult> {
    iter.seek_ge(&MvccKey::unversioned(Vec::new()));
    while iter.valid()? {
        ctx.check_cancelled()?;
        let key = iter.key();
        if key.is_value() {
            writer.put_mvcc(key, iter.value())?;
        } else {
            writer.put_unversioned(&key.key, iter.value())?;
        }
        iter.next();
    }

    Ok(EvalResult::Local(LocalResult {
        metrics: Metrics {
            add_sst_as_writes: 1,
        },
    }))
}
