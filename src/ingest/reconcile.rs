use super::config::EvalContext;
use super::request::IngestRequest;
use crate::core::{
    EstimatesUpdate, MvccIterator, MvccStats, Result, StatsMerge, compute_stats_for_range,
};
use tracing::{Level, event};

/// Decide the stats to merge into the range.
///
/// `conflict_delta` is present exactly when conflict checking ran. Only then
/// is the result exact; otherwise overlap with existing data is ignored and
/// the merge is flagged as an estimate. A later explicit recomputation
/// clears the flag.
pub(crate) fn reconcile_stats(
    ctx: &EvalContext,
    iter: &mut dyn MvccIterator,
    req: &IngestRequest,
    conflict_delta: Option<MvccStats>,
) -> Result<StatsMerge> {
    let now_nanos = req.timestamp.wall_time;
    let verify_fast_path = conflict_delta.is_some() && ctx.settings().verify;

    let mut stats = req.mvcc_stats.unwrap_or_default();
    if req.mvcc_stats.is_none() || verify_fast_path {
        event!(Level::DEBUG, span = %req.span, "computing stats for file");
        let computed =
            compute_stats_for_range(iter, &req.span, now_nanos, || ctx.check_cancelled())?;

        if verify_fast_path
            && let Some(given) = req.mvcc_stats
            && !given.equal_ignoring_update(&computed)
        {
            let diff = given.diff(&computed).join(", ");
            event!(Level::ERROR, diff = %diff, "precomputed stats mismatch");
            panic!("fast-path stats computation gave wrong result: {}", diff);
        }
        stats = computed;
    }
    stats.contains_estimates = 0;

    match conflict_delta {
        Some(delta) => {
            stats.add(&delta);
            Ok(StatsMerge {
                delta: stats,
                estimates: EstimatesUpdate::Reset,
            })
        }
        None => Ok(StatsMerge {
            delta: stats,
            estimates: EstimatesUpdate::Increment,
        }),
    }
}
