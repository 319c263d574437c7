//! Bounded-concurrency execution for bulk refreshes.
//!
//! Wraps `buffer_unordered` so that at most `limit` transforms are in flight
//! at once while the final result vector keeps the input order. A progress
//! callback fires once per item in completion order, which lets a dashboard
//! fill in cities as they arrive instead of waiting for the whole batch.

use futures_util::stream::{self, StreamExt};
use std::future::Future;

/// Cap on simultaneous outbound fetches during a refresh cycle.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Apply `transform` to every item with at most `limit` running concurrently.
///
/// The returned vector has one result per input item, in input order,
/// regardless of completion order. `on_progress` receives each result and its
/// original index as soon as that item completes. `limit` of 0 is treated
/// as 1; a limit at or above the item count degenerates to full parallelism.
///
/// Error policy: the transform is expected to absorb its own failures and
/// return a sentinel (for the refresh path, the previous snapshot); this
/// executor neither retries nor short-circuits.
pub async fn map_bounded<T, R, F, Fut, P>(
    items: Vec<T>,
    limit: usize,
    transform: F,
    mut on_progress: P,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
    P: FnMut(usize, &R),
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let mut completed = stream::iter(items.into_iter().enumerate().map(|(index, item)| {
        let fut = transform(item);
        async move { (index, fut.await) }
    }))
    .buffer_unordered(limit.max(1));

    let mut indexed: Vec<(usize, R)> = Vec::with_capacity(total);
    while let Some((index, result)) = completed.next().await {
        on_progress(index, &result);
        indexed.push((index, result));
    }

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}
