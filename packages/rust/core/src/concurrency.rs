//! Chunking and bounded fan-out used by the worker stages.

use std::future::Future;

use tokio::task::JoinSet;

use sitegen_shared::{Result, SitegenError};

/// Split `items` into contiguous groups of `size`, preserving order.
///
/// Every group has exactly `size` items except possibly the last.
/// A `size` of zero is treated as one.
pub fn chunk<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

/// Run `op` over `items` with at most `limit` operations in flight.
///
/// `op` is called on the current task with the item index and the item; the
/// future it returns is spawned. A new item is only scheduled when an
/// in-flight one settles, so nothing new starts after the first failure.
/// That failure is returned immediately and the remaining in-flight futures
/// are dropped without being awaited.
///
/// `on_settled(completed, total)` runs after each successful completion.
/// Results come back in submission order.
pub async fn map_limited<T, R, F, Fut, P>(
    items: Vec<T>,
    limit: usize,
    op: F,
    mut on_settled: P,
) -> Result<Vec<R>>
where
    R: Send + 'static,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
    P: FnMut(usize, usize),
{
    let total = items.len();
    let mut queued = items.into_iter().enumerate();
    let mut in_flight = JoinSet::new();
    let mut results: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
    let mut completed = 0;

    for (index, item) in queued.by_ref().take(limit.max(1)) {
        let fut = op(index, item);
        in_flight.spawn(async move { (index, fut.await) });
    }

    while let Some(joined) = in_flight.join_next().await {
        let (index, outcome) = joined.map_err(|e| SitegenError::Task(e.to_string()))?;
        results[index] = Some(outcome?);

        completed += 1;
        on_settled(completed, total);

        if let Some((index, item)) = queued.next() {
            let fut = op(index, item);
            in_flight.spawn(async move { (index, fut.await) });
        }
    }

    Ok(results.into_iter().flatten().collect())
}
