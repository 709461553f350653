//! Bounded concurrent execution of per-file work.
//!
//! Manifest builds, dedup scans and staging copies all fan out one task per
//! file. [`run_batch`] caps the number of in-flight tasks and only returns
//! once every task has settled, so a batch never completes while some of
//! its file operations are still running.

use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::error::StoreResult;

/// Run `f` for every item with at most `limit` futures in flight.
///
/// All futures are driven to completion even if some fail; the first error
/// in completion order is returned afterwards. Output order is completion
/// order, not input order.
pub(crate) async fn run_batch<I, T, F, Fut>(items: I, limit: usize, f: F) -> StoreResult<Vec<T>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let results: Vec<StoreResult<T>> = stream::iter(items)
        .map(f)
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    results.into_iter().collect()
}
