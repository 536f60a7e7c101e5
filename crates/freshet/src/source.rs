#![forbid(unsafe_code)]

//! Contracts consumed by the publishers: batched cursors and one-shot
//! asynchronous operations.
//!
//! These are the seams toward the query/transport layer. The drain engine
//! does not interpret query semantics, does not retry, and invokes each
//! capability at most once at a time.

use std::future::Future;

/// One fetched batch of items.
///
/// `has_more == false` marks the final batch; the cursor is not asked again
/// after it. A batch may be empty while `has_more` is still true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Batch<T> {
    #[must_use]
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }
}

/// A batched async cursor over query results.
///
/// Normative:
/// - `fetch_next` is never invoked concurrently with itself, and never
///   again after it returned `has_more == false` or an error.
/// - `close` is called exactly once, when the stream reaches a terminal
///   state (including cancellation), and never while a fetch is still
///   mid-operation.
pub trait CursorSource: Send + 'static {
    /// Item type produced by the cursor.
    type Item: Send + 'static;

    /// Fetch/close failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the next batch, issuing the underlying query on first call.
    fn fetch_next(&mut self)
    -> impl Future<Output = Result<Batch<Self::Item>, Self::Error>> + Send;

    /// Release server-side cursor resources.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// A single asynchronous operation with exactly one outcome.
///
/// Consumed by value, so it can run at most once. `Ok(Some(value))` is a
/// success with a payload; `Ok(None)` is a success whose only meaningful
/// outcome is "succeeded" — the stream completes without emitting an item.
///
/// Cancellation drops the execution future; any remote side effects that
/// outlive the drop belong to the implementation, not the bridge.
pub trait Operation: Send + 'static {
    /// Payload type of a successful outcome.
    type Output: Send + 'static;

    /// Failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run the operation.
    fn execute(self) -> impl Future<Output = Result<Option<Self::Output>, Self::Error>> + Send;
}
