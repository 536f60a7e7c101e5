#![forbid(unsafe_code)]

use crate::{error::FlowError, subscription::Subscription};

/// The consumer half of a stream.
///
/// Signal rules (normative):
/// - `on_subscribe` is delivered first, exactly once.
/// - `on_next` is never delivered beyond outstanding demand, never after a
///   terminal signal, and never once `cancel()` has returned.
/// - At most one of `on_complete` / `on_error` is delivered, at most once.
/// - All signals arrive sequentially from the stream's drain task;
///   implementations never observe two signals concurrently.
pub trait Subscriber: Send + 'static {
    /// Item type emitted by the stream.
    type Item: Send + 'static;

    /// Source error type carried by [`FlowError::Source`].
    type Error: std::error::Error + Send + Sync + 'static;

    /// Receives the subscription handle before any other signal.
    fn on_subscribe(&mut self, subscription: Subscription);

    /// Receives one item; consumes one unit of demand.
    fn on_next(&mut self, item: Self::Item);

    /// Terminal failure signal.
    fn on_error(&mut self, error: FlowError<Self::Error>);

    /// Terminal success signal.
    fn on_complete(&mut self);
}
