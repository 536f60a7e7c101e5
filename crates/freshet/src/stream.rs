#![forbid(unsafe_code)]

//! `futures::Stream` adapter over the publisher/subscriber surface.
//!
//! An internal subscriber forwards signals into a bounded channel; the
//! consumer-facing [`ItemStream`] pulls from it and returns demand in
//! tranches, so buffered items never exceed outstanding demand and the
//! producer can always deliver without blocking.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

use crate::{error::FlowError, subscriber::Subscriber, subscription::Subscription};

/// Options for stream adapters.
///
/// `replenish` is both the adapter's buffer capacity and the demand
/// tranche: the adapter requests `replenish` items up front and returns
/// consumed credits once half a tranche has been pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Items requested per demand tranche; also the buffer capacity.
    pub replenish: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self { replenish: 32 }
    }
}

pub(crate) fn channel_subscriber<T, E>(
    options: StreamOptions,
) -> (ChannelSubscriber<T, E>, ItemStream<T, E>)
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let tranche = options.replenish.max(1);
    // One extra slot so a terminal error always fits behind buffered items.
    let (tx, rx) = mpsc::channel(tranche + 1);
    let (sub_tx, sub_rx) = oneshot::channel();
    let subscriber = ChannelSubscriber {
        tx,
        sub_tx: Some(sub_tx),
        subscription: None,
        initial: tranche as u64,
    };
    let stream = ItemStream {
        inner: ReceiverStream::new(rx),
        sub_rx: Some(sub_rx),
        subscription: None,
        tranche: tranche as u64,
        credits: 0,
        done: false,
    };
    (subscriber, stream)
}

/// Internal subscriber forwarding signals into the adapter channel.
pub(crate) struct ChannelSubscriber<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    tx: mpsc::Sender<Result<T, FlowError<E>>>,
    sub_tx: Option<oneshot::Sender<Subscription>>,
    subscription: Option<Subscription>,
    initial: u64,
}

impl<T, E> Subscriber for ChannelSubscriber<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = T;
    type Error = E;

    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(self.initial);
        if let Some(sub_tx) = self.sub_tx.take() {
            let _ = sub_tx.send(subscription.clone());
        }
        self.subscription = Some(subscription);
    }

    fn on_next(&mut self, item: T) {
        match self.tx.try_send(Ok(item)) {
            Ok(()) => {}
            Err(TrySendError::Closed(_) | TrySendError::Full(_)) => {
                // The consumer is gone (a full buffer means demand
                // discipline was violated upstream); stop the stream.
                if let Some(subscription) = &self.subscription {
                    subscription.cancel();
                }
            }
        }
    }

    fn on_error(&mut self, error: FlowError<E>) {
        let _ = self.tx.try_send(Err(error));
    }

    fn on_complete(&mut self) {
        // Dropping the sender ends the stream; nothing to forward.
    }
}

/// Demand-bounded stream of items from a publisher.
///
/// Yields `Ok(item)` per item and at most one final `Err` carrying the
/// terminal failure; completion ends the stream. Dropping the stream
/// cancels the subscription.
pub struct ItemStream<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    inner: ReceiverStream<Result<T, FlowError<E>>>,
    sub_rx: Option<oneshot::Receiver<Subscription>>,
    subscription: Option<Subscription>,
    tranche: u64,
    credits: u64,
    done: bool,
}

impl<T, E> ItemStream<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Return consumed credits to the producer once half a tranche has
    /// accumulated.
    fn replenish(&mut self) {
        self.credits += 1;
        let threshold = (self.tranche / 2).max(1);
        if self.credits >= threshold {
            if let Some(subscription) = &self.subscription {
                trace!(credits = self.credits, "replenishing demand");
                subscription.request(self.credits);
                self.credits = 0;
            }
        }
    }
}

impl<T, E> Stream for ItemStream<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = Result<T, FlowError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if let Some(sub_rx) = this.sub_rx.as_mut() {
            match Pin::new(sub_rx).poll(cx) {
                Poll::Ready(Ok(subscription)) => {
                    this.subscription = Some(subscription);
                    this.sub_rx = None;
                }
                Poll::Ready(Err(_)) => this.sub_rx = None,
                Poll::Pending => {}
            }
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                if item.is_err() {
                    this.done = true;
                } else {
                    this.replenish();
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> Drop for ItemStream<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(subscription) = &self.subscription {
            subscription.cancel();
        } else if let Some(mut sub_rx) = self.sub_rx.take() {
            // The handle may not have arrived yet; if it never does, the
            // producer notices the closed channel on its next delivery and
            // cancels itself.
            if let Ok(subscription) = sub_rx.try_recv() {
                subscription.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        assert_eq!(StreamOptions::default().replenish, 32);
    }

    #[test]
    fn zero_replenish_is_clamped() {
        let (subscriber, stream) =
            channel_subscriber::<u32, std::io::Error>(StreamOptions { replenish: 0 });
        assert_eq!(subscriber.initial, 1);
        assert_eq!(stream.tranche, 1);
    }
}
