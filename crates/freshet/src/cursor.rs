#![forbid(unsafe_code)]

//! Batch-cursor drain loop: turns a [`CursorSource`] into a demand-bounded
//! stream of individual items.
//!
//! Each subscriber gets its own drain task that owns all mutable state
//! (demand, pending buffer, the cursor itself) and receives typed commands
//! over an unbounded channel. Fetch settlement is raced against commands
//! with `tokio::select!`, so every state transition and every subscriber
//! signal happens on one task — strictly sequenced, never concurrent,
//! never after a terminal signal.

use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    demand::Demand,
    error::FlowError,
    source::{Batch, CursorSource},
    stream::{ItemStream, StreamOptions, channel_subscriber},
    subscriber::Subscriber,
    subscription::{Command, SharedState, Subscription, subscription_channel},
};

/// Fetch future that owns the source for the duration of one fetch.
///
/// The drain task holds this across `select!` iterations and gets the
/// source back at settlement, so `close` can never race a fetch that is
/// still mid-operation.
type FetchFuture<S> = Pin<
    Box<
        dyn Future<
                Output = (
                    S,
                    Result<Batch<<S as CursorSource>::Item>, <S as CursorSource>::Error>,
                ),
            > + Send,
    >,
>;

fn issue_fetch<S: CursorSource>(mut source: S) -> FetchFuture<S> {
    Box::pin(async move {
        let result = source.fetch_next().await;
        (source, result)
    })
}

enum Inner<S> {
    /// Cold: every subscribe re-issues the underlying query from scratch.
    Cold(Box<dyn Fn() -> S + Send + Sync>),
    /// Wraps an already-open cursor; single-use.
    Once(Mutex<Option<S>>),
}

/// Publisher over a batched async cursor.
///
/// Every `subscribe` spawns an independent drain task with its own cursor;
/// nothing is shared between subscribers. No fetch happens until the
/// subscriber requests demand, batches larger than outstanding demand are
/// buffered and drained on later requests without re-fetching, and items
/// are delivered in batch order with batch boundaries invisible.
pub struct CursorPublisher<S: CursorSource> {
    inner: Inner<S>,
}

impl<S: CursorSource> fmt::Debug for CursorPublisher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorPublisher").finish_non_exhaustive()
    }
}

impl<S: CursorSource> CursorPublisher<S> {
    /// Cold publisher: `factory` produces a fresh cursor per subscriber.
    #[must_use]
    pub fn new(factory: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            inner: Inner::Cold(Box::new(factory)),
        }
    }

    /// Single-use publisher over an already-open cursor.
    ///
    /// A second subscriber is rejected with [`FlowError::AlreadyConsumed`].
    #[must_use]
    pub fn once(source: S) -> Self {
        Self {
            inner: Inner::Once(Mutex::new(Some(source))),
        }
    }

    /// Start an independent drain task serving `subscriber`.
    ///
    /// Must be called from within a tokio runtime context. The subscriber
    /// receives `on_subscribe` first; nothing is fetched until it requests
    /// demand through the handle.
    pub fn subscribe<U>(&self, subscriber: U)
    where
        U: Subscriber<Item = S::Item, Error = S::Error>,
    {
        let source = match &self.inner {
            Inner::Cold(factory) => Some(factory()),
            Inner::Once(slot) => slot.lock().ok().and_then(|mut slot| slot.take()),
        };
        let (subscription, cmd_rx, state) = subscription_channel();
        tokio::spawn(drain_loop(source, subscriber, subscription, cmd_rx, state));
    }

    /// Consume the publisher into a [`futures::Stream`] of items.
    ///
    /// Demand is managed by the adapter in tranches of
    /// [`StreamOptions::replenish`]; dropping the stream cancels the
    /// subscription and releases the cursor.
    pub fn into_stream(self, options: StreamOptions) -> ItemStream<S::Item, S::Error> {
        let (subscriber, stream) = channel_subscriber(options);
        self.subscribe(subscriber);
        stream
    }
}

async fn drain_loop<S, U>(
    source: Option<S>,
    mut subscriber: U,
    subscription: Subscription,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    state: Arc<SharedState>,
) where
    S: CursorSource,
    U: Subscriber<Item = S::Item, Error = S::Error>,
{
    subscriber.on_subscribe(subscription);

    let Some(source) = source else {
        if !state.is_cancelled() {
            subscriber.on_error(FlowError::AlreadyConsumed);
        }
        return;
    };

    let mut source = Some(source);
    let mut in_flight: Option<FetchFuture<S>> = None;
    let mut demand = Demand::new();
    let mut buffer: VecDeque<S::Item> = VecDeque::new();
    let mut exhausted = false;
    let mut commands_closed = false;

    loop {
        // Drain: emit buffered items up to outstanding demand. The
        // cancelled flag is re-checked before every emission.
        while demand.get() > 0 && !state.is_cancelled() {
            let Some(item) = buffer.pop_front() else { break };
            demand.take(1);
            subscriber.on_next(item);
        }

        if state.is_cancelled() {
            discard_and_close(source.take(), in_flight.take()).await;
            return;
        }

        if buffer.is_empty() && exhausted {
            debug!("cursor exhausted, completing");
            subscriber.on_complete();
            close_source(source.take()).await;
            return;
        }

        // Refill only when the buffer is dry, demand remains, and no fetch
        // is already in flight.
        if buffer.is_empty() && !exhausted && demand.get() > 0 && in_flight.is_none() {
            if let Some(cursor) = source.take() {
                trace!("issuing fetch");
                in_flight = Some(issue_fetch(cursor));
            }
        }

        // With every handle dropped and nothing in flight, no event can
        // ever arrive again: release the cursor and bow out, no signal.
        if commands_closed && in_flight.is_none() {
            debug!("subscription handles dropped, releasing cursor");
            close_source(source.take()).await;
            return;
        }

        tokio::select! {
            cmd = cmd_rx.recv(), if !commands_closed => {
                match cmd {
                    None => commands_closed = true,
                    Some(Command::Request(0)) => {
                        if !state.is_cancelled() {
                            subscriber.on_error(FlowError::IllegalDemand);
                        }
                        discard_and_close(source.take(), in_flight.take()).await;
                        return;
                    }
                    Some(Command::Request(n)) => {
                        trace!(n, "demand granted");
                        demand.add(n);
                    }
                    Some(Command::Cancel) => {
                        // The shared flag is already set; the next loop
                        // iteration tears down.
                    }
                }
            }
            settled = async {
                match in_flight.as_mut() {
                    Some(fetch) => Some(fetch.await),
                    None => None,
                }
            }, if in_flight.is_some() => {
                let Some((returned, result)) = settled else { continue };
                in_flight = None;
                source = Some(returned);
                match result {
                    Ok(batch) => {
                        trace!(
                            items = batch.items.len(),
                            has_more = batch.has_more,
                            "batch fetched"
                        );
                        exhausted = !batch.has_more;
                        buffer.extend(batch.items);
                    }
                    Err(e) => {
                        if !state.is_cancelled() {
                            subscriber.on_error(FlowError::Source(e));
                        }
                        close_source(source.take()).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Let an in-flight fetch settle, discard its result, then close.
///
/// Closing a cursor that is still fetching would race the remote call, so
/// the settled result is dropped unseen instead.
async fn discard_and_close<S: CursorSource>(source: Option<S>, in_flight: Option<FetchFuture<S>>) {
    let source = match in_flight {
        Some(fetch) => {
            let (returned, discarded) = fetch.await;
            trace!(failed = discarded.is_err(), "discarded fetch result");
            Some(returned)
        }
        None => source,
    };
    close_source(source).await;
}

async fn close_source<S: CursorSource>(source: Option<S>) {
    if let Some(mut cursor) = source {
        debug!("closing cursor");
        cursor.close().await;
    }
}
