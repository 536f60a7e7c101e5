#![forbid(unsafe_code)]

//! Single-result bridge: one asynchronous operation as a one-item stream.
//!
//! Same actor shape as the cursor drain loop, reduced to a single
//! settlement: the operation is not started until the first positive
//! request arrives, resolves into at most one `on_next` plus a terminal
//! signal, and a cancellation observed before settlement suppresses the
//! signal entirely.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    error::FlowError,
    source::Operation,
    stream::{ItemStream, StreamOptions, channel_subscriber},
    subscriber::Subscriber,
    subscription::{Command, SharedState, Subscription, subscription_channel},
};

type ExecutionFuture<Op> = Pin<
    Box<
        dyn Future<Output = Result<Option<<Op as Operation>::Output>, <Op as Operation>::Error>>
            + Send,
    >,
>;

/// Publisher adapting one [`Operation`] into at most one item followed by
/// a terminal signal.
///
/// Single-use: the operation is consumed by the first subscriber; a second
/// subscriber is rejected with [`FlowError::AlreadyConsumed`]. If the
/// subscriber never requests, the operation is never executed.
pub struct OperationPublisher<Op: Operation> {
    op: Mutex<Option<Op>>,
}

impl<Op: Operation> fmt::Debug for OperationPublisher<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPublisher").finish_non_exhaustive()
    }
}

impl<Op: Operation> OperationPublisher<Op> {
    #[must_use]
    pub fn new(op: Op) -> Self {
        Self {
            op: Mutex::new(Some(op)),
        }
    }

    /// Start the bridge task serving `subscriber`.
    ///
    /// Must be called from within a tokio runtime context.
    pub fn subscribe<U>(&self, subscriber: U)
    where
        U: Subscriber<Item = Op::Output, Error = Op::Error>,
    {
        let op = self.op.lock().ok().and_then(|mut slot| slot.take());
        let (subscription, cmd_rx, state) = subscription_channel();
        tokio::spawn(bridge_loop(op, subscriber, subscription, cmd_rx, state));
    }

    /// Consume the publisher into a [`futures::Stream`] with at most one
    /// item.
    pub fn into_stream(self, options: StreamOptions) -> ItemStream<Op::Output, Op::Error> {
        let (subscriber, stream) = channel_subscriber(options);
        self.subscribe(subscriber);
        stream
    }
}

async fn bridge_loop<Op, U>(
    op: Option<Op>,
    mut subscriber: U,
    subscription: Subscription,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    state: Arc<SharedState>,
) where
    Op: Operation,
    U: Subscriber<Item = Op::Output, Error = Op::Error>,
{
    subscriber.on_subscribe(subscription);

    let Some(op) = op else {
        if !state.is_cancelled() {
            subscriber.on_error(FlowError::AlreadyConsumed);
        }
        return;
    };

    let mut op = Some(op);
    let mut in_flight: Option<ExecutionFuture<Op>> = None;
    let mut commands_closed = false;

    loop {
        if state.is_cancelled() {
            // Dropping the execution future suppresses its signal; remote
            // side effects belong to the operation.
            debug!("bridge cancelled");
            return;
        }

        // No demand can ever arrive; the operation was never started.
        if commands_closed && in_flight.is_none() {
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
                        return;
                    }
                    Some(Command::Request(_)) => {
                        // The first positive request starts the operation;
                        // extra demand cannot matter for a single item.
                        if let Some(operation) = op.take() {
                            debug!("executing operation");
                            in_flight = Some(Box::pin(operation.execute()));
                        }
                    }
                    Some(Command::Cancel) => {
                        // The shared flag is already set; the next loop
                        // iteration tears down.
                    }
                }
            }
            settled = async {
                match in_flight.as_mut() {
                    Some(execution) => Some(execution.await),
                    None => None,
                }
            }, if in_flight.is_some() => {
                let Some(result) = settled else { continue };
                if state.is_cancelled() {
                    return;
                }
                match result {
                    Ok(Some(value)) => {
                        trace!("operation resolved with a value");
                        subscriber.on_next(value);
                        if !state.is_cancelled() {
                            subscriber.on_complete();
                        }
                    }
                    Ok(None) => {
                        trace!("operation resolved without a value");
                        subscriber.on_complete();
                    }
                    Err(e) => {
                        subscriber.on_error(FlowError::Source(e));
                    }
                }
                return;
            }
        }
    }
}
