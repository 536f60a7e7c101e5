#![forbid(unsafe_code)]

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Commands accepted by a drain task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Request(u64),
    Cancel,
}

/// State shared between subscription handles and their drain task.
///
/// The cancelled flag is the one piece of state readable outside the drain
/// task: the task re-checks it before every emission, so no item is
/// delivered once `cancel()` has returned.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    cancelled: AtomicBool,
}

impl SharedState {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Create a subscription handle wired to a fresh command channel.
pub(crate) fn subscription_channel() -> (
    Subscription,
    mpsc::UnboundedReceiver<Command>,
    Arc<SharedState>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let state = Arc::new(SharedState::default());
    (
        Subscription {
            cmd_tx,
            state: state.clone(),
        },
        cmd_rx,
        state,
    )
}

/// Live coupling between a subscriber and the drain task serving it.
///
/// Cheap to clone; all methods are non-blocking and safe to call
/// concurrently with in-flight fetch callbacks. Calls made after the
/// stream reached a terminal state are ignored.
#[derive(Clone)]
pub struct Subscription {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<SharedState>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Authorize `n` more items.
    ///
    /// `request(0)` is a protocol violation and fails the stream with
    /// [`crate::FlowError::IllegalDemand`]. Cumulative demand saturates at
    /// [`u64::MAX`], which means unbounded.
    pub fn request(&self, n: u64) {
        trace!(n, "demand requested");
        let _ = self.cmd_tx.send(Command::Request(n));
    }

    /// Stop the stream.
    ///
    /// Idempotent, and returns immediately even if a fetch is outstanding.
    /// No item reaches the subscriber after this returns; an in-flight
    /// fetch settles in the background and its result is discarded.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            debug!("subscription cancelled");
            let _ = self.cmd_tx.send(Command::Cancel);
        }
    }

    /// True once `cancel` has been observed on any clone of this handle.
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_idempotent_and_sends_one_command() {
        let (subscription, mut cmd_rx, state) = subscription_channel();

        subscription.cancel();
        subscription.cancel();
        subscription.clone().cancel();

        assert!(subscription.is_cancelled());
        assert!(state.is_cancelled());
        assert_eq!(cmd_rx.recv().await, Some(Command::Cancel));
        assert!(cmd_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn request_forwards_demand() {
        let (subscription, mut cmd_rx, _state) = subscription_channel();

        subscription.request(5);
        subscription.request(0);

        assert_eq!(cmd_rx.recv().await, Some(Command::Request(5)));
        assert_eq!(cmd_rx.recv().await, Some(Command::Request(0)));
    }

    #[test]
    fn calls_after_drain_task_exit_are_ignored() {
        let (subscription, cmd_rx, _state) = subscription_channel();
        drop(cmd_rx);

        subscription.request(1);
        subscription.cancel();
        assert!(subscription.is_cancelled());
    }
}
