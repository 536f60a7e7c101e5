//! Recording subscriber and its test-side probe.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use freshet::{FlowError, Subscriber, Subscription};
use tokio::sync::watch;

use crate::TestError;

/// One recorded subscriber signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<T> {
    Next(T),
    Error(String),
    Complete,
}

struct ProbeShared<T> {
    signals: Mutex<Vec<Signal<T>>>,
    subscription: Mutex<Option<Subscription>>,
    subscribed: watch::Sender<bool>,
    terminal: watch::Sender<bool>,
}

/// Subscriber that records every signal for later assertions.
///
/// Errors are recorded by display string so tests can compare them without
/// an `Eq` bound on the error type.
pub struct RecordingSubscriber<T> {
    shared: Arc<ProbeShared<T>>,
    initial_demand: Option<u64>,
    keep_subscription: bool,
}

impl<T: Send + 'static> RecordingSubscriber<T> {
    /// Records signals; demand is driven manually through the probe.
    #[must_use]
    pub fn new() -> (Self, SubscriberProbe<T>) {
        Self::build(None, true)
    }

    /// Requests `n` as soon as the subscription arrives.
    #[must_use]
    pub fn with_demand(n: u64) -> (Self, SubscriberProbe<T>) {
        Self::build(Some(n), true)
    }

    /// Requests `n`, then drops the subscription handle immediately —
    /// nobody can ever request again or cancel.
    #[must_use]
    pub fn detached_with_demand(n: u64) -> (Self, SubscriberProbe<T>) {
        Self::build(Some(n), false)
    }

    fn build(initial_demand: Option<u64>, keep_subscription: bool) -> (Self, SubscriberProbe<T>) {
        let shared = Arc::new(ProbeShared {
            signals: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            subscribed: watch::channel(false).0,
            terminal: watch::channel(false).0,
        });
        (
            Self {
                shared: shared.clone(),
                initial_demand,
                keep_subscription,
            },
            SubscriberProbe { shared },
        )
    }
}

impl<T: Send + 'static> Subscriber for RecordingSubscriber<T> {
    type Item = T;
    type Error = TestError;

    fn on_subscribe(&mut self, subscription: Subscription) {
        if let Some(n) = self.initial_demand {
            subscription.request(n);
        }
        if self.keep_subscription {
            *self.shared.subscription.lock().unwrap() = Some(subscription);
        }
        // send_replace: the probe may subscribe its receiver later.
        self.shared.subscribed.send_replace(true);
    }

    fn on_next(&mut self, item: T) {
        self.shared.signals.lock().unwrap().push(Signal::Next(item));
    }

    fn on_error(&mut self, error: FlowError<TestError>) {
        self.shared
            .signals
            .lock()
            .unwrap()
            .push(Signal::Error(error.to_string()));
        self.shared.terminal.send_replace(true);
    }

    fn on_complete(&mut self) {
        self.shared.signals.lock().unwrap().push(Signal::Complete);
        self.shared.terminal.send_replace(true);
    }
}

/// Test-side view of a [`RecordingSubscriber`].
pub struct SubscriberProbe<T> {
    shared: Arc<ProbeShared<T>>,
}

impl<T: Clone + Send + 'static> SubscriberProbe<T> {
    /// All recorded signals, in delivery order.
    #[must_use]
    pub fn signals(&self) -> Vec<Signal<T>> {
        self.shared.signals.lock().unwrap().clone()
    }

    /// Payloads of the recorded `Next` signals, in order.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.signals()
            .into_iter()
            .filter_map(|signal| match signal {
                Signal::Next(item) => Some(item),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        *self.shared.terminal.borrow()
    }

    /// Wait (bounded) for the subscription handle to arrive.
    pub async fn subscription(&self) -> Subscription {
        let mut subscribed = self.shared.subscribed.subscribe();
        tokio::time::timeout(Duration::from_secs(5), subscribed.wait_for(|&seen| seen))
            .await
            .expect("timed out waiting for on_subscribe")
            .expect("subscriber dropped");
        self.shared
            .subscription
            .lock()
            .unwrap()
            .clone()
            .expect("subscription recorded")
    }

    /// Wait (bounded) until at least `n` items have been delivered.
    pub async fn wait_items(&self, n: usize) {
        crate::eventually(|| self.items().len() >= n).await;
    }

    /// Wait (bounded) for the terminal signal.
    pub async fn wait_terminal(&self) {
        let mut terminal = self.shared.terminal.subscribe();
        tokio::time::timeout(Duration::from_secs(5), terminal.wait_for(|&seen| seen))
            .await
            .expect("timed out waiting for terminal signal")
            .expect("subscriber dropped");
    }
}
