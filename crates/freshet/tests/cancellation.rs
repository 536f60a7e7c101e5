#![cfg(test)]

use std::time::Duration;

use freshet::{Batch, CursorPublisher};
use freshet_test_utils::{RecordingSubscriber, ScriptedCursor, Signal, eventually, gate};
use tokio::time::sleep;

#[tokio::test]
async fn cancel_before_any_request_fetches_nothing() {
    let cursor = ScriptedCursor::from_batches(vec![vec![1, 2, 3]]);
    let stats = cursor.stats();
    let publisher = CursorPublisher::once(cursor);

    let (subscriber, probe) = RecordingSubscriber::<u32>::new();
    publisher.subscribe(subscriber);

    probe.subscription().await.cancel();

    eventually(|| stats.closes() == 1).await;
    assert_eq!(stats.fetches(), 0);
    assert!(probe.signals().is_empty());
}

#[tokio::test]
async fn cancel_discards_in_flight_fetch_and_closes_after_settlement() {
    let (gate, mut handle) = gate();
    let cursor = ScriptedCursor::from_batches(vec![vec![1, 2], vec![3]]).gated(gate);
    let stats = cursor.stats();
    let publisher = CursorPublisher::once(cursor);

    let (subscriber, probe) = RecordingSubscriber::with_demand(5);
    publisher.subscribe(subscriber);

    handle.wait_entered(1).await;
    probe.subscription().await.cancel();

    // The fetch is still parked; the cursor must not be closed mid-flight.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(stats.closes(), 0);

    handle.release();
    eventually(|| stats.closes() == 1).await;

    // The settled batch was discarded: no item, no terminal signal.
    assert!(probe.signals().is_empty());
    assert_eq!(stats.fetches(), 1);
    assert_eq!(handle.entered(), 1);
}

#[tokio::test]
async fn cancel_mid_drain_stops_delivery() {
    let publisher = CursorPublisher::once(ScriptedCursor::from_batches(vec![vec![1, 2, 3, 4, 5]]));

    let (subscriber, probe) = RecordingSubscriber::with_demand(2);
    publisher.subscribe(subscriber);

    probe.wait_items(2).await;
    let subscription = probe.subscription().await;
    subscription.cancel();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.signals(), vec![Signal::Next(1), Signal::Next(2)]);
    assert!(!probe.is_terminal());
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let cursor = ScriptedCursor::from_batches(vec![vec![1]]);
    let stats = cursor.stats();
    let publisher = CursorPublisher::once(cursor);

    let (subscriber, probe) = RecordingSubscriber::<u32>::new();
    publisher.subscribe(subscriber);

    let subscription = probe.subscription().await;
    subscription.cancel();
    subscription.cancel();
    subscription.clone().cancel();

    eventually(|| stats.closes() == 1).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(stats.closes(), 1);
    assert!(probe.signals().is_empty());
}

#[tokio::test]
async fn requests_after_cancel_are_ignored() {
    let cursor = ScriptedCursor::from_batches(vec![vec![1, 2]]);
    let stats = cursor.stats();
    let publisher = CursorPublisher::once(cursor);

    let (subscriber, probe) = RecordingSubscriber::<u32>::new();
    publisher.subscribe(subscriber);

    let subscription = probe.subscription().await;
    subscription.cancel();
    subscription.request(5);

    eventually(|| stats.closes() == 1).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(stats.fetches(), 0);
    assert!(probe.signals().is_empty());
}

#[tokio::test]
async fn dropping_every_handle_releases_the_cursor() {
    let cursor = ScriptedCursor::new(vec![
        Ok(Batch::new(vec![1, 2], true)),
        Ok(Batch::new(vec![3], false)),
    ]);
    let stats = cursor.stats();
    let publisher = CursorPublisher::once(cursor);

    // Requests two items, then drops the handle: the remaining demandless
    // stream can never progress and must release the cursor silently.
    let (subscriber, probe) = RecordingSubscriber::detached_with_demand(2);
    publisher.subscribe(subscriber);

    eventually(|| stats.closes() == 1).await;
    assert_eq!(probe.signals(), vec![Signal::Next(1), Signal::Next(2)]);
    assert!(!probe.is_terminal());
    assert_eq!(stats.fetches(), 1);
}
