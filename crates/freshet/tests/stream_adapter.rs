#![cfg(test)]

use freshet::{Batch, CursorPublisher, OperationPublisher, StreamOptions};
use freshet_test_utils::{ScriptedCursor, ScriptedOperation, TestError, eventually};
use futures::StreamExt;

#[tokio::test]
async fn collects_every_item_in_order() {
    let publisher = CursorPublisher::once(ScriptedCursor::from_batches(vec![
        vec![1, 2, 3],
        vec![4, 5],
        vec![6, 7],
    ]));

    let items: Vec<_> = publisher
        .into_stream(StreamOptions::default())
        .map(|item| item.expect("no error scripted"))
        .collect()
        .await;
    assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7]);
}

#[tokio::test]
async fn small_tranche_replenishes_until_exhaustion() {
    let cursor = ScriptedCursor::from_batches(vec![(1..=10).collect::<Vec<u32>>()]);
    let stats = cursor.stats();
    let publisher = CursorPublisher::once(cursor);

    let items: Vec<_> = publisher
        .into_stream(StreamOptions { replenish: 2 })
        .map(|item| item.expect("no error scripted"))
        .collect()
        .await;
    assert_eq!(items, (1..=10).collect::<Vec<u32>>());
    assert_eq!(stats.fetches(), 1);
    eventually(|| stats.closes() == 1).await;
}

#[tokio::test]
async fn error_ends_the_stream_after_buffered_items() {
    let publisher = CursorPublisher::once(ScriptedCursor::new(vec![
        Ok(Batch::new(vec![1, 2], true)),
        Err(TestError("cursor lost")),
    ]));

    let mut stream = publisher.into_stream(StreamOptions::default());
    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    assert_eq!(stream.next().await.unwrap().unwrap(), 2);
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "source error: cursor lost");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn dropping_the_stream_releases_the_cursor() {
    let cursor = ScriptedCursor::from_batches(vec![(1..=100).collect::<Vec<u32>>(), vec![101]]);
    let stats = cursor.stats();
    let publisher = CursorPublisher::once(cursor);

    let mut stream = publisher.into_stream(StreamOptions { replenish: 4 });
    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    drop(stream);

    eventually(|| stats.closes() == 1).await;
}

#[tokio::test]
async fn operation_stream_yields_at_most_one_item() {
    let publisher = OperationPublisher::new(ScriptedOperation::ok(9));
    let items: Vec<_> = publisher
        .into_stream(StreamOptions::default())
        .map(|item| item.expect("no error scripted"))
        .collect()
        .await;
    assert_eq!(items, vec![9]);

    let publisher = OperationPublisher::new(ScriptedOperation::<u32>::empty());
    let items: Vec<_> = publisher
        .into_stream(StreamOptions::default())
        .map(|item| item.expect("no error scripted"))
        .collect()
        .await;
    assert!(items.is_empty());
}
