//! Integration tests for demand-paced async streams

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use demandbus_runtime::paced;
use futures::StreamExt;
use std::time::Duration;

const ARTICLES: [&str; 7] = ["one", "two", "three", "four", "five", "six", "seven"];

#[tokio::test]
async fn batches_of_three_two_two_deliver_everything_once() {
    let (demand, mut stream) = paced(ARTICLES);
    let mut received = Vec::new();

    for batch in [3, 2, 2] {
        demand.request(batch);
        for _ in 0..batch {
            received.push(stream.next().await.unwrap());
        }
    }

    assert_eq!(received, ARTICLES);
    let end = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("completion should follow the last item");
    assert_eq!(end, None);
}

#[tokio::test]
async fn never_runs_ahead_of_demand() {
    let (demand, mut stream) = paced(0..100);
    demand.request(10);

    let mut received = Vec::new();
    while let Ok(Some(item)) =
        tokio::time::timeout(Duration::from_millis(100), stream.next()).await
    {
        received.push(item);
    }
    assert_eq!(received, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn oversized_request_ends_at_backlog() {
    let (demand, stream) = paced(1..=3);
    demand.request(usize::MAX);

    let items: Vec<i32> = tokio::time::timeout(Duration::from_secs(1), stream.collect())
        .await
        .expect("stream should complete");
    assert_eq!(items, vec![1, 2, 3]);
}

#[tokio::test]
async fn cancel_ends_the_stream() {
    let (demand, mut stream) = paced(0..10);
    demand.request(2);
    assert_eq!(stream.next().await, Some(0));

    demand.cancel();
    demand.cancel();
    assert!(demand.is_cancelled());
    assert_eq!(stream.next().await, None);

    demand.request(5);
    assert_eq!(stream.next().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn demand_from_another_task() {
    let (demand, stream) = paced(0..50);

    let driver = tokio::spawn(async move {
        for _ in 0..50 {
            demand.request(1);
            tokio::task::yield_now().await;
        }
    });

    let items: Vec<i32> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
        .await
        .expect("stream should complete");
    driver.await.unwrap();
    assert_eq!(items, (0..50).collect::<Vec<_>>());
}
