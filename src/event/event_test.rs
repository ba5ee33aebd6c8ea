use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use super::*;
use crate::storage::EventStore;
use crate::storage::MemoryStore;
use crate::storage::MockEventStore;
use crate::BackoffPolicy;
use crate::NetworkError;
use crate::StorageError;

const CLUSTER: &str = "c1";

fn policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        timeout_ms: 1_000,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
    }
}

#[test]
fn registration_is_idempotent_per_cluster() {
    let streamer = EventStreamer::new();
    let (first, _rx1) = reconfigure_channel(1);
    let (second, _rx2) = reconfigure_channel(1);

    assert!(streamer.register(CLUSTER, first));
    assert!(!streamer.register(CLUSTER, second));
    assert!(streamer.is_registered(CLUSTER));

    assert!(!streamer.unregister("unknown"));
    assert!(streamer.unregister(CLUSTER));
    assert!(!streamer.notify(CLUSTER));
}

#[tokio::test]
async fn pulses_coalesce_in_a_full_channel() {
    let streamer = EventStreamer::new();
    let (tx, mut rx) = reconfigure_channel(1);
    streamer.register(CLUSTER, tx);

    for _ in 0..5 {
        assert!(streamer.notify(CLUSTER));
    }

    assert_eq!(rx.recv().await, Some(Reconfigure));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn poller_pulses_when_marker_moves() {
    let store = Arc::new(MemoryStore::new());
    let streamer = Arc::new(EventStreamer::new());
    let (tx, mut rx) = reconfigure_channel(4);
    streamer.register(CLUSTER, tx);

    let poller = StoreEventPoller::new(store.clone(), streamer, Duration::from_secs(1));
    let mut seen = None;

    assert!(!poller.poll_once(&mut seen).await);
    store.touch().await.unwrap();
    assert!(poller.poll_once(&mut seen).await);
    assert!(!poller.poll_once(&mut seen).await);

    assert_eq!(seen, Some(1));
    assert_eq!(rx.try_recv(), Ok(Reconfigure));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
#[traced_test]
async fn poller_skips_cycle_when_store_fails() {
    let mut store = MockEventStore::new();
    store
        .expect_last_update()
        .returning(|| Err(StorageError::Unavailable("down".into()).into()));
    let streamer = Arc::new(EventStreamer::new());
    let (tx, mut rx) = reconfigure_channel(1);
    streamer.register(CLUSTER, tx);

    let poller = StoreEventPoller::new(Arc::new(store), streamer, Duration::from_secs(1));
    let mut seen = Some(3);

    assert!(!poller.poll_once(&mut seen).await);
    assert_eq!(seen, Some(3));
    assert!(rx.try_recv().is_err());
    assert!(logs_contain("store_unavailable"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn relay_retries_until_established() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut client = MockRelayClient::new();
    client.expect_subscribe().returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            return Err(NetworkError::RelaySetupFailed("connection refused".into()).into());
        }
        Ok(stream::iter(vec![Ok(())]).chain(stream::pending()).boxed())
    });

    let streamer = Arc::new(EventStreamer::new());
    let (tx, mut rx) = reconfigure_channel(1);
    streamer.register(CLUSTER, tx);

    let cancel = CancellationToken::new();
    let listener = RelayListener::new(Arc::new(client), streamer, CLUSTER.into(), policy());
    let handle = tokio::spawn(listener.run(cancel.clone()));

    assert_eq!(rx.recv().await, Some(Reconfigure));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(logs_contain("relay_setup_failed"));

    cancel.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn relay_reestablishes_after_stream_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut client = MockRelayClient::new();
    client.expect_subscribe().returning(move |_| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            let failing = stream::iter(vec![
                Ok(()),
                Err(NetworkError::RelaySetupFailed("reset".into()).into()),
            ]);
            return Ok(failing.boxed());
        }
        Ok(stream::iter(vec![Ok(())]).chain(stream::pending()).boxed())
    });

    let streamer = Arc::new(EventStreamer::new());
    let (tx, mut rx) = reconfigure_channel(4);
    streamer.register(CLUSTER, tx);

    let cancel = CancellationToken::new();
    let listener = RelayListener::new(Arc::new(client), streamer, CLUSTER.into(), policy());
    let handle = tokio::spawn(listener.run(cancel.clone()));

    assert_eq!(rx.recv().await, Some(Reconfigure));
    assert_eq!(rx.recv().await, Some(Reconfigure));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    cancel.cancel();
    assert!(handle.await.unwrap().is_ok());
}
