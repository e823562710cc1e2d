//! Push feed integration: subscription replay ordering across
//! reconnects, batch isolation, and dedup against storage.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::watch;

use feed_core::{Error, TrackedRoster};
use integration_tests::{
    fixtures,
    mocks::{MockPushConnector, MockRecordFetcher, PushEvent},
};
use storage::{KillmailRepository, MemoryRepository};
use upstream::{InboundMessage, OutboundMessage, SubscriptionSet};
use worker::{IngestionCoordinator, PushFeedWorker};

fn worker(
    connector: Arc<MockPushConnector>,
    repo: Arc<MemoryRepository>,
    tracked: &[u64],
) -> PushFeedWorker {
    let coordinator = Arc::new(IngestionCoordinator::new(
        repo,
        Arc::new(MockRecordFetcher::new()),
        Arc::new(TrackedRoster::with_characters(tracked.iter().copied())),
    ));
    let mut subscriptions = SubscriptionSet::new(500, 200);
    subscriptions.add_characters(tracked.iter().copied());
    PushFeedWorker::new(
        connector,
        coordinator,
        "killmails:lobby",
        subscriptions,
        Duration::from_millis(10),
    )
}

async fn drive(worker: &PushFeedWorker) {
    let (tx, rx) = watch::channel(false);
    tokio::select! {
        _ = worker.run(rx) => {}
        _ = tokio::time::sleep(Duration::from_millis(500)) => {}
    }
    drop(tx);
}

fn batch(ids_and_victims: &[(u64, u64)]) -> Result<InboundMessage, Error> {
    Ok(InboundMessage::BatchUpdate {
        killmails: ids_and_victims
            .iter()
            .map(|&(id, victim)| fixtures::killmail(id, Some(victim), &[42]))
            .collect(),
    })
}

#[tokio::test(start_paused = true)]
async fn reconnect_replays_subscriptions_before_any_inbound_handling() {
    // Session one dies immediately. Session two delivers a batch; the
    // worker must have re-sent the full interest set first.
    let connector = Arc::new(MockPushConnector::new(vec![
        vec![],
        vec![batch(&[(1, 111)])],
    ]));
    let repo = Arc::new(MemoryRepository::new());
    let w = worker(connector.clone(), repo.clone(), &[111, 222, 333]);

    drive(&w).await;
    assert!(connector.connects.load(Ordering::SeqCst) >= 2);

    let log = connector.log();
    let expected_subscribe = OutboundMessage::SubscribeCharacters {
        characters: vec![111, 222, 333],
    };

    // Two sessions, each starting with join + replay.
    let joins: Vec<usize> = log
        .iter()
        .enumerate()
        .filter_map(|(i, e)| match e {
            PushEvent::Sent(OutboundMessage::Join { .. }) => Some(i),
            _ => None,
        })
        .collect();
    assert_eq!(joins.len(), 2);
    assert_eq!(log[joins[1] + 1], PushEvent::Sent(expected_subscribe));

    // The batch was only delivered after the second replay.
    let delivered = log
        .iter()
        .position(|e| matches!(e, PushEvent::Delivered(1)))
        .expect("batch should have been delivered");
    assert!(delivered > joins[1] + 1);

    assert_eq!(repo.record_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_irrelevant_item_does_not_stop_the_batch() {
    let connector = Arc::new(MockPushConnector::new(vec![vec![batch(&[
        (10, 111),
        (11, 999),
        (12, 111),
    ])]]));
    let repo = Arc::new(MemoryRepository::new());
    let w = worker(connector.clone(), repo.clone(), &[111]);

    drive(&w).await;

    assert_eq!(repo.record_count(), 2);
    assert!(repo.find_by_event_id(11).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn redelivered_events_across_sessions_stay_single() {
    // The same killmail arrives in both sessions; storage-level dedup
    // keeps the second copy out even after the seen-window reset.
    let connector = Arc::new(MockPushConnector::new(vec![
        vec![batch(&[(20, 111)])],
        vec![batch(&[(20, 111)])],
    ]));
    let repo = Arc::new(MemoryRepository::new());
    let w = worker(connector.clone(), repo.clone(), &[111]);

    drive(&w).await;
    assert_eq!(repo.record_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn undecodable_frame_keeps_the_session_alive() {
    let connector = Arc::new(MockPushConnector::new(vec![vec![
        Err(Error::invalid_payload("not json")),
        batch(&[(30, 111)]),
    ]]));
    let repo = Arc::new(MemoryRepository::new());
    let w = worker(connector.clone(), repo.clone(), &[111]);

    drive(&w).await;
    // The batch behind the bad frame was delivered on the one and only
    // joined session.
    let log = connector.log();
    let joins = log
        .iter()
        .filter(|e| matches!(e, PushEvent::Sent(OutboundMessage::Join { .. })))
        .count();
    assert_eq!(joins, 1);
    assert!(log.contains(&PushEvent::Delivered(30)));
    assert_eq!(repo.record_count(), 1);
}
