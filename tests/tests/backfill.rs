//! Backfill orchestration against mock history and detail services.

use std::sync::Arc;

use chrono::Utc;

use feed_core::{StreamKind, TrackedRoster};
use integration_tests::{fixtures, mocks::MockHistorySource, mocks::MockRecordFetcher};
use storage::{KillmailRepository, MemoryRepository};
use worker::{BackfillConfig, BackfillOrchestrator, IngestionCoordinator};

struct Setup {
    repo: Arc<MemoryRepository>,
    history: Arc<MockHistorySource>,
    fetcher: Arc<MockRecordFetcher>,
    orchestrator: Arc<BackfillOrchestrator>,
}

fn setup(tracked: &[u64]) -> Setup {
    let repo = Arc::new(MemoryRepository::new());
    let history = Arc::new(MockHistorySource::new());
    let fetcher = Arc::new(MockRecordFetcher::new());
    let coordinator = Arc::new(IngestionCoordinator::new(
        repo.clone(),
        fetcher.clone(),
        Arc::new(TrackedRoster::with_characters(tracked.iter().copied())),
    ));
    let orchestrator = Arc::new(BackfillOrchestrator::new(
        history.clone(),
        fetcher.clone(),
        coordinator,
        repo.clone(),
        BackfillConfig {
            max_age_days: 30,
            worker_count: 2,
        },
    ));
    Setup {
        repo,
        history,
        fetcher,
        orchestrator,
    }
}

#[tokio::test]
async fn stops_at_checkpoint_and_advances_past_processed_events() {
    let s = setup(&[111]);
    s.repo
        .advance_checkpoint("kills:111", 500, Utc::now())
        .await
        .unwrap();

    let kms: Vec<_> = [600, 550, 500, 450]
        .iter()
        .map(|&id| fixtures::killmail(id, Some(999), &[111]))
        .collect();
    s.history.add_page(
        111,
        StreamKind::Kills,
        kms.iter().map(fixtures::history_entry).collect(),
    );
    for km in &kms {
        s.fetcher.add(km.clone());
    }

    let result = s.orchestrator.run_character(111).await;
    assert_eq!(result.processed, 2);
    assert!(result.error.is_none());

    // 600 and 550 ingested; 500 hit the checkpoint and ended the walk.
    assert!(s.repo.find_by_event_id(600).await.unwrap().is_some());
    assert!(s.repo.find_by_event_id(550).await.unwrap().is_some());
    assert!(s.repo.find_by_event_id(500).await.unwrap().is_none());
    assert!(s.repo.find_by_event_id(450).await.unwrap().is_none());

    let cp = s.repo.checkpoint("kills:111").await.unwrap().unwrap();
    assert_eq!(cp.last_seen_id, 600);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let s = setup(&[111]);
    let km = fixtures::killmail(700, Some(111), &[42]);
    s.history
        .add_page(111, StreamKind::Kills, vec![fixtures::history_entry(&km)]);
    s.fetcher.add(km);

    let first = s.orchestrator.run_character(111).await;
    assert_eq!(first.processed, 1);

    let second = s.orchestrator.run_character(111).await;
    assert_eq!(second.processed, 0);
    assert_eq!(s.repo.record_count(), 1);
}

#[tokio::test]
async fn kills_and_losses_streams_have_independent_checkpoints() {
    let s = setup(&[111]);
    let kill = fixtures::killmail(801, Some(999), &[111]);
    let loss = fixtures::killmail(802, Some(111), &[888]);
    s.history
        .add_page(111, StreamKind::Kills, vec![fixtures::history_entry(&kill)]);
    s.history
        .add_page(111, StreamKind::Losses, vec![fixtures::history_entry(&loss)]);
    s.fetcher.add(kill);
    s.fetcher.add(loss);

    let result = s.orchestrator.run_character(111).await;
    assert_eq!(result.processed, 2);

    assert_eq!(
        s.repo.checkpoint("kills:111").await.unwrap().unwrap().last_seen_id,
        801
    );
    assert_eq!(
        s.repo.checkpoint("losses:111").await.unwrap().unwrap().last_seen_id,
        802
    );
    // The tracked victim's loss view came along with the loss stream.
    assert_eq!(s.repo.find_losses(111).await.unwrap().len(), 1);
}

#[tokio::test]
async fn age_cutoff_bounds_the_walk() {
    let s = setup(&[111]);
    let recent = fixtures::killmail_aged(901, Some(111), 2);
    let stale = fixtures::killmail_aged(900, Some(111), 31 * 24);
    s.history.add_page(
        111,
        StreamKind::Kills,
        vec![fixtures::history_entry(&recent), fixtures::history_entry(&stale)],
    );
    s.fetcher.add(recent);
    s.fetcher.add(stale);

    let result = s.orchestrator.run_character(111).await;
    assert_eq!(result.processed, 1);
    assert!(s.repo.find_by_event_id(900).await.unwrap().is_none());
    assert_eq!(
        s.repo.checkpoint("kills:111").await.unwrap().unwrap().last_seen_id,
        901
    );
}

#[tokio::test]
async fn run_walks_characters_concurrently_and_independently() {
    let s = setup(&[111, 222]);
    for (character, id) in [(111u64, 1000u64), (222, 2000)] {
        let km = fixtures::killmail(id, Some(character), &[42]);
        s.history
            .add_page(character, StreamKind::Losses, vec![fixtures::history_entry(&km)]);
        s.fetcher.add(km);
    }

    let summary = s.orchestrator.run(&[111, 222]).await;
    assert_eq!(summary.characters, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.aborted, 0);
    assert_eq!(s.repo.loss_count(), 2);
}
