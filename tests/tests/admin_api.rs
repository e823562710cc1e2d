//! Admin surface over the assembled pipeline.

use std::sync::Arc;

use axum_test::TestServer;

use api::{router, AppState};
use feed_core::{Completeness, IngestOrigin, Loss, TrackedRoster};
use integration_tests::{fixtures, mocks::MockRecordFetcher};
use storage::{KillmailRepository, MemoryRepository};
use telemetry::health;
use worker::{EnrichmentJob, EnrichmentReport, IngestionCoordinator};

struct Stack {
    repo: Arc<MemoryRepository>,
    fetcher: Arc<MockRecordFetcher>,
    coordinator: Arc<IngestionCoordinator>,
    server: TestServer,
}

fn stack(tracked: &[u64]) -> Stack {
    let repo = Arc::new(MemoryRepository::new());
    let fetcher = Arc::new(MockRecordFetcher::new());
    let roster = Arc::new(TrackedRoster::with_characters(tracked.iter().copied()));
    let coordinator = Arc::new(IngestionCoordinator::new(
        repo.clone(),
        fetcher.clone(),
        roster.clone(),
    ));
    let enrichment = Arc::new(EnrichmentJob::new(repo.clone(), coordinator.clone(), 50));
    let state = AppState::new(repo.clone(), roster, enrichment, vec![]);
    let server = TestServer::new(router(state)).expect("Failed to create test server");
    Stack {
        repo,
        fetcher,
        coordinator,
        server,
    }
}

#[tokio::test]
async fn manual_enrichment_completes_a_degraded_event() {
    let s = stack(&[111]);
    let km = fixtures::killmail(1, Some(111), &[222]);
    s.fetcher.add(km.clone());

    // Ingest during a detail outage, then recover.
    s.fetcher.set_detail_down(true);
    s.coordinator
        .ingest_reference(1, None, IngestOrigin::Realtime)
        .await
        .unwrap();
    s.fetcher.set_detail_down(false);

    let response = s.server.post("/admin/enrichment/run").await;
    response.assert_status_ok();
    let report: EnrichmentReport = response.json();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.enriched, 1);

    let stored = s.repo.find_by_event_id(1).await.unwrap().unwrap();
    assert_eq!(stored.completeness, Completeness::Full);
}

#[tokio::test]
async fn losses_route_reflects_ingested_events() {
    let s = stack(&[111]);
    s.coordinator
        .ingest(fixtures::killmail(2, Some(111), &[222]), IngestOrigin::Realtime)
        .await
        .unwrap();
    s.coordinator
        .ingest(fixtures::killmail(3, Some(111), &[333]), IngestOrigin::Realtime)
        .await
        .unwrap();

    let response = s.server.get("/characters/111/losses").await;
    response.assert_status_ok();
    let losses: Vec<Loss> = response.json();
    assert_eq!(losses.len(), 2);
    // Newest first.
    assert!(losses[0].kill_time >= losses[1].kill_time);

    s.server
        .get("/characters/404/losses")
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn health_degrades_when_a_feed_is_down_but_stays_ready() {
    let s = stack(&[111]);
    health().storage.set_healthy();
    health().index_service.set_healthy();
    health().detail_service.set_healthy();
    health().queue_feed.set_healthy();
    health().push_feed.set_unhealthy("socket closed");

    let response = s.server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "degraded");

    s.server.get("/health/ready").await.assert_status_ok();
    s.server.get("/health/live").await.assert_status_ok();
}
