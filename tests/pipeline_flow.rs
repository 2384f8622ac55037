mod common;

use admetric::application::backup::DiskBackup;
use admetric::application::circuit_breaker::BreakerState;
use admetric::domain::click_event::{ClickEvent, NewClick};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_accepted_clicks_reach_storage() {
    let tmp = TempDir::new().unwrap();
    let test = common::start_pipeline(&["ad-1", "ad-2"], common::fast_settings(tmp.path()));
    let service = test.pipeline.click_service.clone();

    let mut ids = Vec::new();
    for n in 0..12 {
        let ad = if n % 3 == 0 { "ad-2" } else { "ad-1" };
        let ip = format!("10.0.0.{}", n);
        let event = service
            .record_click(NewClick::new(ad, ip, 5))
            .await
            .unwrap();
        ids.push(event.id);
    }

    let repo = test.repo.clone();
    assert!(common::eventually(Duration::from_secs(5), || repo.stored_clicks() == 12).await);
    assert!(ids.iter().all(|id| repo.has_click(*id)));

    let cache = test.pipeline.cache.clone();
    assert!(common::eventually(Duration::from_secs(5), || cache.total() == 12).await);
    assert_eq!(cache.peek("ad-1"), Some(8));
    assert_eq!(cache.peek("ad-2"), Some(4));
    assert!(
        common::eventually(Duration::from_secs(5), || {
            repo.stored_total("ad-1") == 8 && repo.stored_total("ad-2") == 4
        })
        .await
    );

    assert_eq!(test.log.backlog(), 0);
    assert_eq!(test.log.pending(), 0);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_storage_outage_requeues_until_recovery() {
    let tmp = TempDir::new().unwrap();
    let test = common::start_pipeline(&["ad-1"], common::fast_settings(tmp.path()));
    let service = test.pipeline.click_service.clone();

    // The ad is memoized before the outage starts.
    service
        .record_click(NewClick::new("ad-1", "10.0.0.1", 5))
        .await
        .unwrap();
    let repo = test.repo.clone();
    assert!(common::eventually(Duration::from_secs(5), || repo.stored_clicks() == 1).await);

    repo.set_down(true);
    for n in 2..5 {
        service
            .record_click(NewClick::new("ad-1", format!("10.0.0.{}", n), 5))
            .await
            .unwrap();
    }

    let breaker = test.pipeline.storage_breaker.clone();
    assert!(
        common::eventually(Duration::from_secs(5), || breaker.state() == BreakerState::Open)
            .await
    );
    assert_eq!(repo.stored_clicks(), 1);

    repo.set_down(false);

    assert!(common::eventually(Duration::from_secs(5), || repo.stored_clicks() == 4).await);
    assert!(
        common::eventually(Duration::from_secs(5), || breaker.state() == BreakerState::Closed)
            .await
    );
    assert!(common::eventually(Duration::from_secs(5), || repo.stored_total("ad-1") == 4).await);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_backup_is_replayed_at_startup() {
    let tmp = TempDir::new().unwrap();
    let backup = DiskBackup::new(tmp.path());
    let event = ClickEvent::accept(NewClick::new("ad-1", "10.0.0.1", 9));
    backup.save(&event).await.unwrap();

    let test = common::start_pipeline(&["ad-1"], common::fast_settings(tmp.path()));

    let repo = test.repo.clone();
    assert!(common::eventually(Duration::from_secs(5), || repo.has_click(event.id)).await);
    assert!(
        common::eventually(Duration::from_secs(5), || {
            std::fs::read_dir(tmp.path())
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .all(|entry| entry.path().is_dir())
                })
                .unwrap_or(true)
        })
        .await
    );
    assert!(common::eventually(Duration::from_secs(5), || repo.stored_total("ad-1") == 1).await);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_leaves_no_click_behind() {
    let tmp = TempDir::new().unwrap();
    let mut settings = common::fast_settings(tmp.path());
    settings.flush_interval = Duration::from_secs(60);
    settings.batch_size = 100;
    let test = common::start_pipeline(&["ad-1"], settings);
    let service = test.pipeline.click_service.clone();

    for n in 0..20 {
        service
            .record_click(NewClick::new("ad-1", format!("10.0.1.{}", n), 2))
            .await
            .unwrap();
    }

    let repo = test.repo.clone();
    let log = test.log.clone();
    test.pipeline.shutdown().await;

    // Anything not persisted is still waiting on the log.
    assert_eq!(repo.stored_clicks() + log.backlog(), 20);
    assert_eq!(log.pending(), 0);
}

#[tokio::test]
async fn test_clicks_after_shutdown_are_backed_up() {
    let tmp = TempDir::new().unwrap();
    let test = common::start_pipeline(&["ad-1"], common::fast_settings(tmp.path()));
    let service = test.pipeline.click_service.clone();
    let backup = test.pipeline.backup.clone();

    // Seed the ad directory while storage is still reachable.
    service
        .record_click(NewClick::new("ad-1", "10.0.0.1", 5))
        .await
        .unwrap();

    test.pipeline.shutdown().await;

    service
        .record_click(NewClick::new("ad-1", "10.0.0.2", 5))
        .await
        .unwrap();

    assert_eq!(backup.list().await.unwrap().len(), 1);
}
