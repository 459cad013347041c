mod common;

use std::sync::atomic::Ordering;

use dooms_clock::error::ClockError;
use dooms_clock::interfaces::channel::ChannelMessage;

use common::{clock_post, service_with, text_post};

#[tokio::test]
async fn fetch_stores_new_posts_once() {
    let (_db, channel, service) = service_with(vec![
        clock_post(1, 100, "23:50:00"),
        clock_post(2, 200, "23:51:00"),
        text_post(3, 300, "Просто анонс без времени"),
    ])
    .await;

    let report = service.fetch_latest().await.unwrap();
    assert_eq!(report.updates_count, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.activated, Some(2));
    assert_eq!(report.attempts.len(), 3);
    assert_eq!(
        report
            .attempts
            .iter()
            .find(|a| a.message_id == 3)
            .and_then(|a| a.error.as_deref()),
        Some("no time pattern found")
    );

    let again = service.fetch_latest().await.unwrap();
    assert_eq!(again.updates_count, 0);
    assert_eq!(again.skipped, 3);
    assert_eq!(again.activated, None);
    assert_eq!(service.total_count().await.unwrap(), 2);
    assert_eq!(channel.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn newest_post_becomes_the_only_active_one() {
    let (_db, channel, service) = service_with(vec![clock_post(1, 100, "23:50:00")]).await;
    service.fetch_latest().await.unwrap();
    assert_eq!(service.latest().await.unwrap().unwrap().message_id, 1);

    channel.push(clock_post(2, 200, "23:51:00")).await;
    service.fetch_latest().await.unwrap();

    let latest = service.latest().await.unwrap().unwrap();
    assert_eq!(latest.message_id, 2);
    assert_eq!(latest.time_value, "23:51:00");
    assert_eq!(service.store().active_count().await.unwrap(), 1);
}

#[tokio::test]
async fn posts_without_text_are_skipped() {
    let (_db, _channel, service) = service_with(vec![ChannelMessage {
        id: 7,
        posted_at: 100,
        text: None,
        image: Some(vec![1, 2, 3]),
    }])
    .await;

    let report = service.fetch_latest().await.unwrap();
    assert_eq!(report.updates_count, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        report.attempts[0].error.as_deref(),
        Some("message has no text")
    );
    assert!(service.latest().await.unwrap().is_none());
}

#[tokio::test]
async fn images_are_stored_as_base64() {
    let mut post = clock_post(4, 100, "23:50:00");
    post.image = Some(b"png".to_vec());
    let (_db, _channel, service) = service_with(vec![post]).await;

    service.fetch_latest().await.unwrap();
    let latest = service.latest().await.unwrap().unwrap();
    assert_eq!(latest.image_data.as_deref(), Some("cG5n"));
}

#[tokio::test]
async fn upstream_failure_leaves_state_untouched() {
    let (_db, channel, service) = service_with(vec![clock_post(1, 100, "23:50:00")]).await;
    service.fetch_latest().await.unwrap();

    channel.set_failing(true);
    let err = service.fetch_latest().await.unwrap_err();
    assert!(matches!(err, ClockError::Upstream(_)));
    assert_eq!(service.total_count().await.unwrap(), 1);
    assert_eq!(service.latest().await.unwrap().unwrap().message_id, 1);
}

#[tokio::test]
async fn fetch_period_validates_days() {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let (_db, _channel, service) = service_with(vec![
        clock_post(1, now - 10 * 86_400, "23:40:00"),
        clock_post(2, now - 3_600, "23:50:00"),
    ])
    .await;

    for days in [0, -1, 366] {
        let err = service.fetch_period(days).await.unwrap_err();
        assert!(matches!(err, ClockError::InvalidRequest(_)), "days={days}");
    }

    let report = service.fetch_period(1).await.unwrap();
    assert_eq!(report.updates_count, 1);
    assert_eq!(report.activated, Some(2));

    let report = service.fetch_period(30).await.unwrap();
    assert_eq!(report.updates_count, 1);
    // Message 1 is older than the active row, so the flag stays put.
    assert_eq!(report.activated, None);
    assert_eq!(service.latest().await.unwrap().unwrap().message_id, 2);
}

#[tokio::test]
async fn reload_rewrites_without_demoting_newer_posts() {
    let (_db, channel, service) = service_with(vec![
        clock_post(1, 100, "23:50:00"),
        clock_post(2, 200, "23:51:00"),
    ])
    .await;
    service.fetch_latest().await.unwrap();

    channel
        .set_messages(vec![
            clock_post(1, 100, "23:45:00"),
            clock_post(2, 200, "23:51:00"),
        ])
        .await;
    let report = service.reload(1).await.unwrap();
    assert_eq!(report.message_id, 1);
    assert_eq!(report.updates_count, 1);
    assert!(!report.activated);

    let stored = service.store().get(1).await.unwrap().unwrap();
    assert_eq!(stored.time_value, "23:45:00");
    assert_eq!(service.latest().await.unwrap().unwrap().message_id, 2);
}

#[tokio::test]
async fn reload_activates_when_nothing_is_active() {
    let (_db, _channel, service) = service_with(vec![clock_post(9, 900, "23:59:00")]).await;

    let report = service.reload(9).await.unwrap();
    assert!(report.activated);
    assert_eq!(service.latest().await.unwrap().unwrap().message_id, 9);
}

#[tokio::test]
async fn reload_error_cases() {
    let (_db, channel, service) =
        service_with(vec![text_post(3, 300, "Нет времени в этом посте")]).await;

    assert!(matches!(
        service.reload(0).await.unwrap_err(),
        ClockError::InvalidRequest(_)
    ));
    assert!(matches!(
        service.reload(42).await.unwrap_err(),
        ClockError::NotFound(_)
    ));
    assert!(matches!(
        service.reload(3).await.unwrap_err(),
        ClockError::Unprocessable(_)
    ));

    channel.set_failing(true);
    assert!(matches!(
        service.reload(3).await.unwrap_err(),
        ClockError::Upstream(_)
    ));
    assert_eq!(service.total_count().await.unwrap(), 0);
}

#[tokio::test]
async fn history_limits_and_reset() {
    let (_db, _channel, service) = service_with(vec![
        clock_post(1, 100, "23:50:00"),
        clock_post(2, 200, "23:51:00"),
        clock_post(3, 300, "23:52:00"),
    ])
    .await;
    service.fetch_latest().await.unwrap();

    let history = service.history(2).await.unwrap();
    assert_eq!(
        history.iter().map(|u| u.message_id).collect::<Vec<_>>(),
        vec![3, 2]
    );
    for limit in [0, 101] {
        assert!(matches!(
            service.history(limit).await.unwrap_err(),
            ClockError::InvalidRequest(_)
        ));
    }

    assert_eq!(service.reset().await.unwrap(), 3);
    assert!(service.history(10).await.unwrap().is_empty());
    assert!(service.latest().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_fetches_and_reloads_do_not_fail() {
    let (_db, _channel, service) = service_with(
        (1..=5)
            .map(|id| clock_post(id, id * 100, &format!("23:5{id}:00")))
            .collect(),
    )
    .await;

    let mut tasks = Vec::new();
    for round in 0..8_i64 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            if round % 2 == 0 {
                service.fetch_latest().await.map(|_| ())
            } else {
                service.reload(round % 5 + 1).await.map(|_| ())
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(service.store().active_count().await.unwrap(), 1);
    assert_eq!(service.latest().await.unwrap().unwrap().message_id, 5);
    assert_eq!(service.total_count().await.unwrap(), 5);
}
