//! Replaying the offline queue after reconnecting

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::common::*;
use tripsync::client::api::{ApiError, Backend, MemoryBackend};
use tripsync::client::notify::NoticeLevel;
use tripsync::client::offline::queue::OperationKind;
use tripsync::shared::config::SyncSettings;
use tripsync::shared::entity::EntityType;
use tripsync::shared::poll::{NewPoll, Poll};

#[tokio::test]
async fn test_replay_runs_in_queue_order() {
    let client = TestClient::new().await;
    client.go_offline();

    let request = NewPoll::new("Dinner?", vec!["Pizza".to_string(), "Sushi".to_string()]);
    assert_offline!(client.state.polls.create_poll(TRIP, CREATOR, &request).await);
    let poll = client.state.polls.polls(TRIP).await.remove(0);
    let option = poll.options[0].id.clone();
    assert_offline!(
        client
            .state
            .polls
            .vote(TRIP, &poll.id, "bob", std::slice::from_ref(&option))
            .await
    );
    assert_offline!(client.state.polls.close_poll(TRIP, &poll.id, CREATOR).await);

    let pending = client.state.queue.pending_operations().await.unwrap();
    let kinds: Vec<OperationKind> = pending.iter().map(|op| op.kind).collect();
    assert_eq!(
        kinds,
        vec![OperationKind::PollCreate, OperationKind::PollVote, OperationKind::PollClose]
    );

    client.go_online();
    let report = client.state.sync.replay_pending().await.unwrap();
    assert_eq!((report.replayed, report.failed, report.remaining), (3, 0, 0));

    let mutations: Vec<String> = client
        .backend
        .request_log()
        .await
        .into_iter()
        .filter(|call| call != "list_polls")
        .collect();
    // The close was computed against the created version and is resubmitted once
    assert_eq!(
        mutations,
        vec!["create_poll", "vote_on_poll", "close_poll", "close_poll"]
    );

    let server = client.backend.poll(&poll.id).await.unwrap();
    assert_eq!(server.total_votes, 1);
    assert!(server.is_closed());
    assert_eq!(client.state.polls.poll(TRIP, &poll.id).await, Some(server));
    assert_eq!(client.state.queue.stats().await.unwrap().total_operations, 0);
    assert_eq!(client.state.polls.pending_changes().await, 0);
}

#[tokio::test]
async fn test_replayed_vote_merges_with_concurrent_vote() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.go_offline();
    assert_offline!(
        client
            .state
            .polls
            .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
            .await
    );

    client
        .backend
        .vote_on_poll("poll-1", &ids(&["opt-2"]), "carol", 1)
        .await
        .unwrap();

    client.go_online();
    let report = client.state.sync.replay_pending().await.unwrap();
    assert_eq!(report.replayed, 1);

    let server = client.backend.poll("poll-1").await.unwrap();
    assert_eq!(server.total_votes, 2);
    assert_eq!(server.version, 3);
    assert_eq!(client.state.polls.poll(TRIP, "poll-1").await, Some(server));
}

#[tokio::test]
async fn test_network_error_stops_the_pass() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.go_offline();
    assert_offline!(
        client
            .state
            .polls
            .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
            .await
    );
    assert_offline!(client.state.polls.close_poll(TRIP, "poll-1", CREATOR).await);

    client.go_online();
    client
        .backend
        .inject_failure(ApiError::Network("connection reset".to_string()))
        .await;

    let report = client.state.sync.replay_pending().await.unwrap();
    assert_eq!((report.replayed, report.failed, report.remaining), (0, 0, 2));
    assert_eq!(client.backend.call_count("close_poll").await, 0);

    let first = client.state.queue.pending_operations().await.unwrap().remove(0);
    assert_eq!(first.retry_count, 1);
    assert_contains!(first.last_error.as_deref().unwrap(), "connection reset");

    // The optimistic vote survives the failed pass
    assert_eq!(
        client.state.polls.poll(TRIP, "poll-1").await.unwrap().total_votes,
        1
    );

    let report = client.state.sync.replay_pending().await.unwrap();
    assert_eq!((report.replayed, report.remaining), (2, 0));
    let server = client.backend.poll("poll-1").await.unwrap();
    assert!(server.is_closed());
    assert_eq!(server.total_votes, 1);
}

#[tokio::test]
async fn test_unappliable_operation_is_kept_as_failed() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.go_offline();
    assert_offline!(
        client
            .state
            .polls
            .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
            .await
    );

    // The creator closes the poll from another device meanwhile
    client.backend.close_poll("poll-1", CREATOR, 1).await.unwrap();

    client.go_online();
    let report = client.state.sync.replay_pending().await.unwrap();
    assert_eq!((report.replayed, report.failed, report.remaining), (0, 1, 0));

    let failed = client.state.queue.failed_operations().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, OperationKind::PollVote);
    assert_contains!(failed[0].last_error.as_deref().unwrap(), "closed");

    let poll = client.state.polls.poll(TRIP, "poll-1").await.unwrap();
    assert!(poll.is_closed());
    assert_eq!(poll.total_votes, 0);

    let notice = client.notices.last().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.title, "Failed to vote");

    let status = client.state.sync.status().await;
    assert_eq!((status.pending_operations, status.failed_operations), (0, 1));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let settings = SyncSettings {
        max_retry_attempts: 2,
        ..SyncSettings::default()
    };
    let client = TestClient::with_backend(Arc::new(MemoryBackend::new()), settings).await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.go_offline();
    assert_offline!(
        client
            .state
            .polls
            .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
            .await
    );
    client.go_online();

    for expected_failed in [0, 1] {
        client
            .backend
            .inject_failure(ApiError::Server {
                status: 503,
                message: "unavailable".to_string(),
            })
            .await;
        let report = client.state.sync.replay_pending().await.unwrap();
        assert_eq!(report.failed, expected_failed);
    }

    assert_eq!(client.state.queue.failed_operations().await.unwrap().len(), 1);
    assert_eq!(client.backend.poll("poll-1").await.unwrap().total_votes, 0);
    assert_eq!(
        client.state.polls.poll(TRIP, "poll-1").await.unwrap().total_votes,
        0
    );
}

#[tokio::test]
async fn test_delete_of_missing_poll_counts_as_replayed() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.go_offline();
    assert_offline!(client.state.polls.delete_poll(TRIP, "poll-1", CREATOR).await);

    client.backend.delete_poll("poll-1", CREATOR).await.unwrap();

    client.go_online();
    let report = client.state.sync.replay_pending().await.unwrap();
    assert_eq!((report.replayed, report.failed), (1, 0));
    assert!(client.state.polls.polls(TRIP).await.is_empty());
}

#[tokio::test]
async fn test_background_sync_replays_on_reconnect() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.state.sync.start().await;
    client.go_offline();
    assert_offline!(
        client
            .state
            .polls
            .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
            .await
    );

    client.go_online();
    let mut replayed = false;
    for _ in 0..200 {
        if client.backend.poll("poll-1").await.unwrap().total_votes == 1 {
            replayed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(replayed, "queued vote was not replayed after reconnecting");

    client.state.sync.stop().await;
    assert!(client.state.sync.status().await.online);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.db");
    let backend = Arc::new(MemoryBackend::new());

    {
        let client = TestClient::on_disk(&path, backend.clone()).await;
        client
            .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
            .await;
        client.go_offline();
        assert_offline!(
            client
                .state
                .polls
                .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
                .await
        );
        client.state.db.pool().close().await;
    }

    let client = TestClient::on_disk(&path, backend.clone()).await;
    client.go_offline();
    let cached = client.state.polls.fetch_polls(TRIP).await;
    assert_eq!(cached[0].total_votes, 1);
    assert_eq!(client.state.queue.stats().await.unwrap().pending, 1);

    client.go_online();
    let report = client.state.sync.replay_pending().await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(backend.poll("poll-1").await.unwrap().total_votes, 1);
}

#[tokio::test]
async fn test_queued_vote_survives_online_refetch_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.db");
    let backend = Arc::new(MemoryBackend::new());

    {
        let client = TestClient::on_disk(&path, backend.clone()).await;
        client
            .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
            .await;
        client.go_offline();
        assert_offline!(
            client
                .state
                .polls
                .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
                .await
        );
        client.state.db.pool().close().await;
    }

    // Another member votes while this device is restarting
    backend
        .vote_on_poll("poll-1", &ids(&["opt-2"]), "carol", 1)
        .await
        .unwrap();

    let client = TestClient::on_disk(&path, backend.clone()).await;
    let polls = client.state.polls.fetch_polls(TRIP).await;
    assert_eq!(polls[0].total_votes, 2);
    assert!(polls[0].has_voted("bob"));
    assert!(polls[0].has_voted("carol"));

    let cached: Vec<Poll> = client.state.cache.cached(TRIP, EntityType::Poll).await;
    assert_eq!(cached[0].total_votes, 2);
    assert_eq!(client.state.queue.stats().await.unwrap().pending, 1);
    assert!(!backend.poll("poll-1").await.unwrap().has_voted("bob"));

    // Still visible when the device drops offline before replay
    client.go_offline();
    assert!(client.state.polls.fetch_polls(TRIP).await[0].has_voted("bob"));

    client.go_online();
    let report = client.state.sync.replay_pending().await.unwrap();
    assert_eq!(report.replayed, 1);
    let server = backend.poll("poll-1").await.unwrap();
    assert_eq!(server.total_votes, 2);
    assert_eq!(client.state.polls.poll(TRIP, "poll-1").await, Some(server));
}
