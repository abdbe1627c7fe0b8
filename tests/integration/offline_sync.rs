//! Optimistic poll mutations against the in-memory backend

use pretty_assertions::assert_eq;

use crate::common::*;
use tripsync::client::api::{ApiError, Backend};
use tripsync::client::error::{MutationError, MutationErrorKind};
use tripsync::client::notify::NoticeLevel;
use tripsync::shared::entity::EntityKey;
use tripsync::shared::poll::Poll;

async fn cached_poll(client: &TestClient, poll_id: &str) -> Option<Poll> {
    client
        .state
        .cache
        .get_cached_entity(&EntityKey::poll(TRIP, poll_id))
        .await
        .and_then(|entity| entity.decode::<Poll>().ok())
}

#[tokio::test]
async fn test_offline_vote_is_kept_and_reported() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.go_offline();

    let err = assert_offline!(
        client
            .state
            .polls
            .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
            .await
    );
    assert!(err.to_string().starts_with("OFFLINE:"));
    assert!(err.operation_id().is_some());

    let poll = client.state.polls.poll(TRIP, "poll-1").await.unwrap();
    assert_eq!(poll.total_votes, 1);
    assert_eq!(poll.option("opt-1").unwrap().votes, 1);

    // A refetch while offline must not drop the vote
    let refetched = client.state.polls.fetch_polls(TRIP).await;
    assert_eq!(refetched[0].total_votes, 1);
    assert_eq!(cached_poll(&client, "poll-1").await.unwrap().total_votes, 1);

    assert_eq!(client.backend.call_count("vote_on_poll").await, 0);
    assert_eq!(client.state.queue.stats().await.unwrap().pending, 1);
    assert_eq!(client.notices.last().unwrap().title, "Saved offline");
    assert_eq!(client.haptics.light_count(), 1);
}

#[tokio::test]
async fn test_single_choice_poll_rejects_two_options() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;

    let err = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1", "opt-2"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), MutationErrorKind::Validation);
    assert_contains!(err.to_string(), "only allows one option");
    assert_eq!(client.backend.call_count("vote_on_poll").await, 0);
    assert_eq!(
        client.state.polls.poll(TRIP, "poll-1").await.unwrap().total_votes,
        0
    );
}

#[tokio::test]
async fn test_single_choice_guard_applies_offline_too() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.go_offline();

    let err = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1", "opt-2"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), MutationErrorKind::Validation);
    assert_eq!(client.state.queue.stats().await.unwrap().total_operations, 0);
}

#[tokio::test]
async fn test_online_vote_is_confirmed() {
    let client = TestClient::new().await;
    let before = client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;

    let poll = assert_ok!(
        client
            .state
            .polls
            .vote(TRIP, "poll-1", "bob", &ids(&["opt-2"]))
            .await
    );

    assert_eq!(poll.version, before.version + 1);
    assert_eq!(poll.option("opt-2").unwrap().voters, vec!["bob".to_string()]);
    assert_eq!(client.state.polls.poll(TRIP, "poll-1").await, Some(poll.clone()));
    assert_eq!(cached_poll(&client, "poll-1").await, Some(poll));
    assert_eq!(client.haptics.success_count(), 1);
    assert_eq!(client.state.polls.pending_changes().await, 0);
}

#[tokio::test]
async fn test_multi_option_vote_is_one_call() {
    let client = TestClient::new().await;
    let before = client
        .load_poll(poll_with_options("poll-1", &["Lake", "Coast", "Hills"], true))
        .await;

    let poll = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1", "opt-3"]))
        .await
        .unwrap();

    assert_eq!(client.backend.call_count("vote_on_poll").await, 1);
    assert_eq!(poll.version, before.version + 1);
    assert_eq!(poll.total_votes, 2);
    assert!(poll.is_consistent());
}

#[tokio::test]
async fn test_hard_failure_rolls_back() {
    let client = TestClient::new().await;
    let before = client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.backend.inject_failure(ApiError::Unauthorized).await;

    let err = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), MutationErrorKind::Failed);
    assert_eq!(client.state.polls.poll(TRIP, "poll-1").await, Some(before.clone()));
    assert_eq!(cached_poll(&client, "poll-1").await, Some(before));

    let notice = client.notices.last().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.title, "Failed to vote");
}

#[tokio::test]
async fn test_concurrent_voter_causes_conflict_and_refresh() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;

    // Another member votes after this client loaded the poll
    client
        .backend
        .vote_on_poll("poll-1", &ids(&["opt-2"]), "carol", 1)
        .await
        .unwrap();

    let err = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
        .await
        .unwrap_err();

    assert!(matches!(err, MutationError::Conflict { expected: 1, .. }));
    assert_contains!(err.to_string(), "updated elsewhere");

    let poll = client.state.polls.poll(TRIP, "poll-1").await.unwrap();
    assert_eq!(poll, client.backend.poll("poll-1").await.unwrap());
    assert_eq!(poll.option("opt-1").unwrap().votes, 0);
    assert_eq!(poll.option("opt-2").unwrap().votes, 1);
    assert_eq!(client.notices.last().unwrap().title, "Poll updated");
}

#[tokio::test]
async fn test_versions_increase_and_stale_writes_conflict() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;

    let first = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
        .await
        .unwrap();
    let second = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-2"]))
        .await
        .unwrap();
    assert!(second.version > first.version);
    assert_eq!(second.total_votes, 1);

    let stale = client
        .backend
        .vote_on_poll("poll-1", &ids(&["opt-1"]), "carol", first.version)
        .await
        .unwrap_err();
    assert!(stale.is_conflict());
    assert_eq!(client.backend.poll("poll-1").await.unwrap(), second);
}

#[tokio::test]
async fn test_only_creator_can_close() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;

    let err = client
        .state
        .polls
        .close_poll(TRIP, "poll-1", "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), MutationErrorKind::Validation);

    let closed = client
        .state
        .polls
        .close_poll(TRIP, "poll-1", CREATOR)
        .await
        .unwrap();
    assert!(closed.is_closed());

    let err = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
        .await
        .unwrap_err();
    assert_contains!(err.to_string(), "closed");
}

#[tokio::test]
async fn test_offline_delete_hides_poll() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client.go_offline();

    assert_offline!(client.state.polls.delete_poll(TRIP, "poll-1", CREATOR).await);

    assert!(client.state.polls.poll(TRIP, "poll-1").await.is_none());
    assert!(cached_poll(&client, "poll-1").await.is_none());
    assert!(client.backend.poll("poll-1").await.is_some());
}

#[tokio::test]
async fn test_remove_vote_online() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
        .await
        .unwrap();

    let poll = client
        .state
        .polls
        .remove_vote(TRIP, "poll-1", "bob")
        .await
        .unwrap();
    assert_eq!(poll.total_votes, 0);
    assert!(!poll.has_voted("bob"));
}

#[tokio::test]
async fn test_conflict_restores_snapshot_when_refetch_fails() {
    let client = TestClient::new().await;
    let before = client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;

    client
        .backend
        .vote_on_poll("poll-1", &ids(&["opt-2"]), "carol", 1)
        .await
        .unwrap();
    client.backend.fail_reads(true).await;

    let err = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), MutationErrorKind::Conflict);

    // The refused guess must not survive in the store or the cache
    let poll = client.state.polls.poll(TRIP, "poll-1").await.unwrap();
    assert!(!poll.has_voted("bob"));
    assert_eq!(poll, before);
    assert_eq!(cached_poll(&client, "poll-1").await, Some(before.clone()));
    assert_eq!(client.state.polls.pending_changes().await, 0);

    client.go_offline();
    let cached = client.state.polls.fetch_polls(TRIP).await;
    assert_eq!(cached, vec![before]);
}

#[tokio::test]
async fn test_repeating_current_selection_is_rejected_offline() {
    let client = TestClient::new().await;
    client
        .load_poll(poll_with_options("poll-1", &["Pizza", "Sushi"], false))
        .await;
    client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
        .await
        .unwrap();
    client.go_offline();

    let err = client
        .state
        .polls
        .vote(TRIP, "poll-1", "bob", &ids(&["opt-1"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), MutationErrorKind::Validation);
    assert_contains!(err.to_string(), "already voted for this selection");
    assert_eq!(client.state.queue.stats().await.unwrap().total_operations, 0);
    assert_eq!(
        client.state.polls.poll(TRIP, "poll-1").await.unwrap().total_votes,
        1
    );
}
