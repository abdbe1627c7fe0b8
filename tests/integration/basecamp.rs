//! Online-only basecamp updates

use pretty_assertions::assert_eq;

use crate::common::*;
use tripsync::client::error::MutationErrorKind;
use tripsync::client::notify::NoticeLevel;
use tripsync::client::sync::network_monitor::NetworkStatus;
use tripsync::shared::basecamp::Basecamp;

#[tokio::test]
async fn test_forced_offline_blocks_basecamp_update() {
    let client = TestClient::new().await;
    client.state.network.force_offline(true);
    assert_eq!(client.state.network.status(), NetworkStatus::ForcedOffline);

    let err = client
        .state
        .basecamps
        .update_basecamp(&Basecamp::new(TRIP, "Cabin", "1 Lake Rd"), CREATOR)
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("OFFLINE:"));
    assert_eq!(err.kind(), MutationErrorKind::Offline);
    assert_eq!(err.operation_id(), None);
    assert_eq!(client.backend.call_count("set_basecamp").await, 0);
    assert_eq!(client.state.queue.stats().await.unwrap().total_operations, 0);
}

#[tokio::test]
async fn test_basecamp_update_online() {
    let client = TestClient::new().await;
    let saved = client
        .state
        .basecamps
        .update_basecamp(
            &Basecamp::new(TRIP, "Cabin", "1 Lake Rd").with_coordinates(46.5, 8.1),
            CREATOR,
        )
        .await
        .unwrap();

    assert_eq!(saved.updated_by.as_deref(), Some(CREATOR));
    assert_eq!(client.backend.call_count("set_basecamp").await, 1);
    assert_eq!(client.haptics.success_count(), 1);
    assert_eq!(client.notices.last().unwrap().level, NoticeLevel::Success);

    // Readable from the cache once connectivity is gone
    client.go_offline();
    assert_eq!(client.state.basecamps.fetch_basecamp(TRIP).await, Some(saved));
}

#[tokio::test]
async fn test_fetch_is_scoped_to_the_trip() {
    let client = TestClient::new().await;
    client
        .state
        .basecamps
        .update_basecamp(&Basecamp::new(TRIP, "Cabin", "1 Lake Rd"), CREATOR)
        .await
        .unwrap();

    let other_trip = "trip-2";
    assert_eq!(client.state.basecamps.fetch_basecamp(other_trip).await, None);
    assert!(client.state.basecamps.fetch_basecamp(TRIP).await.is_some());
}
