use message_sync::messaging::{HttpMessagesApi, MessagesApi};
use message_sync::{SessionToken, SyncConfig, SyncError};
use std::time::Duration;

fn api_for(server: &mockito::Server) -> HttpMessagesApi {
    HttpMessagesApi::new(&SyncConfig::new(&server.url())).unwrap()
}

#[tokio::test]
async fn test_unread_counts_sends_bearer_and_parses_map() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/messages/unread-count")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"u1":3,"u2":0}"#)
        .create_async()
        .await;

    let counts = api_for(&server)
        .unread_counts(&SessionToken::new("tok-1"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(counts.len(), 2);
    assert_eq!(counts["u1"], 3);
    assert_eq!(counts["u2"], 0);
}

#[tokio::test]
async fn test_unread_counts_maps_error_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/messages/unread-count")
        .with_status(401)
        .with_body("unauthorized")
        .create_async()
        .await;

    let err = api_for(&server)
        .unread_counts(&SessionToken::new("expired"))
        .await
        .unwrap_err();

    match err.downcast_ref::<SyncError>() {
        Some(SyncError::Http { status, body }) => {
            assert_eq!(*status, 401);
            assert_eq!(body, "unauthorized");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unread_counts_rejects_malformed_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/messages/unread-count")
        .with_status(200)
        .with_body(r#"["not","a","map"]"#)
        .create_async()
        .await;

    assert!(api_for(&server)
        .unread_counts(&SessionToken::new("tok"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_mark_read_patches_peer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", "/api/messages/read/u42")
        .match_header("authorization", "Bearer tok-2")
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .create_async()
        .await;

    api_for(&server)
        .mark_read(&SessionToken::new("tok-2"), "u42")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_mark_read_encodes_peer_segment() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", "/api/messages/read/a%2Fb%3Fc%23d")
        .with_status(200)
        .create_async()
        .await;

    api_for(&server)
        .mark_read(&SessionToken::new("tok"), "a/b?c#d")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_mark_read_failure_surfaces() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("PATCH", "/api/messages/read/u42")
        .with_status(500)
        .create_async()
        .await;

    let err = api_for(&server)
        .mark_read(&SessionToken::new("tok"), "u42")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::Http { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_backend_is_an_error() {
    let config = SyncConfig::new("http://127.0.0.1:9").with_request_timeout(Duration::from_millis(500));
    let api = HttpMessagesApi::new(&config).unwrap();
    assert!(api.unread_counts(&SessionToken::new("tok")).await.is_err());
}
