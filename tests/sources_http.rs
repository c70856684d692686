// tests/sources_http.rs
//
// Gmail and LinkedIn sources against a local axum stand-in for the REST APIs.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Value as Json};
use shuttle_axum::axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json as AxumJson, Router,
};
use vault_watch::sources::gmail::GmailSource;
use vault_watch::sources::linkedin::LinkedInSource;
use vault_watch::vault::memory::MemorySink;
use vault_watch::watch::config::{GmailConfig, LinkedInConfig};
use vault_watch::{ItemSource, Watcher};

const TOKEN: &str = "test-token";

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        shuttle_axum::axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

type Reply = Result<AxumJson<Json>, StatusCode>;

async fn gmail_list(
    Path(user): Path<String>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Reply {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    assert_eq!(user, "me");
    assert_eq!(q.get("labelIds").map(String::as_str), Some("INBOX"));
    assert_eq!(q.get("maxResults").map(String::as_str), Some("5"));
    Ok(AxumJson(json!({
        "messages": [{"id": "m1"}, {"id": "gone"}, {"id": "m2"}],
        "resultSizeEstimate": 3
    })))
}

async fn gmail_get(
    Path((_user, id)): Path<(String, String)>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Reply {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    assert_eq!(q.get("format").map(String::as_str), Some("full"));
    if id == "gone" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(AxumJson(json!({
        "id": id,
        "threadId": format!("t-{id}"),
        "snippet": "snippet",
        "internalDate": "1700000000000",
        "payload": {
            "mimeType": "text/plain",
            "headers": [
                {"name": "Subject", "value": format!("Subject {id}")},
                {"name": "From", "value": "Ana <ana@example.test>"}
            ],
            "body": {"data": URL_SAFE_NO_PAD.encode(format!("body of {id}"))}
        }
    })))
}

fn gmail_stub() -> Router {
    Router::new()
        .route("/users/{user}/messages", get(gmail_list))
        .route("/users/{user}/messages/{id}", get(gmail_get))
}

fn gmail_config(token: &str) -> GmailConfig {
    GmailConfig {
        access_token: token.to_string(),
        user_id: "me".to_string(),
        label: "INBOX".to_string(),
        max_results: 5,
    }
}

#[tokio::test]
async fn gmail_fetches_listed_messages_and_skips_missing_ones() {
    let base = serve(gmail_stub()).await;
    let src = GmailSource::new(&gmail_config(TOKEN))
        .unwrap()
        .with_api_base(format!("{base}/"));

    let items = src.fetch_candidates().await.expect("partial batch is still ok");
    let ids: Vec<&str> = items.iter().map(|it| it.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert_eq!(items[0].title, "Subject m1");
    assert_eq!(items[0].body, "body of m1");
    assert_eq!(items[1].meta.get("thread_id").map(String::as_str), Some("t-m2"));

    // Through a watcher: both land, the missing one is simply not seen.
    let sink = Arc::new(MemorySink::new());
    let w = Watcher::builder("gmail")
        .source(src)
        .sink(sink.clone())
        .build()
        .unwrap();
    let r = w.poll_once().await;
    assert!(r.source_error.is_none());
    assert_eq!(r.persisted, vec!["m1".to_string(), "m2".to_string()]);
    assert!(!w.has_seen("gone").await);
}

#[tokio::test]
async fn gmail_list_failure_is_a_source_error() {
    let base = serve(gmail_stub()).await;
    let src = GmailSource::new(&gmail_config("wrong"))
        .unwrap()
        .with_api_base(base);

    let err = src.fetch_candidates().await.unwrap_err();
    assert!(format!("{err:#}").contains("messages.list"), "{err:#}");
}

async fn linkedin_notifications(
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Reply {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    assert_eq!(q.get("count").map(String::as_str), Some("2"));
    Ok(AxumJson(json!({
        "elements": [
            {
                "entityUrn": "urn:li:notification:9",
                "type": "MENTION",
                "createdAt": 1_700_000_000_000i64,
                "title": {"text": "You were mentioned"},
                "message": {"text": "<b>Great</b> post!"},
                "actor": {"name": {"firstName": "Eva", "lastName": "Dvorak"}}
            },
            {"type": "NO_ID"}
        ]
    })))
}

#[tokio::test]
async fn linkedin_fetches_notifications_from_configured_base() {
    let base = serve(Router::new().route("/v2/notifications", get(linkedin_notifications))).await;
    let src = LinkedInSource::new(&LinkedInConfig {
        access_token: TOKEN.to_string(),
        api_base: format!("{base}/"),
        count: 2,
    })
    .unwrap();

    let items = src.fetch_candidates().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "urn:li:notification:9");
    assert_eq!(items[0].title, "You were mentioned");
    assert_eq!(items[0].body, "Great post!");
    assert_eq!(items[0].sender.as_deref(), Some("Eva Dvorak"));

    let unauthorized = LinkedInSource::new(&LinkedInConfig {
        access_token: "nope".to_string(),
        api_base: base,
        count: 2,
    })
    .unwrap();
    assert!(unauthorized.fetch_candidates().await.is_err());
}
