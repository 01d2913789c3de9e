// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Firestore and OAuth token exchange against an in-process fake of the
//! Google REST endpoints
//!
//! The fake records every request so the tests can check what went over
//! the wire as well as how responses are mapped.

use anemia_eye_service::storage::{
    AccessTokenSource, DocumentStore, FirestoreConfig, FirestoreDocumentStore,
    ServiceAccountKey, ServiceAccountTokenProvider, StaticToken, StorageError,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const KEY_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/service_account.json");
const DOC_PREFIX: &str = "projects/anemia-test-project/databases/(default)/documents";

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    body: String,
}

struct FakeGoogle {
    requests: Mutex<Vec<Recorded>>,
    token_hits: AtomicUsize,
    token_status: StatusCode,
    token_lifetime: u64,
}

impl FakeGoogle {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

fn typed_doc(id: &str, user: &str) -> Value {
    json!({
        "name": format!("{}/predictions/{}", DOC_PREFIX, id),
        "fields": {
            "id": { "stringValue": user },
            "hasil": { "stringValue": "Normal" }
        }
    })
}

async fn fake_handler(
    State(fake): State<Arc<FakeGoogle>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().map(str::to_string);
    fake.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    if path == "/token" {
        fake.token_hits.fetch_add(1, Ordering::SeqCst);
        if fake.token_status != StatusCode::OK {
            return (fake.token_status, Json(json!({"error": "invalid_grant"}))).into_response();
        }
        let hit = fake.token_hits.load(Ordering::SeqCst);
        return Json(json!({
            "access_token": format!("ya29.fake-{}", hit),
            "expires_in": fake.token_lifetime,
            "token_type": "Bearer"
        }))
        .into_response();
    }

    if path.ends_with("/documents:runQuery") {
        return Json(json!([
            { "document": typed_doc("q1", "u1"), "readTime": "2025-10-20T00:00:00Z" },
            { "readTime": "2025-10-20T00:00:00Z", "skippedResults": 2 }
        ]))
        .into_response();
    }

    if path.ends_with("/documents/forbidden") {
        return (StatusCode::FORBIDDEN, "caller lacks permission").into_response();
    }
    if path.ends_with("/documents/missing") {
        return StatusCode::NOT_FOUND.into_response();
    }
    if path.ends_with("/documents/broken") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "backend exploded").into_response();
    }

    if path.ends_with("/documents/predictions") {
        if method == Method::POST {
            let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            return Json(json!({
                "name": format!("{}/predictions/created-1", DOC_PREFIX),
                "fields": request["fields"].clone(),
                "createTime": "2025-10-20T00:00:00Z"
            }))
            .into_response();
        }

        let second_page = query.as_deref().is_some_and(|q| q.contains("pageToken=page-2"));
        return if second_page {
            Json(json!({ "documents": [typed_doc("c", "u3")] })).into_response()
        } else {
            Json(json!({
                "documents": [typed_doc("a", "u1"), typed_doc("b", "u2")],
                "nextPageToken": "page-2"
            }))
            .into_response()
        };
    }

    StatusCode::NOT_FOUND.into_response()
}

async fn start_fake(token_status: StatusCode, token_lifetime: u64) -> (String, Arc<FakeGoogle>) {
    let fake = Arc::new(FakeGoogle {
        requests: Mutex::new(Vec::new()),
        token_hits: AtomicUsize::new(0),
        token_status,
        token_lifetime,
    });
    let app = Router::new()
        .fallback(fake_handler)
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), fake)
}

fn firestore(base: &str, tokens: Arc<dyn AccessTokenSource>) -> FirestoreDocumentStore {
    let mut config = FirestoreConfig::new("anemia-test-project");
    config.api_base = base.to_string();
    config.timeout_seconds = 5;
    FirestoreDocumentStore::new(config, tokens).unwrap()
}

fn provider(base: &str) -> ServiceAccountTokenProvider {
    let mut key = ServiceAccountKey::from_file(KEY_PATH).unwrap();
    key.token_uri = format!("{}/token", base);
    ServiceAccountTokenProvider::new(key, reqwest::Client::new())
}

#[cfg(test)]
mod firestore_http_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_follows_next_page_token() {
        let (base, fake) = start_fake(StatusCode::OK, 3600).await;
        let store = firestore(&base, Arc::new(StaticToken("fixed".into())));

        let docs = store.list("predictions").await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(docs[2].data, json!({"id": "u3", "hasil": "Normal"}));

        let requests = fake.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|r| r.authorization.as_deref() == Some("Bearer fixed")));
        assert_eq!(
            requests[0].path,
            "/v1/projects/anemia-test-project/databases/(default)/documents/predictions"
        );
        assert_eq!(requests[0].query.as_deref(), Some("pageSize=300"));
        assert_eq!(
            requests[1].query.as_deref(),
            Some("pageSize=300&pageToken=page-2")
        );
    }

    #[tokio::test]
    async fn test_insert_sends_typed_fields() {
        let (base, fake) = start_fake(StatusCode::OK, 3600).await;
        let store = firestore(&base, Arc::new(StaticToken("fixed".into())));

        let created = store
            .insert("predictions", json!({"id": "u9", "akurasi": "91.00%"}))
            .await
            .unwrap();
        assert_eq!(created.id, "created-1");
        assert_eq!(created.data["id"], "u9");

        let requests = fake.requests();
        assert_eq!(requests[0].method, Method::POST);
        let sent: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(sent["fields"]["id"], json!({"stringValue": "u9"}));
        assert_eq!(sent["fields"]["akurasi"], json!({"stringValue": "91.00%"}));
    }

    #[tokio::test]
    async fn test_run_query_skips_read_time_only_items() {
        let (base, fake) = start_fake(StatusCode::OK, 3600).await;
        let store = firestore(&base, Arc::new(StaticToken("fixed".into())));

        let docs = store
            .find_by_field("predictions", "id", &json!("u1"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "q1");

        let requests = fake.requests();
        assert_eq!(
            requests[0].path,
            "/v1/projects/anemia-test-project/databases/(default)/documents:runQuery"
        );
        let sent: Value = serde_json::from_str(&requests[0].body).unwrap();
        let filter = &sent["structuredQuery"]["where"]["fieldFilter"];
        assert_eq!(filter["field"]["fieldPath"], "id");
        assert_eq!(filter["value"], json!({"stringValue": "u1"}));
        assert_eq!(
            sent["structuredQuery"]["from"][0]["collectionId"],
            "predictions"
        );
    }

    #[tokio::test]
    async fn test_http_errors_are_mapped() {
        let (base, _fake) = start_fake(StatusCode::OK, 3600).await;
        let store = firestore(&base, Arc::new(StaticToken("fixed".into())));

        assert!(matches!(
            store.list("forbidden").await,
            Err(StorageError::AuthError(_))
        ));
        assert!(matches!(
            store.list("missing").await,
            Err(StorageError::NotFound(_))
        ));
        match store.list("broken").await {
            Err(StorageError::ServerError(detail)) => {
                assert!(detail.contains("backend exploded"))
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Nothing listens on the discard port
        let store = firestore("http://127.0.0.1:9", Arc::new(StaticToken("fixed".into())));
        assert!(matches!(
            store.list("predictions").await,
            Err(StorageError::NetworkError(_))
        ));
    }
}

#[cfg(test)]
mod token_exchange_tests {
    use super::*;

    #[tokio::test]
    async fn test_token_is_exchanged_once_and_cached() {
        let (base, fake) = start_fake(StatusCode::OK, 3600).await;
        let tokens = provider(&base);

        for _ in 0..3 {
            assert_eq!(tokens.access_token().await.unwrap(), "ya29.fake-1");
        }
        assert_eq!(fake.token_hits.load(Ordering::SeqCst), 1);

        let exchange = &fake.requests()[0];
        assert_eq!(exchange.method, Method::POST);
        assert!(exchange
            .body
            .contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"));
        assert!(exchange.body.contains("assertion="));
    }

    #[tokio::test]
    async fn test_short_lived_token_is_refreshed() {
        // Inside the refresh margin from the start, so every call exchanges again
        let (base, fake) = start_fake(StatusCode::OK, 30).await;
        let tokens = provider(&base);

        assert_eq!(tokens.access_token().await.unwrap(), "ya29.fake-1");
        assert_eq!(tokens.access_token().await.unwrap(), "ya29.fake-2");
        assert_eq!(fake.token_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_grant_is_auth_error() {
        let (base, _fake) = start_fake(StatusCode::BAD_REQUEST, 3600).await;
        match provider(&base).access_token().await {
            Err(StorageError::AuthError(detail)) => assert!(detail.contains("invalid_grant")),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_token_server_failure_stays_server_error() {
        let (base, _fake) = start_fake(StatusCode::SERVICE_UNAVAILABLE, 3600).await;
        assert!(matches!(
            provider(&base).access_token().await,
            Err(StorageError::ServerError(_))
        ));
    }

    #[tokio::test]
    async fn test_firestore_uses_exchanged_token() {
        let (base, fake) = start_fake(StatusCode::OK, 3600).await;
        let store = firestore(&base, Arc::new(provider(&base)));

        store.list("predictions").await.unwrap();
        store.list("predictions").await.unwrap();

        let auth: Vec<Option<String>> = fake
            .requests()
            .into_iter()
            .filter(|r| r.path != "/token")
            .map(|r| r.authorization)
            .collect();
        assert_eq!(auth.len(), 4);
        assert!(auth
            .iter()
            .all(|a| a.as_deref() == Some("Bearer ya29.fake-1")));
        assert_eq!(fake.token_hits.load(Ordering::SeqCst), 1);
    }
}
