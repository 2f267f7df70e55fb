//! Router assembly.

use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{admin, objects, stream, ws};

const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the full application router.
///
/// The two streaming transports sit outside the timeout layer; everything
/// else answers within [`API_TIMEOUT`].
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/objects", post(objects::create).get(objects::list))
        .route(
            "/objects/{id}",
            get(objects::get_one)
                .patch(objects::update)
                .delete(objects::delete_one),
        )
        .route("/sessions", get(admin::list_sessions))
        .route("/sessions/{id}", delete(admin::disconnect_session))
        .route("/healthz", get(admin::healthz))
        .route("/metrics", get(admin::metrics))
        .layer(TimeoutLayer::new(API_TIMEOUT));

    Router::new()
        .route("/changes", get(stream::changes))
        .route("/ws", get(ws::upgrade))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use plank_relay::{ChangeFeed, FeedConfig, ReplayBuffer, SessionRegistry};
    use plank_store::ObjectStore;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let store = Arc::new(ObjectStore::in_memory().unwrap());
        let registry = Arc::new(SessionRegistry::new(16));
        let replay = Arc::new(ReplayBuffer::new(64, 0));
        let prometheus = PrometheusBuilder::new().build_recorder().handle();
        AppState {
            store,
            registry,
            replay,
            prometheus,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn object_crud_round_trip() {
        let state = test_state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/objects",
                json!({
                    "category": "task",
                    "updated_by": "alice",
                    "related": [{"id": 1, "relation_kind": "blocks", "category": "task"}],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["stage"], "draft");

        let response = app
            .clone()
            .oneshot(get_request(&format!("/objects/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/objects/{id}"),
                json!({ "stage": "doing", "updated_by": "bob" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["stage"], "doing");
        assert_eq!(updated["updated_by"], "bob");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/objects/{id}?actor=carol"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let deleted = body_json(response).await;
        assert_eq!(deleted["deleted"], json!([id]));

        let response = app
            .oneshot(get_request(&format!("/objects/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_filters_by_category() {
        let state = test_state();
        let app = router(state.clone());

        for category in ["task", "task", "project"] {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/objects",
                    json!({ "category": category, "updated_by": "alice" }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .oneshot(get_request("/objects?category=task"))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_empty_actor() {
        let app = router(test_state());
        let response = app
            .oneshot(json_request(
                "POST",
                "/objects",
                json!({ "category": "task", "updated_by": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_object_is_404_with_error_body() {
        let app = router(test_state());
        let response = app.oneshot(get_request("/objects/999")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("999"));
    }

    #[tokio::test]
    async fn sessions_listing_and_disconnect() {
        let state = test_state();
        let app = router(state.clone());

        let response = app.clone().oneshot(get_request("/sessions")).await.unwrap();
        assert_eq!(body_json(response).await, json!([]));

        let session = state
            .registry
            .register(plank_relay::Transport::Stream, Some("cli".into()))
            .unwrap();
        session.activate();

        let response = app.clone().oneshot(get_request("/sessions")).await.unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed[0]["client_id"], "cli");
        assert_eq!(listed[0]["state"], "active");
        assert_eq!(listed[0]["transport"], "stream");
        assert!(listed[0]["duration_ms"].is_u64());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/sessions/{}", session.id()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/sessions/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthz_reports_log_head() {
        let app = router(test_state());
        let response = app.oneshot(get_request("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["change_log_head"], 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_completes_with_an_open_stream() {
        let state = test_state();
        let registry = state.registry.clone();
        let app = router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let close_registry = registry.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                    // Streaming bodies only end once their queues close.
                    close_registry.shutdown();
                })
                .await
                .unwrap();
        });

        // Hold a live stream session open.
        use tokio::io::AsyncWriteExt;
        let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
        conn.write_all(b"GET /changes HTTP/1.1\r\nhost: localhost\r\n\r\n")
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(3), server)
            .await
            .expect("serve did not return after sessions closed")
            .unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn change_stream_delivers_ndjson_envelopes() {
        let store = Arc::new(ObjectStore::in_memory().unwrap());
        let registry = Arc::new(SessionRegistry::new(16));
        let feed = ChangeFeed::start(
            store.clone(),
            registry.clone(),
            FeedConfig {
                poll_interval: Duration::from_millis(5),
                ..FeedConfig::default()
            },
        )
        .unwrap();
        let state = AppState {
            store: store.clone(),
            registry: registry.clone(),
            replay: feed.replay(),
            prometheus: PrometheusBuilder::new().build_recorder().handle(),
        };
        let app = router(state);

        let response = app
            .oneshot(get_request("/changes?client_id=tester"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/x-ndjson"
        );
        let mut body = response.into_body().into_data_stream();

        let created = store
            .create(plank_store::NewObject {
                category: plank_core::object::Category::Task,
                stage: plank_core::object::Stage::Draft,
                related: vec![],
                dependencies: vec![],
                updated_by: "alice".into(),
            })
            .unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let line: Value = serde_json::from_slice(chunk.trim_ascii_end()).unwrap();
        assert_eq!(line["type"], "change");
        assert_eq!(line["record"]["object_id"], created.id);
        assert_eq!(line["record"]["event_type"], "created");

        drop(body);
        feed.shutdown().await;
    }
}
