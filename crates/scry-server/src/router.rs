//! HTTP router configuration.

use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_token;
use crate::handler::{health_check, not_found, readiness_check};
use crate::state::AppState;
use crate::{events, rpc, viewer};

/// Build the application router.
///
/// Routes:
/// - `GET /view/:share_id` - Composed SVG view
/// - `GET /view/:share_id/svg` - Raw artifact
/// - `GET /view/:share_id/png` - PNG with embedded description
/// - `GET /view/:share_id/events` - Server-sent board change events
/// - `POST /rpc/execute` - Run a script against a board (bearer-guarded)
/// - `POST /rpc/list` - List boards (bearer-guarded)
/// - `POST /rpc/history` - Archived artifacts of a board (bearer-guarded)
/// - `GET /health` - Health check
/// - `GET /ready` - Readiness check
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let view_routes = Router::new()
        .route("/view/:share_id", get(viewer::view_board))
        .route("/view/:share_id/svg", get(viewer::view_svg))
        .route("/view/:share_id/png", get(viewer::view_png))
        .route("/view/:share_id/events", get(events::board_events));

    let rpc_routes = Router::new()
        .route("/rpc/execute", post(rpc::execute))
        .route("/rpc/list", post(rpc::list))
        .route("/rpc/history", post(rpc::history))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check));

    Router::new()
        .merge(view_routes)
        .merge(rpc_routes)
        .merge(health_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::util::ServiceExt;

    use super::*;
    use scry_board::{
        BoardRecord, BoardStore, BoardSummary, BoardUpdate, ExecutionSession, HistoryEntry,
        MemoryBoardStore, NewBoard, ShareId,
    };
    use scry_common::{LimitsConfig, RuntimeError, StoreError};
    use scry_core::{EvalRequest, Evaluator};
    use scry_render::{FontSet, Rasterizer};
    use serde_json::Value;
    use tokio_stream::StreamExt;

    /// Draws a fixed square and keeps an empty namespace.
    struct SquareEvaluator;

    #[async_trait]
    impl Evaluator for SquareEvaluator {
        async fn evaluate(&self, _request: &EvalRequest) -> Result<String, RuntimeError> {
            Ok(serde_json::json!({
                "svg": r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10"/></svg>"#,
                "stdout": "",
                "scope": "{}",
                "error": null,
            })
            .to_string())
        }
    }

    /// Uses the script text as the artifact.
    struct EchoEvaluator;

    #[async_trait]
    impl Evaluator for EchoEvaluator {
        async fn evaluate(&self, request: &EvalRequest) -> Result<String, RuntimeError> {
            Ok(serde_json::json!({
                "svg": request.code,
                "stdout": "",
                "scope": "{}",
                "error": null,
            })
            .to_string())
        }
    }

    /// Memory store whose updates take a while to land.
    struct SlowUpdateStore {
        inner: MemoryBoardStore,
        delay: Duration,
    }

    #[async_trait]
    impl BoardStore for SlowUpdateStore {
        async fn get_by_name(&self, name: &str) -> Result<Option<BoardRecord>, StoreError> {
            self.inner.get_by_name(name).await
        }

        async fn get_by_share_id(&self, id: &ShareId) -> Result<Option<BoardRecord>, StoreError> {
            self.inner.get_by_share_id(id).await
        }

        async fn create(&self, board: NewBoard) -> Result<ShareId, StoreError> {
            self.inner.create(board).await
        }

        async fn update(&self, name: &str, update: BoardUpdate) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.update(name, update).await
        }

        async fn append_history(
            &self,
            board_name: &str,
            artifact: &str,
            alt: Option<&str>,
        ) -> Result<(), StoreError> {
            self.inner.append_history(board_name, artifact, alt).await
        }

        async fn list(&self) -> Result<Vec<BoardSummary>, StoreError> {
            self.inner.list().await
        }

        async fn history(&self, board_name: &str) -> Result<Vec<HistoryEntry>, StoreError> {
            self.inner.history(board_name).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    fn echo_state(store: Arc<dyn BoardStore>) -> AppState {
        let session = ExecutionSession::new(Arc::new(EchoEvaluator), store, LimitsConfig::default());
        AppState::new(
            session,
            Rasterizer::new(FontSet::empty(), 4096),
            "http://scry.test",
            None,
        )
    }

    fn draw(name: &str, svg: &str) -> String {
        serde_json::json!({ "name": name, "code": svg }).to_string()
    }

    fn state(token: Option<&str>) -> AppState {
        let session = ExecutionSession::new(
            Arc::new(SquareEvaluator),
            Arc::new(MemoryBoardStore::new()),
            LimitsConfig::default(),
        );
        AppState::new(
            session,
            Rasterizer::new(FontSet::empty(), 4096),
            "http://scry.test/",
            token.map(str::to_string),
        )
    }

    fn setup_router(token: Option<&str>) -> Router {
        build_router(state(token), Duration::from_secs(30))
    }

    fn rpc(path: &str, body: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = setup_router(None)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_check() {
        let response = setup_router(None)
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let response = setup_router(None)
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_view_rejects_non_canonical_share_id() {
        for uri in [
            "/view/demo",
            "/view/6F9619FF-8B86-4D11-B42D-00C04FC964FF",
            "/view/00000000-0000-4000-8000-000000000000/png",
            "/view/demo/events",
            "/view/00000000-0000-4000-8000-000000000000/events",
        ] {
            let response = setup_router(None)
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_view_rejects_other_methods() {
        let response = setup_router(None)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/view/00000000-0000-4000-8000-000000000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_rpc_requires_token_when_configured() {
        let app = setup_router(Some("s3cret"));
        let body = r#"{"name": "demo", "code": "draw()"}"#;

        let response = app
            .clone()
            .oneshot(rpc("/rpc/execute", body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(rpc("/rpc/execute", body, Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(rpc("/rpc/execute", body, Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_execute_reply_and_list() {
        let app = setup_router(None);

        let response = app
            .clone()
            .oneshot(rpc("/rpc/execute", r#"{"name": "demo", "code": "draw()"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = json_body(response).await;
        let share_id = reply["share_id"].as_str().unwrap().to_string();
        assert_eq!(reply["url"], format!("http://scry.test/view/{share_id}"));
        assert_eq!(reply["outcome"], "succeeded_artifact");
        assert_eq!(reply["width"], 800);
        assert!(reply["snippet"].as_str().unwrap().starts_with("<svg"));

        let response = app.oneshot(rpc("/rpc/list", "{}", None)).await.unwrap();
        let listing = json_body(response).await;
        assert_eq!(listing["count"], 1);
        assert_eq!(listing["boards"][0]["name"], "demo");
        assert_eq!(listing["boards"][0]["history_count"], 0);
        assert_eq!(listing["boards"][0]["has_artifact"], true);
    }

    #[tokio::test]
    async fn test_execute_validation_error() {
        let response = setup_router(None)
            .oneshot(rpc("/rpc/execute", r#"{"name": "a/b", "code": ""}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Board name cannot contain /, null, or newline characters"
        );
    }

    #[tokio::test]
    async fn test_execute_malformed_body() {
        let response = setup_router(None)
            .oneshot(rpc("/rpc/execute", "{not json", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_timed_out_execute_still_commits() {
        let store = Arc::new(SlowUpdateStore {
            inner: MemoryBoardStore::new(),
            delay: Duration::from_millis(300),
        });
        let app = build_router(echo_state(store.clone()), Duration::from_millis(100));

        let first = app
            .clone()
            .oneshot(rpc("/rpc/execute", &draw("demo", "<svg>A</svg>"), None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(rpc("/rpc/execute", &draw("demo", "<svg>B</svg>"), None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::REQUEST_TIMEOUT);

        // The abandoned execution finishes its commit in the background
        tokio::time::sleep(Duration::from_millis(600)).await;
        let board = store.get_by_name("demo").await.unwrap().unwrap();
        assert_eq!(board.artifact, "<svg>B</svg>");
        let history = store.history("demo").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].artifact, "<svg>A</svg>");
    }

    #[tokio::test]
    async fn test_history_lists_archived_artifacts() {
        let app = build_router(
            echo_state(Arc::new(MemoryBoardStore::new())),
            Duration::from_secs(30),
        );
        for svg in ["<svg>1</svg>", "<svg>2</svg>", "<svg>3</svg>"] {
            let response = app
                .clone()
                .oneshot(rpc("/rpc/execute", &draw("demo", svg), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(rpc("/rpc/history", r#"{"name": "demo"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = json_body(response).await;
        assert_eq!(reply["name"], "demo");
        assert_eq!(reply["count"], 2);
        let artifacts: Vec<&str> = reply["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["artifact"].as_str().unwrap())
            .collect();
        assert_eq!(artifacts, ["<svg>1</svg>", "<svg>2</svg>"]);

        let response = app
            .clone()
            .oneshot(rpc("/rpc/history", r#"{"name": "ghost"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(rpc("/rpc/history", r#"{"name": "a/b"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_requires_token_when_configured() {
        let response = setup_router(Some("s3cret"))
            .oneshot(rpc("/rpc/history", r#"{"name": "demo"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_board_events_stream_changes() {
        let app = build_router(
            echo_state(Arc::new(MemoryBoardStore::new())),
            Duration::from_secs(30),
        );
        let response = app
            .clone()
            .oneshot(rpc("/rpc/execute", &draw("demo", "<svg>1</svg>"), None))
            .await
            .unwrap();
        let share_id = json_body(response).await["share_id"]
            .as_str()
            .unwrap()
            .to_string();

        let events = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/view/{share_id}/events"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(events.status(), StatusCode::OK);
        assert_eq!(events.headers()[header::CONTENT_TYPE], "text/event-stream");
        let mut stream = events.into_body().into_data_stream();

        // A change to another board is not delivered to this subscriber
        for (name, svg) in [("other", "<svg>x</svg>"), ("demo", "<svg>2</svg>")] {
            let response = app
                .clone()
                .oneshot(rpc("/rpc/execute", &draw(name, svg), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("event: board"), "{text}");
        let data = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let changed: Value = serde_json::from_str(data).unwrap();
        assert_eq!(changed["share_id"], share_id);
        assert_eq!(changed["outcome"], "succeeded_artifact");
        assert_eq!(changed["created"], false);
        assert_eq!(changed["archived"], true);
    }
}
