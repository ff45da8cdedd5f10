//! End-to-end: a WebAssembly guest behind the full HTTP router.
//!
//! The guest's `execute` answers with the script text, so each script below
//! is the guest response itself.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use scry_board::{ExecutionSession, MemoryBoardStore};
use scry_common::{EngineConfig, ExecutionConfig, LimitsConfig};
use scry_core::{CompiledModule, WasmEngine, WasmEvaluator};
use scry_host::register_all;
use scry_render::{FontSet, Rasterizer};
use scry_server::{AppState, ScryServer, build_router};
use wasmtime::Linker;

const ECHO_GUEST: &str = r#"(module
    (import "wbg" "__wbindgen_init_externref_table" (func $init_table))

    (memory (export "memory") 2)
    (global $heap (mut i32) (i32.const 4096))
    (global $sp (mut i32) (i32.const 1024))

    (func (export "__wbindgen_malloc") (param $size i32) (param $align i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get $size)))
        (local.get $ptr))
    (func (export "__wbindgen_free") (param i32 i32 i32))
    (func (export "__wbindgen_add_to_stack_pointer") (param $delta i32) (result i32)
        (global.set $sp (i32.add (global.get $sp) (local.get $delta)))
        (global.get $sp))
    (func (export "__wbindgen_start") (call $init_table))

    (func (export "execute")
        (param $ret i32) (param $code i32) (param $code_len i32)
        (param $scope i32) (param $scope_len i32) (param $w i64) (param $h i64)
        (i32.store (local.get $ret) (local.get $code))
        (i32.store offset=4 (local.get $ret) (local.get $code_len)))
)"#;

const ARTIFACT: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="800" height="600"><rect width="800" height="600" fill="#1a1a2e"/><circle cx="400" cy="300" r="120" fill="#e94560"/></svg>"##;

fn app_state() -> AppState {
    let engine = WasmEngine::new(&EngineConfig {
        pooling_allocator: false,
        ..Default::default()
    })
    .unwrap();
    let module = CompiledModule::from_wat(engine.inner(), ECHO_GUEST).unwrap();
    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker).unwrap();
    let evaluator = WasmEvaluator::new(engine, module, linker, ExecutionConfig::default());

    let session = ExecutionSession::new(
        Arc::new(evaluator),
        Arc::new(MemoryBoardStore::new()),
        LimitsConfig::default(),
    );
    AppState::new(
        session,
        Rasterizer::new(FontSet::empty(), 4096),
        "http://localhost:8080",
        None,
    )
}

fn router() -> Router {
    build_router(app_state(), Duration::from_secs(30))
}

fn execute_body(name: &str, response: &Value, extra: &Value) -> String {
    let mut body = json!({
        "name": name,
        "code": response.to_string(),
        "width": 800,
        "height": 600,
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    body.to_string()
}

async fn execute(app: &Router, body: String) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rpc/execute")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn view_path(url: &str) -> String {
    url.trim_start_matches("http://localhost:8080").to_string()
}

fn drawn(svg: &str) -> Value {
    json!({"svg": svg, "stdout": "drawn\n", "scope": "{\"r\":120}", "error": null})
}

#[tokio::test]
async fn test_execute_then_view_svg_and_png() {
    let app = router();

    let (status, reply) = execute(
        &app,
        execute_body("demo", &drawn(ARTIFACT), &json!({"alt": "A red circle & a dark sky"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["output"], "drawn\n");
    let url = reply["url"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:8080/view/"));
    let view = view_path(url);

    // composed view
    let response = get(&app, &view).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=60");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("demo"));
    assert!(text.contains("<circle"));
    assert!(text.contains("A red circle &amp; a dark sky"));

    // raw artifact
    let response = get(&app, &format!("{view}/svg")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body, ARTIFACT.as_bytes());

    // raster
    let response = get(&app, &format!("{view}/png")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=300");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[bytes.len() - 8..bytes.len() - 4], b"IEND");

    let mut decoder = png::Decoder::new(Cursor::new(bytes.to_vec()));
    decoder.set_ignore_text_chunk(false);
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0; reader.output_buffer_size()];
    reader.next_frame(&mut buf).unwrap();
    reader.finish().unwrap();

    let info = reader.info();
    assert_eq!((info.width, info.height), (800, 600));
    assert_eq!(info.utf8_text.len(), 1);
    assert_eq!(info.utf8_text[0].keyword, "Description");
    assert_eq!(
        info.utf8_text[0].get_text().unwrap(),
        "A red circle & a dark sky"
    );
}

#[tokio::test]
async fn test_board_without_artifact_is_not_viewable() {
    let app = router();

    let scope_only = json!({"svg": null, "stdout": "", "scope": "{\"x\":1}", "error": null});
    let (status, reply) = execute(&app, execute_body("blank", &scope_only, &json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["outcome"], "succeeded_no_artifact");
    assert!(reply["snippet"].is_null());

    let view = view_path(reply["url"].as_str().unwrap());
    assert_eq!(get(&app, &view).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(get(&app, &format!("{view}/png")).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_script_error_is_unprocessable() {
    let app = router();

    let failing = json!({
        "svg": null,
        "stdout": "before the fault",
        "scope": "{}",
        "error": "ZeroDivisionError: division by zero",
    });
    let (status, reply) = execute(&app, execute_body("demo", &failing, &json!({}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply["error"], "ZeroDivisionError: division by zero");
    assert_eq!(reply["output"], "before the fault");
}

#[tokio::test]
async fn test_oversized_board_png_is_rejected() {
    let app = router();

    let (status, reply) = execute(
        &app,
        execute_body("wide", &drawn(ARTIFACT), &json!({"width": 5000, "height": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let view = view_path(reply["url"].as_str().unwrap());

    let response = get(&app, &format!("{view}/png")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["width"], 5000);
    assert_eq!(body["height"], 100);
    assert_eq!(body["max"], 4096);

    // the vector views still work
    assert_eq!(get(&app, &view).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_served_over_tcp() {
    let handle = ScryServer::start_test(app_state()).await.unwrap();
    let client = reqwest::Client::new();

    let health = client
        .get(format!("{}/health", handle.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let list: Value = client
        .post(format!("{}/rpc/list", handle.url()))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["count"], 0);

    handle.shutdown().await;
}
