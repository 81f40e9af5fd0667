//! API endpoint integration tests

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::Engine;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voicedrive::api::{ApiServer, ApiState};
use voicedrive::llm::TextGenerator;
use voicedrive::voice::{PhraseCache, Speaker, TextToSpeech, TtsProvider, samples_to_wav};

mod common;
use common::{RecordingSink, scheduler, setup_test_db};

const FRONTEND: &str = "http://localhost:3000";

fn test_state(sink: &Arc<RecordingSink>) -> ApiState {
    ApiState::new(setup_test_db(), scheduler(sink, Duration::from_secs(1)))
}

fn build_test_router(state: ApiState) -> axum::Router {
    ApiServer::new(state, 0, FRONTEND).unwrap().router()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn design_body(title: &str, tags: &[&str]) -> Value {
    json!({
        "title": title,
        "description": "square patrol",
        "author": "ada",
        "content": {"nodes": [{"id": "n1", "type": "move", "direction": "forward"}]},
        "tags": tags,
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["session"]["connected"], true);
    assert_eq!(json["session"]["active"], false);
}

#[tokio::test]
async fn test_ready_reports_drive_channel() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let (status, json) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["checks"]["database"]["status"], "ok");

    sink.set_connected(false);
    let (status, json) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["checks"]["drive"]["status"], "fail");
}

#[tokio::test]
async fn test_root_redirects_to_frontend() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], FRONTEND);
}

#[tokio::test]
async fn test_cors_allows_frontend_origin() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/move")
        .header(header::ORIGIN, FRONTEND)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        FRONTEND
    );
}

#[tokio::test(start_paused = true)]
async fn test_move_dispatches_and_auto_stops() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let (status, json) = send(
        &app,
        with_json("POST", "/api/move", &json!({"direction": "forward", "value": 1.0})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(json["message"], "Moving forward");
    assert_eq!(json["published"], true);
    assert_eq!(sink.payloads(), ["forward"]);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(sink.payloads(), ["forward", "stop"]);
}

#[tokio::test]
async fn test_move_rejects_unknown_direction() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    for direction in ["up", "stop"] {
        let (status, json) = send(
            &app,
            with_json("POST", "/api/move", &json!({"direction": direction, "value": 1.0})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_direction");
    }
    assert!(sink.payloads().is_empty());
}

#[tokio::test]
async fn test_stop_endpoint() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let request = Request::builder()
        .method("POST")
        .uri("/api/stop")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Robot stopped");
    assert_eq!(sink.payloads(), ["stop"]);
}

#[tokio::test]
async fn test_stop_while_disconnected_reports_unpublished() {
    let sink = RecordingSink::new();
    sink.set_connected(false);
    let app = build_test_router(test_state(&sink));

    let request = Request::builder()
        .method("POST")
        .uri("/api/stop")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["published"], false);
}

#[tokio::test]
async fn test_design_lifecycle() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let (status, created) = send(
        &app,
        with_json("POST", "/api/designs", &design_body("patrol", &["demo"])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["downloads"], 0);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = send(&app, get(&format!("/api/designs/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "patrol");
    assert_eq!(fetched["content"]["nodes"][0]["type"], "move");

    let (status, updated) = send(
        &app,
        with_json(
            "PUT",
            &format!("/api/designs/{id}"),
            &design_body("patrol v2", &["demo", "square"]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "patrol v2");
    assert_eq!(updated["created_at"], created["created_at"]);

    let download = Request::builder()
        .method("POST")
        .uri(format!("/api/designs/{id}/download"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, download).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Download count incremented");

    let (_, fetched) = send(&app, get(&format!("/api/designs/{id}"))).await;
    assert_eq!(fetched["downloads"], 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/designs/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Design deleted successfully");

    let (status, json) = send(&app, get(&format!("/api/designs/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_list_designs_paging_and_tags() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    for (title, tags) in [("a", vec!["maze"]), ("b", vec![]), ("c", vec!["maze", "fast"])] {
        let (status, _) = send(&app, with_json("POST", "/api/designs", &design_body(title, &tags))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, all) = send(&app, get("/api/designs")).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["c", "b", "a"]);

    let (_, page) = send(&app, get("/api/designs?skip=1&limit=1")).await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["title"], "b");

    let (_, tagged) = send(&app, get("/api/designs?tag=maze")).await;
    assert_eq!(tagged.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_design_validation() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let mut body = design_body("bad", &[]);
    body["content"] = json!("not an object");
    let (status, json) = send(&app, with_json("POST", "/api/designs", &body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "invalid_input");

    let (status, _) = send(
        &app,
        with_json("PUT", "/api/designs/missing", &design_body("x", &[])),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let download = Request::builder()
        .method("POST")
        .uri("/api/designs/missing/download")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, download).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_without_key_is_unavailable() {
    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink));

    let (status, json) = send(
        &app,
        with_json("POST", "/api/generate", &json!({"prompt": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "not_configured");
}

#[tokio::test]
async fn test_generate_returns_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Beep boop, ready to roll."}]}}]
        })))
        .mount(&server)
        .await;

    let generator = TextGenerator::new(
        SecretString::from("g-key".to_string()),
        "gemini-2.0-flash".to_string(),
    )
    .unwrap()
    .with_base_url(server.uri());

    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink).with_generator(Arc::new(generator)));

    let (status, json) = send(
        &app,
        with_json("POST", "/api/generate", &json!({"prompt": "say hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], "Beep boop, ready to roll.");
}

#[tokio::test]
async fn test_speak_returns_audio() {
    let server = MockServer::start().await;
    let wav = samples_to_wav(&[0.1; 160], 16000).unwrap();
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav.clone()))
        .mount(&server)
        .await;

    let tts = TextToSpeech::new(
        TtsProvider::OpenAI,
        SecretString::from("key".to_string()),
        "alloy",
        "tts-1".to_string(),
    )
    .unwrap()
    .with_base_url(server.uri());
    let cache_dir = tempfile::tempdir().unwrap();
    let speaker = Speaker::new(tts, PhraseCache::new(cache_dir.path(), &[]), vec![], false);

    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink).with_speaker(Arc::new(speaker)));

    let (status, json) = send(
        &app,
        with_json("POST", "/api/speak", &json!({"text": "hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    let audio = base64::engine::general_purpose::STANDARD
        .decode(json["audio"].as_str().unwrap())
        .unwrap();
    assert_eq!(audio, wav);
}

#[tokio::test]
async fn test_speak_rejects_empty_text() {
    let server = MockServer::start().await;
    let tts = TextToSpeech::new(
        TtsProvider::OpenAI,
        SecretString::from("key".to_string()),
        "alloy",
        "tts-1".to_string(),
    )
    .unwrap()
    .with_base_url(server.uri());
    let speaker = Speaker::new(tts, PhraseCache::new("/tmp/unused", &[]), vec![], false);

    let sink = RecordingSink::new();
    let app = build_test_router(test_state(&sink).with_speaker(Arc::new(speaker)));

    let (status, _) = send(&app, with_json("POST", "/api/speak", &json!({"text": "  "}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
