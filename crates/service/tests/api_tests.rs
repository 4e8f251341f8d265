//! End-to-end tests for the HTTP API against a mocked Gemini backend.

use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use storekeep_core::{AppConfig, FileConfig, FileRecord, NewStore, PollPolicy};
use storekeep_gemini::GeminiClient;
use storekeep_service::{router, AppState};
use storekeep_workflow::Workspace;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOUNDARY: &str = "storekeep-test-boundary";

struct TestApp {
    server: MockServer,
    root: TempDir,
    workspace: Workspace,
    router: Router,
}

impl TestApp {
    async fn start() -> Self {
        Self::start_with_default_store(None).await
    }

    async fn start_with_default_store(default_store: Option<&str>) -> Self {
        let default_store = default_store.map(str::to_string);
        let server = MockServer::start().await;
        let root = tempfile::tempdir().unwrap();
        let base_url = format!("{}/v1beta", server.uri());
        let data_dir = root.path().join("data").to_string_lossy().into_owned();
        let upload_dir = root.path().join("uploads").to_string_lossy().into_owned();
        let config = AppConfig::from_lookup(FileConfig::default(), |key| match key {
            "GEMINI_API_KEY" => Some("test-key".to_string()),
            "GEMINI_BASE_URL" => Some(base_url.clone()),
            "STOREKEEP_DATA_DIR" => Some(data_dir.clone()),
            "STOREKEEP_UPLOAD_DIR" => Some(upload_dir.clone()),
            "GEMINI_FILE_SEARCH_STORE" => default_store.clone(),
            _ => None,
        })
        .unwrap();
        let gemini = GeminiClient::new(&config)
            .with_poll_policy(PollPolicy::new(Duration::from_millis(5), 2));
        let workspace = Workspace::new(config).with_gemini(gemini);
        let router = router(AppState::new(workspace.clone()));
        Self {
            server,
            root,
            workspace,
            router,
        }
    }

    fn upload_dir(&self) -> std::path::PathBuf {
        self.root.path().join("uploads")
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn json_request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };
    send(router, builder.body(body).unwrap()).await
}

fn multipart_body(file: Option<(&str, &str, &[u8])>, fields: &[(&str, &str)]) -> Body {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

async fn upload_request(
    router: &Router,
    file: Option<(&str, &str, &[u8])>,
    fields: &[(&str, &str)],
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/files/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_body(file, fields))
        .unwrap();
    send(router, request).await
}

fn dir_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

async fn seed_store(app: &TestApp, name: &str) {
    app.workspace
        .metadata()
        .insert_store(NewStore::from_remote(name, Some("seeded"), None))
        .await
        .unwrap();
}

#[tokio::test]
async fn created_store_is_listed_as_active() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/fileSearchStores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "fileSearchStores/manuals-x1",
            "displayName": "manuals",
            "createTime": "2025-11-02T10:15:00Z"
        })))
        .mount(&app.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/fileSearchStores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fileSearchStores": [{
                "name": "fileSearchStores/manuals-x1",
                "displayName": "manuals",
                "activeDocumentsCount": "2",
                "sizeBytes": "4096"
            }]
        })))
        .mount(&app.server)
        .await;

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/stores",
        Some(json!({ "displayName": "manuals" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["store"]["displayName"], "manuals");

    let (status, body) = json_request(&app.router, "GET", "/api/stores", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activeStoreName"], "fileSearchStores/manuals-x1");
    let store = &body["stores"][0];
    assert_eq!(store["isActive"], true);
    assert_eq!(store["activeDocumentsCount"], 2);
    assert_eq!(store["sizeBytes"], 4096);
}

#[tokio::test]
async fn blank_display_name_is_rejected() {
    let app = TestApp::start().await;
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/stores",
        Some(json!({ "displayName": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "displayName is required");
}

#[tokio::test]
async fn ask_without_stores_is_bad_request() {
    let app = TestApp::start().await;
    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/ask",
        Some(json!({ "question": "How do I reset the device?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("no active store"));
}

#[tokio::test]
async fn ask_without_question_is_bad_request() {
    let app = TestApp::start().await;
    let (status, body) = json_request(&app.router, "POST", "/api/ask", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "question is required");
}

#[tokio::test]
async fn ask_returns_answer_with_citations() {
    let app = TestApp::start().await;
    seed_store(&app, "fileSearchStores/manuals-x1").await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hold the power button for 10 seconds." }] },
                "groundingMetadata": {
                    "groundingChunks": [{
                        "retrievedContext": { "uri": "doc://reset", "title": "Reset guide" }
                    }]
                }
            }]
        })))
        .mount(&app.server)
        .await;

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/ask",
        Some(json!({ "question": "How do I reset the device?", "model": "gemini-2.5-pro" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["answer"], "Hold the power button for 10 seconds.");
    assert_eq!(body["storeName"], "fileSearchStores/manuals-x1");
    assert_eq!(body["model"], "gemini-2.5-pro");
    assert_eq!(body["citations"][0]["uri"], "doc://reset");
}

#[tokio::test]
async fn ask_uses_the_activated_store_even_with_a_default_configured() {
    let app = TestApp::start_with_default_store(Some("fileSearchStores/pinned")).await;
    seed_store(&app, "fileSearchStores/first").await;
    seed_store(&app, "fileSearchStores/chosen").await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "From the chosen store." }] } }]
        })))
        .mount(&app.server)
        .await;

    let (status, _) = json_request(
        &app.router,
        "PUT",
        "/api/stores/fileSearchStores%2Fchosen/active",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = json_request(
        &app.router,
        "POST",
        "/api/ask",
        Some(json!({ "question": "Which store answers?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["storeName"], "fileSearchStores/chosen");
}

#[tokio::test]
async fn deleting_unknown_store_fails_but_clears_local_records() {
    let app = TestApp::start().await;
    seed_store(&app, "fileSearchStores/ghost").await;
    app.workspace
        .metadata()
        .insert_file(FileRecord {
            store_name: "fileSearchStores/ghost".into(),
            file_name: "fileSearchStores/ghost/documents/d1".into(),
            display_name: "d1".into(),
        })
        .await
        .unwrap();
    Mock::given(method("DELETE"))
        .and(path("/v1beta/fileSearchStores/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "Store fileSearchStores/ghost not found" }
        })))
        .mount(&app.server)
        .await;

    let (status, body) = json_request(
        &app.router,
        "DELETE",
        "/api/stores/fileSearchStores%2Fghost",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Store fileSearchStores/ghost not found"));

    let metadata = app.workspace.metadata();
    assert!(metadata.list_stores().await.unwrap().is_empty());
    assert!(metadata.list_files(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn activate_switches_the_active_store() {
    let app = TestApp::start().await;
    seed_store(&app, "fileSearchStores/a").await;
    seed_store(&app, "fileSearchStores/b").await;

    let (status, body) = json_request(
        &app.router,
        "PUT",
        "/api/stores/fileSearchStores%2Fb/active",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activeStoreName"], "fileSearchStores/b");
    assert_eq!(
        app.workspace
            .metadata()
            .active_store_name()
            .await
            .unwrap()
            .as_deref(),
        Some("fileSearchStores/b")
    );

    let (status, body) = json_request(
        &app.router,
        "PUT",
        "/api/stores/fileSearchStores%2Fmissing/active",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["activeStoreName"], Value::Null);
}

#[tokio::test]
async fn upload_without_file_is_bad_request() {
    let app = TestApp::start().await;
    let (status, body) = upload_request(&app.router, None, &[("displayName", "manual")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "file is required");
}

#[tokio::test]
async fn upload_indexes_file_and_removes_staged_copy() {
    let app = TestApp::start().await;
    seed_store(&app, "fileSearchStores/manuals-x1").await;
    Mock::given(method("POST"))
        .and(path(
            "/upload/v1beta/fileSearchStores/manuals-x1:uploadToFileSearchStore",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "fileSearchStores/manuals-x1/upload/operations/op-1",
            "done": true,
            "response": {
                "documentName": "fileSearchStores/manuals-x1/documents/doc-1",
                "parent": "fileSearchStores/manuals-x1"
            }
        })))
        .expect(1)
        .mount(&app.server)
        .await;

    let (status, body) = upload_request(
        &app.router,
        Some(("manual.pdf", "application/pdf", &b"%PDF-1.4 test"[..])),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(
        body["file"]["documentName"],
        "fileSearchStores/manuals-x1/documents/doc-1"
    );
    assert_eq!(body["file"]["displayName"], "manual.pdf");
    assert!(dir_is_empty(&app.upload_dir()));
    let sent = app.server.received_requests().await.unwrap();
    let payload = String::from_utf8_lossy(&sent[0].body);
    assert!(payload.contains("%PDF-1.4 test"));

    let (status, body) = json_request(
        &app.router,
        "GET",
        "/api/stores/fileSearchStores%2Fmanuals-x1/files",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"][0]["displayName"], "manual.pdf");
}

#[tokio::test]
async fn failed_upload_still_removes_staged_copy() {
    let app = TestApp::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/upload/v1beta/fileSearchStores/target:uploadToFileSearchStore",
        ))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": 500, "message": "backend unavailable" }
        })))
        .mount(&app.server)
        .await;

    let (status, body) = upload_request(
        &app.router,
        Some(("notes.txt", "text/plain", &b"hello"[..])),
        &[("storeName", "fileSearchStores/target")],
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("backend unavailable"));
    assert!(dir_is_empty(&app.upload_dir()));
    assert!(app
        .workspace
        .metadata()
        .list_files(None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn index_serves_the_ui() {
    let app = TestApp::start().await;
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&body).contains("/api/stores"));
}
