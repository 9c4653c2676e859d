// tests/integration_tests.rs
use actix_web::{http::header, http::StatusCode, test, App};
use awc::ws;
use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use videorelay::api::{configure_app, AppState};
use videorelay::config::AppConfig;
use videorelay::models::JobStatus;
use videorelay::storage::UploadedFile;

const BOUNDARY: &str = "videorelay-test-boundary";

fn test_state() -> (AppState, PathBuf) {
    let upload_dir = std::env::temp_dir().join(format!("videorelay-it-{}", uuid::Uuid::new_v4()));
    let config = AppConfig {
        upload_dir: upload_dir.clone(),
        executable: PathBuf::from("/nonexistent/videorelay/DarkPlate"),
        ..AppConfig::default()
    };
    (AppState::new(config), upload_dir)
}

/// State whose executable is `/bin/sh`, with one job whose input is `script`.
async fn shell_job(script: &str) -> (AppState, String, PathBuf) {
    let upload_dir = std::env::temp_dir().join(format!("videorelay-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&upload_dir).unwrap();
    let path = upload_dir.join("job.sh");
    std::fs::write(&path, script).unwrap();

    let state = AppState::new(AppConfig {
        upload_dir: upload_dir.clone(),
        executable: PathBuf::from("/bin/sh"),
        ..AppConfig::default()
    });
    let job_id = state
        .jobs
        .create(UploadedFile {
            original_name: "job.sh".to_string(),
            file_name: "job.sh".to_string(),
            path,
        })
        .await;
    (state, job_id, upload_dir)
}

/// Read text frames as JSON events until `done` accepts one.
async fn read_events<S>(conn: &mut S, done: impl Fn(&serde_json::Value) -> bool) -> Vec<serde_json::Value>
where
    S: futures::Stream<Item = Result<ws::Frame, awc::error::WsProtocolError>> + Unpin,
{
    let mut events = Vec::new();
    while let Some(frame) = conn.next().await {
        if let ws::Frame::Text(text) = frame.expect("websocket frame") {
            let event: serde_json::Value = serde_json::from_slice(&text).unwrap();
            let finished = done(&event);
            events.push(event);
            if finished {
                break;
            }
        }
    }
    events
}

fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(field: &str, file_name: &str, bytes: &[u8]) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(multipart_body(field, file_name, bytes))
}

fn location(resp: &actix_web::dev::ServiceResponse) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[actix_rt::test]
async fn test_index_serves_upload_form() {
    let (state, _) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state))).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("name=\"video\""));
    assert!(body.contains("multipart/form-data"));
}

#[actix_rt::test]
async fn test_output_page_opens_channel() {
    let (state, _) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state))).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/output?job=abc").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains("WebSocket"));
}

#[actix_rt::test]
async fn test_upload_stores_file_and_redirects() {
    let (state, upload_dir) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state.clone()))).await;

    let resp = test::call_service(&app, upload_request("video", "sample.mp4", b"fake mp4 bytes").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let target = location(&resp);
    let job_id = target.strip_prefix("/output?job=").expect("redirect to results page");
    assert_eq!(
        std::fs::read(upload_dir.join("sample.mp4")).unwrap(),
        b"fake mp4 bytes"
    );

    let job = state.jobs.get(job_id).await.expect("job registered");
    assert_eq!(job.file_name, "sample.mp4");

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&format!("/api/v1/jobs/{}", job_id)).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["file_name"], "sample.mp4");

    let _ = std::fs::remove_dir_all(upload_dir);
}

#[actix_rt::test]
async fn test_same_name_upload_replaces_previous() {
    let (state, upload_dir) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state))).await;

    let first = test::call_service(&app, upload_request("video", "sample.mp4", b"the first, longer upload").to_request()).await;
    let second = test::call_service(&app, upload_request("video", "sample.mp4", b"second").to_request()).await;

    assert_eq!(first.status(), StatusCode::FOUND);
    assert_eq!(second.status(), StatusCode::FOUND);
    assert_ne!(location(&first), location(&second));
    assert_eq!(std::fs::read(upload_dir.join("sample.mp4")).unwrap(), b"second");

    let _ = std::fs::remove_dir_all(upload_dir);
}

#[actix_rt::test]
async fn test_traversal_filename_stays_in_upload_dir() {
    let (state, upload_dir) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state))).await;

    let resp = test::call_service(&app, upload_request("video", "../../escape.mp4", b"x").to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(upload_dir.join("escape.mp4").exists());
    assert!(!upload_dir.parent().unwrap().join("escape.mp4").exists());

    let _ = std::fs::remove_dir_all(upload_dir);
}

#[actix_rt::test]
async fn test_missing_video_field_is_rejected() {
    let (state, _) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state))).await;

    let resp = test::call_service(&app, upload_request("document", "sample.mp4", b"x").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("video"));
}

#[actix_rt::test]
async fn test_non_multipart_post_is_rejected() {
    let (state, _) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state))).await;

    let req = test::TestRequest::post()
        .uri("/")
        .insert_header((header::CONTENT_TYPE, "text/plain"))
        .set_payload("hello")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_channel_requires_known_job() {
    let (state, _) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state))).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/ws?job=unknown").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/ws").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_health_and_unknown_job() {
    let (state, _) = test_state();
    let app = test::init_service(App::new().configure(configure_app(state))).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["service"], "videorelay");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/jobs/nope").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_channel_streams_job_output() {
    let (state, job_id, upload_dir) = shell_job("echo A\necho B 1>&2\necho C\nexit 0\n").await;
    let mut srv = {
        let state = state.clone();
        actix_test::start(move || App::new().configure(configure_app(state.clone())))
    };

    let mut conn = srv.ws_at(&format!("/ws?job={}", job_id)).await.unwrap();
    let events = tokio::time::timeout(
        Duration::from_secs(10),
        read_events(&mut conn, |e| e["event"] == "completed" || e["event"] == "failed"),
    )
    .await
    .expect("job finishes");

    assert_eq!(events[0]["event"], "started");
    assert_eq!(events[0]["file_name"], "job.sh");
    let lines: Vec<&str> = events
        .iter()
        .filter(|e| e["event"] == "output")
        .map(|e| e["data"].as_str().unwrap())
        .collect();
    assert_eq!(lines, vec!["A", "B", "C"]);

    let last = events.last().unwrap();
    assert_eq!(last["event"], "completed");
    assert_eq!(last["exit_code"], 0);
    assert_eq!(state.jobs.get(&job_id).await.unwrap().status, JobStatus::Completed);

    let _ = std::fs::remove_dir_all(upload_dir);
}

#[actix_rt::test]
async fn test_closing_last_channel_cancels_job() {
    let (state, job_id, upload_dir) = shell_job("echo ready\nexec sleep 30\n").await;
    let mut srv = {
        let state = state.clone();
        actix_test::start(move || App::new().configure(configure_app(state.clone())))
    };

    let mut conn = srv.ws_at(&format!("/ws?job={}", job_id)).await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(10),
        read_events(&mut conn, |e| e["data"] == "ready"),
    )
    .await
    .expect("job prints its first line");

    conn.send(ws::Message::Close(None)).await.unwrap();
    drop(conn);

    let status = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = state.jobs.get(&job_id).await.unwrap().status;
            if !status.is_active() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("job stops after the channel closes");
    assert_eq!(status, JobStatus::Cancelled);

    let _ = std::fs::remove_dir_all(upload_dir);
}

#[actix_rt::test]
async fn test_oversized_upload_is_rejected() {
    let (state, upload_dir) = test_state();
    let state = AppState::new(AppConfig {
        max_upload_bytes: 64,
        ..(*state.config).clone()
    });
    let app = test::init_service(App::new().configure(configure_app(state.clone()))).await;

    let resp = test::call_service(&app, upload_request("video", "big.mp4", &[7u8; 4096]).to_request()).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!upload_dir.join("big.mp4").exists());

    let resp = test::call_service(&app, upload_request("video", "big.mp4", &[]).to_request()).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let _ = std::fs::remove_dir_all(upload_dir);
}
