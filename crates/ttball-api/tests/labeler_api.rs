//! Labeler endpoints over a temporary data root.

mod common;

use std::io::Read;

use axum::http::{header, StatusCode};
use common::*;

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let body = assert_status(app.get("/labeler/api/health").await, StatusCode::OK).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_list_tasks_with_frame_counts() {
    let app = TestApp::new().await;
    let empty = assert_status(app.get("/labeler/api/tasks").await, StatusCode::OK).await;
    assert_eq!(empty["tasks"], serde_json::json!([]));

    let id = app.seed_task(3).await;
    let body = assert_status(app.get("/labeler/api/tasks").await, StatusCode::OK).await;
    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], id.to_string());
    assert_eq!(tasks[0]["frames"], 3);
    assert_eq!(tasks[0]["meta"]["fps"], 5);
    assert_eq!(tasks[0]["meta"]["source"], "upload");
}

#[tokio::test]
async fn test_frames_and_labeled_flags() {
    let app = TestApp::new().await;
    let id = app.seed_task(3).await;

    let body = assert_status(app.get(&task_uri(&id, "frames")).await, StatusCode::OK).await;
    assert_eq!(body["task_id"], id.to_string());
    assert_eq!(
        body["frames"],
        serde_json::json!(["000001.jpg", "000002.jpg", "000003.jpg"])
    );
    assert_eq!(body["labeled"], serde_json::json!([]));

    let saved = app
        .post_json(
            &task_uri(&id, "label"),
            serde_json::json!({"filename": "000002.jpg", "cx": 100.0, "cy": 50.0, "box": 20.0}),
        )
        .await;
    assert_status(saved, StatusCode::OK).await;

    let body = assert_status(app.get(&task_uri(&id, "frames")).await, StatusCode::OK).await;
    assert_eq!(body["labeled"], serde_json::json!(["000002.jpg"]));
}

#[tokio::test]
async fn test_frames_of_unknown_task_is_404() {
    let app = TestApp::new().await;
    let response = app.get("/labeler/api/task/2024-01-01/nope-1/frames").await;
    let body = assert_status(response, StatusCode::NOT_FOUND).await;
    assert!(body["detail"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_rejects_hidden_path_segments() {
    let app = TestApp::new().await;
    app.seed_task(1).await;
    let response = app.get("/labeler/api/task/2024-01-01/.exports/frames").await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_serves_frame_jpeg() {
    let app = TestApp::new().await;
    let id = app.seed_task(1).await;

    let response = app.get(&task_uri(&id, "frame/000001.jpg")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = body_bytes(response).await;
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

    let missing = app.get(&task_uri(&id, "frame/000009.jpg")).await;
    assert_status(missing, StatusCode::NOT_FOUND).await;

    let not_jpeg = app.get(&task_uri(&id, "frame/meta.json")).await;
    assert_status(not_jpeg, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn test_save_label_writes_yolo_line() {
    let app = TestApp::new().await;
    let id = app.seed_task(1).await;

    let response = app
        .post_json(
            &task_uri(&id, "label"),
            serde_json::json!({"filename": "000001.jpg", "cx": 100.0, "cy": 50.0, "box": 20.0}),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["saved"], "000001.txt");

    let path = app.state.tasks.labels_dir(&id).join("000001.txt");
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "0 0.500000 0.500000 0.100000 0.200000\n"
    );

    // Overwrites, and tiny boxes are raised to two pixels
    app.post_json(
        &task_uri(&id, "label"),
        serde_json::json!({"filename": "000001.jpg", "cx": 0.0, "cy": 100.0, "box": 0.5}),
    )
    .await;
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "0 0.000000 1.000000 0.010000 0.020000\n"
    );
}

#[tokio::test]
async fn test_label_click_outside_image_is_400() {
    let app = TestApp::new().await;
    let id = app.seed_task(1).await;

    let response = app
        .post_json(
            &task_uri(&id, "label"),
            serde_json::json!({"filename": "000001.jpg", "cx": 250.0, "cy": 50.0, "box": 20.0}),
        )
        .await;
    let body = assert_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["detail"].as_str().unwrap().contains("outside"));
    assert!(!app.state.tasks.labels_dir(&id).join("000001.txt").exists());
}

#[tokio::test]
async fn test_label_without_box_is_400_with_detail() {
    let app = TestApp::new().await;
    let id = app.seed_task(1).await;

    let response = app
        .post_json(
            &task_uri(&id, "label"),
            serde_json::json!({"filename": "000001.jpg", "cx": 10.0, "cy": 10.0}),
        )
        .await;
    assert_eq!(response.headers()["content-type"], "application/json");
    let body = assert_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["detail"].as_str().unwrap().contains("box"));
    assert!(!app.state.tasks.labels_dir(&id).join("000001.txt").exists());
}

#[tokio::test]
async fn test_label_unknown_frame_is_404() {
    let app = TestApp::new().await;
    let id = app.seed_task(1).await;

    let response = app
        .post_json(
            &task_uri(&id, "label"),
            serde_json::json!({"filename": "000042.jpg", "cx": 1.0, "cy": 1.0, "box": 20.0}),
        )
        .await;
    assert_status(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn test_skip_and_read_label_state() {
    let app = TestApp::new().await;
    let id = app.seed_task(2).await;

    let body = assert_status(app.get(&task_uri(&id, "label/000001.jpg")).await, StatusCode::OK).await;
    assert_eq!(body["filename"], "000001.jpg");
    assert_eq!(body["state"], "unlabeled");

    let skipped = app
        .post_json(&task_uri(&id, "skip"), serde_json::json!({"filename": "000001.jpg"}))
        .await;
    let body = assert_status(skipped, StatusCode::OK).await;
    assert_eq!(body["saved"], "000001.txt");
    assert_eq!(
        std::fs::read_to_string(app.state.tasks.labels_dir(&id).join("000001.txt")).unwrap(),
        ""
    );

    let body = assert_status(app.get(&task_uri(&id, "label/000001.jpg")).await, StatusCode::OK).await;
    assert_eq!(body["state"], "negative");

    app.post_json(
        &task_uri(&id, "label"),
        serde_json::json!({"filename": "000002.jpg", "cx": 50.0, "cy": 25.0, "box": 10.0}),
    )
    .await;
    let body = assert_status(app.get(&task_uri(&id, "label/000002.jpg")).await, StatusCode::OK).await;
    assert_eq!(body["state"], "ball");
    assert_eq!(body["label"]["class_id"], 0);
    assert_eq!(body["label"]["x"], 0.25);
}

#[tokio::test]
async fn test_export_yolo_dataset() {
    let app = TestApp::new().await;
    let id = app.seed_task(2).await;
    app.post_json(
        &task_uri(&id, "label"),
        serde_json::json!({"filename": "000001.jpg", "cx": 100.0, "cy": 50.0, "box": 20.0}),
    )
    .await;

    let response = app.get(&task_uri(&id, "export")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\""));
    assert!(disposition.ends_with(".zip\""));

    let bytes = body_bytes(response).await;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "dataset.yaml",
            "images/000001.jpg",
            "images/000002.jpg",
            "labels/000001.txt",
        ]
    );

    let mut yaml = String::new();
    archive.by_name("dataset.yaml").unwrap().read_to_string(&mut yaml).unwrap();
    assert!(yaml.contains("ball"));
}

#[tokio::test]
async fn test_export_without_frames_is_400() {
    let app = TestApp::new().await;
    let id = app.seed_task(0).await;
    assert_status(app.get(&task_uri(&id, "export")).await, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_upload_rejects_unsupported_extension() {
    let app = TestApp::new().await;
    let body = multipart_body(&[("file", Some("notes.txt"), "hello"), ("fps", None, "5")]);
    let response = app.post_multipart("/labeler/api/ingest/upload", body).await;
    let body = assert_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["detail"].as_str().unwrap().contains("Unsupported file type"));
    assert!(app.state.tasks.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_without_file_is_400() {
    let app = TestApp::new().await;
    let body = multipart_body(&[("fps", None, "5")]);
    let response = app.post_multipart("/labeler/api/ingest/upload", body).await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_upload_rejects_fps_out_of_range() {
    let app = TestApp::new().await;
    let body = multipart_body(&[("file", Some("rally.mp4"), "data"), ("fps", None, "120")]);
    let response = app.post_multipart("/labeler/api/ingest/upload", body).await;
    assert_status(response, StatusCode::BAD_REQUEST).await;

    // The staged upload is cleaned up
    let staging = app.labels_root().join(".uploads");
    let leftovers = std::fs::read_dir(&staging).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_youtube_rejects_bad_url_and_fps() {
    let app = TestApp::new().await;

    let response = app.post_form("/labeler/api/ingest/youtube", "url=ftp%3A%2F%2Fexample.com%2Fv").await;
    assert_status(response, StatusCode::BAD_REQUEST).await;

    let response = app
        .post_form(
            "/labeler/api/ingest/youtube",
            "url=https%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3Dabc&fps=0",
        )
        .await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
#[ignore = "requires ffprobe"]
async fn test_upload_unreadable_video_is_400() {
    let app = TestApp::new().await;
    let body = multipart_body(&[("file", Some("rally.mp4"), "not a video"), ("fps", None, "5")]);
    let response = app.post_multipart("/labeler/api/ingest/upload", body).await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
    assert!(app.state.tasks.list().await.unwrap().is_empty());
}
