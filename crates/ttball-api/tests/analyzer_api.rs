//! Analyzer endpoints that do not need ffmpeg or a detector model.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;

use ttball_models::analysis::files;
use ttball_models::Calibration;

const CORNERS: &str = r#"{"points": [[100, 100], [1100, 120], [1150, 600], [80, 620]]}"#;

fn corners() -> serde_json::Value {
    serde_json::from_str(CORNERS).unwrap()
}

#[tokio::test]
async fn test_health_reports_model_and_tools() {
    let app = TestApp::new().await;
    let body = assert_status(app.get("/analyzer/api/health").await, StatusCode::OK).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_loaded"], false);
    assert!(body["ffmpeg"].is_boolean());
    assert!(body["yt_dlp"].is_boolean());
}

#[tokio::test]
async fn test_list_analyses_newest_first() {
    let app = TestApp::new().await;
    let first = app.seed_analysis().await;

    let mut older = app.state.analyses.read_meta(&first).await.unwrap();
    older.created -= chrono::Duration::hours(1);
    app.state.analyses.write_meta(&older).await.unwrap();
    let second = app.seed_analysis().await;

    let body = assert_status(app.get("/analyzer/api/analyses").await, StatusCode::OK).await;
    let ids: Vec<&str> = body["analyses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["analysis_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.to_string(), first.to_string()]);
    assert_eq!(body["analyses"][0]["video_info"]["width"], 1280);
}

#[tokio::test]
async fn test_calibrate_stores_points() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;

    let response = app.post_json(&analysis_uri(&id, "calibrate"), corners()).await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["points"][1], serde_json::json!([1100.0, 120.0]));

    let stored = app.state.analyses.load_calibration(&id).await.unwrap().unwrap();
    assert_eq!(stored.img_pts[3], [80.0, 620.0]);
}

#[tokio::test]
async fn test_calibrate_requires_four_points() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;

    let response = app
        .post_json(
            &analysis_uri(&id, "calibrate"),
            serde_json::json!({"points": [[1, 1], [2, 2], [3, 3]]}),
        )
        .await;
    let body = assert_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["detail"].as_str().unwrap().contains("exactly 4 points"));
    assert!(app.state.analyses.load_calibration(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_calibrate_rejects_malformed_point() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;

    let response = app
        .post_json(
            &analysis_uri(&id, "calibrate"),
            serde_json::json!({"points": [[1, 1, 5], [2, 2], [3, 3], [4, 4]]}),
        )
        .await;
    assert_eq!(response.headers()["content-type"], "application/json");
    let body = assert_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["detail"].is_string());
    assert!(app.state.analyses.load_calibration(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_calibrate_rejects_points_outside_frame() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;

    let response = app
        .post_json(
            &analysis_uri(&id, "calibrate"),
            serde_json::json!({"points": [[100, 100], [1300, 120], [1150, 600], [80, 620]]}),
        )
        .await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn test_calibrate_unknown_analysis_is_404() {
    let app = TestApp::new().await;
    let response = app
        .post_json("/analyzer/api/analysis/2024-01-01/analysis-1/calibrate", corners())
        .await;
    assert_status(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn test_analyze_preconditions() {
    let app = TestApp::new().await;

    let missing = app
        .post_form("/analyzer/api/analysis/2024-01-01/analysis-1/analyze", "")
        .await;
    assert_status(missing, StatusCode::NOT_FOUND).await;

    let id = app.seed_analysis().await;
    let no_video = app.post_form(&analysis_uri(&id, "analyze"), "").await;
    assert_status(no_video, StatusCode::NOT_FOUND).await;

    std::fs::write(app.state.analyses.file_path(&id, "video.mp4"), "fake").unwrap();
    let no_calibration = app.post_form(&analysis_uri(&id, "analyze"), "").await;
    let body = assert_status(no_calibration, StatusCode::BAD_REQUEST).await;
    assert!(body["detail"].as_str().unwrap().contains("calibration missing"));

    let calibration = Calibration::from_points(&[[100.0, 100.0], [1100.0, 120.0], [1150.0, 600.0], [80.0, 620.0]]).unwrap();
    app.state.analyses.save_calibration(&id, &calibration).await.unwrap();
    let no_model = app.post_form(&analysis_uri(&id, "analyze"), "confidence=0.3").await;
    let body = assert_status(no_model, StatusCode::INTERNAL_SERVER_ERROR).await;
    assert!(body["detail"].as_str().unwrap().contains("model not loaded"));

    // A bare POST uses the default confidence and reaches the same check
    let bare = app.post_empty(&analysis_uri(&id, "analyze")).await;
    let body = assert_status(bare, StatusCode::INTERNAL_SERVER_ERROR).await;
    assert!(body["detail"].as_str().unwrap().contains("model not loaded"));

    let meta = app.state.analyses.read_meta(&id).await.unwrap();
    assert!(!meta.is_analyzed());
}

#[tokio::test]
async fn test_production_masks_internal_errors() {
    let app = TestApp::with_config(|c| c.environment = "Production".to_string()).await;
    let id = app.seed_analysis().await;
    std::fs::write(app.state.analyses.file_path(&id, "video.mp4"), "fake").unwrap();
    let calibration = Calibration::from_points(&[[100.0, 100.0], [1100.0, 120.0], [1150.0, 600.0], [80.0, 620.0]]).unwrap();
    app.state.analyses.save_calibration(&id, &calibration).await.unwrap();

    let response = app.post_form(&analysis_uri(&id, "analyze"), "confidence=0.3").await;
    let body = assert_status(response, StatusCode::INTERNAL_SERVER_ERROR).await;
    assert_eq!(body["detail"], "An internal error occurred");

    // Client errors keep their detail
    let response = app.post_form(&analysis_uri(&id, "analyze"), "confidence=2").await;
    let body = assert_status(response, StatusCode::BAD_REQUEST).await;
    assert_ne!(body["detail"], "An internal error occurred");
}

#[tokio::test]
async fn test_analyze_rejects_confidence_out_of_range() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;

    for value in ["0", "1.5", "-0.1"] {
        let response = app
            .post_form(&analysis_uri(&id, "analyze"), &format!("confidence={}", value))
            .await;
        assert_status(response, StatusCode::BAD_REQUEST).await;
    }
}

#[tokio::test]
async fn test_outputs_missing_are_404() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;
    for rest in ["heatmap", "csv", "preview", "summary"] {
        assert_status(app.get(&analysis_uri(&id, rest)).await, StatusCode::NOT_FOUND).await;
    }
}

#[tokio::test]
async fn test_serves_outputs() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;
    std::fs::write(app.state.analyses.file_path(&id, files::HEATMAP), b"\x89PNG").unwrap();
    std::fs::write(
        app.state.analyses.file_path(&id, files::BOUNCES_CSV),
        "frame,time_s,x_m,y_m,conf\n42,1.400,1.2346,0.5000,0.877\n",
    )
    .unwrap();
    std::fs::write(app.state.analyses.file_path(&id, files::SUMMARY), b"{\"bounce_count\":1}").unwrap();

    let heatmap = app.get(&analysis_uri(&id, "heatmap")).await;
    assert_eq!(heatmap.status(), StatusCode::OK);
    assert_eq!(heatmap.headers()[header::CONTENT_TYPE], "image/png");

    let csv = app.get(&analysis_uri(&id, "csv")).await;
    assert_eq!(csv.status(), StatusCode::OK);
    assert_eq!(
        csv.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"bounces.csv\""
    );
    let text = String::from_utf8(body_bytes(csv).await).unwrap();
    assert!(text.starts_with("frame,time_s,x_m,y_m,conf\n"));

    let summary = assert_status(app.get(&analysis_uri(&id, "summary")).await, StatusCode::OK).await;
    assert_eq!(summary["bounce_count"], 1);
}

#[tokio::test]
async fn test_preview_supports_range_requests() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;
    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    std::fs::write(app.state.analyses.file_path(&id, files::PREVIEW), &data).unwrap();

    let full = app.get(&analysis_uri(&id, "preview")).await;
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(full.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(full.headers()[header::ACCEPT_RANGES], "bytes");

    let request = Request::builder()
        .uri(analysis_uri(&id, "preview"))
        .header(header::RANGE, "bytes=100-199")
        .body(Body::empty())
        .unwrap();
    let partial = app.send(request).await;
    assert_eq!(partial.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(partial.headers()[header::CONTENT_RANGE], "bytes 100-199/4096");
    assert_eq!(body_bytes(partial).await, data[100..200].to_vec());
}

#[tokio::test]
async fn test_first_frame() {
    let app = TestApp::new().await;
    let id = app.seed_analysis().await;

    // No frame and no video to extract it from
    assert_status(app.get(&analysis_uri(&id, "frame")).await, StatusCode::NOT_FOUND).await;

    write_jpeg(&app.state.analyses.file_path(&id, files::FIRST_FRAME), 64, 36);
    let response = app.get(&analysis_uri(&id, "frame")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
}

#[tokio::test]
async fn test_upload_rejects_labeler_only_extension() {
    let app = TestApp::new().await;
    let body = multipart_body(&[("file", Some("rally.mkv"), "data")]);
    let response = app.post_multipart("/analyzer/api/upload", body).await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
    assert!(app.state.analyses.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_youtube_requires_http_url() {
    let app = TestApp::new().await;
    assert_status(app.post_form("/analyzer/api/youtube", "url=").await, StatusCode::BAD_REQUEST).await;
    assert_status(
        app.post_form("/analyzer/api/youtube", "url=www.youtube.com%2Fwatch").await,
        StatusCode::BAD_REQUEST,
    )
    .await;
}
