//! Shared helpers for the HTTP-level tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use ttball_api::{create_router, ApiConfig, AppState};
use ttball_models::{AnalysisMeta, EntityId, IngestSource, TaskMeta, VideoSummary};

pub const BOUNDARY: &str = "ttball-test-boundary";

/// Router over fresh temporary data roots, without a detector model.
pub struct TestApp {
    pub tmp: TempDir,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut ApiConfig)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = ApiConfig {
            label_data_dir: tmp.path().join("labels"),
            analyzer_data_dir: tmp.path().join("analyzer"),
            static_dir: tmp.path().join("static"),
            model_path: tmp.path().join("missing.onnx"),
            ..ApiConfig::default()
        };
        customize(&mut config);

        let state = AppState::with_detector(config, None).await.unwrap();
        let router = create_router(state.clone(), None);
        Self { tmp, state, router }
    }

    pub fn labels_root(&self) -> PathBuf {
        self.tmp.path().join("labels")
    }

    pub fn analyzer_root(&self) -> PathBuf {
        self.tmp.path().join("analyzer")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> Response {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_form(&self, uri: &str, body: &str) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// POST with neither a body nor a content type.
    pub async fn post_empty(&self, uri: &str) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_multipart(&self, uri: &str, body: Vec<u8>) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// A labeling task with `frames` generated 200x100 JPEG frames.
    pub async fn seed_task(&self, frames: u32) -> EntityId {
        let id = self.state.tasks.create(Some("rally")).await.unwrap();
        let frames_dir = self.state.tasks.frames_dir(&id);
        for i in 1..=frames {
            write_jpeg(&frames_dir.join(format!("{:06}.jpg", i)), 200, 100);
        }
        let mut meta = TaskMeta::from_upload("rally.mp4", 5);
        meta.frames = Some(frames);
        self.state.tasks.write_meta(&id, &meta).await.unwrap();
        std::fs::write(self.state.tasks.task_dir(&id).join("video.mp4"), b"fake video").unwrap();
        id
    }

    /// An analysis of a 1280x720 video, without calibration.
    pub async fn seed_analysis(&self) -> EntityId {
        let id = self.state.analyses.create().await.unwrap();
        let info = VideoSummary {
            width: 1280,
            height: 720,
            fps: 30.0,
            duration: 10.0,
            frame_count: 300,
        };
        let meta = AnalysisMeta::new(id.clone(), IngestSource::Upload, Some("match.mp4".into()), None, info);
        self.state.analyses.write_meta(&meta).await.unwrap();
        id
    }
}

pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 90, 160]));
    img.save(path).unwrap();
}

/// Multipart body from `(name, filename, contents)` parts.
pub fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, f
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn assert_status(response: Response, expected: StatusCode) -> serde_json::Value {
    let status = response.status();
    let bytes = body_bytes(response).await;
    assert_eq!(
        status,
        expected,
        "unexpected status, body: {}",
        String::from_utf8_lossy(&bytes)
    );
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

pub fn task_uri(id: &EntityId, rest: &str) -> String {
    format!("/labeler/api/task/{}/{}/{}", id.day(), id.name(), rest)
}

pub fn analysis_uri(id: &EntityId, rest: &str) -> String {
    format!("/analyzer/api/analysis/{}/{}/{}", id.day(), id.name(), rest)
}
