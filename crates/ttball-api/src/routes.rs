//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::response::Redirect;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::handlers::{admin, analyzer, health, labeler};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, mask_internal_errors, security_headers, trace_request};
use crate::state::AppState;

/// Browser UI of one sub-application: `/` and `/static/*` from
/// `<static_dir>/<app>/`.
fn ui_routes(state: &AppState, app: &str) -> Router<AppState> {
    let dir = state.config.static_dir.join(app);
    Router::new()
        .route_service("/", ServeFile::new(dir.join("index.html")))
        .nest_service("/static", ServeDir::new(dir))
}

fn labeler_routes(state: &AppState) -> Router<AppState> {
    let api = Router::new()
        .route("/health", get(labeler::health))
        .route("/tasks", get(labeler::list_tasks))
        .route("/ingest/upload", post(labeler::ingest_upload))
        .route("/ingest/youtube", post(labeler::ingest_youtube))
        .route("/task/:day/:name/frames", get(labeler::get_frames))
        .route("/task/:day/:name/frame/:filename", get(labeler::get_frame))
        .route("/task/:day/:name/label/:filename", get(labeler::get_label))
        .route("/task/:day/:name/label", post(labeler::save_label))
        .route("/task/:day/:name/skip", post(labeler::skip_frame))
        .route("/task/:day/:name/export", get(labeler::export_task));

    ui_routes(state, "labeler").nest("/api", api)
}

fn analyzer_routes(state: &AppState) -> Router<AppState> {
    let api = Router::new()
        .route("/health", get(analyzer::health))
        .route("/upload", post(analyzer::upload))
        .route("/youtube", post(analyzer::youtube))
        .route("/analyses", get(analyzer::list_analyses))
        .route("/analysis/:day/:name/frame", get(analyzer::first_frame))
        .route("/analysis/:day/:name/calibrate", post(analyzer::calibrate))
        .route("/analysis/:day/:name/analyze", post(analyzer::analyze))
        .route("/analysis/:day/:name/heatmap", get(analyzer::heatmap))
        .route("/analysis/:day/:name/csv", get(analyzer::csv))
        .route("/analysis/:day/:name/preview", get(analyzer::preview))
        .route("/analysis/:day/:name/summary", get(analyzer::summary));

    ui_routes(state, "analyzer").nest("/api", api)
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    let api = Router::new()
        .route("/health", get(admin::health))
        .route("/stats", get(admin::stats))
        .route("/labeler/tasks", get(admin::list_tasks))
        .route("/labeler/task/:day/:name", delete(admin::delete_task))
        .route("/labeler/task/:day/:name/download", get(admin::download_task))
        .route("/analyzer/analyses", get(admin::list_analyses))
        .route("/analyzer/analysis/:day/:name", delete(admin::delete_analysis))
        .route(
            "/analyzer/analysis/:day/:name/download/:file_type",
            get(admin::download_analysis_file),
        )
        .route(
            "/analyzer/analysis/:day/:name/download-all",
            get(admin::download_analysis),
        )
        .route("/cleanup/old-tasks", post(admin::cleanup));

    ui_routes(state, "admin").nest("/api", api)
}

/// Create the API router.
///
/// Everything is mounted below `config.root_path`; when a prefix is set,
/// `GET /` redirects to it. The prefix itself redirects to the labeler.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let root_path = state.config.root_path.clone();
    let landing = format!("{}/labeler", root_path);

    let app = Router::new()
        .route("/", get(move || async move { Redirect::temporary(&landing) }))
        .nest("/labeler", labeler_routes(&state))
        .nest("/analyzer", analyzer_routes(&state))
        .nest("/admin", admin_routes(&state))
        .route("/health", get(health))
        .merge(metrics_routes);

    let app = if root_path.is_empty() {
        app
    } else {
        let target = root_path.clone();
        Router::new()
            .nest(&root_path, app)
            .route("/", get(move || async move { Redirect::temporary(&target) }))
    };

    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), mask_internal_errors))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(trace_request))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
