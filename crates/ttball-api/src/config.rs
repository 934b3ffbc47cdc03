//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Optional path prefix every route is mounted under (e.g. `/ball`)
    pub root_path: String,
    /// Labeling task root
    pub label_data_dir: PathBuf,
    /// Analysis root
    pub analyzer_data_dir: PathBuf,
    /// Browser UIs (`labeler/`, `analyzer/`, `admin/` below it)
    pub static_dir: PathBuf,
    /// ONNX export of the ball detector
    pub model_path: PathBuf,
    /// Square model input size
    pub model_input_size: u32,
    /// Longest video accepted by the labeler (seconds)
    pub labeler_max_duration_secs: f64,
    /// Longest video accepted by the analyzer (seconds)
    pub analyzer_max_duration_secs: f64,
    /// Upper bound for one analysis run
    pub analysis_timeout: Duration,
    /// Max request body size (uploads)
    pub max_upload_bytes: usize,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Environment (development/production)
    pub environment: String,
    /// Serve Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            root_path: String::new(),
            label_data_dir: PathBuf::from("./data/labels"),
            analyzer_data_dir: PathBuf::from("./data/analyzer"),
            static_dir: PathBuf::from("./static"),
            model_path: PathBuf::from("models/ball/best.onnx"),
            model_input_size: 640,
            labeler_max_duration_secs: 1800.0,
            analyzer_max_duration_secs: 120.0,
            analysis_timeout: Duration::from_secs(300),
            max_upload_bytes: 2 * 1024 * 1024 * 1024, // 2GB
            cors_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            metrics_enabled: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            root_path: normalize_root_path(&std::env::var("APP_ROOT_PATH").unwrap_or_default()),
            label_data_dir: std::env::var("LABEL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.label_data_dir),
            analyzer_data_dir: std::env::var("ANALYZER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.analyzer_data_dir),
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            model_path: std::env::var("BALL_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            model_input_size: env_parse("MODEL_INPUT_SIZE").unwrap_or(defaults.model_input_size),
            labeler_max_duration_secs: env_parse("LABELER_MAX_DURATION_SECS")
                .unwrap_or(defaults.labeler_max_duration_secs),
            analyzer_max_duration_secs: env_parse("ANALYZER_MAX_DURATION_SECS")
                .unwrap_or(defaults.analyzer_max_duration_secs),
            analysis_timeout: env_parse("ANALYSIS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.analysis_timeout),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }
}

/// `"/ball/"` -> `"/ball"`, `"ball"` -> `"/ball"`, `"/"` -> `""`.
pub fn normalize_root_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
