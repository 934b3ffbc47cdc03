//! Application state.

use std::sync::Arc;

use tracing::{info, warn};

use ttball_analysis::AnalysisPipeline;
use ttball_media::{BallDetector, BallDetectorConfig, OnnxBallDetector};
use ttball_storage::{AdminStore, AnalysisStore, TaskStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub tasks: TaskStore,
    pub analyses: AnalysisStore,
    pub admin: AdminStore,
    /// `None` when the detector model could not be loaded; analysis requests
    /// then fail while everything else keeps working.
    pub pipeline: Option<AnalysisPipeline>,
}

impl AppState {
    /// Create application state, loading the ONNX ball detector from
    /// `config.model_path`.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let detector_config = BallDetectorConfig {
            model_path: config.model_path.clone(),
            input_size: config.model_input_size,
            ..Default::default()
        };

        let detector: Option<Arc<dyn BallDetector>> =
            match tokio::task::spawn_blocking(move || OnnxBallDetector::new(detector_config)).await? {
                Ok(d) => Some(Arc::new(d)),
                Err(e) => {
                    warn!(
                        model_path = %config.model_path.display(),
                        error = %e,
                        "Ball detector unavailable, analysis endpoints will fail"
                    );
                    None
                }
            };

        Self::with_detector(config, detector).await
    }

    /// Create application state around an already constructed detector.
    pub async fn with_detector(
        config: ApiConfig,
        detector: Option<Arc<dyn BallDetector>>,
    ) -> anyhow::Result<Self> {
        let tasks = TaskStore::new(&config.label_data_dir);
        let analyses = AnalysisStore::new(&config.analyzer_data_dir);
        tasks.ensure_root().await?;
        analyses.ensure_root().await?;

        info!(
            labeler_root = %config.label_data_dir.display(),
            analyzer_root = %config.analyzer_data_dir.display(),
            model_loaded = detector.is_some(),
            "Storage ready"
        );

        Ok(Self {
            admin: AdminStore::new(&config.label_data_dir, &config.analyzer_data_dir),
            tasks,
            analyses,
            pipeline: detector.map(AnalysisPipeline::new),
            config: Arc::new(config),
        })
    }

    pub fn model_loaded(&self) -> bool {
        self.pipeline.is_some()
    }
}
