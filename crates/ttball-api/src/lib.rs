//! Axum server for the table-tennis ball tools.
//!
//! One binary serves three sub-applications:
//! - `/labeler`: turn videos into frame tasks and click ball positions
//! - `/analyzer`: calibrate a table and compute a bounce heatmap
//! - `/admin`: inspect, download and clean up both data roots

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;
pub mod upload;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
