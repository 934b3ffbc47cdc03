//! File responses.

use std::path::Path;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{ApiError, ApiResult};

/// Serve a file from disk with an explicit content type.
///
/// Goes through `ServeFile`, so `Range`, `If-Modified-Since` and `HEAD`
/// requests behave as for static files. With `download_name` the response
/// carries an attachment `Content-Disposition`.
pub async fn serve_file(
    path: &Path,
    content_type: &'static str,
    download_name: Option<&str>,
    request: Request,
) -> ApiResult<Response> {
    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(r) => r,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);

    if response.status().is_success() {
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(name) = download_name {
            let value = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name))
                .map_err(|_| ApiError::internal(format!("Invalid download name: {}", name)))?;
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
    } else if response.status() == axum::http::StatusCode::NOT_FOUND {
        return Err(ApiError::not_found(format!("File {}", path.display())));
    }

    Ok(response)
}
