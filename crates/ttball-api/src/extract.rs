//! Request extractors.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::{Form, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use ttball_models::EntityId;

use crate::error::ApiError;

#[derive(Deserialize)]
struct IdSegments {
    day: String,
    name: String,
}

/// Task or analysis id taken from the `:day/:name` path segments.
///
/// Segments that could escape the data root are rejected with 400 before
/// any handler runs.
#[derive(Debug, Clone)]
pub struct EntityPath(pub EntityId);

#[async_trait]
impl<S> FromRequestParts<S> for EntityPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(segments) = Path::<IdSegments>::from_request_parts(parts, state).await?;
        Ok(EntityPath(EntityId::new(segments.day, segments.name)?))
    }
}

/// JSON body whose rejections answer with the API's `{"detail"}` errors.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Url-encoded form body with `{"detail"}` rejections.
#[derive(Debug)]
pub struct FormBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for FormBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state).await?;
        Ok(FormBody(value))
    }
}

/// Form body where a bare POST (no content type, no body) means
/// `T::default()`.
#[derive(Debug)]
pub struct OptionalForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for OptionalForm<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if req.headers().contains_key(CONTENT_TYPE) {
            let FormBody(value) = FormBody::<T>::from_request(req, state).await?;
            return Ok(OptionalForm(value));
        }
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        if body.is_empty() {
            Ok(OptionalForm(T::default()))
        } else {
            Err(ApiError::bad_request(
                "Expected an application/x-www-form-urlencoded body",
            ))
        }
    }
}

/// The `:filename` segment of frame and label routes.
#[derive(Debug, Deserialize)]
pub struct FileSegment {
    pub filename: String,
}
