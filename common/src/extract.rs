//! A `Json` extractor wrapper that reports axum's built-in rejections in the
//! service's own error envelope shape instead of axum's default plain-text
//! body, preserving the fixed check order of spec section 6.2/4.3: media
//! type before body size before JSON parse.

use crate::error::{ErrorCode, ServiceError};
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;

pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => {
                let err = if rejection.status() == axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE {
                    ServiceError::new(
                        ErrorCode::UnsupportedMediaType,
                        "request body must be application/json",
                    )
                } else if rejection.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
                    ServiceError::new(ErrorCode::PayloadTooLarge, "request body exceeds the configured limit")
                } else {
                    ServiceError::new(ErrorCode::InvalidJson, "request body is not valid JSON")
                };
                Err(err.into_response())
            }
        }
    }
}
