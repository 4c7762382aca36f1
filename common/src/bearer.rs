//! Bearer-token extraction for the handful of endpoints authorized via an
//! `Authorization: Bearer <envelope>` header rather than a JSON body token
//! (account/transaction reads, sealed bid listing, asset upload).

use crate::error::{ErrorCode, ServiceError};
use axum::http::HeaderMap;

pub fn extract(headers: &HeaderMap) -> Result<String, ServiceError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| ServiceError::new(ErrorCode::Forbidden, "missing Authorization header"))?
        .to_str()
        .map_err(|_| ServiceError::new(ErrorCode::Forbidden, "Authorization header is not valid UTF-8"))?;

    value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| {
            ServiceError::new(ErrorCode::Forbidden, "Authorization header must be a Bearer token")
        })
}
