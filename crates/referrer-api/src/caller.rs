//! Caller identity extractor.
//!
//! Authentication happens in front of this service. The upstream layer asserts
//! who the caller is through the `x-user-id` header; this crate only reads it.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The user a request is made on behalf of. Not yet validated as a UUID.
pub struct Caller(pub String);

impl<S> FromRequestParts<S> for Caller
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let value = parts
      .headers
      .get(USER_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;
    Ok(Caller(value.to_owned()))
  }
}
