//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use referrer_core::referrer::ReferrerKind;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// No caller identity on a path that needs one.
  #[error("unauthenticated: {0}")]
  Unauthenticated(String),

  #[error("forbidden")]
  Forbidden,

  #[error("referrer {digest} is ambiguous")]
  Ambiguous {
    digest:  String,
    kinds:   Vec<ReferrerKind>,
    message: String,
  },

  #[error("unprocessable: {0}")]
  Unprocessable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<referrer_core::Error> for ApiError {
  fn from(e: referrer_core::Error) -> Self {
    use referrer_core::Error as E;
    let message = e.to_string();
    match e {
      E::NotFound(m) => ApiError::NotFound(m),
      E::Unauthorized(_) => ApiError::Forbidden,
      E::AmbiguousReferrer { digest, kinds } => ApiError::Ambiguous { digest, kinds, message },
      E::DependentAttestationMissing { .. } => ApiError::Unprocessable(message),
      E::InvalidIdentifier(_)
      | E::Validation(_)
      | E::InvalidEnvelope(_)
      | E::InvalidPredicate(_)
      | E::MissingDigest(_) => ApiError::BadRequest(message),
      e @ (E::Serialization(_) | E::Store(_)) => ApiError::Store(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": "not found" })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Unauthenticated(m) => (StatusCode::UNAUTHORIZED, json!({ "error": m })),
      ApiError::Forbidden => (StatusCode::FORBIDDEN, json!({ "error": "forbidden" })),
      ApiError::Ambiguous { digest, kinds, message } => (
        StatusCode::CONFLICT,
        json!({ "error": message, "digest": digest, "kinds": kinds }),
      ),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": m })),
      ApiError::Store(e) => {
        error!(error = %e, "store failure");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          json!({ "error": "internal error" }),
        )
      }
    };
    (status, Json(body)).into_response()
  }
}
