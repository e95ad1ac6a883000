//! Handlers for attestation ingestion.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/workflows/{workflow_id}/attestations` | Body: DSSE envelope; returns 201 + `{"digest": ...}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use referrer_core::{
  envelope::Envelope,
  service::ReferrerService,
  store::{MembershipRepository, ReferrerStore, WorkflowRepository},
};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
  pub digest: String,
}

/// `POST /workflows/{workflow_id}/attestations`
pub async fn ingest<R, W, M>(
  State(service): State<Arc<ReferrerService<R, W, M>>>,
  Path(workflow_id): Path<String>,
  Json(envelope): Json<Envelope>,
) -> Result<impl IntoResponse, ApiError>
where
  R: ReferrerStore,
  W: WorkflowRepository,
  M: MembershipRepository,
{
  let digest = service.extract_and_persist(&envelope, &workflow_id).await?;
  Ok((StatusCode::CREATED, Json(IngestResponse { digest })))
}
