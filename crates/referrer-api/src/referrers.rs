//! Handlers for referrer lookups.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/referrers/{digest}` | Requires `x-user-id`; optional `?kind=` |
//! | `GET`  | `/discover/{digest}` | Public shared index; optional `?kind=` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use referrer_core::{
  service::ReferrerService,
  store::{MembershipRepository, ReferrerStore, WorkflowRepository},
};
use serde::Deserialize;

use crate::{caller::Caller, error::ApiError, view::ReferrerView};

#[derive(Debug, Deserialize)]
pub struct LookupParams {
  /// Disambiguates a digest stored under several kinds, e.g. `sbom_spdx_json`.
  pub kind: Option<String>,
}

/// `GET /referrers/{digest}[?kind=...]`
pub async fn get_private<R, W, M>(
  State(service): State<Arc<ReferrerService<R, W, M>>>,
  Caller(user_id): Caller,
  Path(digest): Path<String>,
  Query(params): Query<LookupParams>,
) -> Result<Json<ReferrerView>, ApiError>
where
  R: ReferrerStore,
  W: WorkflowRepository,
  M: MembershipRepository,
{
  let referrer = service
    .get_from_root_user(&digest, params.kind.as_deref(), &user_id)
    .await?;
  Ok(Json(referrer.into()))
}

/// `GET /discover/{digest}[?kind=...]`
pub async fn discover<R, W, M>(
  State(service): State<Arc<ReferrerService<R, W, M>>>,
  Path(digest): Path<String>,
  Query(params): Query<LookupParams>,
) -> Result<Json<ReferrerView>, ApiError>
where
  R: ReferrerStore,
  W: WorkflowRepository,
  M: MembershipRepository,
{
  let referrer = service
    .get_from_root_in_public_shared_index(&digest, params.kind.as_deref())
    .await?;
  Ok(Json(referrer.into()))
}
