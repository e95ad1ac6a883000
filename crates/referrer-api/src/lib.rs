//! JSON REST API for the referrer graph engine.
//!
//! Exposes an axum [`Router`] backed by a [`ReferrerService`]. Authentication,
//! TLS, and transport concerns are the caller's responsibility; the private
//! lookup path trusts the `x-user-id` header set by the layer in front.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", referrer_api::api_router(service.clone()))
//! ```

pub mod attestations;
pub mod caller;
pub mod error;
pub mod referrers;
pub mod view;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use referrer_core::{
  service::ReferrerService,
  store::{MembershipRepository, ReferrerStore, WorkflowRepository},
};

pub use error::ApiError;

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<R, W, M>(service: Arc<ReferrerService<R, W, M>>) -> Router<()>
where
  R: ReferrerStore + 'static,
  W: WorkflowRepository + 'static,
  M: MembershipRepository + 'static,
{
  Router::new()
    .route(
      "/workflows/{workflow_id}/attestations",
      post(attestations::ingest::<R, W, M>),
    )
    .route("/referrers/{digest}", get(referrers::get_private::<R, W, M>))
    .route("/discover/{digest}", get(referrers::discover::<R, W, M>))
    .with_state(service)
}
