//! The storage traits and their query filters.
//!
//! [`ReferrerStore`] is implemented by storage backends (e.g.
//! `referrer-store-sqlite`). [`WorkflowRepository`] and
//! [`MembershipRepository`] are the narrow views the engine needs of data it
//! does not own. Higher layers depend on these abstractions, not on any
//! concrete backend.
//!
//! Backend errors must convert into [`crate::Error`] without losing their kind,
//! so that e.g. an ambiguity raised by a store reaches the caller as
//! [`crate::Error::AmbiguousReferrer`].

use std::future::Future;

use uuid::Uuid;

use crate::{
  referrer::{Referrer, ReferrerKind, StoredReferrer},
  tenancy::{Membership, Workflow},
};

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Parameters for [`ReferrerStore::exist`].
#[derive(Debug, Clone, Default)]
pub struct ExistFilter {
  pub kind: Option<ReferrerKind>,
}

/// Parameters for [`ReferrerStore::get_from_root`].
#[derive(Debug, Clone, Default)]
pub struct RootFilter {
  /// Disambiguates digests stored under several kinds.
  pub kind:        Option<ReferrerKind>,
  /// Only consider nodes introduced through a public workflow.
  pub public_only: bool,
}

impl RootFilter {
  pub fn with_kind(mut self, kind: Option<ReferrerKind>) -> Self {
    self.kind = kind;
    self
  }

  pub fn public_only(mut self) -> Self {
    self.public_only = true;
    self
  }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Abstraction over a referrer graph backend.
///
/// Writes are append-only: nodes and edges are created, never updated or
/// deleted. All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ReferrerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  /// Persist `referrers` and their edges, associating every node with
  /// `workflow_id`.
  ///
  /// Nodes are found or created by `(digest, kind)`; an existing node is
  /// never modified. The whole batch is atomic.
  fn save<'a>(
    &'a self,
    referrers: &'a [Referrer],
    workflow_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Whether any node with `digest` exists, regardless of tenancy.
  fn exist<'a>(
    &'a self,
    digest: &'a str,
    filter: &'a ExistFilter,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Fetch the node for `digest` visible to `org_ids`, with its direct
  /// neighbours.
  ///
  /// Returns `None` if no visible node matches. Fails with an ambiguity error
  /// when several kinds match and `filter.kind` is unset. An empty `org_ids`
  /// sees nothing.
  fn get_from_root<'a>(
    &'a self,
    digest: &'a str,
    org_ids: &'a [Uuid],
    filter: &'a RootFilter,
  ) -> impl Future<Output = Result<Option<StoredReferrer>, Self::Error>> + Send + 'a;
}

/// Read access to workflows.
pub trait WorkflowRepository: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  /// Returns `None` if the workflow does not exist.
  fn find_workflow(
    &self,
    workflow_id: Uuid,
  ) -> impl Future<Output = Result<Option<Workflow>, Self::Error>> + Send + '_;
}

/// Read access to organisation memberships.
pub trait MembershipRepository: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  fn find_memberships_by_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Membership>, Self::Error>> + Send + '_;
}
