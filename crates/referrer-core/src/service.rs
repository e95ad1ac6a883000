//! The referrer use cases: ingestion and the two query paths.
//!
//! Identifiers are validated before any I/O. A node that does not exist and a
//! node the caller may not see produce the same [`Error::NotFound`].

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  builder::build_referrers,
  config::SharedIndexConfig,
  digest,
  envelope::Envelope,
  referrer::{ReferrerKind, StoredReferrer},
  store::{ExistFilter, MembershipRepository, ReferrerStore, RootFilter, WorkflowRepository},
};

/// Orchestrates extraction, graph building, and storage.
pub struct ReferrerService<R, W, M> {
  referrers:    Arc<R>,
  workflows:    Arc<W>,
  memberships:  Arc<M>,
  shared_index: Option<Vec<Uuid>>,
}

impl<R, W, M> ReferrerService<R, W, M>
where
  R: ReferrerStore,
  W: WorkflowRepository,
  M: MembershipRepository,
{
  /// Fails if `shared_index` is enabled but misconfigured.
  pub fn new(
    referrers: Arc<R>,
    workflows: Arc<W>,
    memberships: Arc<M>,
    shared_index: &SharedIndexConfig,
  ) -> Result<Self> {
    let allowed_orgs = shared_index.validate()?;
    Ok(Self {
      referrers,
      workflows,
      memberships,
      shared_index: shared_index.enabled.then_some(allowed_orgs),
    })
  }

  // ── Ingestion ─────────────────────────────────────────────────────────────

  /// Index the referrers of `envelope` under `workflow_id` and return the
  /// attestation digest.
  ///
  /// Attestations referenced as materials must have been ingested before;
  /// otherwise this fails with [`Error::DependentAttestationMissing`] and
  /// nothing is written.
  #[tracing::instrument(skip(self, envelope))]
  pub async fn extract_and_persist(
    &self,
    envelope: &Envelope,
    workflow_id: &str,
  ) -> Result<String> {
    let workflow_id = parse_uuid("workflow", workflow_id)?;
    let workflow = self
      .workflows
      .find_workflow(workflow_id)
      .await
      .map_err(into_core)?
      .ok_or_else(|| Error::NotFound(format!("workflow {workflow_id}")))?;

    let graph = build_referrers(envelope)?;

    let attestations_only = ExistFilter { kind: Some(ReferrerKind::Attestation) };
    for dependency in &graph.dependencies {
      let exists = self
        .referrers
        .exist(&dependency.digest, &attestations_only)
        .await
        .map_err(into_core)?;
      if !exists {
        warn!(dependency = %dependency.digest, "rejecting attestation with unknown dependency");
        return Err(Error::DependentAttestationMissing {
          digest: dependency.digest.clone(),
        });
      }
    }

    self
      .referrers
      .save(&graph.referrers, workflow.workflow_id)
      .await
      .map_err(into_core)?;

    info!(
      digest = %graph.root.digest,
      org_id = %workflow.org_id,
      nodes = graph.referrers.len(),
      "persisted referrers"
    );
    Ok(graph.root.digest)
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  /// Private path: scoped to every organisation `user_id` belongs to.
  #[tracing::instrument(skip(self))]
  pub async fn get_from_root_user(
    &self,
    digest: &str,
    kind_hint: Option<&str>,
    user_id: &str,
  ) -> Result<StoredReferrer> {
    let digest = digest::parse(digest)?;
    let kind = parse_kind_hint(kind_hint)?;
    let user_id = parse_uuid("user", user_id)?;

    let org_ids: Vec<Uuid> = self
      .memberships
      .find_memberships_by_user(user_id)
      .await
      .map_err(into_core)?
      .into_iter()
      .map(|m| m.org_id)
      .collect();

    self
      .lookup(&digest, &org_ids, RootFilter::default().with_kind(kind))
      .await
  }

  /// Lookup scoped to an explicit set of organisations.
  #[tracing::instrument(skip(self))]
  pub async fn get_from_root(
    &self,
    digest: &str,
    kind_hint: Option<&str>,
    org_ids: &[Uuid],
  ) -> Result<StoredReferrer> {
    let digest = digest::parse(digest)?;
    let kind = parse_kind_hint(kind_hint)?;
    self
      .lookup(&digest, org_ids, RootFilter::default().with_kind(kind))
      .await
  }

  /// Unauthenticated discovery path.
  ///
  /// Only nodes of allow-listed organisations that were introduced through a
  /// public workflow are visible.
  #[tracing::instrument(skip(self))]
  pub async fn get_from_root_in_public_shared_index(
    &self,
    digest: &str,
    kind_hint: Option<&str>,
  ) -> Result<StoredReferrer> {
    let Some(allowed_orgs) = &self.shared_index else {
      return Err(Error::Unauthorized("shared referrer index is not enabled".to_owned()));
    };
    let digest = digest::parse(digest)?;
    let kind = parse_kind_hint(kind_hint)?;
    self
      .lookup(
        &digest,
        allowed_orgs,
        RootFilter::default().with_kind(kind).public_only(),
      )
      .await
  }

  pub fn shared_index_enabled(&self) -> bool { self.shared_index.is_some() }

  async fn lookup(
    &self,
    digest: &str,
    org_ids: &[Uuid],
    filter: RootFilter,
  ) -> Result<StoredReferrer> {
    let found = self
      .referrers
      .get_from_root(digest, org_ids, &filter)
      .await
      .map_err(into_core);

    match found {
      Ok(Some(referrer)) => Ok(referrer),
      Ok(None) => Err(Error::NotFound(format!("referrer {digest}"))),
      Err(e) => {
        if e.is_ambiguous() {
          debug!(%digest, "ambiguous referrer lookup");
        }
        Err(e)
      }
    }
  }
}

fn into_core<E: Into<Error>>(e: E) -> Error { e.into() }

fn parse_uuid(what: &str, value: &str) -> Result<Uuid> {
  Uuid::parse_str(value.trim())
    .map_err(|e| Error::InvalidIdentifier(format!("{what} id {value:?}: {e}")))
}

fn parse_kind_hint(hint: Option<&str>) -> Result<Option<ReferrerKind>> {
  match hint.map(str::trim) {
    None | Some("") => Ok(None),
    Some(kind) => kind.parse().map(Some),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_kind_hint_means_no_filter() {
    assert_eq!(parse_kind_hint(None).unwrap(), None);
    assert_eq!(parse_kind_hint(Some(" ")).unwrap(), None);
    assert_eq!(
      parse_kind_hint(Some("sarif")).unwrap(),
      Some(ReferrerKind::Sarif)
    );
  }

  #[test]
  fn malformed_uuid_is_invalid_identifier() {
    assert!(matches!(
      parse_uuid("user", "not-a-uuid"),
      Err(Error::InvalidIdentifier(_))
    ));
  }
}
