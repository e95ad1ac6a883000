//! Integration tests for `SqliteStore` against an in-memory database.

use referrer_core::{
  referrer::{Referrer, ReferrerKey, ReferrerKind},
  store::{ExistFilter, MembershipRepository, ReferrerStore, RootFilter, WorkflowRepository},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

const ATT: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
const IMG: &str = "sha256:2222222222222222222222222222222222222222222222222222222222222222";
const SBOM: &str = "sha256:3333333333333333333333333333333333333333333333333333333333333333";

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// A store with one organisation and one private workflow in it.
async fn seeded() -> (SqliteStore, Uuid, Uuid) {
  let s = store().await;
  let org = s.add_organization("acme").await.unwrap();
  let wf = s.add_workflow(org.org_id, "build", false).await.unwrap();
  (s, org.org_id, wf.workflow_id)
}

fn key(digest: &str, kind: ReferrerKind) -> ReferrerKey { ReferrerKey::new(digest, kind) }

/// Attestation `ATT` pointing at an image and an SBOM, with back-edges.
fn small_graph() -> Vec<Referrer> {
  let att_key = key(ATT, ReferrerKind::Attestation);
  let img_key = key(IMG, ReferrerKind::ContainerImage);
  let sbom_key = key(SBOM, ReferrerKind::SbomCyclonedxJson);

  let mut att = Referrer::new(att_key.clone(), true);
  att.metadata.insert("name".into(), "build".into());
  att.annotations.insert("branch".into(), "main".into());
  att.references = vec![img_key.clone(), sbom_key.clone()];

  let mut img = Referrer::new(img_key, false);
  img.references = vec![att_key.clone()];

  let mut sbom = Referrer::new(sbom_key, true);
  sbom.references = vec![att_key];

  vec![att, img, sbom]
}

// ─── Tenancy ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn workflow_round_trip() {
  let (s, org_id, wf_id) = seeded().await;

  let wf = s.find_workflow(wf_id).await.unwrap().expect("workflow");
  assert_eq!(wf.org_id, org_id);
  assert_eq!(wf.name, "build");
  assert!(!wf.public);

  assert!(s.find_workflow(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn workflow_requires_organization() {
  let s = store().await;
  let missing = Uuid::new_v4();
  let err = s.add_workflow(missing, "build", true).await.unwrap_err();
  assert!(matches!(err, Error::OrganizationNotFound(id) if id == missing));
}

#[tokio::test]
async fn set_workflow_public_flips_flag() {
  let (s, _, wf_id) = seeded().await;
  s.set_workflow_public(wf_id, true).await.unwrap();
  assert!(s.find_workflow(wf_id).await.unwrap().unwrap().public);

  let err = s.set_workflow_public(Uuid::new_v4(), true).await.unwrap_err();
  assert!(matches!(err, Error::WorkflowNotFound(_)));
}

#[tokio::test]
async fn memberships_by_user() {
  let s = store().await;
  let a = s.add_organization("a").await.unwrap();
  let b = s.add_organization("b").await.unwrap();
  let user = Uuid::new_v4();
  s.add_membership(user, a.org_id).await.unwrap();
  s.add_membership(user, b.org_id).await.unwrap();
  s.add_membership(Uuid::new_v4(), a.org_id).await.unwrap();

  let orgs: Vec<Uuid> = s
    .find_memberships_by_user(user)
    .await
    .unwrap()
    .into_iter()
    .map(|m| m.org_id)
    .collect();
  assert_eq!(orgs.len(), 2);
  assert!(orgs.contains(&a.org_id) && orgs.contains(&b.org_id));

  assert!(s.find_memberships_by_user(Uuid::new_v4()).await.unwrap().is_empty());
}

// ─── Save / read ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_and_read_one_level() {
  let (s, org_id, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();

  let root = s
    .get_from_root(ATT, &[org_id], &RootFilter::default())
    .await
    .unwrap()
    .expect("root visible");

  assert_eq!(root.kind, ReferrerKind::Attestation);
  assert!(root.downloadable);
  assert_eq!(root.metadata.get("name").map(String::as_str), Some("build"));
  assert_eq!(root.annotations.get("branch").map(String::as_str), Some("main"));
  assert_eq!(root.org_ids, vec![org_id]);
  assert_eq!(root.workflow_ids, vec![wf_id]);
  assert!(!root.in_public_workflow);

  let kinds: Vec<_> = root.references.iter().map(|r| r.kind.clone()).collect();
  assert_eq!(
    kinds,
    vec![ReferrerKind::ContainerImage, ReferrerKind::SbomCyclonedxJson]
  );
  assert!(root.references.iter().all(|r| r.references.is_empty()));

  // The back-edge makes the attestation reachable from the image.
  let img = s
    .get_from_root(IMG, &[org_id], &RootFilter::default())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(img.references.len(), 1);
  assert_eq!(img.references[0].digest, ATT);
}

#[tokio::test]
async fn resave_is_idempotent() {
  let (s, org_id, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();
  let first = s
    .get_from_root(ATT, &[org_id], &RootFilter::default())
    .await
    .unwrap()
    .unwrap();

  s.save(&small_graph(), wf_id).await.unwrap();
  let second = s
    .get_from_root(ATT, &[org_id], &RootFilter::default())
    .await
    .unwrap()
    .unwrap();

  assert_eq!(first.id, second.id);
  assert_eq!(first.created_at, second.created_at);
  assert_eq!(second.references.len(), 2);
  assert_eq!(second.workflow_ids, vec![wf_id]);
}

#[tokio::test]
async fn existing_node_is_not_overwritten() {
  let (s, org_id, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();

  let mut changed = Referrer::new(key(IMG, ReferrerKind::ContainerImage), true);
  changed.references = vec![key(ATT, ReferrerKind::Attestation)];
  s.save(&[changed], wf_id).await.unwrap();

  let img = s
    .get_from_root(IMG, &[org_id], &RootFilter::default())
    .await
    .unwrap()
    .unwrap();
  assert!(!img.downloadable);
}

#[tokio::test]
async fn second_workflow_adds_association() {
  let (s, org_id, wf_id) = seeded().await;
  let other_org = s.add_organization("globex").await.unwrap();
  let other_wf = s.add_workflow(other_org.org_id, "ci", true).await.unwrap();

  s.save(&small_graph(), wf_id).await.unwrap();
  s.save(&small_graph(), other_wf.workflow_id).await.unwrap();

  let root = s
    .get_from_root(ATT, &[org_id], &RootFilter::default())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(root.org_ids.len(), 2);
  assert_eq!(root.workflow_ids.len(), 2);
  assert!(root.in_public_workflow);
}

#[tokio::test]
async fn save_to_unknown_workflow_fails() {
  let s = store().await;
  let missing = Uuid::new_v4();
  let err = s.save(&small_graph(), missing).await.unwrap_err();
  assert!(matches!(err, Error::WorkflowNotFound(id) if id == missing));
  assert!(!s.exist(ATT, &ExistFilter::default()).await.unwrap());
}

#[tokio::test]
async fn dangling_reference_rolls_back() {
  let (s, _, wf_id) = seeded().await;
  let mut att = Referrer::new(key(ATT, ReferrerKind::Attestation), true);
  att.references = vec![key(IMG, ReferrerKind::ContainerImage)];

  let err = s.save(&[att], wf_id).await.unwrap_err();
  assert!(matches!(err, Error::DanglingReference(_)));
  assert!(!s.exist(ATT, &ExistFilter::default()).await.unwrap());
}

#[tokio::test]
async fn edge_to_previously_stored_node() {
  let (s, org_id, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();

  let next = "sha256:4444444444444444444444444444444444444444444444444444444444444444";
  let mut att = Referrer::new(key(next, ReferrerKind::Attestation), true);
  att.references = vec![key(ATT, ReferrerKind::Attestation)];
  s.save(&[att], wf_id).await.unwrap();

  let root = s
    .get_from_root(next, &[org_id], &RootFilter::default())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(root.references.len(), 1);
  assert_eq!(root.references[0].digest, ATT);
}

// ─── Exist ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn exist_honours_kind_filter() {
  let (s, _, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();

  assert!(s.exist(IMG, &ExistFilter::default()).await.unwrap());
  assert!(
    s.exist(IMG, &ExistFilter { kind: Some(ReferrerKind::ContainerImage) })
      .await
      .unwrap()
  );
  assert!(
    !s.exist(IMG, &ExistFilter { kind: Some(ReferrerKind::Attestation) })
      .await
      .unwrap()
  );
  assert!(
    !s.exist("sha256:ffff", &ExistFilter::default())
      .await
      .unwrap()
  );
}

// ─── Visibility and ambiguity ────────────────────────────────────────────────

#[tokio::test]
async fn no_orgs_sees_nothing() {
  let (s, _, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();

  let found = s
    .get_from_root(ATT, &[], &RootFilter::default())
    .await
    .unwrap();
  assert!(found.is_none());
}

#[tokio::test]
async fn other_org_sees_nothing() {
  let (s, _, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();

  let found = s
    .get_from_root(ATT, &[Uuid::new_v4()], &RootFilter::default())
    .await
    .unwrap();
  assert!(found.is_none());
}

#[tokio::test]
async fn public_only_requires_public_workflow() {
  let (s, org_id, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();

  let filter = RootFilter::default().public_only();
  assert!(s.get_from_root(ATT, &[org_id], &filter).await.unwrap().is_none());

  s.set_workflow_public(wf_id, true).await.unwrap();
  let root = s.get_from_root(ATT, &[org_id], &filter).await.unwrap().unwrap();
  assert!(root.in_public_workflow);
  assert_eq!(root.references.len(), 2);
}

#[tokio::test]
async fn neighbours_follow_visibility() {
  let s = store().await;
  let a = s.add_organization("a").await.unwrap();
  let b = s.add_organization("b").await.unwrap();
  let wf_a = s.add_workflow(a.org_id, "a", false).await.unwrap();
  let wf_b = s.add_workflow(b.org_id, "b", false).await.unwrap();

  // Org A indexes only the image; org B links an attestation to it.
  s.save(
    &[Referrer::new(key(IMG, ReferrerKind::ContainerImage), false)],
    wf_a.workflow_id,
  )
  .await
  .unwrap();
  s.save(&small_graph(), wf_b.workflow_id).await.unwrap();

  let img = s
    .get_from_root(IMG, &[a.org_id], &RootFilter::default())
    .await
    .unwrap()
    .unwrap();
  assert!(img.references.is_empty());

  let img = s
    .get_from_root(IMG, &[b.org_id], &RootFilter::default())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(img.references.len(), 1);
}

#[tokio::test]
async fn ambiguous_digest_needs_kind() {
  let (s, org_id, wf_id) = seeded().await;
  s.save(
    &[
      Referrer::new(key(SBOM, ReferrerKind::Artifact), true),
      Referrer::new(key(SBOM, ReferrerKind::SbomCyclonedxJson), true),
    ],
    wf_id,
  )
  .await
  .unwrap();

  let err = s
    .get_from_root(SBOM, &[org_id], &RootFilter::default())
    .await
    .unwrap_err();
  match referrer_core::Error::from(err) {
    referrer_core::Error::AmbiguousReferrer { digest, kinds } => {
      assert_eq!(digest, SBOM);
      assert_eq!(
        kinds,
        vec![ReferrerKind::Artifact, ReferrerKind::SbomCyclonedxJson]
      );
    }
    other => panic!("expected ambiguity, got {other:?}"),
  }

  let filter = RootFilter::default().with_kind(Some(ReferrerKind::Artifact));
  let node = s.get_from_root(SBOM, &[org_id], &filter).await.unwrap().unwrap();
  assert_eq!(node.kind, ReferrerKind::Artifact);
}

#[tokio::test]
async fn kind_filter_miss_is_none() {
  let (s, org_id, wf_id) = seeded().await;
  s.save(&small_graph(), wf_id).await.unwrap();

  let filter = RootFilter::default().with_kind(Some(ReferrerKind::Sarif));
  assert!(s.get_from_root(ATT, &[org_id], &filter).await.unwrap().is_none());
}
