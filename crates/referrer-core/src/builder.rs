//! Turns an attestation envelope into the referrer nodes it introduces.
//!
//! Building is pure: no I/O and no state shared between calls. The only thing
//! it cannot decide on its own is whether attestations referenced as materials
//! already exist, so those are handed back as [`ReferrerGraph::dependencies`]
//! for the caller to check against a store.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
  Error, Result, digest,
  envelope::{
    Envelope, GIT_HEAD_SUBJECT, Predicate, ResourceDescriptor, digest_of, extract_statement,
    material_annotations,
  },
  referrer::{Referrer, ReferrerKey, ReferrerKind},
};

/// The output of [`build_referrers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerGraph {
  /// The attestation node's identity.
  pub root:         ReferrerKey,
  /// Every node, attestation included, sorted by [`ReferrerKey`].
  pub referrers:    Vec<Referrer>,
  /// Attestation nodes referenced by this envelope that must already be
  /// stored before the graph may be persisted.
  pub dependencies: Vec<ReferrerKey>,
}

impl ReferrerGraph {
  pub fn get(&self, key: &ReferrerKey) -> Option<&Referrer> {
    self.referrers.iter().find(|r| r.digest == key.digest && r.kind == key.kind)
  }
}

/// Build the referrer graph for `envelope`.
pub fn build_referrers(envelope: &Envelope) -> Result<ReferrerGraph> {
  let statement = extract_statement(envelope)?;
  let predicate = Predicate::from_statement(&statement)?;

  let root_key = ReferrerKey::new(digest_of(envelope)?, ReferrerKind::Attestation);
  let mut builder = GraphBuilder::new(root_key);
  builder.root.metadata = predicate.metadata.to_map();
  builder.root.annotations = predicate.annotations;

  for material in predicate.materials {
    let Some(digest) = material.digest else {
      continue;
    };
    if material.kind == ReferrerKind::String {
      continue;
    }
    builder.link(ReferrerKey::new(digest, material.kind), material.uploaded_to_cas);
  }

  for subject in &statement.subject {
    let Some((kind, downloadable)) = classify_subject(subject)? else {
      continue;
    };
    let digest = digest::from_map(&subject.digest)?.ok_or_else(|| {
      Error::MissingDigest(format!("subject {:?} has no digest", subject.name))
    })?;
    builder.link(ReferrerKey::new(digest, kind), downloadable);
  }

  let graph = builder.finish();
  debug!(
    nodes = graph.referrers.len(),
    dependencies = graph.dependencies.len(),
    "built referrer graph"
  );
  Ok(graph)
}

/// Decide whether a subject is a referrer, and if so of which kind.
fn classify_subject(
  subject: &ResourceDescriptor,
) -> Result<Option<(ReferrerKind, bool)>> {
  if subject.name == GIT_HEAD_SUBJECT {
    return Ok(Some((ReferrerKind::GitHeadCommit, false)));
  }
  let annotations = material_annotations(&subject.annotations)?;
  Ok(match annotations.kind {
    None | Some(ReferrerKind::String) => None,
    Some(kind) => Some((kind, annotations.uploaded_to_cas)),
  })
}

// ─── Builder state ───────────────────────────────────────────────────────────

/// Per-call state. Owned by a single [`build_referrers`] invocation.
struct GraphBuilder {
  root:         Referrer,
  root_key:     ReferrerKey,
  nodes:        BTreeMap<ReferrerKey, Referrer>,
  dependencies: BTreeSet<ReferrerKey>,
}

impl GraphBuilder {
  fn new(root_key: ReferrerKey) -> Self {
    Self {
      root: Referrer::new(root_key.clone(), true),
      root_key,
      nodes: BTreeMap::new(),
      dependencies: BTreeSet::new(),
    }
  }

  /// Add `key` with a back-reference to the attestation, and append it to the
  /// attestation's references. A key seen before in this pass is ignored.
  fn link(&mut self, key: ReferrerKey, downloadable: bool) {
    if key == self.root_key || self.nodes.contains_key(&key) {
      return;
    }

    // Attestation nodes only come into existence through their own ingestion.
    let downloadable = if key.kind == ReferrerKind::Attestation {
      self.dependencies.insert(key.clone());
      true
    } else {
      downloadable
    };

    let mut node = Referrer::new(key.clone(), downloadable);
    node.references.push(self.root_key.clone());
    self.root.references.push(key.clone());
    self.nodes.insert(key, node);
  }

  fn finish(mut self) -> ReferrerGraph {
    self.root.references.sort();
    self.nodes.insert(self.root_key.clone(), self.root);
    ReferrerGraph {
      root:         self.root_key,
      referrers:    self.nodes.into_values().collect(),
      dependencies: self.dependencies.into_iter().collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::{Value, json};

  use super::*;

  const SBOM: &str = "16159bb881eb4ab7eb5d8afc5350b0feeed1e31c0a268e355e74f9ccbe885e0c";
  const IMAGE: &str = "fbd9335f55d83d8aaf9ab1a539b0f2a87b444e8c54f34c9a1ca9d7df15605db4";
  const GIT: &str = "78ac366c9e8a300d51808d581e9d2e4ad1ae4b72";

  fn material(digest: &str, kind: &str, cas: bool) -> Value {
    json!({
      "name": kind.to_lowercase(),
      "digest": { "sha256": digest },
      "annotations": {
        "chainloop.material.type": kind,
        "chainloop.material.cas": cas,
      }
    })
  }

  fn envelope(materials: Vec<Value>, subjects: Vec<Value>) -> Envelope {
    Envelope::from_statement(&json!({
      "_type": "https://in-toto.io/Statement/v1",
      "subject": subjects,
      "predicateType": "chainloop.dev/attestation/v0.2",
      "predicate": {
        "metadata": { "name": "release", "team": "platform", "project": "api", "organization": "acme" },
        "materials": materials,
        "annotations": { "version": "1.0" }
      }
    }))
    .unwrap()
  }

  fn git_head() -> Value {
    json!({ "name": "git.head", "digest": { "sha1": GIT } })
  }

  fn kinds(graph: &ReferrerGraph) -> Vec<&str> {
    graph.referrers.iter().map(|r| r.kind.as_str()).collect()
  }

  #[test]
  fn builds_attestation_with_material_and_git_head() {
    let env = envelope(vec![material(SBOM, "SBOM_CYCLONEDX_JSON", true)], vec![git_head()]);
    let graph = build_referrers(&env).unwrap();

    assert_eq!(kinds(&graph), ["ATTESTATION", "GIT_HEAD_COMMIT", "SBOM_CYCLONEDX_JSON"]);
    assert!(graph.dependencies.is_empty());

    let root_key = ReferrerKey::new(digest_of(&env).unwrap(), ReferrerKind::Attestation);
    assert_eq!(graph.root, root_key);
    let root = graph.get(&root_key).unwrap();
    assert!(root.downloadable);
    assert_eq!(root.metadata.get("team").map(String::as_str), Some("platform"));
    assert_eq!(root.annotations.get("version").map(String::as_str), Some("1.0"));
    assert_eq!(
      root.references,
      vec![
        ReferrerKey::new(format!("sha1:{GIT}"), ReferrerKind::GitHeadCommit),
        ReferrerKey::new(format!("sha256:{SBOM}"), ReferrerKind::SbomCyclonedxJson),
      ]
    );

    let sbom = graph
      .get(&ReferrerKey::new(format!("sha256:{SBOM}"), ReferrerKind::SbomCyclonedxJson))
      .unwrap();
    assert!(sbom.downloadable);
    assert_eq!(sbom.references, vec![root_key.clone()]);
    assert!(sbom.metadata.is_empty());

    let git = graph
      .get(&ReferrerKey::new(format!("sha1:{GIT}"), ReferrerKind::GitHeadCommit))
      .unwrap();
    assert!(!git.downloadable);
    assert_eq!(git.references, vec![root_key]);
  }

  #[test]
  fn output_is_deterministic() {
    let env = envelope(
      vec![
        material(IMAGE, "CONTAINER_IMAGE", false),
        material(SBOM, "SBOM_CYCLONEDX_JSON", true),
        material(SBOM, "ARTIFACT", true),
      ],
      vec![git_head()],
    );
    assert_eq!(build_referrers(&env).unwrap(), build_referrers(&env).unwrap());
  }

  #[test]
  fn same_material_twice_collapses() {
    let env = envelope(
      vec![
        material(SBOM, "SBOM_CYCLONEDX_JSON", true),
        material(SBOM, "SBOM_CYCLONEDX_JSON", true),
      ],
      vec![],
    );
    let graph = build_referrers(&env).unwrap();
    assert_eq!(graph.referrers.len(), 2);
    let root = &graph.referrers[0];
    assert_eq!(root.kind, ReferrerKind::Attestation);
    assert_eq!(root.references.len(), 1);
    assert_eq!(graph.referrers[1].references.len(), 1);
  }

  #[test]
  fn same_digest_different_kinds_are_separate_nodes() {
    let env = envelope(
      vec![material(SBOM, "SARIF", true), material(SBOM, "ARTIFACT", true)],
      vec![],
    );
    let graph = build_referrers(&env).unwrap();
    assert_eq!(kinds(&graph), ["ARTIFACT", "ATTESTATION", "SARIF"]);
    let root = &graph.referrers[1];
    assert_eq!(root.references.len(), 2);
    assert!(graph.referrers.iter().all(|r| r.kind == ReferrerKind::Attestation
      || r.references == vec![root.key()]));
  }

  #[test]
  fn materials_without_digest_and_strings_are_skipped() {
    let env = envelope(
      vec![
        json!({ "name": "note", "content": "hello" }),
        json!({
          "name": "version",
          "digest": { "sha256": IMAGE },
          "annotations": { "chainloop.material.type": "STRING" }
        }),
      ],
      vec![],
    );
    let graph = build_referrers(&env).unwrap();
    assert_eq!(kinds(&graph), ["ATTESTATION"]);
    assert!(graph.referrers[0].references.is_empty());
  }

  #[test]
  fn subject_matching_a_material_is_not_duplicated() {
    let subject = json!({
      "name": "sbom",
      "digest": { "sha256": SBOM },
      "annotations": { "chainloop.material.type": "SBOM_CYCLONEDX_JSON", "chainloop.material.cas": true }
    });
    let env = envelope(vec![material(SBOM, "SBOM_CYCLONEDX_JSON", true)], vec![subject]);
    let graph = build_referrers(&env).unwrap();
    assert_eq!(graph.referrers.len(), 2);
    assert_eq!(graph.referrers[0].references.len(), 1);
  }

  #[test]
  fn unannotated_subjects_are_discarded() {
    let subject = json!({ "name": "some-binary", "digest": { "sha256": IMAGE } });
    let graph = build_referrers(&envelope(vec![], vec![subject])).unwrap();
    assert_eq!(kinds(&graph), ["ATTESTATION"]);
  }

  #[test]
  fn annotated_subject_takes_kind_and_cas_flag() {
    let subject = json!({
      "name": "ghcr.io/acme/api",
      "digest": { "sha256": IMAGE },
      "annotations": { "chainloop.material.type": "CONTAINER_IMAGE", "chainloop.material.cas": "false" }
    });
    let graph = build_referrers(&envelope(vec![], vec![subject])).unwrap();
    let image = &graph.referrers[1];
    assert_eq!(image.kind, ReferrerKind::ContainerImage);
    assert!(!image.downloadable);
  }

  #[test]
  fn classified_subject_without_digest_is_an_error() {
    let subject = json!({ "name": "git.head", "digest": {} });
    let err = build_referrers(&envelope(vec![], vec![subject])).unwrap_err();
    assert!(matches!(err, Error::MissingDigest(_)));
  }

  #[test]
  fn attestation_materials_become_dependencies() {
    let dependency = format!("sha256:{IMAGE}");
    let env = envelope(vec![material(IMAGE, "ATTESTATION", false)], vec![]);
    let graph = build_referrers(&env).unwrap();

    let key = ReferrerKey::new(dependency, ReferrerKind::Attestation);
    assert_eq!(graph.dependencies, vec![key.clone()]);
    let node = graph.get(&key).unwrap();
    assert!(node.downloadable);
    assert_eq!(graph.referrers.len(), 2);
  }
}
