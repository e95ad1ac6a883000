//! Referrers: the content-addressed nodes of the attestation graph.
//!
//! A referrer is identified by its `(digest, kind)` pair, never by the digest
//! alone: the same bytes may legitimately be indexed as two different kinds
//! (e.g. a SARIF report that was also uploaded as a generic artifact).

use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The kind of artifact a referrer represents.
///
/// Known kinds get their own variant. Any other material type that shows up
/// in an attestation is carried verbatim in [`ReferrerKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ReferrerKind {
  Attestation,
  Artifact,
  ContainerImage,
  GitHeadCommit,
  SbomCyclonedxJson,
  SbomSpdxJson,
  Sarif,
  Openvex,
  JunitXml,
  HelmChart,
  /// Free-text material value; never indexed as a referrer.
  String,
  Other(String),
}

impl ReferrerKind {
  /// The upper-snake textual form stored in the database and on the wire.
  pub fn as_str(&self) -> &str {
    match self {
      Self::Attestation => "ATTESTATION",
      Self::Artifact => "ARTIFACT",
      Self::ContainerImage => "CONTAINER_IMAGE",
      Self::GitHeadCommit => "GIT_HEAD_COMMIT",
      Self::SbomCyclonedxJson => "SBOM_CYCLONEDX_JSON",
      Self::SbomSpdxJson => "SBOM_SPDX_JSON",
      Self::Sarif => "SARIF",
      Self::Openvex => "OPENVEX",
      Self::JunitXml => "JUNIT_XML",
      Self::HelmChart => "HELM_CHART",
      Self::String => "STRING",
      Self::Other(other) => other,
    }
  }
}

impl fmt::Display for ReferrerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ReferrerKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_ascii_uppercase();
    let kind = match normalized.as_str() {
      "" => {
        return Err(Error::InvalidIdentifier("empty referrer kind".to_owned()));
      }
      "ATTESTATION" => Self::Attestation,
      "ARTIFACT" => Self::Artifact,
      "CONTAINER_IMAGE" => Self::ContainerImage,
      "GIT_HEAD_COMMIT" => Self::GitHeadCommit,
      "SBOM_CYCLONEDX_JSON" => Self::SbomCyclonedxJson,
      "SBOM_SPDX_JSON" => Self::SbomSpdxJson,
      "SARIF" => Self::Sarif,
      "OPENVEX" => Self::Openvex,
      "JUNIT_XML" => Self::JunitXml,
      "HELM_CHART" => Self::HelmChart,
      "STRING" => Self::String,
      _ => Self::Other(normalized),
    };
    Ok(kind)
  }
}

impl From<ReferrerKind> for String {
  fn from(kind: ReferrerKind) -> Self { kind.as_str().to_owned() }
}

impl TryFrom<String> for ReferrerKind {
  type Error = Error;

  fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Composite identity of a referrer.
///
/// Ordered by kind text first, then digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferrerKey {
  pub digest: String,
  pub kind:   ReferrerKind,
}

impl ReferrerKey {
  pub fn new(digest: impl Into<String>, kind: ReferrerKind) -> Self {
    Self { digest: digest.into(), kind }
  }
}

impl Ord for ReferrerKey {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .kind
      .as_str()
      .cmp(other.kind.as_str())
      .then_with(|| self.digest.cmp(&other.digest))
  }
}

impl PartialOrd for ReferrerKey {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl fmt::Display for ReferrerKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.kind, self.digest)
  }
}

// ─── Built node ──────────────────────────────────────────────────────────────

/// A node produced by the graph builder, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referrer {
  pub digest:       String,
  pub kind:         ReferrerKind,
  /// Whether the content can be fetched from CAS.
  pub downloadable: bool,
  /// Only populated on attestation nodes.
  pub metadata:     BTreeMap<String, String>,
  /// Only populated on attestation nodes.
  pub annotations:  BTreeMap<String, String>,
  /// Outbound edges.
  pub references:   Vec<ReferrerKey>,
}

impl Referrer {
  pub fn new(key: ReferrerKey, downloadable: bool) -> Self {
    Self {
      digest: key.digest,
      kind: key.kind,
      downloadable,
      metadata: BTreeMap::new(),
      annotations: BTreeMap::new(),
      references: Vec::new(),
    }
  }

  pub fn key(&self) -> ReferrerKey {
    ReferrerKey::new(self.digest.clone(), self.kind.clone())
  }
}

// ─── Stored node ─────────────────────────────────────────────────────────────

/// A referrer as read back from a store, with one level of neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReferrer {
  pub id:                 Uuid,
  pub digest:             String,
  pub kind:               ReferrerKind,
  pub downloadable:       bool,
  pub metadata:           BTreeMap<String, String>,
  pub annotations:        BTreeMap<String, String>,
  /// Set once at creation; re-ingestion never changes it.
  pub created_at:         DateTime<Utc>,
  /// Direct neighbours only. Their own `references` are always empty.
  pub references:         Vec<StoredReferrer>,
  /// Every organisation that has ever introduced this node.
  pub org_ids:            Vec<Uuid>,
  /// Every workflow that has ever introduced this node.
  pub workflow_ids:       Vec<Uuid>,
  /// At least one associated workflow is public.
  pub in_public_workflow: bool,
}

impl StoredReferrer {
  pub fn key(&self) -> ReferrerKey {
    ReferrerKey::new(self.digest.clone(), self.kind.clone())
  }
}
