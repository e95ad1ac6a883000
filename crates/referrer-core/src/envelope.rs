//! DSSE envelopes and the in-toto statements they carry.
//!
//! Signature verification happens upstream. This module only decodes the
//! payload and turns the predicate into typed materials, rejecting anything
//! structurally off instead of returning partial results.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result, digest, referrer::ReferrerKind};

/// DSSE payload type for in-toto statements.
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// Subject name reserved for the git commit a workflow run was built from.
pub const GIT_HEAD_SUBJECT: &str = "git.head";

pub const ANNOTATION_MATERIAL_TYPE: &str = "chainloop.material.type";
pub const ANNOTATION_MATERIAL_CAS: &str = "chainloop.material.cas";
pub const ANNOTATION_MATERIAL_NAME: &str = "chainloop.material.name";

// ─── Wire types ──────────────────────────────────────────────────────────────

/// A DSSE envelope. Field order is part of the attestation digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
  #[serde(rename = "payloadType")]
  pub payload_type: String,
  /// Base64 (standard alphabet) encoded statement.
  pub payload:      String,
  #[serde(default)]
  pub signatures:   Vec<Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub keyid: Option<String>,
  pub sig:   String,
}

impl Envelope {
  /// Wrap a statement into an unsigned in-toto envelope.
  pub fn from_statement(statement: &Value) -> Result<Self> {
    let bytes = serde_json::to_vec(statement)?;
    Ok(Self {
      payload_type: IN_TOTO_PAYLOAD_TYPE.to_owned(),
      payload:      B64.encode(bytes),
      signatures:   Vec::new(),
    })
  }

  fn decode_payload(&self) -> Result<Vec<u8>> {
    if self.payload_type != IN_TOTO_PAYLOAD_TYPE {
      return Err(Error::InvalidEnvelope(format!(
        "unexpected payload type {:?}",
        self.payload_type
      )));
    }
    B64
      .decode(self.payload.as_bytes())
      .map_err(|e| Error::InvalidEnvelope(format!("payload is not base64: {e}")))
  }
}

/// An in-toto statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
  #[serde(rename = "_type")]
  pub statement_type: String,
  #[serde(default)]
  pub subject:        Vec<ResourceDescriptor>,
  #[serde(rename = "predicateType", default)]
  pub predicate_type: String,
  #[serde(default)]
  pub predicate:      Value,
}

/// An in-toto resource descriptor, used both for subjects and materials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceDescriptor {
  #[serde(default)]
  pub name:        String,
  /// Keyed by algorithm, e.g. `{"sha256": "..."}`.
  #[serde(default)]
  pub digest:      BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uri:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content:     Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub annotations: BTreeMap<String, Value>,
}

// ─── Typed predicate ─────────────────────────────────────────────────────────

/// Who produced the attestation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateMetadata {
  #[serde(default)]
  pub name:         String,
  #[serde(default)]
  pub team:         String,
  #[serde(default)]
  pub project:      String,
  #[serde(default)]
  pub organization: String,
}

impl PredicateMetadata {
  /// Non-empty fields as a flat map, the shape stored on attestation nodes.
  pub fn to_map(&self) -> BTreeMap<String, String> {
    [
      ("name", &self.name),
      ("team", &self.team),
      ("project", &self.project),
      ("organization", &self.organization),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_empty())
    .map(|(k, v)| (k.to_owned(), v.clone()))
    .collect()
  }
}

/// A material declared in the predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
  pub name:            String,
  /// `None` for materials without content identity (e.g. plain strings).
  pub digest:          Option<String>,
  pub kind:            ReferrerKind,
  pub uploaded_to_cas: bool,
  /// Inline content or URI, when the material carries one.
  pub value:           Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Predicate {
  pub metadata:    PredicateMetadata,
  pub materials:   Vec<Material>,
  pub annotations: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RawPredicate {
  #[serde(default)]
  metadata:    PredicateMetadata,
  #[serde(default)]
  materials:   Vec<ResourceDescriptor>,
  #[serde(default)]
  annotations: BTreeMap<String, String>,
}

// ─── Annotation adapter ──────────────────────────────────────────────────────

/// The reserved annotations carried by materials and subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialAnnotations {
  pub kind:            Option<ReferrerKind>,
  pub uploaded_to_cas: bool,
  pub name:            Option<String>,
}

/// Interpret the reserved material annotations. Everything else in the map is
/// ignored.
pub fn material_annotations(
  annotations: &BTreeMap<String, Value>,
) -> Result<MaterialAnnotations> {
  let kind: Option<ReferrerKind> = match annotations.get(ANNOTATION_MATERIAL_TYPE) {
    None => None,
    Some(Value::String(s)) if s.trim().is_empty() => None,
    Some(Value::String(s)) => Some(s.parse()?),
    Some(other) => {
      return Err(Error::InvalidPredicate(format!(
        "{ANNOTATION_MATERIAL_TYPE} must be a string, got {other}"
      )));
    }
  };

  let uploaded_to_cas = match annotations.get(ANNOTATION_MATERIAL_CAS) {
    Some(Value::Bool(b)) => *b,
    Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
    _ => false,
  };

  let name = annotations
    .get(ANNOTATION_MATERIAL_NAME)
    .and_then(Value::as_str)
    .map(str::to_owned);

  Ok(MaterialAnnotations { kind, uploaded_to_cas, name })
}

impl Material {
  fn from_descriptor(descriptor: ResourceDescriptor) -> Result<Self> {
    let annotations = material_annotations(&descriptor.annotations)?;
    let digest = digest::from_map(&descriptor.digest)?;
    Ok(Self {
      name: annotations.name.unwrap_or(descriptor.name),
      digest,
      kind: annotations.kind.unwrap_or(ReferrerKind::Artifact),
      uploaded_to_cas: annotations.uploaded_to_cas,
      value: descriptor.content.or(descriptor.uri),
    })
  }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// Decode the statement carried by `envelope`.
pub fn extract_statement(envelope: &Envelope) -> Result<Statement> {
  let payload = envelope.decode_payload()?;
  serde_json::from_slice(&payload)
    .map_err(|e| Error::InvalidEnvelope(format!("payload is not an in-toto statement: {e}")))
}

/// Decode the typed predicate carried by `envelope`.
pub fn extract_predicate(envelope: &Envelope) -> Result<Predicate> {
  Predicate::from_statement(&extract_statement(envelope)?)
}

impl Predicate {
  /// Type the predicate of an already decoded statement.
  pub fn from_statement(statement: &Statement) -> Result<Self> {
    if !statement.predicate.is_object() {
      return Err(Error::InvalidPredicate(format!(
        "predicate of type {:?} is not a JSON object",
        statement.predicate_type
      )));
    }

    let raw = RawPredicate::deserialize(&statement.predicate)
      .map_err(|e| Error::InvalidPredicate(e.to_string()))?;

    let materials = raw
      .materials
      .into_iter()
      .map(Material::from_descriptor)
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      metadata: raw.metadata,
      materials,
      annotations: raw.annotations,
    })
  }
}

/// Content digest of the envelope itself; the identity of its attestation node.
pub fn digest_of(envelope: &Envelope) -> Result<String> {
  let bytes = serde_json::to_vec(envelope)?;
  Ok(digest::sha256(&bytes))
}
