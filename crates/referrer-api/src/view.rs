//! The JSON shape of a referrer on the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use referrer_core::referrer::{ReferrerKind, StoredReferrer};
use serde::Serialize;

/// A referrer and its direct neighbours, without tenancy details.
#[derive(Debug, Serialize)]
pub struct ReferrerView {
  pub digest:       String,
  pub kind:         ReferrerKind,
  pub downloadable: bool,
  /// Introduced through at least one public workflow.
  pub public:       bool,
  pub created_at:   DateTime<Utc>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub metadata:     BTreeMap<String, String>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub annotations:  BTreeMap<String, String>,
  pub references:   Vec<ReferrerView>,
}

impl From<StoredReferrer> for ReferrerView {
  fn from(r: StoredReferrer) -> Self {
    Self {
      digest:       r.digest,
      kind:         r.kind,
      downloadable: r.downloadable,
      public:       r.in_public_workflow,
      created_at:   r.created_at,
      metadata:     r.metadata,
      annotations:  r.annotations,
      references:   r.references.into_iter().map(Self::from).collect(),
    }
  }
}
