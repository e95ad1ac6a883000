//! Error types for `referrer-core`.

use thiserror::Error;

use crate::referrer::ReferrerKind;

#[derive(Debug, Error)]
pub enum Error {
  /// The workflow, the node, or a node outside the caller's scope. These are
  /// intentionally indistinguishable.
  #[error("not found: {0}")]
  NotFound(String),

  #[error("invalid identifier: {0}")]
  InvalidIdentifier(String),

  #[error("validation error: {0}")]
  Validation(String),

  #[error(
    "referrer {digest} is ambiguous, it matches kinds [{}]; retry with a kind filter",
    display_kinds(.kinds)
  )]
  AmbiguousReferrer {
    digest: String,
    kinds:  Vec<ReferrerKind>,
  },

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  /// A material claims to be an attestation that was never ingested.
  #[error("dependent attestation {digest} has not been ingested")]
  DependentAttestationMissing { digest: String },

  #[error("invalid envelope: {0}")]
  InvalidEnvelope(String),

  #[error("invalid predicate: {0}")]
  InvalidPredicate(String),

  #[error("missing digest: {0}")]
  MissingDigest(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }

  pub fn is_ambiguous(&self) -> bool {
    matches!(self, Self::AmbiguousReferrer { .. })
  }
}

fn display_kinds(kinds: &[ReferrerKind]) -> String {
  kinds
    .iter()
    .map(ReferrerKind::as_str)
    .collect::<Vec<_>>()
    .join(", ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
