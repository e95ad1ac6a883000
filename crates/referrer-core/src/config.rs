//! Shared-index configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Opt-in public view over referrers of allow-listed organisations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedIndexConfig {
  #[serde(default)]
  pub enabled:      bool,
  /// Organisation UUIDs whose public workflows feed the index.
  #[serde(default)]
  pub allowed_orgs: Vec<String>,
}

impl SharedIndexConfig {
  /// Check the configuration and return the parsed allow-list.
  ///
  /// A disabled index is always valid and yields an empty list. An enabled
  /// one needs at least one organisation, and every entry must be a UUID.
  pub fn validate(&self) -> Result<Vec<Uuid>> {
    if !self.enabled {
      return Ok(Vec::new());
    }
    if self.allowed_orgs.is_empty() {
      return Err(Error::Validation(
        "shared index is enabled but no allowed organisations are configured"
          .to_owned(),
      ));
    }
    self
      .allowed_orgs
      .iter()
      .map(|org| {
        Uuid::parse_str(org.trim()).map_err(|e| {
          Error::Validation(format!("invalid shared index organisation {org:?}: {e}"))
        })
      })
      .collect()
  }
}
