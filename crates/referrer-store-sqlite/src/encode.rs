//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Metadata and annotation maps
//! are stored as compact JSON objects. UUIDs are stored as hyphenated
//! lowercase strings. Kinds are stored in their upper-snake textual form.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use referrer_core::{
  referrer::{ReferrerKind, StoredReferrer},
  tenancy::{Membership, Workflow},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── ReferrerKind ─────────────────────────────────────────────────────────────

pub fn encode_kind(kind: &ReferrerKind) -> String { kind.as_str().to_owned() }

pub fn decode_kind(s: &str) -> Result<ReferrerKind> { Ok(s.parse()?) }

// ─── String maps ──────────────────────────────────────────────────────────────

pub fn encode_map(map: &BTreeMap<String, String>) -> Result<String> {
  Ok(serde_json::to_string(map)?)
}

pub fn decode_map(s: &str) -> Result<BTreeMap<String, String>> {
  Ok(serde_json::from_str(s)?)
}

/// Encode a list of organisation ids as the JSON array consumed by
/// `json_each` in visibility predicates.
pub fn encode_uuid_list(ids: &[Uuid]) -> Result<String> {
  let ids: Vec<String> = ids.iter().copied().map(encode_uuid).collect();
  Ok(serde_json::to_string(&ids)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `referrers` row.
pub struct RawReferrer {
  pub referrer_id:  String,
  pub digest:       String,
  pub kind:         String,
  pub downloadable: bool,
  pub metadata:     String,
  pub annotations:  String,
  pub created_at:   String,
}

impl RawReferrer {
  pub const COLUMNS: &'static str = "r.referrer_id, r.digest, r.kind, r.downloadable, \
                                     r.metadata, r.annotations, r.created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      referrer_id:  row.get(0)?,
      digest:       row.get(1)?,
      kind:         row.get(2)?,
      downloadable: row.get(3)?,
      metadata:     row.get(4)?,
      annotations:  row.get(5)?,
      created_at:   row.get(6)?,
    })
  }
}

/// One `referrer_workflows` association joined with its workflow.
pub struct RawAssociation {
  pub workflow_id: String,
  pub org_id:      String,
  pub public:      bool,
}

/// A referrer row plus all of its workflow associations.
pub struct RawNode {
  pub referrer:     RawReferrer,
  pub associations: Vec<RawAssociation>,
}

impl RawNode {
  /// Decode into a [`StoredReferrer`] with the given neighbours.
  pub fn into_stored(self, references: Vec<StoredReferrer>) -> Result<StoredReferrer> {
    let mut org_ids = Vec::new();
    let mut workflow_ids = Vec::new();
    let mut in_public_workflow = false;
    for assoc in self.associations {
      let org_id = decode_uuid(&assoc.org_id)?;
      if !org_ids.contains(&org_id) {
        org_ids.push(org_id);
      }
      workflow_ids.push(decode_uuid(&assoc.workflow_id)?);
      in_public_workflow |= assoc.public;
    }

    let raw = self.referrer;
    Ok(StoredReferrer {
      id: decode_uuid(&raw.referrer_id)?,
      digest: raw.digest,
      kind: decode_kind(&raw.kind)?,
      downloadable: raw.downloadable,
      metadata: decode_map(&raw.metadata)?,
      annotations: decode_map(&raw.annotations)?,
      created_at: decode_dt(&raw.created_at)?,
      references,
      org_ids,
      workflow_ids,
      in_public_workflow,
    })
  }
}

/// Raw values read directly from a `workflows` row.
pub struct RawWorkflow {
  pub workflow_id: String,
  pub org_id:      String,
  pub name:        String,
  pub public:      bool,
  pub created_at:  String,
}

impl RawWorkflow {
  pub fn into_workflow(self) -> Result<Workflow> {
    Ok(Workflow {
      workflow_id: decode_uuid(&self.workflow_id)?,
      org_id:      decode_uuid(&self.org_id)?,
      name:        self.name,
      public:      self.public,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `memberships` row.
pub struct RawMembership {
  pub membership_id: String,
  pub user_id:       String,
  pub org_id:        String,
  pub created_at:    String,
}

impl RawMembership {
  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      membership_id: decode_uuid(&self.membership_id)?,
      user_id:       decode_uuid(&self.user_id)?,
      org_id:        decode_uuid(&self.org_id)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}
