//! [`SqliteStore`], the SQLite implementation of the referrer traits.

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use referrer_core::{
  referrer::{Referrer, StoredReferrer},
  store::{ExistFilter, MembershipRepository, ReferrerStore, RootFilter, WorkflowRepository},
  tenancy::{Membership, Organization, Workflow},
};

use crate::{
  Error, Result,
  encode::{
    RawAssociation, RawMembership, RawNode, RawReferrer, RawWorkflow, decode_kind, encode_dt,
    encode_kind, encode_map, encode_uuid, encode_uuid_list,
  },
  schema::SCHEMA,
};

/// Visibility predicate over a `referrers r` row. Binds `?2` (JSON array of
/// organisation ids) and `?3` (public-only flag).
const VISIBLE: &str = "EXISTS (
    SELECT 1 FROM referrer_workflows rw
    JOIN workflows w ON w.workflow_id = rw.workflow_id
    WHERE rw.referrer_id = r.referrer_id
      AND w.org_id IN (SELECT value FROM json_each(?2))
      AND (?3 = 0 OR w.public = 1)
  )";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A referrer store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// A node ready to be written, with its edges as encoded `(digest, kind)`.
struct PendingNode {
  candidate_id: String,
  digest:       String,
  kind:         String,
  downloadable: bool,
  metadata:     String,
  annotations:  String,
  references:   Vec<(String, String)>,
}

enum SaveOutcome {
  Saved { created: usize },
  WorkflowMissing,
  Dangling(String),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Tenancy bookkeeping ───────────────────────────────────────────────────

  pub async fn add_organization(&self, name: &str) -> Result<Organization> {
    let org = Organization {
      org_id:     Uuid::new_v4(),
      name:       name.to_owned(),
      created_at: Utc::now(),
    };

    let id_str = encode_uuid(org.org_id);
    let name = org.name.clone();
    let at_str = encode_dt(org.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO organizations (org_id, name, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, name, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(org)
  }

  pub async fn add_workflow(&self, org_id: Uuid, name: &str, public: bool) -> Result<Workflow> {
    let workflow = Workflow {
      workflow_id: Uuid::new_v4(),
      org_id,
      name: name.to_owned(),
      public,
      created_at: Utc::now(),
    };

    let id_str = encode_uuid(workflow.workflow_id);
    let org_str = encode_uuid(org_id);
    let name = workflow.name.clone();
    let at_str = encode_dt(workflow.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let org_exists = conn
          .query_row(
            "SELECT 1 FROM organizations WHERE org_id = ?1",
            rusqlite::params![org_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !org_exists {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO workflows (workflow_id, org_id, name, public, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, org_str, name, public, at_str],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::OrganizationNotFound(org_id));
    }
    Ok(workflow)
  }

  /// Flip a workflow's visibility. Affects the shared index immediately.
  pub async fn set_workflow_public(&self, workflow_id: Uuid, public: bool) -> Result<()> {
    let id_str = encode_uuid(workflow_id);
    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE workflows SET public = ?2 WHERE workflow_id = ?1",
          rusqlite::params![id_str, public],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::WorkflowNotFound(workflow_id));
    }
    Ok(())
  }

  pub async fn add_membership(&self, user_id: Uuid, org_id: Uuid) -> Result<Membership> {
    let membership = Membership {
      membership_id: Uuid::new_v4(),
      user_id,
      org_id,
      created_at: Utc::now(),
    };

    let id_str = encode_uuid(membership.membership_id);
    let user_str = encode_uuid(user_id);
    let org_str = encode_uuid(org_id);
    let at_str = encode_dt(membership.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let org_exists = conn
          .query_row(
            "SELECT 1 FROM organizations WHERE org_id = ?1",
            rusqlite::params![org_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !org_exists {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO memberships (membership_id, user_id, org_id, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, user_str, org_str, at_str],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::OrganizationNotFound(org_id));
    }
    Ok(membership)
  }
}

// ─── Read helpers (run on the connection thread) ─────────────────────────────

fn load_associations(
  conn: &rusqlite::Connection,
  referrer_id: &str,
) -> rusqlite::Result<Vec<RawAssociation>> {
  let mut stmt = conn.prepare_cached(
    "SELECT rw.workflow_id, w.org_id, w.public
     FROM referrer_workflows rw
     JOIN workflows w ON w.workflow_id = rw.workflow_id
     WHERE rw.referrer_id = ?1
     ORDER BY w.created_at, rw.workflow_id",
  )?;
  stmt
    .query_map(rusqlite::params![referrer_id], |row| {
      Ok(RawAssociation {
        workflow_id: row.get(0)?,
        org_id:      row.get(1)?,
        public:      row.get(2)?,
      })
    })?
    .collect()
}

fn with_associations(
  conn: &rusqlite::Connection,
  referrer: RawReferrer,
) -> rusqlite::Result<RawNode> {
  let associations = load_associations(conn, &referrer.referrer_id)?;
  Ok(RawNode { referrer, associations })
}

/// Everything `get_from_root` reads, before decoding.
enum RootRows {
  Missing,
  Ambiguous(Vec<String>),
  Found { root: RawNode, neighbours: Vec<RawNode> },
}

// ─── ReferrerStore impl ──────────────────────────────────────────────────────

impl ReferrerStore for SqliteStore {
  type Error = Error;

  async fn save<'a>(&'a self, referrers: &'a [Referrer], workflow_id: Uuid) -> Result<()> {
    let nodes = referrers
      .iter()
      .map(|r| {
        Ok(PendingNode {
          candidate_id: encode_uuid(Uuid::new_v4()),
          digest:       r.digest.clone(),
          kind:         encode_kind(&r.kind),
          downloadable: r.downloadable,
          metadata:     encode_map(&r.metadata)?,
          annotations:  encode_map(&r.annotations)?,
          references:   r
            .references
            .iter()
            .map(|k| (k.digest.clone(), encode_kind(&k.kind)))
            .collect(),
        })
      })
      .collect::<Result<Vec<_>>>()?;

    let workflow_str = encode_uuid(workflow_id);
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front so concurrent writers
        // serialise here instead of failing on lock upgrade.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let workflow_exists = tx
          .query_row(
            "SELECT 1 FROM workflows WHERE workflow_id = ?1",
            rusqlite::params![workflow_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !workflow_exists {
          return Ok(SaveOutcome::WorkflowMissing);
        }

        let mut ids: HashMap<(String, String), String> = HashMap::new();
        let mut created = 0;
        {
          let mut insert = tx.prepare(
            "INSERT INTO referrers
               (referrer_id, digest, kind, downloadable, metadata, annotations, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (digest, kind) DO NOTHING",
          )?;
          let mut select =
            tx.prepare("SELECT referrer_id FROM referrers WHERE digest = ?1 AND kind = ?2")?;

          // Nodes first, so every edge endpoint in the batch has an id.
          for node in &nodes {
            created += insert.execute(rusqlite::params![
              node.candidate_id,
              node.digest,
              node.kind,
              node.downloadable,
              node.metadata,
              node.annotations,
              now_str,
            ])?;
            // Re-read: the row may have been created by an earlier ingestion.
            let id: String =
              select.query_row(rusqlite::params![node.digest, node.kind], |r| r.get(0))?;
            ids.insert((node.digest.clone(), node.kind.clone()), id);
          }

          let mut edge = tx.prepare(
            "INSERT OR IGNORE INTO referrer_references (from_id, to_id) VALUES (?1, ?2)",
          )?;
          for node in &nodes {
            let from = ids[&(node.digest.clone(), node.kind.clone())].clone();
            for target in &node.references {
              let to = match ids.get(target) {
                Some(id) => id.clone(),
                None => {
                  let stored: Option<String> = select
                    .query_row(rusqlite::params![target.0, target.1], |r| r.get(0))
                    .optional()?;
                  match stored {
                    Some(id) => id,
                    None => {
                      return Ok(SaveOutcome::Dangling(format!("{}@{}", target.1, target.0)));
                    }
                  }
                }
              };
              edge.execute(rusqlite::params![from, to])?;
            }
          }

          let mut associate = tx.prepare(
            "INSERT OR IGNORE INTO referrer_workflows (referrer_id, workflow_id) VALUES (?1, ?2)",
          )?;
          for id in ids.values() {
            associate.execute(rusqlite::params![id, workflow_str])?;
          }
        }

        tx.commit()?;
        Ok(SaveOutcome::Saved { created })
      })
      .await?;

    match outcome {
      SaveOutcome::Saved { created } => {
        debug!(%workflow_id, total = referrers.len(), created, "saved referrers");
        Ok(())
      }
      SaveOutcome::WorkflowMissing => Err(Error::WorkflowNotFound(workflow_id)),
      SaveOutcome::Dangling(key) => Err(Error::DanglingReference(key)),
    }
  }

  async fn exist<'a>(&'a self, digest: &'a str, filter: &'a ExistFilter) -> Result<bool> {
    let digest = digest.to_owned();
    let kind_str = filter.kind.as_ref().map(encode_kind);

    let exists = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (
             SELECT 1 FROM referrers WHERE digest = ?1 AND (?2 IS NULL OR kind = ?2)
           )",
          rusqlite::params![digest, kind_str],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(exists)
  }

  async fn get_from_root<'a>(
    &'a self,
    digest: &'a str,
    org_ids: &'a [Uuid],
    filter: &'a RootFilter,
  ) -> Result<Option<StoredReferrer>> {
    if org_ids.is_empty() {
      return Ok(None);
    }

    let digest_str = digest.to_owned();
    let orgs_json = encode_uuid_list(org_ids)?;
    let public_only = filter.public_only;
    let kind_str = filter.kind.as_ref().map(encode_kind);

    let rows = self
      .conn
      .call(move |conn| {
        let roots: Vec<RawReferrer> = {
          let mut stmt = conn.prepare(&format!(
            "SELECT {columns} FROM referrers r
             WHERE r.digest = ?1 AND (?4 IS NULL OR r.kind = ?4) AND {VISIBLE}
             ORDER BY r.kind",
            columns = RawReferrer::COLUMNS,
          ))?;
          stmt
            .query_map(
              rusqlite::params![digest_str, orgs_json, public_only, kind_str],
              RawReferrer::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        if roots.len() > 1 {
          return Ok(RootRows::Ambiguous(roots.into_iter().map(|r| r.kind).collect()));
        }
        let Some(root) = roots.into_iter().next() else {
          return Ok(RootRows::Missing);
        };

        // One level only: neighbours are returned without their own edges.
        let neighbours: Vec<RawReferrer> = {
          let mut stmt = conn.prepare(&format!(
            "SELECT {columns} FROM referrer_references e
             JOIN referrers r ON r.referrer_id = e.to_id
             WHERE e.from_id = ?1 AND {VISIBLE}
             ORDER BY r.kind, r.digest",
            columns = RawReferrer::COLUMNS,
          ))?;
          stmt
            .query_map(
              rusqlite::params![root.referrer_id, orgs_json, public_only],
              RawReferrer::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let root = with_associations(conn, root)?;
        let neighbours = neighbours
          .into_iter()
          .map(|n| with_associations(conn, n))
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(RootRows::Found { root, neighbours })
      })
      .await?;

    match rows {
      RootRows::Missing => Ok(None),
      RootRows::Ambiguous(kinds) => {
        let kinds = kinds
          .iter()
          .map(|k| decode_kind(k))
          .collect::<Result<Vec<_>>>()?;
        Err(Error::Core(referrer_core::Error::AmbiguousReferrer {
          digest: digest.to_owned(),
          kinds,
        }))
      }
      RootRows::Found { root, neighbours } => {
        let references = neighbours
          .into_iter()
          .map(|n| n.into_stored(Vec::new()))
          .collect::<Result<Vec<_>>>()?;
        Ok(Some(root.into_stored(references)?))
      }
    }
  }
}

// ─── Collaborator impls ──────────────────────────────────────────────────────

impl WorkflowRepository for SqliteStore {
  type Error = Error;

  async fn find_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>> {
    let id_str = encode_uuid(workflow_id);

    let raw: Option<RawWorkflow> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT workflow_id, org_id, name, public, created_at
               FROM workflows WHERE workflow_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawWorkflow {
                  workflow_id: row.get(0)?,
                  org_id:      row.get(1)?,
                  name:        row.get(2)?,
                  public:      row.get(3)?,
                  created_at:  row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawWorkflow::into_workflow).transpose()
  }
}

impl MembershipRepository for SqliteStore {
  type Error = Error;

  async fn find_memberships_by_user(&self, user_id: Uuid) -> Result<Vec<Membership>> {
    let user_str = encode_uuid(user_id);

    let raws: Vec<RawMembership> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT membership_id, user_id, org_id, created_at
           FROM memberships WHERE user_id = ?1
           ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_str], |row| {
            Ok(RawMembership {
              membership_id: row.get(0)?,
              user_id:       row.get(1)?,
              org_id:        row.get(2)?,
              created_at:    row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMembership::into_membership).collect()
  }
}
