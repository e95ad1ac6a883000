//! Tenancy records owned by external collaborators.
//!
//! The engine only reads these to scope ingestion and queries; creating and
//! deleting them is somebody else's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
  pub org_id:     Uuid,
  pub name:       String,
  pub created_at: DateTime<Utc>,
}

/// A workflow belongs to exactly one organisation. Nodes introduced through a
/// public workflow become eligible for the shared index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_id: Uuid,
  pub org_id:      Uuid,
  pub name:        String,
  pub public:      bool,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
  pub membership_id: Uuid,
  pub user_id:       Uuid,
  pub org_id:        Uuid,
  pub created_at:    DateTime<Utc>,
}
