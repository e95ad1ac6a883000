//! Error type for `referrer-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] referrer_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("workflow not found: {0}")]
  WorkflowNotFound(Uuid),

  #[error("organization not found: {0}")]
  OrganizationNotFound(Uuid),

  /// An edge points at a node that is neither in the batch nor stored.
  #[error("reference to unknown referrer {0}")]
  DanglingReference(String),
}

impl From<Error> for referrer_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      Error::WorkflowNotFound(id) => Self::NotFound(format!("workflow {id}")),
      Error::OrganizationNotFound(id) => Self::NotFound(format!("organization {id}")),
      other => Self::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
