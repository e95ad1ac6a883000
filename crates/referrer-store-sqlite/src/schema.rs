//! SQL schema for the referrer SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organizations (
    org_id      TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workflows (
    workflow_id TEXT PRIMARY KEY,
    org_id      TEXT NOT NULL REFERENCES organizations(org_id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    public      INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memberships (
    membership_id TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    org_id        TEXT NOT NULL REFERENCES organizations(org_id) ON DELETE CASCADE,
    created_at    TEXT NOT NULL,
    UNIQUE (user_id, org_id)
);

-- Referrers are append-only; (digest, kind) is the identity.
-- No UPDATE is ever issued against this table.
CREATE TABLE IF NOT EXISTS referrers (
    referrer_id  TEXT PRIMARY KEY,
    digest       TEXT NOT NULL,
    kind         TEXT NOT NULL,   -- ReferrerKind textual form
    downloadable INTEGER NOT NULL,
    metadata     TEXT NOT NULL DEFAULT '{}',
    annotations  TEXT NOT NULL DEFAULT '{}',
    created_at   TEXT NOT NULL,   -- ISO 8601 UTC; set once
    UNIQUE (digest, kind)
);

-- Directed edge from_id -> to_id.
CREATE TABLE IF NOT EXISTS referrer_references (
    from_id TEXT NOT NULL REFERENCES referrers(referrer_id) ON DELETE CASCADE,
    to_id   TEXT NOT NULL REFERENCES referrers(referrer_id) ON DELETE CASCADE,
    PRIMARY KEY (from_id, to_id)
);

-- Which workflows (and through them, organisations) introduced a referrer.
CREATE TABLE IF NOT EXISTS referrer_workflows (
    referrer_id TEXT NOT NULL REFERENCES referrers(referrer_id) ON DELETE CASCADE,
    workflow_id TEXT NOT NULL REFERENCES workflows(workflow_id) ON DELETE CASCADE,
    PRIMARY KEY (referrer_id, workflow_id)
);

CREATE INDEX IF NOT EXISTS referrers_digest_idx    ON referrers(digest);
CREATE INDEX IF NOT EXISTS references_to_idx       ON referrer_references(to_id);
CREATE INDEX IF NOT EXISTS referrer_workflows_idx  ON referrer_workflows(workflow_id);
CREATE INDEX IF NOT EXISTS workflows_org_idx       ON workflows(org_id);
CREATE INDEX IF NOT EXISTS memberships_user_idx    ON memberships(user_id);

PRAGMA user_version = 1;
";
