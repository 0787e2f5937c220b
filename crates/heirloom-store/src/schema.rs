//! Schema and migrations.
//!
//! Records are stored as JSON bodies next to the few columns that queries
//! and constraints need. Migrations are idempotent and tracked with
//! `PRAGMA user_version`.

use rusqlite::{Connection, Result as SqlResult};

pub const SCHEMA_VERSION: i64 = 2;

pub fn migrate(conn: &Connection) -> SqlResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vaults (
            id       TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            status   TEXT NOT NULL,
            body     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS parties (
            id       TEXT PRIMARY KEY,
            vault_id TEXT NOT NULL REFERENCES vaults(id),
            role     TEXT NOT NULL,
            body     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fragments (
            id               TEXT PRIMARY KEY,
            vault_id         TEXT NOT NULL REFERENCES vaults(id),
            holder_party_id  TEXT NOT NULL REFERENCES parties(id),
            share_index      INTEGER NOT NULL,
            scheme_threshold INTEGER NOT NULL,
            scheme_total     INTEGER NOT NULL,
            blob             BLOB NOT NULL,
            UNIQUE (vault_id, share_index)
        );

        CREATE TABLE IF NOT EXISTS attempts (
            id       TEXT PRIMARY KEY,
            vault_id TEXT NOT NULL REFERENCES vaults(id),
            status   TEXT NOT NULL,
            body     TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS attempts_one_open_per_vault
            ON attempts (vault_id) WHERE status = 'open';

        CREATE TABLE IF NOT EXISTS attestations (
            attempt_id  TEXT NOT NULL REFERENCES attempts(id),
            guardian_id TEXT NOT NULL,
            signature   BLOB NOT NULL,
            nonce       INTEGER NOT NULL,
            signed_at   INTEGER NOT NULL,
            PRIMARY KEY (attempt_id, guardian_id)
        );
        ",
    )?;

    // v2: replay tracking and outcome metrics
    if version < 2 {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS attestation_nonces (
                attempt_id  TEXT NOT NULL REFERENCES attempts(id),
                guardian_id TEXT NOT NULL,
                nonce       INTEGER NOT NULL,
                PRIMARY KEY (attempt_id, guardian_id, nonce)
            );

            CREATE TABLE IF NOT EXISTS recovery_outcomes (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                attempt_id         TEXT NOT NULL,
                vault_id           TEXT NOT NULL,
                success            INTEGER NOT NULL,
                fragments_provided INTEGER NOT NULL,
                threshold          INTEGER NOT NULL,
                total              INTEGER NOT NULL,
                reason             TEXT,
                recorded_at        INTEGER NOT NULL
            );
            ",
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}
