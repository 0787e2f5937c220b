//! SQLite-backed [`VaultStore`].

use crate::schema;
use heirloom_core::{
    AttemptId, Attestation, Fragment, FragmentId, Party, PartyId, RecoveryAttempt,
    RecoveryOutcome, StoreError, StoreTx, Vault, VaultId, VaultStore,
};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const TERMINAL_STATUSES: &str = "('recovered', 'cancelled')";

fn store_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

/// SQLite integers are signed 64-bit; refuse values that would wrap negative.
fn sql_int(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| {
        StoreError::Backend(format!("{} {} exceeds the SQLite integer range", column, value))
    })
}

fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn from_json<T: DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Single-connection store. Writers are serialized by the connection mutex
/// and `BEGIN IMMEDIATE`, which also keeps other processes out while a
/// transaction is open.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(store_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // WAL for concurrent readers
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(store_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(store_err)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(store_err)?;
        schema::migrate(&conn).map_err(store_err)?;
        log::debug!("SQLite store ready (schema v{})", schema::SCHEMA_VERSION);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl VaultStore for SqliteStore {
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".into()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_err)?;

        // Dropping `tx` on the error path rolls back.
        let result = f(&mut SqliteTx { conn: &tx })?;
        tx.commit().map_err(store_err)?;
        Ok(result)
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl SqliteTx<'_> {
    fn body<T: DeserializeOwned>(
        &self,
        sql: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let body: Option<String> = self
            .conn
            .query_row(sql, params![key], |row| row.get(0))
            .optional()
            .map_err(store_err)?;
        body.as_deref().map(from_json).transpose()
    }

    fn bodies<T: DeserializeOwned>(&self, sql: &str, key: &str) -> Result<Vec<T>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(from_json(&row.map_err(store_err)?)?);
        }
        Ok(out)
    }
}

impl StoreTx for SqliteTx<'_> {
    fn vault(&self, id: &VaultId) -> Result<Option<Vault>, StoreError> {
        self.body("SELECT body FROM vaults WHERE id = ?1", id.as_str())
    }

    fn put_vault(&mut self, vault: &Vault) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO vaults (id, owner_id, status, body) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    status = excluded.status,
                    body = excluded.body",
                params![
                    vault.id.as_str(),
                    vault.owner_id,
                    vault.status.as_str(),
                    to_json(vault)?
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn live_vault_ids(&self) -> Result<Vec<VaultId>, StoreError> {
        let sql = format!(
            "SELECT id FROM vaults WHERE status NOT IN {} ORDER BY id",
            TERMINAL_STATUSES
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        rows.map(|row| row.map(VaultId::new).map_err(store_err))
            .collect()
    }

    fn parties(&self, vault_id: &VaultId) -> Result<Vec<Party>, StoreError> {
        self.bodies(
            "SELECT body FROM parties WHERE vault_id = ?1 ORDER BY rowid",
            vault_id.as_str(),
        )
    }

    fn put_party(&mut self, party: &Party) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO parties (id, vault_id, role, body) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    role = excluded.role,
                    body = excluded.body",
                params![
                    party.id.as_str(),
                    party.vault_id.as_str(),
                    party.role.as_str(),
                    to_json(party)?
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn fragments(&self, vault_id: &VaultId) -> Result<Vec<Fragment>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, holder_party_id, share_index, scheme_threshold, scheme_total, blob
                 FROM fragments WHERE vault_id = ?1 ORDER BY share_index",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![vault_id.as_str()], |row| {
                Ok(Fragment {
                    id: FragmentId::new(row.get::<_, String>(0)?),
                    vault_id: vault_id.clone(),
                    holder_party_id: PartyId::new(row.get::<_, String>(1)?),
                    share_index: row.get(2)?,
                    scheme_threshold: row.get(3)?,
                    scheme_total: row.get(4)?,
                    encrypted_share_blob: row.get(5)?,
                })
            })
            .map_err(store_err)?;
        rows.map(|row| row.map_err(store_err)).collect()
    }

    fn insert_fragment(&mut self, fragment: &Fragment) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO fragments
                    (id, vault_id, holder_party_id, share_index, scheme_threshold, scheme_total, blob)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    fragment.id.as_str(),
                    fragment.vault_id.as_str(),
                    fragment.holder_party_id.as_str(),
                    fragment.share_index,
                    fragment.scheme_threshold,
                    fragment.scheme_total,
                    fragment.encrypted_share_blob
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn attempt(&self, id: &AttemptId) -> Result<Option<RecoveryAttempt>, StoreError> {
        self.body("SELECT body FROM attempts WHERE id = ?1", id.as_str())
    }

    fn open_attempt(&self, vault_id: &VaultId) -> Result<Option<RecoveryAttempt>, StoreError> {
        self.body(
            "SELECT body FROM attempts WHERE vault_id = ?1 AND status = 'open'",
            vault_id.as_str(),
        )
    }

    fn put_attempt(&mut self, attempt: &RecoveryAttempt) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO attempts (id, vault_id, status, body) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    body = excluded.body",
                params![
                    attempt.id.as_str(),
                    attempt.vault_id.as_str(),
                    attempt.status.as_str(),
                    to_json(attempt)?
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn attestations(&self, attempt_id: &AttemptId) -> Result<Vec<Attestation>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT guardian_id, signature, nonce, signed_at
                 FROM attestations WHERE attempt_id = ?1 ORDER BY guardian_id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![attempt_id.as_str()], |row| {
                Ok(Attestation {
                    recovery_attempt_id: attempt_id.clone(),
                    guardian_id: PartyId::new(row.get::<_, String>(0)?),
                    signature: row.get(1)?,
                    nonce: get_u64(row, 2)?,
                    signed_at: get_u64(row, 3)?,
                })
            })
            .map_err(store_err)?;
        rows.map(|row| row.map_err(store_err)).collect()
    }

    fn upsert_attestation(&mut self, attestation: &Attestation) -> Result<(), StoreError> {
        let nonce = sql_int(attestation.nonce, "nonce")?;
        let signed_at = sql_int(attestation.signed_at, "signed_at")?;
        self.conn
            .execute(
                "INSERT INTO attestations (attempt_id, guardian_id, signature, nonce, signed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(attempt_id, guardian_id) DO UPDATE SET
                    signature = excluded.signature,
                    nonce = excluded.nonce,
                    signed_at = excluded.signed_at",
                params![
                    attestation.recovery_attempt_id.as_str(),
                    attestation.guardian_id.as_str(),
                    attestation.signature,
                    nonce,
                    signed_at
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn nonce_seen(
        &self,
        attempt_id: &AttemptId,
        guardian_id: &PartyId,
        nonce: u64,
    ) -> Result<bool, StoreError> {
        let nonce = sql_int(nonce, "nonce")?;
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM attestation_nonces
                 WHERE attempt_id = ?1 AND guardian_id = ?2 AND nonce = ?3)",
                params![attempt_id.as_str(), guardian_id.as_str(), nonce],
                |row| row.get(0),
            )
            .map_err(store_err)
    }

    fn record_nonce(
        &mut self,
        attempt_id: &AttemptId,
        guardian_id: &PartyId,
        nonce: u64,
    ) -> Result<(), StoreError> {
        let nonce = sql_int(nonce, "nonce")?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO attestation_nonces (attempt_id, guardian_id, nonce)
                 VALUES (?1, ?2, ?3)",
                params![attempt_id.as_str(), guardian_id.as_str(), nonce],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn record_outcome(&mut self, outcome: &RecoveryOutcome) -> Result<(), StoreError> {
        let recorded_at = sql_int(outcome.recorded_at, "recorded_at")?;
        self.conn
            .execute(
                "INSERT INTO recovery_outcomes
                    (attempt_id, vault_id, success, fragments_provided, threshold, total, reason, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    outcome.attempt_id.as_str(),
                    outcome.vault_id.as_str(),
                    outcome.success,
                    outcome.fragments_provided,
                    outcome.threshold,
                    outcome.total,
                    outcome.reason,
                    recorded_at
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn outcomes(&self) -> Result<Vec<RecoveryOutcome>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT attempt_id, vault_id, success, fragments_provided, threshold, total,
                        reason, recorded_at
                 FROM recovery_outcomes ORDER BY id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RecoveryOutcome {
                    attempt_id: AttemptId::new(row.get::<_, String>(0)?),
                    vault_id: VaultId::new(row.get::<_, String>(1)?),
                    success: row.get(2)?,
                    fragments_provided: row.get(3)?,
                    threshold: row.get(4)?,
                    total: row.get(5)?,
                    reason: row.get(6)?,
                    recorded_at: get_u64(row, 7)?,
                })
            })
            .map_err(store_err)?;
        rows.map(|row| row.map_err(store_err)).collect()
    }

    fn count_active_owners(&self) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(DISTINCT owner_id) FROM vaults WHERE status NOT IN {}",
            TERMINAL_STATUSES
        );
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(store_err)?;
        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative owner count {}", count)))
    }
}
