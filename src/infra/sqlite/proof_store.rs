//! SQLite proof tier for local development fallback
//!
//! Same logical shape as the primary `proofs` table, keyed by `file_hash`.
//! Timestamps are stored as RFC 3339 text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::crypto::ContentFingerprint;
use crate::domain::{OwnerId, ProofRecord, ProofStatus};
use crate::infra::{classify_sqlite_error, InsertOutcome, ProofTier, ProvenanceError, Result};

const PROOF_COLUMNS: &str = "id, owner_id, content_id, content_type, filename, file_hash, \
     file_size, ledger_transaction_id, ledger_explorer_url, verification_status, \
     created_at, updated_at";

/// SQLite-backed proof tier
pub struct SqliteProofStore {
    pool: SqlitePool,
}

impl SqliteProofStore {
    /// Create a new SQLite proof tier with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a database, e.g. `sqlite://proofs.db?mode=rwc`
    pub async fn from_path(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path)
            .await
            .map_err(classify_sqlite_error)?;
        Ok(Self { pool })
    }

    /// Private in-memory database, single connection so every query sees it
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(classify_sqlite_error)?;
        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn initialize(&self) -> Result<()> {
        crate::migrations::run_sqlite(&self.pool)
            .await
            .map_err(|e| ProvenanceError::StoreSchemaMissing(e.to_string()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn select_by_hash(&self, file_hash: &str) -> Result<Option<ProofRecord>> {
        let row = sqlx::query_as::<_, SqliteProofRow>(&format!(
            "SELECT {PROOF_COLUMNS} FROM proofs WHERE file_hash = ?"
        ))
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlite_error)?;

        row.map(ProofRecord::try_from).transpose()
    }
}

#[async_trait]
impl ProofTier for SqliteProofStore {
    async fn find(&self, fingerprint: &ContentFingerprint) -> Result<Option<ProofRecord>> {
        self.select_by_hash(&fingerprint.to_hex()).await
    }

    async fn insert_if_absent(&self, record: &ProofRecord) -> Result<InsertOutcome> {
        let file_hash = record.fingerprint.to_hex();
        let file_size = i64::try_from(record.file_size_bytes).map_err(|_| {
            ProvenanceError::Internal(format!(
                "file_size {} out of range for {file_hash}",
                record.file_size_bytes
            ))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO proofs (
                id, owner_id, content_id, content_type, filename, file_hash,
                file_size, ledger_transaction_id, ledger_explorer_url,
                verification_status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_hash) DO NOTHING
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.owner_id.as_str())
        .bind(record.content_id.as_deref())
        .bind(&record.content_type)
        .bind(&record.filename)
        .bind(&file_hash)
        .bind(file_size)
        .bind(&record.ledger_transaction_id)
        .bind(&record.ledger_explorer_url)
        .bind(record.status.as_str())
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(classify_sqlite_error)?;

        let stored = self.select_by_hash(&file_hash).await?.ok_or_else(|| {
            ProvenanceError::Internal(format!("row for {file_hash} vanished after insert"))
        })?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted(stored))
        } else {
            Ok(InsertOutcome::Existing(stored))
        }
    }

    async fn update_status(
        &self,
        fingerprint: &ContentFingerprint,
        status: ProofStatus,
    ) -> Result<Option<ProofRecord>> {
        let file_hash = fingerprint.to_hex();
        let mut tx = self.pool.begin().await.map_err(classify_sqlite_error)?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT verification_status FROM proofs WHERE file_hash = ?")
                .bind(&file_hash)
                .fetch_optional(&mut *tx)
                .await
                .map_err(classify_sqlite_error)?;

        let Some((current,)) = current else {
            return Ok(None);
        };
        let current: ProofStatus = current.parse().map_err(ProvenanceError::Internal)?;

        if !current.can_transition_to(status) {
            return Err(ProvenanceError::Internal(format!(
                "invalid status transition for {file_hash}: {current} -> {status}"
            )));
        }

        if current != status {
            sqlx::query(
                "UPDATE proofs SET verification_status = ?, updated_at = ? WHERE file_hash = ?",
            )
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(&file_hash)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlite_error)?;
        }

        tx.commit().await.map_err(classify_sqlite_error)?;
        self.select_by_hash(&file_hash).await
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<ProofRecord>> {
        let rows = sqlx::query_as::<_, SqliteProofRow>(&format!(
            "SELECT {PROOF_COLUMNS} FROM proofs WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlite_error)?;

        rows.into_iter().map(ProofRecord::try_from).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1 FROM proofs LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlite_error)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[derive(Debug, FromRow)]
struct SqliteProofRow {
    id: String,
    owner_id: String,
    content_id: Option<String>,
    content_type: String,
    filename: String,
    file_hash: String,
    file_size: i64,
    ledger_transaction_id: String,
    ledger_explorer_url: String,
    verification_status: String,
    created_at: String,
    updated_at: String,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProvenanceError::Internal(format!("invalid timestamp {value:?}: {e}")))
}

impl TryFrom<SqliteProofRow> for ProofRecord {
    type Error = ProvenanceError;

    fn try_from(row: SqliteProofRow) -> Result<Self> {
        Ok(ProofRecord {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| ProvenanceError::Internal(format!("invalid id {}: {e}", row.id)))?,
            fingerprint: ContentFingerprint::from_hex(&row.file_hash)?,
            owner_id: OwnerId::new(row.owner_id),
            content_id: row.content_id,
            content_type: row.content_type,
            filename: row.filename,
            file_size_bytes: u64::try_from(row.file_size).map_err(|_| {
                ProvenanceError::Internal(format!("negative file_size for {}", row.file_hash))
            })?,
            ledger_transaction_id: row.ledger_transaction_id,
            ledger_explorer_url: row.ledger_explorer_url,
            status: row
                .verification_status
                .parse()
                .map_err(ProvenanceError::Internal)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}
