//! PostgreSQL proof tier
//!
//! Primary tier. Uniqueness of `file_hash` is enforced by the table's UNIQUE
//! constraint, so `insert_if_absent` is a single `ON CONFLICT DO NOTHING`
//! statement and stays atomic across processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, FromRow};
use uuid::Uuid;

use crate::crypto::ContentFingerprint;
use crate::domain::{OwnerId, ProofRecord, ProofStatus};
use crate::infra::{classify_pg_error, InsertOutcome, ProofTier, ProvenanceError, Result};

const PROOF_COLUMNS: &str = "id, owner_id, content_id, content_type, filename, file_hash, \
     file_size, ledger_transaction_id, ledger_explorer_url, verification_status, \
     created_at, updated_at";

/// PostgreSQL-backed proof tier
pub struct PgProofStore {
    pool: PgPool,
}

impl PgProofStore {
    /// Create a new PostgreSQL proof tier
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create from connection string
    pub async fn from_url(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await.map_err(classify_pg_error)?;
        Ok(Self::new(pool))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select_by_hash(&self, file_hash: &str) -> Result<Option<ProofRecord>> {
        let row = sqlx::query_as::<_, ProofRow>(&format!(
            "SELECT {PROOF_COLUMNS} FROM proofs WHERE file_hash = $1"
        ))
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_pg_error)?;

        row.map(ProofRecord::try_from).transpose()
    }
}

#[async_trait]
impl ProofTier for PgProofStore {
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

        let inserted = sqlx::query_as::<_, ProofRow>(&format!(
            r#"
            INSERT INTO proofs (
                id, owner_id, content_id, content_type, filename, file_hash,
                file_size, ledger_transaction_id, ledger_explorer_url,
                verification_status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (file_hash) DO NOTHING
            RETURNING {PROOF_COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(record.owner_id.as_str())
        .bind(record.content_id.as_deref())
        .bind(&record.content_type)
        .bind(&record.filename)
        .bind(&file_hash)
        .bind(file_size)
        .bind(&record.ledger_transaction_id)
        .bind(&record.ledger_explorer_url)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_pg_error)?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(ProofRecord::try_from(row)?));
        }

        match self.select_by_hash(&file_hash).await? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(ProvenanceError::Internal(format!(
                "insert for {file_hash} conflicted but no row is visible"
            ))),
        }
    }

    async fn update_status(
        &self,
        fingerprint: &ContentFingerprint,
        status: ProofStatus,
    ) -> Result<Option<ProofRecord>> {
        let file_hash = fingerprint.to_hex();
        let mut tx = self.pool.begin().await.map_err(classify_pg_error)?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT verification_status FROM proofs WHERE file_hash = $1 FOR UPDATE")
                .bind(&file_hash)
                .fetch_optional(&mut *tx)
                .await
                .map_err(classify_pg_error)?;

        let Some((current,)) = current else {
            return Ok(None);
        };
        let current: ProofStatus = current.parse().map_err(ProvenanceError::Internal)?;

        if !current.can_transition_to(status) {
            return Err(ProvenanceError::Internal(format!(
                "invalid status transition for {file_hash}: {current} -> {status}"
            )));
        }

        let row = sqlx::query_as::<_, ProofRow>(&format!(
            r#"
            UPDATE proofs
            SET verification_status = $2,
                updated_at = CASE WHEN verification_status = $2 THEN updated_at ELSE NOW() END
            WHERE file_hash = $1
            RETURNING {PROOF_COLUMNS}
            "#
        ))
        .bind(&file_hash)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify_pg_error)?;

        tx.commit().await.map_err(classify_pg_error)?;
        Ok(Some(ProofRecord::try_from(row)?))
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<ProofRecord>> {
        let rows = sqlx::query_as::<_, ProofRow>(&format!(
            "SELECT {PROOF_COLUMNS} FROM proofs WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_pg_error)?;

        rows.into_iter().map(ProofRecord::try_from).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1 FROM proofs LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_pg_error)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Database row for `proofs`
#[derive(Debug, FromRow)]
struct ProofRow {
    id: Uuid,
    owner_id: String,
    content_id: Option<String>,
    content_type: String,
    filename: String,
    file_hash: String,
    file_size: i64,
    ledger_transaction_id: String,
    ledger_explorer_url: String,
    verification_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProofRow> for ProofRecord {
    type Error = ProvenanceError;

    fn try_from(row: ProofRow) -> Result<Self> {
        Ok(ProofRecord {
            id: row.id,
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
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
